//! Category-aggregating error sink.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::error;

/// Counts for one error category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregationData
{
    /// Every report in this category, detailed or not
    #[serde(rename = "count")]
    pub overall_count: u32,
    /// Distinct detail strings (or sub-categories) and their counts
    #[serde(rename = "details")]
    pub detailed_counts: BTreeMap<String, u32>,
}

#[derive(Debug, Default)]
struct AggregatorState
{
    categories: BTreeMap<String, AggregationData>,
    total: u32,
}

/// Sink every check reports into
///
/// One lock guards both the category map and the running total, so
/// concurrent unit tasks never lose an update. Reporting never fails.
///
/// ```rust
/// use dwarfck_core::verifier::OutputCategoryAggregator;
///
/// let agg = OutputCategoryAggregator::new(false);
/// agg.report("Invalid DIE reference", || unreachable!("detail is off"));
/// agg.report("Invalid DIE reference", || unreachable!("detail is off"));
/// assert_eq!(agg.num_errors(), 2);
/// assert_eq!(agg.num_categories(), 1);
/// ```
#[derive(Debug, Default)]
pub struct OutputCategoryAggregator
{
    state: Mutex<AggregatorState>,
    include_detail: Mutex<bool>,
}

impl OutputCategoryAggregator
{
    pub fn new(include_detail: bool) -> Self
    {
        Self {
            state: Mutex::new(AggregatorState::default()),
            include_detail: Mutex::new(include_detail),
        }
    }

    pub fn show_detail(&self, include_detail: bool)
    {
        *self.include_detail.lock() = include_detail;
    }

    pub fn include_detail(&self) -> bool
    {
        *self.include_detail.lock()
    }

    /// Record one error in `category`
    ///
    /// `detail` is only called when detail reporting is on.
    pub fn report(&self, category: &str, detail: impl FnOnce() -> String)
    {
        let include_detail = self.include_detail();
        let mut state = self.state.lock();
        state.total = state.total.saturating_add(1);
        let data = state.categories.entry(category.to_string()).or_default();
        data.overall_count = data.overall_count.saturating_add(1);
        if include_detail {
            let message = detail();
            error!(category, "{message}");
            *data.detailed_counts.entry(message).or_default() += 1;
        }
    }

    /// Record one error in `category`, grouped under `sub_category`
    ///
    /// The sub-category is always counted, so the summary can tell errors
    /// apart by attribute or tag name even without detail reporting.
    pub fn report_sub(&self, category: &str, sub_category: &str, detail: impl FnOnce() -> String)
    {
        let include_detail = self.include_detail();
        let mut state = self.state.lock();
        state.total = state.total.saturating_add(1);
        let data = state.categories.entry(category.to_string()).or_default();
        data.overall_count = data.overall_count.saturating_add(1);
        *data.detailed_counts.entry(sub_category.to_string()).or_default() += 1;
        if include_detail {
            let message = detail();
            error!(category, sub_category, "{message}");
        }
    }

    /// Call `handler` for every category in lexicographic order
    pub fn enumerate_results(&self, mut handler: impl FnMut(&str, u32))
    {
        let state = self.state.lock();
        for (category, data) in &state.categories {
            handler(category, data.overall_count);
        }
    }

    /// Call `handler` for every detail of `category` in lexicographic order
    pub fn enumerate_detailed_results_for(&self, category: &str, mut handler: impl FnMut(&str, u32))
    {
        let state = self.state.lock();
        if let Some(data) = state.categories.get(category) {
            for (detail, count) in &data.detailed_counts {
                handler(detail, *count);
            }
        }
    }

    /// Copy of every category's counts
    pub fn snapshot(&self) -> BTreeMap<String, AggregationData>
    {
        self.state.lock().categories.clone()
    }

    pub fn num_errors(&self) -> u32
    {
        self.state.lock().total
    }

    pub fn num_categories(&self) -> usize
    {
        self.state.lock().categories.len()
    }
}
