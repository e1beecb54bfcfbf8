//! Final error summary, as text and as the JSON summary file.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use super::AggregationData;
use crate::error::{DwarfckError, Result};

/// Error counts of a finished verification run
///
/// `Display` renders the aggregated per-category counts (when enabled),
/// each followed by its sub-category counts in detail mode, then the
/// overall verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary
{
    #[serde(rename = "error-categories")]
    pub categories: BTreeMap<String, AggregationData>,
    #[serde(rename = "error-count")]
    pub error_count: u32,
    #[serde(skip)]
    pub show_aggregate: bool,
    #[serde(skip)]
    pub show_detail: bool,
}

impl Summary
{
    pub fn new(categories: BTreeMap<String, AggregationData>, error_count: u32, show_aggregate: bool) -> Self
    {
        Self {
            categories,
            error_count,
            show_aggregate,
            show_detail: false,
        }
    }

    /// List each category's sub-category counts under it
    #[must_use]
    pub fn with_detail(mut self, show_detail: bool) -> Self
    {
        self.show_detail = show_detail;
        self
    }

    pub fn is_clean(&self) -> bool
    {
        self.error_count == 0
    }

    pub fn to_json(&self) -> Result<String>
    {
        serde_json::to_string_pretty(self).map_err(|err| DwarfckError::Summary {
            path: PathBuf::from("<memory>"),
            reason: err.to_string(),
        })
    }

    /// Write the JSON summary to `path`
    pub fn write_json(&self, path: &Path) -> Result<()>
    {
        let summary_error = |reason: String| DwarfckError::Summary {
            path: path.to_path_buf(),
            reason,
        };
        let file = File::create(path).map_err(|err| summary_error(err.to_string()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).map_err(|err| summary_error(err.to_string()))?;
        info!(path = %path.display(), errors = self.error_count, "wrote JSON error summary");
        Ok(())
    }
}

impl fmt::Display for Summary
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if self.show_aggregate && !self.categories.is_empty() {
            writeln!(f, "Aggregated error counts:")?;
            for (category, data) in &self.categories {
                writeln!(f, "{category} occurred {} time(s).", data.overall_count)?;
                if self.show_detail {
                    for (detail, count) in &data.detailed_counts {
                        writeln!(f, "\t{detail} occurred {count} time(s).")?;
                    }
                }
            }
        }
        if self.is_clean() {
            write!(f, "No errors.")
        } else {
            write!(f, "Errors detected.")
        }
    }
}

#[cfg(test)]
mod tests
{
    use pretty_assertions::assert_eq;

    use super::*;

    fn summary(show_aggregate: bool) -> Summary
    {
        let categories = BTreeMap::from([
            (
                String::from("Invalid DIE reference"),
                AggregationData {
                    overall_count: 2,
                    detailed_counts: BTreeMap::new(),
                },
            ),
            (
                String::from("Name Index DIE entry missing name"),
                AggregationData {
                    overall_count: 1,
                    detailed_counts: BTreeMap::from([(String::from("DW_TAG_variable"), 1)]),
                },
            ),
        ]);
        Summary::new(categories, 3, show_aggregate)
    }

    #[test]
    fn text_lists_categories_in_order()
    {
        assert_eq!(
            summary(true).to_string(),
            "Aggregated error counts:\n\
             Invalid DIE reference occurred 2 time(s).\n\
             Name Index DIE entry missing name occurred 1 time(s).\n\
             Errors detected."
        );
        assert_eq!(summary(false).to_string(), "Errors detected.");
        assert_eq!(summary(false).with_detail(true).to_string(), "Errors detected.");
        assert_eq!(Summary::new(BTreeMap::new(), 0, true).to_string(), "No errors.");
    }

    #[test]
    fn detail_mode_lists_sub_categories()
    {
        assert_eq!(
            summary(true).with_detail(true).to_string(),
            "Aggregated error counts:\n\
             Invalid DIE reference occurred 2 time(s).\n\
             Name Index DIE entry missing name occurred 1 time(s).\n\
             \tDW_TAG_variable occurred 1 time(s).\n\
             Errors detected."
        );
        assert_eq!(Summary::new(BTreeMap::new(), 0, true).with_detail(true).to_string(), "No errors.");
    }

    #[test]
    fn json_shape()
    {
        let json: serde_json::Value = serde_json::from_str(&summary(true).to_json().unwrap()).unwrap();
        assert_eq!(json["error-count"], 3);
        assert_eq!(json["error-categories"]["Invalid DIE reference"]["count"], 2);
        assert_eq!(
            json["error-categories"]["Name Index DIE entry missing name"]["details"]["DW_TAG_variable"],
            1
        );
        assert!(json.get("show_aggregate").is_none());
        assert!(json.get("show_detail").is_none());
    }
}
