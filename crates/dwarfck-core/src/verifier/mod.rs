//! # Verifier
//!
//! Structural and semantic checks over decoded DWARF.
//!
//! A [`Verifier`] borrows one [`DebugData`] and exposes a `handle_*` entry
//! point per section family. Each entry point reports every defect it finds
//! into the shared [`OutputCategoryAggregator`] and keeps going; the return
//! value only says whether that family added any error. Call
//! [`Verifier::summarize`] once every family has been handled.
//!
//! ```rust
//! use dwarfck_core::types::DebugData;
//! use dwarfck_core::verifier::{Verifier, VerifierOptions};
//! use gimli::RunTimeEndian;
//!
//! let data = DebugData::new(RunTimeEndian::Little);
//! let verifier = Verifier::new(&data, VerifierOptions::default());
//! assert!(verifier.handle_debug_info());
//! assert_eq!(verifier.num_errors(), 0);
//! ```

mod abbrev;
mod accel;
mod aggregator;
mod expression;
mod header;
mod index;
mod line;
mod ranges;
mod references;
mod str_offsets;
mod strings;
mod summary;
mod tags;
mod unit;

use std::path::PathBuf;

pub use aggregator::{AggregationData, OutputCategoryAggregator};
pub use ranges::DieRangeInfo;
use rayon::prelude::*;
pub use references::ReferenceMap;
pub use summary::Summary;
use tracing::debug;

use crate::error::Result;
use crate::types::{DebugData, UnitSection};

/// How a verification run reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierOptions
{
    /// Record and log a detail string for every error
    pub show_detail: bool,
    /// Include per-category counts in the text summary
    pub show_aggregate_errors: bool,
    /// Write a JSON error summary here when summarizing
    pub json_summary: Option<PathBuf>,
    /// Verify units on the rayon pool
    pub parallel: bool,
}

impl Default for VerifierOptions
{
    fn default() -> Self
    {
        Self {
            show_detail: false,
            show_aggregate_errors: true,
            json_summary: None,
            parallel: true,
        }
    }
}

/// Verification engine over one binary's debug information
#[derive(Debug)]
pub struct Verifier<'a>
{
    data: &'a DebugData,
    options: VerifierOptions,
    aggregator: OutputCategoryAggregator,
}

impl<'a> Verifier<'a>
{
    pub fn new(data: &'a DebugData, options: VerifierOptions) -> Self
    {
        let aggregator = OutputCategoryAggregator::new(options.show_detail);
        Self {
            data,
            options,
            aggregator,
        }
    }

    pub fn options(&self) -> &VerifierOptions
    {
        &self.options
    }

    /// The sink every check reports into
    pub fn aggregator(&self) -> &OutputCategoryAggregator
    {
        &self.aggregator
    }

    /// Total errors reported so far
    pub fn num_errors(&self) -> u32
    {
        self.aggregator.num_errors()
    }

    /// Run `check` and say whether it reported nothing new
    fn run(&self, family: &str, check: impl FnOnce()) -> bool
    {
        let before = self.num_errors();
        check();
        let found = self.num_errors() - before;
        debug!(family, errors = found, "verified");
        found == 0
    }

    /// Abbreviation sets in `.debug_abbrev`
    pub fn handle_debug_abbrev(&self) -> bool
    {
        self.run(".debug_abbrev", || self.verify_abbrev_section())
    }

    /// Unit headers, unit contents and references of `.debug_info` and
    /// `.debug_types`
    ///
    /// Units are verified concurrently unless parallelism is off. The
    /// cross-unit reference pass runs once every unit is done.
    pub fn handle_debug_info(&self) -> bool
    {
        self.run(".debug_info", || {
            let mut cross = ReferenceMap::new();
            for section in [UnitSection::Info, UnitSection::Types] {
                let chain = self.verify_unit_headers(section);
                let units: Vec<_> = self
                    .data
                    .units_in(section)
                    .filter(|unit| !chain.rejected.contains(&unit.offset))
                    .collect();
                debug!(
                    section = section.name(),
                    accepted = chain.accepted.len(),
                    rejected = chain.rejected.len(),
                    units = units.len(),
                    "unit headers walked"
                );

                let found = if self.options.parallel {
                    units
                        .par_iter()
                        .map(|unit| self.verify_unit(unit))
                        .reduce(ReferenceMap::new, |mut all, refs| {
                            references::merge_references(&mut all, refs);
                            all
                        })
                } else {
                    let mut all = ReferenceMap::new();
                    for unit in units {
                        references::merge_references(&mut all, self.verify_unit(unit));
                    }
                    all
                };
                references::merge_references(&mut cross, found);
            }
            self.verify_cross_unit_references(&cross);
        })
    }

    /// `.debug_cu_index`
    pub fn handle_debug_cu_index(&self) -> bool
    {
        self.run(".debug_cu_index", || {
            self.verify_unit_index(&self.data.sections.debug_cu_index, index::IndexKind::Compile);
        })
    }

    /// `.debug_tu_index`
    pub fn handle_debug_tu_index(&self) -> bool
    {
        self.run(".debug_tu_index", || {
            self.verify_unit_index(&self.data.sections.debug_tu_index, index::IndexKind::Type);
        })
    }

    /// Statement-list offsets and line-table rows
    pub fn handle_debug_line(&self) -> bool
    {
        self.run(".debug_line", || self.verify_debug_line())
    }

    /// Apple accelerator tables and `.debug_names`
    pub fn handle_accel_tables(&self) -> bool
    {
        self.run("accelerator tables", || self.verify_accel_tables())
    }

    /// `.debug_str_offsets` contributions
    pub fn handle_debug_str_offsets(&self) -> bool
    {
        self.run(".debug_str_offsets", || self.verify_str_offsets())
    }

    /// Build the final summary, writing the JSON file when configured
    pub fn summarize(&self) -> Result<Summary>
    {
        let summary = Summary::new(
            self.aggregator.snapshot(),
            self.num_errors(),
            self.options.show_aggregate_errors,
        )
        .with_detail(self.options.show_detail);
        if let Some(path) = &self.options.json_summary {
            summary.write_json(path)?;
        }
        Ok(summary)
    }
}
