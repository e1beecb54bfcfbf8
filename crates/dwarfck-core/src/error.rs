//! # Error Types
//!
//! Errors for the edges of the verifier: loading a binary and writing reports.
//!
//! Defects found *in* the debug information are never returned as errors.
//! They are reported into the
//! [`OutputCategoryAggregator`](crate::verifier::OutputCategoryAggregator)
//! and verification carries on. This enum only covers the cases where there
//! is nothing to verify at all, or where a report cannot be written.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for loading and reporting
///
/// ## Error Categories
///
/// 1. **Input errors**: Io, Object, Dwarf
/// 2. **Output errors**: Summary
#[derive(Error, Debug)]
pub enum DwarfckError
{
    /// The binary could not be read from disk
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not an object file `object` understands
    ///
    /// This happens for truncated files, archives, or formats without
    /// DWARF support (e.g. raw firmware images).
    #[error("failed to parse object file {path}: {source}")]
    Object
    {
        path: PathBuf,
        #[source]
        source: object::Error,
    },

    /// A DWARF section could not be decoded at all
    ///
    /// Decoding problems local to one unit or entry are not fatal; they are
    /// surfaced by the verifier. This variant is for failures that stop the
    /// loader from producing any model, like a broken compressed section.
    #[error("failed to decode {context}: {source}")]
    Dwarf
    {
        context: &'static str,
        #[source]
        source: gimli::Error,
    },

    /// The JSON error summary could not be serialized or written
    #[error("failed to write error summary to {path}: {reason}")]
    Summary
    {
        path: PathBuf,
        reason: String,
    },
}

/// Convenience type alias for `Result<T, DwarfckError>`
///
/// ```rust
/// use dwarfck_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, DwarfckError>;
