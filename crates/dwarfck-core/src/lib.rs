//! # dwarfck-core
//!
//! Verification engine for DWARF debug information.
//!
//! This crate checks that the debug information of a binary is well-formed
//! and internally consistent, including:
//! - Unit headers and abbreviation tables
//! - The entry tree: attribute values, references, address ranges and
//!   location expressions
//! - Line tables, accelerator tables (`.debug_names` and the Apple tables),
//!   unit indices and string offsets
//!
//! ## Layout
//!
//! - [`loader`] reads an object file and decodes it with `gimli`
//! - [`types`] is the decoded model the checks walk
//! - [`verifier`] runs the checks and counts every defect by category
//!
//! Defects are never returned as errors. They are counted in the
//! [`OutputCategoryAggregator`](verifier::OutputCategoryAggregator) and
//! verification continues.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use dwarfck_core::loader;
//! use dwarfck_core::verifier::{Verifier, VerifierOptions};
//!
//! let data = loader::load_file(Path::new("a.out"))?;
//! let verifier = Verifier::new(&data, VerifierOptions::default());
//! verifier.handle_debug_abbrev();
//! verifier.handle_debug_info();
//! println!("{}", verifier.summarize()?);
//! # Ok::<(), dwarfck_core::DwarfckError>(())
//! ```

pub mod error;
pub mod loader;
pub mod types;
pub mod verifier;

// Re-export commonly used types
pub use error::{DwarfckError, Result};
pub use types::DebugData;
pub use verifier::{Summary, Verifier, VerifierOptions};
