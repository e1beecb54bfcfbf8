//! # dwarfck Utilities
//!
//! Shared utilities for the dwarfck workspace.
//!
//! For now this is the logging setup built on `tracing`, shared by the CLI
//! and by anything else embedding the verifier.

pub mod logging;

// Re-export commonly used logging items for convenience
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
