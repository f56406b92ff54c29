//! Output formatting module
//!
//! Provides console output formats for run summaries.

mod formatter;

pub use formatter::{OutputFormat, ResultFormatter};
