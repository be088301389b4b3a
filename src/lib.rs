//! Pending-review and revoked-access reports from ITC compliance exports.
//!
//! [`loader::load_export`] reads the CSV; [`report::analyze`] turns its rows
//! into one [`report::Report`] per report type without touching the clock or
//! the filesystem; [`output`] writes the results.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod digest;
pub mod error;
pub mod grouping;
pub mod loader;
pub mod output;
pub mod owner;
pub mod recipients;
pub mod record;
pub mod report;

pub use config::ReportConfig;
pub use error::{PipelineError, Result};
pub use report::{analyze, Analysis, Report, ReportKind, ReportStatus};
