//! Results aggregation and reporting module
//!
//! Folds the finished tree into statistics and renders or exports them.

mod aggregate;
mod report;
mod storage;

pub use aggregate::{aggregate, fold_example, AggregateEntry, Aggregation, StatusCounts, StepSummary};
pub use report::{ReportFormat, ReportGenerator};
pub use storage::{write_launch_info, ExportFormat, RunRecord};
