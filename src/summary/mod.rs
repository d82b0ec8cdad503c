//! Failure taxonomy, exit codes and the final run report

mod failure;
mod report;

pub use failure::{ExitCode, ExitCodeAggregator, FailureKind, RunStatus};
pub use report::{FailureSummary, RunReport, RUN_REPORT_SCHEMA_ID, RUN_REPORT_SCHEMA_VERSION};
