// src/report.rs

//! Reporting glue: per-pass summaries and the invocation-level failure rule.

use tracing::{error, info, warn};

use crate::task::{TaskError, TaskResults};
use crate::watch::{PassOutcome, PassReport};

/// Counts over one pass's results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub succeeded: usize,
    /// Successes that reused a recorded output instead of re-executing.
    pub cached: usize,
    pub failed: usize,
    /// Tasks skipped because a dependency failed.
    pub propagated: usize,
    pub cancelled: usize,
}

impl PassSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.propagated + self.cancelled
    }
}

pub fn summarize(results: &TaskResults) -> PassSummary {
    let mut summary = PassSummary::default();
    for result in results.iter() {
        match &result.error {
            None => {
                summary.succeeded += 1;
                if result.output.as_ref().is_some_and(|output| !output.fresh) {
                    summary.cached += 1;
                }
            }
            Some(TaskError::Propagated { .. }) => summary.propagated += 1,
            Some(TaskError::Cancelled { .. }) => summary.cancelled += 1,
            Some(_) => summary.failed += 1,
        }
    }
    summary
}

/// Log one line per task plus a summary line, in completion order.
pub fn log_results(results: &TaskResults) {
    for result in results.iter() {
        match &result.error {
            None => {
                let cached = result.output.as_ref().is_some_and(|output| !output.fresh);
                info!(key = %result.key, cached, duration = ?result.duration, "done");
            }
            Some(TaskError::Propagated {
                failed_dependency, ..
            }) => {
                warn!(key = %result.key, dependency = %failed_dependency, "skipped due to dependency failure");
            }
            Some(TaskError::Cancelled { .. }) => {
                warn!(key = %result.key, "cancelled");
            }
            Some(err) => {
                error!(key = %result.key, error = %err, "failed");
            }
        }
    }

    let summary = summarize(results);
    info!(
        succeeded = summary.succeeded,
        cached = summary.cached,
        failed = summary.failed,
        skipped = summary.propagated,
        cancelled = summary.cancelled,
        "pass finished"
    );
}

/// Log a watch-mode pass report.
pub fn log_pass_report(report: &PassReport) {
    match &report.outcome {
        PassOutcome::Completed(results) => {
            info!(pass = report.index, "pass completed");
            log_results(results);
        }
        PassOutcome::Cancelled(results) => {
            warn!(pass = report.index, "pass cancelled");
            if let Some(results) = results {
                log_results(results);
            }
        }
        PassOutcome::Faulted(message) => {
            error!(pass = report.index, error = %message, "pass faulted");
        }
    }
}
