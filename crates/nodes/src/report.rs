//! Summary reporter.

use std::sync::Arc;

use pipeline::{ReportSink, RunOutcome, RunReport};
use tracing::{error, info, warn};

/// Publishes every run report to each configured sink.
///
/// A sink failure is logged and never changes the run's outcome.
#[derive(Clone, Default)]
pub struct Reporter {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl Reporter {
    /// A reporter publishing to `sinks`, in order.
    pub fn new(sinks: Vec<Arc<dyn ReportSink>>) -> Self {
        Self { sinks }
    }

    /// Adds a sink after the existing ones.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Logs the outcome and hands the report to every sink. Returns the number
    /// of sinks that accepted it.
    pub fn publish(&self, report: &RunReport) -> usize {
        match &report.outcome {
            RunOutcome::Committed { commit, pushed, added, updated } => {
                info!(
                    run_id = %report.run_id,
                    commit = %commit,
                    pushed,
                    added,
                    updated,
                    "Run committed changes"
                );
            }
            RunOutcome::NoChange => info!(run_id = %report.run_id, "Run finished without changes"),
            RunOutcome::Failed { step, message } => {
                error!(run_id = %report.run_id, step = %step, error = %message, "Run failed");
            }
        }

        self.sinks
            .iter()
            .filter(|sink| match sink.publish(report) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Failed to publish run report");
                    false
                }
            })
            .count()
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter").field("sinks", &self.sinks.len()).finish()
    }
}
