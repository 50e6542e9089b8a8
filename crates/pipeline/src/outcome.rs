//! Run outcome and the human-readable report derived from it.
//!
//! The report always reflects what actually happened: a commit, a no-op, or a
//! failure at a named step.

use serde::{Deserialize, Serialize};

use crate::identifiers::{CommitSha, RepoPath, RunId};
use crate::trigger::{RunIntent, TriggerKind};
use crate::types::{RunStep, Timestamp};

/// Heading of every report block.
pub const REPORT_HEADING: &str = "## Wiki citation sync";

/// What a run ended with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The bibliography changed and a commit was created (and pushed, when
    /// pushing is enabled).
    Committed {
        /// The new commit.
        commit: CommitSha,
        /// Whether the commit reached the remote.
        pushed: bool,
        /// Entries appended by the executor.
        added: usize,
        /// Entries replaced by the executor.
        updated: usize,
    },
    /// The bibliography is byte-identical to the committed version.
    NoChange,
    /// The run stopped at `step`.
    Failed {
        /// Step that failed.
        step: RunStep,
        /// Error description.
        message: String,
    },
}

impl RunOutcome {
    /// Returns `true` unless the run failed.
    pub fn is_success(&self) -> bool {
        !matches!(self, RunOutcome::Failed { .. })
    }
}

/// The record of one run, handed to report sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: RunId,
    /// What started the run.
    pub trigger: TriggerKind,
    /// Bibliography path the run operated on.
    pub bibliography: RepoPath,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run finished.
    pub finished_at: Timestamp,
    /// Result.
    pub outcome: RunOutcome,
}

impl RunReport {
    /// Creates a report for `intent` that finished now.
    pub fn new(
        intent: &RunIntent,
        bibliography: RepoPath,
        started_at: Timestamp,
        outcome: RunOutcome,
    ) -> Self {
        Self {
            run_id: intent.run_id,
            trigger: intent.trigger,
            bibliography,
            started_at,
            finished_at: Timestamp::now(),
            outcome,
        }
    }

    /// Renders the report as Markdown lines.
    ///
    /// Successful runs render exactly four lines; failed runs render a failure
    /// block instead, which never contains the success lines.
    pub fn summary_lines(&self) -> Vec<String> {
        match &self.outcome {
            RunOutcome::Committed { commit, pushed, added, updated } => {
                let status = if *pushed {
                    format!("committed and pushed `{}`", commit.short())
                } else {
                    format!("committed `{}` (not pushed)", commit.short())
                };
                self.success_lines(&status, *added, *updated)
            }
            RunOutcome::NoChange => self.success_lines("no changes", 0, 0),
            RunOutcome::Failed { step, message } => vec![
                REPORT_HEADING.to_string(),
                format!("- Status: failed during {step}"),
                format!("- Error: {}", single_line(message)),
                format!("- Run: `{}` ({})", self.run_id, self.trigger),
            ],
        }
    }

    /// [`RunReport::summary_lines`] joined with trailing newline.
    pub fn to_markdown(&self) -> String {
        let mut out = self.summary_lines().join("\n");
        out.push('\n');
        out
    }

    fn success_lines(&self, status: &str, added: usize, updated: usize) -> Vec<String> {
        vec![
            REPORT_HEADING.to_string(),
            format!("- Status: {status}"),
            format!("- References: {added} added, {updated} updated"),
            format!("- Bibliography: `{}`", self.bibliography),
        ]
    }
}

fn single_line(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}
