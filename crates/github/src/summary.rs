//! Report sinks: the GitHub Actions job summary and stdout.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use pipeline::{ReportError, ReportSink, RunReport};
use tracing::debug;

/// Environment variable GitHub Actions sets to the job summary file.
pub const STEP_SUMMARY_ENV: &str = "GITHUB_STEP_SUMMARY";

/// Appends reports to the Actions job summary file.
#[derive(Debug, Clone)]
pub struct StepSummary {
    path: PathBuf,
}

impl StepSummary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The sink named by `GITHUB_STEP_SUMMARY`, if set and non-empty.
    pub fn from_env() -> Option<Self> {
        std::env::var_os(STEP_SUMMARY_ENV)
            .filter(|v| !v.is_empty())
            .map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for StepSummary {
    fn publish(&self, report: &RunReport) -> Result<(), ReportError> {
        let err = |e: std::io::Error| ReportError {
            target: self.path.display().to_string(),
            message: e.to_string(),
        };
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).map_err(err)?;
        file.write_all(report.to_markdown().as_bytes()).map_err(err)?;
        debug!(path = %self.path.display(), "Appended job summary");
        Ok(())
    }
}

/// Prints reports to stdout, for runs outside GitHub Actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReport;

impl ReportSink for ConsoleReport {
    fn publish(&self, report: &RunReport) -> Result<(), ReportError> {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(report.to_markdown().as_bytes())
            .and_then(|()| stdout.flush())
            .map_err(|e| ReportError { target: "stdout".to_string(), message: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{RepoPath, RunIntent, RunOutcome, Timestamp, TriggerKind};

    fn report(outcome: RunOutcome) -> RunReport {
        RunReport::new(
            &RunIntent::new(TriggerKind::Manual),
            RepoPath::new("references.bib").unwrap(),
            Timestamp::now(),
            outcome,
        )
    }

    #[test]
    fn appends_to_existing_summary() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("summary.md");
        std::fs::write(&path, "# Earlier step\n").unwrap();

        let sink = StepSummary::new(&path);
        sink.publish(&report(RunOutcome::NoChange)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "# Earlier step\n\
             ## Wiki citation sync\n\
             - Status: no changes\n\
             - References: 0 added, 0 updated\n\
             - Bibliography: `references.bib`\n"
        );
    }

    #[test]
    fn unwritable_summary_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let sink = StepSummary::new(dir.path().join("missing").join("summary.md"));
        assert!(sink.publish(&report(RunOutcome::NoChange)).is_err());
    }
}
