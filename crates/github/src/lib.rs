//! bibsync git and GitHub Actions adapter.
//!
//! Implements the repository-facing traits defined in the [`pipeline`] crate:
//!
//! - [`GitRepository`] — [`pipeline::VersionControl`] over the `git` binary.
//! - [`FileRunLock`] — [`pipeline::RunLock`] as an advisory lock file in the
//!   git directory.
//! - [`StepSummary`] / [`ConsoleReport`] — [`pipeline::ReportSink`] for the
//!   Actions job summary and for stdout.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. Process
//! spawning, exit-code interpretation, and file locking live here; the
//! [`pipeline`] crate never sees them.

mod git;
mod lock;
mod summary;

pub use git::{CommandExecutor, CommandResult, GitRepository, ProcessCommandExecutor, PushTarget};
pub use lock::{FileRunLock, LOCK_FILE_NAME};
pub use summary::{ConsoleReport, StepSummary, STEP_SUMMARY_ENV};
