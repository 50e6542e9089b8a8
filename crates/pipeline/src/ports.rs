//! Port traits implemented by infrastructure crates.
//!
//! | Port | Implemented by |
//! |------|----------------|
//! | [`ReferenceSource`] | `zotero::ZoteroClient` |
//! | [`CitationSource`] | `wiki::WikiClient` |
//! | [`SyncExecutor`] | `nodes::BuiltinSyncExecutor`, `nodes::ExternalSyncExecutor` |
//! | [`VersionControl`] | `github::GitRepository` |
//! | [`RunLock`] | `github::FileRunLock` |
//! | [`ReportSink`] | `github::StepSummary`, `github::ConsoleReport` |
//! | [`EventSource`] | `listener::ActionsEventSource`, `listener::ScheduleEventSource` |
//!
//! Credentials only ever cross [`ReferenceSource::fetch`] and
//! [`SyncExecutor::execute`]; no other port sees them.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::bibliography::Entry;
use crate::citations::WikiCitation;
use crate::credentials::ZoteroCredentials;
use crate::errors::{RetryPolicy, SyncError};
use crate::identifiers::{CommitSha, RepoPath, WikiPageUrl};
use crate::outcome::RunReport;
use crate::trigger::TriggerEvent;
use crate::types::{CommitIdentity, SyncSummary};

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Failures talking to an upstream HTTP source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("request to {url} failed: {message}")]
    Transport {
        /// Requested URL (never contains credentials).
        url: String,
        /// Transport error text.
        message: String,
    },

    /// The source rejected the credentials.
    #[error("{url} rejected the credentials (HTTP {status})")]
    Unauthorized {
        /// Requested URL.
        url: String,
        /// 401 or 403.
        status: u16,
    },

    /// Any other non-success status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Delay requested by the server, if any.
        retry_after: Option<Duration>,
    },

    /// The response body could not be interpreted.
    #[error("malformed response from {url}: {message}")]
    Malformed {
        /// Requested URL.
        url: String,
        /// What was wrong.
        message: String,
    },
}

impl SourceError {
    /// Whether the failed request may be re-issued.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            SourceError::Transport { .. } => RetryPolicy::Retryable { after: None },
            SourceError::Status {
                status: 429 | 503,
                retry_after,
                ..
            } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            _ => RetryPolicy::NonRetryable,
        }
    }
}

/// A reference manager library (Zotero).
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    /// Fetches every entry in the library.
    async fn fetch(&self, credentials: &ZoteroCredentials) -> Result<Vec<Entry>, SourceError>;
}

/// A wiki that hosts citing pages.
#[async_trait]
pub trait CitationSource: Send + Sync {
    /// Fetches `page` and extracts its citations.
    async fn citations(&self, page: &WikiPageUrl) -> Result<Vec<WikiCitation>, SourceError>;
}

// ---------------------------------------------------------------------------
// Sync executor
// ---------------------------------------------------------------------------

/// The component that may rewrite the bibliography file.
#[async_trait]
pub trait SyncExecutor: Send + Sync {
    /// Whether [`SyncExecutor::execute`] needs credentials. Checked during
    /// provisioning so a run fails before touching anything.
    fn requires_credentials(&self) -> bool;

    /// Runs once. May rewrite the bibliography in place.
    async fn execute(
        &self,
        credentials: Option<&ZoteroCredentials>,
    ) -> Result<SyncSummary, SyncError>;
}

// ---------------------------------------------------------------------------
// Version control
// ---------------------------------------------------------------------------

/// Failures running version-control commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VcsError {
    /// The command could not be started.
    #[error("failed to run `{command}`: {message}")]
    SpawnFailed {
        /// Command line.
        command: String,
        /// OS error text.
        message: String,
    },

    /// The command exited unsuccessfully.
    #[error("`{command}` failed with code {code:?}: {stderr}")]
    CommandFailed {
        /// Command line.
        command: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Trimmed standard error (or standard output when stderr is empty).
        stderr: String,
    },

    /// The command succeeded but printed something unusable.
    #[error("`{command}` produced unexpected output: {output}")]
    UnexpectedOutput {
        /// Command line.
        command: String,
        /// Offending output.
        output: String,
    },
}

/// The working tree the bibliography lives in.
pub trait VersionControl: Send + Sync {
    /// Checks that the tool is installed and the root is inside a work tree.
    fn verify(&self) -> Result<(), VcsError>;

    /// Returns `true` if `path` is tracked in the index.
    fn is_tracked(&self, path: &RepoPath) -> Result<bool, VcsError>;

    /// Stages `path` (additions, modifications, and deletion).
    fn stage(&self, path: &RepoPath) -> Result<(), VcsError>;

    /// Returns `true` if the staged version of `path` differs from `HEAD`.
    fn has_staged_changes(&self, path: &RepoPath) -> Result<bool, VcsError>;

    /// Commits only `path` under `identity` and returns the new commit.
    fn commit(
        &self,
        path: &RepoPath,
        identity: &CommitIdentity,
        message: &str,
    ) -> Result<CommitSha, VcsError>;

    /// Pushes `HEAD` to the remote.
    fn push(&self) -> Result<(), VcsError>;
}

// ---------------------------------------------------------------------------
// Run lock
// ---------------------------------------------------------------------------

/// Failures acquiring the run lock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The lock file could not be created or opened.
    #[error("cannot open lock file {path}: {message}")]
    Io {
        /// Lock file path.
        path: String,
        /// OS error text.
        message: String,
    },

    /// Another run kept the lock for longer than the configured timeout.
    #[error("lock {path} still held by another run after {waited:?}")]
    Timeout {
        /// Lock file path.
        path: String,
        /// How long this run waited.
        waited: Duration,
    },
}

/// Proof of holding the run lock. Dropping it releases the lock.
pub struct LockGuard {
    _held: Box<dyn Send + Sync>,
}

impl LockGuard {
    /// Wraps whatever keeps the lock alive (e.g. a locked file handle).
    pub fn new(held: impl Send + Sync + 'static) -> Self {
        Self { _held: Box::new(held) }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LockGuard")
    }
}

/// Serialises runs against the same repository.
#[async_trait]
pub trait RunLock: Send + Sync {
    /// Waits for exclusive ownership.
    async fn acquire(&self) -> Result<LockGuard, LockError>;
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// Failures writing a report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot write report to {target}: {message}")]
pub struct ReportError {
    /// Sink description (file path or `stdout`).
    pub target: String,
    /// Underlying error text.
    pub message: String,
}

/// Where run reports go.
pub trait ReportSink: Send + Sync {
    /// Appends the report.
    fn publish(&self, report: &RunReport) -> Result<(), ReportError>;
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Produces trigger events.
#[async_trait]
pub trait EventSource: Send {
    /// Waits for the next event; `None` when the source is exhausted.
    async fn next_event(&mut self) -> Option<TriggerEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_retryable() {
        let err = SourceError::Status {
            url: "u".into(),
            status: 429,
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(
            err.retry_policy(),
            RetryPolicy::Retryable { after: Some(Duration::from_secs(3)) }
        );

        let err = SourceError::Status { url: "u".into(), status: 503, retry_after: None };
        assert!(err.retry_policy().is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let err = SourceError::Unauthorized { url: "u".into(), status: 403 };
        assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);
        let err = SourceError::Status { url: "u".into(), status: 404, retry_after: None };
        assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);
    }

    #[test]
    fn only_service_unavailable_server_errors_are_retryable() {
        for status in [500, 502, 504] {
            let err = SourceError::Status { url: "u".into(), status, retry_after: None };
            assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable, "status {status}");
        }
    }
}
