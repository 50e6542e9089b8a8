//! Top-level error and retry-policy types for the bibsync run domain.
//!
//! [`SyncError`] covers conditions that halt a run. Component-level errors
//! (bibliography parsing, source fetches, git, locking) are defined next to
//! the component or port that produces them and are wrapped here.
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bibliography::BibliographyError;
use crate::ports::{LockError, SourceError, VcsError};
use crate::types::RunStep;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by infrastructure error types so an adapter can decide whether to
/// re-issue a request without failing the run.
///
/// - `Retryable` errors: timeouts, rate-limit and "service unavailable" responses.
/// - `NonRetryable` errors: bad credentials, malformed responses, everything else.
///
/// Run-level failures are never retried; this only governs individual requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from `Retry-After` or `Backoff` response headers).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetryPolicy::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Run-level errors
// ---------------------------------------------------------------------------

/// Errors that halt a run.
///
/// Every variant maps to the [`RunStep`] it aborted so the reporter can
/// describe the failure as a tagged outcome.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Tooling, working tree, or credentials are not usable.
    #[error("Provisioning failed: {message}")]
    Provisioning {
        /// Description of the missing prerequisite.
        message: String,
    },

    /// Another run holds the repository lock, or the lock file is unusable.
    #[error("Run lock unavailable: {0}")]
    Lock(#[from] LockError),

    /// The existing bibliography could not be read or written.
    #[error("Bibliography error: {0}")]
    Bibliography(#[from] BibliographyError),

    /// An upstream source (Zotero) failed.
    #[error("Source fetch failed: {0}")]
    Source(#[from] SourceError),

    /// The external executor could not be spawned or exited unsuccessfully.
    #[error("Sync executor failed: {message}")]
    Executor {
        /// Description of the failure, including the exit status if any.
        message: String,
    },

    /// Staging or committing the bibliography failed.
    #[error("Commit failed: {0}")]
    Commit(#[source] VcsError),

    /// The push was rejected or could not reach the remote.
    #[error("Push failed: {0}")]
    Push(#[source] VcsError),

    /// Configuration is invalid. Produced at load time; a run never starts with
    /// an invalid configuration.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl SyncError {
    /// The run step this error aborted.
    pub fn step(&self) -> RunStep {
        match self {
            SyncError::Provisioning { .. } | SyncError::Configuration { .. } => RunStep::Provision,
            SyncError::Lock(_) => RunStep::Lock,
            SyncError::Bibliography(_) | SyncError::Source(_) | SyncError::Executor { .. } => {
                RunStep::Sync
            }
            SyncError::Commit(_) => RunStep::Commit,
            SyncError::Push(_) => RunStep::Push,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_the_step_they_abort() {
        let err = SyncError::Executor { message: "exit status 2".into() };
        assert_eq!(err.step(), RunStep::Sync);

        let err = SyncError::Push(VcsError::CommandFailed {
            command: "git push".into(),
            code: Some(1),
            stderr: "rejected".into(),
        });
        assert_eq!(err.step(), RunStep::Push);
        assert!(err.to_string().contains("Push failed"));
    }

    #[test]
    fn retry_policy_classification() {
        assert!(RetryPolicy::Retryable { after: None }.is_retryable());
        assert!(!RetryPolicy::NonRetryable.is_retryable());
    }
}
