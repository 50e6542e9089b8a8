//! Shared value types for the bibsync run domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants and participate in domain computations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Run steps
// ---------------------------------------------------------------------------

/// One step of the fixed run sequence.
///
/// Used to tag failures so the report can say where a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStep {
    /// Tooling and working-tree checks.
    Provision,
    /// Acquiring the repository-wide run lock.
    Lock,
    /// The Sync Executor (fetch, merge, write).
    Sync,
    /// Staging and committing the bibliography.
    Commit,
    /// Pushing the new commit to the remote.
    Push,
}

impl RunStep {
    /// Returns the step name as used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStep::Provision => "provision",
            RunStep::Lock => "lock",
            RunStep::Sync => "sync",
            RunStep::Commit => "commit",
            RunStep::Push => "push",
        }
    }
}

impl std::fmt::Display for RunStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Commit identity
// ---------------------------------------------------------------------------

/// Author and committer identity used for automated commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitIdentity {
    /// Value passed as `user.name`.
    pub name: String,
    /// Value passed as `user.email`.
    pub email: String,
}

impl CommitIdentity {
    /// Name of the synthetic CI identity.
    pub const DEFAULT_NAME: &'static str = "GitHub Action";
    /// Email of the synthetic CI identity.
    pub const DEFAULT_EMAIL: &'static str = "action@github.com";

    /// Creates an identity, returning `None` if either part is blank.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let email = email.into();
        if name.trim().is_empty() || email.trim().is_empty() {
            None
        } else {
            Some(Self { name, email })
        }
    }
}

impl Default for CommitIdentity {
    fn default() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            email: Self::DEFAULT_EMAIL.to_string(),
        }
    }
}

impl std::fmt::Display for CommitIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Default commit message for bibliography updates.
pub const DEFAULT_COMMIT_MESSAGE: &str =
    "Auto-sync: Updated references.bib from Zotero after wiki sync";

// ---------------------------------------------------------------------------
// Sync results
// ---------------------------------------------------------------------------

/// Counts produced by one Sync Executor invocation.
///
/// External executors cannot report counts; they return the default (all
/// zero) and the Change Committer's diff check decides what happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Entries appended to the bibliography.
    pub added: usize,
    /// Existing entries replaced with newer upstream data.
    pub updated: usize,
    /// Entries in the bibliography after the run.
    pub total: usize,
}

impl SyncSummary {
    /// Returns `true` if the executor reported any content change.
    pub fn is_changed(self) -> bool {
        self.added + self.updated > 0
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Wall-clock time from `self` until `later`, zero if `later` is not after `self`.
    pub fn until(self, later: Timestamp) -> std::time::Duration {
        (later.0 - self.0).to_std().unwrap_or_default()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
