//! Core domain for bibsync.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type, and cross-cutting error type used by a run. Infrastructure crates
//! implement the traits defined in [`ports`]; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RunId`, `CitationKey`, `CommitSha`, etc.) |
//! | [`types`] | Shared value types (`RunStep`, `CommitIdentity`, `SyncSummary`, `Timestamp`) |
//! | [`errors`] | Run-halting error and retry-policy types |
//! | [`bibliography`] | BibTeX model, parser, and canonical renderer |
//! | [`citations`] | Wiki citation extraction |
//! | [`merge`] | Merging fetched records into a bibliography |
//! | [`trigger`] | Schedule, watch list, and trigger evaluation |
//! | [`outcome`] | Tagged run outcome and report rendering |
//! | [`credentials`] | Reference-manager credentials capability |
//! | [`ports`] | Traits implemented by infrastructure crates |

pub mod bibliography;
pub mod citations;
pub mod credentials;
pub mod errors;
pub mod identifiers;
pub mod merge;
pub mod outcome;
pub mod ports;
pub mod trigger;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use bibliography::{Bibliography, BibliographyError, Block, Entry, Field, FieldValue};
pub use citations::{extract_citations, CitationKind, WikiCitation};
pub use credentials::ZoteroCredentials;
pub use errors::{RetryPolicy, SyncError};
pub use identifiers::{
    BranchName, CitationKey, CommitSha, RemoteName, RepoPath, RunId, WikiPageUrl,
};
pub use merge::{merge, MergeOptions, MergeOutcome, RecordSet};
pub use outcome::{RunOutcome, RunReport};
pub use ports::{
    CitationSource, EventSource, LockError, LockGuard, ReferenceSource, ReportError, ReportSink,
    RunLock, SourceError, SyncExecutor, VcsError, VersionControl,
};
pub use trigger::{DailySchedule, RunIntent, TriggerError, TriggerEvent, TriggerKind, TriggerPolicy};
pub use types::{CommitIdentity, RunStep, SyncSummary, Timestamp, DEFAULT_COMMIT_MESSAGE};
