//! bibsync run steps and the executor that sequences them.
//!
//! One run is the fixed sequence provision → lock → sync → commit → report.
//! Each step lives in its own module; [`PipelineExecutor`] drives them and
//! turns the first error into a tagged [`pipeline::RunOutcome::Failed`].
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Nodes sequence calls between business logic in the
//! [`pipeline`] crate and the infrastructure traits (git, Zotero, wiki, report
//! sinks). They contain no domain rules of their own: merging is
//! [`pipeline::merge`], trigger decisions are [`pipeline::TriggerPolicy`].
//!
//! | Module | Step |
//! |--------|------|
//! | [`provision`] | Environment checks before anything is touched |
//! | [`sync`] | Built-in and external sync executors |
//! | [`commit`] | Stage, commit, and push the bibliography |
//! | [`report`] | Publish the run report to every sink |
//! | [`executor`] | The run loop itself |

pub mod commit;
pub mod executor;
pub mod provision;
pub mod report;
pub mod sync;

pub use commit::{CommitNode, CommitResult};
pub use executor::PipelineExecutor;
pub use provision::Provisioner;
pub use report::Reporter;
pub use sync::{BuiltinSyncExecutor, ExternalCommand, ExternalSyncExecutor};

#[cfg(test)]
pub(crate) mod testing;
