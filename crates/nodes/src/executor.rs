//! The run loop: provision → lock → sync → commit → report.

use std::path::PathBuf;
use std::sync::Arc;

use pipeline::{
    RepoPath, RunIntent, RunLock, RunOutcome, RunReport, SyncError, SyncExecutor, SyncSummary,
    Timestamp, VcsError, VersionControl, ZoteroCredentials,
};
use tracing::{info, instrument, Span};

use crate::commit::{CommitNode, CommitResult};
use crate::provision::Provisioner;
use crate::report::Reporter;

/// Drives one run at a time against a single repository.
///
/// Credentials are held here only to be handed to the sync executor; no other
/// step sees them.
pub struct PipelineExecutor {
    bibliography: RepoPath,
    provisioner: Provisioner,
    committer: CommitNode,
    vcs: Arc<dyn VersionControl>,
    lock: Arc<dyn RunLock>,
    sync: Arc<dyn SyncExecutor>,
    reporter: Reporter,
    credentials: Option<ZoteroCredentials>,
}

impl PipelineExecutor {
    /// Creates an executor for the repository at `root`. The committer decides
    /// which path is committed; it must name the same file the sync executor
    /// rewrites.
    pub fn new(
        root: impl Into<PathBuf>,
        committer: CommitNode,
        vcs: Arc<dyn VersionControl>,
        lock: Arc<dyn RunLock>,
        sync: Arc<dyn SyncExecutor>,
    ) -> Self {
        let bibliography = committer.path().clone();
        Self {
            provisioner: Provisioner::new(root, bibliography.clone()),
            bibliography,
            committer,
            vcs,
            lock,
            sync,
            reporter: Reporter::default(),
            credentials: None,
        }
    }

    /// Replaces the default reporter, which only logs.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Zotero credentials handed to the sync executor. `None` fails
    /// provisioning when the executor requires credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<ZoteroCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Executes one run and reports it. Never fails: errors become a
    /// [`RunOutcome::Failed`] naming the step that stopped the run.
    #[instrument(skip(self), fields(run_id = %intent.run_id, trigger = %intent.trigger))]
    pub async fn run(&self, intent: RunIntent) -> RunReport {
        let started_at = Timestamp::now();
        info!("Run started");

        let outcome = match self.execute().await {
            Ok(outcome) => outcome,
            Err(e) => RunOutcome::Failed { step: e.step(), message: e.to_string() },
        };

        let report = RunReport::new(&intent, self.bibliography.clone(), started_at, outcome);
        self.reporter.publish(&report);
        report
    }

    /// Runs only provisioning and the sync executor, under the run lock.
    /// Nothing is committed.
    #[instrument(skip(self))]
    pub async fn sync_only(&self) -> Result<SyncSummary, SyncError> {
        self.provision().await?;
        let _guard = self.lock.acquire().await?;
        self.sync.execute(self.credentials.as_ref()).await
    }

    async fn execute(&self) -> Result<RunOutcome, SyncError> {
        self.provision().await?;

        // Held through the push so concurrent runs never race on the branch.
        let _guard = self.lock.acquire().await?;

        let summary = self.sync.execute(self.credentials.as_ref()).await?;
        info!(
            added = summary.added,
            updated = summary.updated,
            total = summary.total,
            "Sync finished"
        );

        Ok(match self.commit().await? {
            CommitResult::NoChange => RunOutcome::NoChange,
            CommitResult::Committed { commit, pushed } => RunOutcome::Committed {
                commit,
                pushed,
                added: summary.added,
                updated: summary.updated,
            },
        })
    }

    // Git runs as a blocking child process, so both git-facing steps move to
    // the blocking pool.
    async fn provision(&self) -> Result<(), SyncError> {
        let provisioner = self.provisioner.clone();
        let vcs = Arc::clone(&self.vcs);
        let sync = Arc::clone(&self.sync);
        let credentials = self.credentials.clone();
        let span = Span::current();
        tokio::task::spawn_blocking(move || {
            span.in_scope(|| provisioner.check(vcs.as_ref(), sync.as_ref(), credentials.as_ref()))
        })
        .await
        .map_err(|e| SyncError::Provisioning {
            message: format!("blocking task failed: {e}"),
        })?
    }

    async fn commit(&self) -> Result<CommitResult, SyncError> {
        let committer = self.committer.clone();
        let vcs = Arc::clone(&self.vcs);
        let span = Span::current();
        tokio::task::spawn_blocking(move || span.in_scope(|| committer.run(vcs.as_ref())))
            .await
            .map_err(|e| {
                SyncError::Commit(VcsError::SpawnFailed {
                    command: "git".to_string(),
                    message: format!("blocking task failed: {e}"),
                })
            })?
    }
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("bibliography", &self.bibliography)
            .field("committer", &self.committer)
            .field("reporter", &self.reporter)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}
