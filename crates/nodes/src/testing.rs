//! In-memory fakes of the ports, shared by the node tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::ThreadId;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    CommitIdentity, CommitSha, LockError, LockGuard, RepoPath, ReportError, ReportSink, RunLock,
    RunReport, SyncError, SyncExecutor, SyncSummary, VcsError, VersionControl, ZoteroCredentials,
};

fn rejected(command: &str) -> VcsError {
    VcsError::CommandFailed {
        command: command.to_string(),
        code: Some(1),
        stderr: "rejected".to_string(),
    }
}

/// Records every call; answers according to its flags.
#[derive(Debug, Default)]
pub(crate) struct FakeVcs {
    pub(crate) verify_fails: bool,
    pub(crate) tracked: bool,
    pub(crate) changed: bool,
    pub(crate) push_fails: bool,
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) threads: Mutex<Vec<ThreadId>>,
}

impl FakeVcs {
    pub(crate) fn with_changes() -> Self {
        Self { tracked: true, changed: true, ..Self::default() }
    }

    pub(crate) fn unchanged() -> Self {
        Self { tracked: true, ..Self::default() }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    /// Threads the calls ran on, in call order.
    pub(crate) fn threads(&self) -> Vec<ThreadId> {
        self.threads.lock().expect("threads lock poisoned").clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().expect("calls lock poisoned").push(call.into());
        self.threads.lock().expect("threads lock poisoned").push(std::thread::current().id());
    }
}

impl VersionControl for FakeVcs {
    fn verify(&self) -> Result<(), VcsError> {
        self.record("verify");
        if self.verify_fails {
            return Err(VcsError::SpawnFailed {
                command: "git --version".into(),
                message: "not found".into(),
            });
        }
        Ok(())
    }

    fn is_tracked(&self, _path: &RepoPath) -> Result<bool, VcsError> {
        self.record("is_tracked");
        Ok(self.tracked)
    }

    fn stage(&self, path: &RepoPath) -> Result<(), VcsError> {
        self.record(format!("stage {path}"));
        Ok(())
    }

    fn has_staged_changes(&self, _path: &RepoPath) -> Result<bool, VcsError> {
        self.record("has_staged_changes");
        Ok(self.changed)
    }

    fn commit(
        &self,
        path: &RepoPath,
        identity: &CommitIdentity,
        message: &str,
    ) -> Result<CommitSha, VcsError> {
        self.record(format!("commit {path} by {identity}: {message}"));
        Ok(CommitSha::new("0123456789abcdef").expect("non-empty sha"))
    }

    fn push(&self) -> Result<(), VcsError> {
        self.record("push");
        if self.push_fails {
            return Err(rejected("git push"));
        }
        Ok(())
    }
}

/// A sync executor that optionally rewrites a file and then succeeds or fails.
#[derive(Debug, Default)]
pub(crate) struct FakeSync {
    pub(crate) needs_credentials: bool,
    pub(crate) fail_with: Option<String>,
    pub(crate) summary: SyncSummary,
    pub(crate) write: Option<(PathBuf, String)>,
    pub(crate) runs: AtomicUsize,
    pub(crate) saw_credentials: AtomicBool,
}

impl FakeSync {
    pub(crate) fn requiring_credentials() -> Self {
        Self { needs_credentials: true, ..Self::default() }
    }

    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncExecutor for FakeSync {
    fn requires_credentials(&self) -> bool {
        self.needs_credentials
    }

    async fn execute(
        &self,
        credentials: Option<&ZoteroCredentials>,
    ) -> Result<SyncSummary, SyncError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.saw_credentials.store(credentials.is_some(), Ordering::SeqCst);
        if let Some((path, content)) = &self.write {
            std::fs::write(path, content).expect("fake sync write");
        }
        match &self.fail_with {
            Some(message) => Err(SyncError::Executor { message: message.clone() }),
            None => Ok(self.summary),
        }
    }
}

/// A lock that is either always free or always busy.
#[derive(Debug, Default)]
pub(crate) struct FakeLock {
    pub(crate) busy: bool,
    pub(crate) acquired: AtomicUsize,
}

#[async_trait]
impl RunLock for FakeLock {
    async fn acquire(&self) -> Result<LockGuard, LockError> {
        if self.busy {
            return Err(LockError::Timeout {
                path: "bibsync.lock".into(),
                waited: Duration::from_secs(300),
            });
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(LockGuard::new(()))
    }
}

/// Collects published reports.
#[derive(Debug, Default)]
pub(crate) struct FakeSink {
    pub(crate) fails: bool,
    pub(crate) reports: Mutex<Vec<RunReport>>,
}

impl FakeSink {
    pub(crate) fn reports(&self) -> Vec<RunReport> {
        self.reports.lock().expect("reports lock poisoned").clone()
    }
}

impl ReportSink for FakeSink {
    fn publish(&self, report: &RunReport) -> Result<(), ReportError> {
        if self.fails {
            return Err(ReportError { target: "fake".into(), message: "disk full".into() });
        }
        self.reports.lock().expect("reports lock poisoned").push(report.clone());
        Ok(())
    }
}
