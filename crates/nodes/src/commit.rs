//! Change committer: stage, diff, commit, push.

use std::path::PathBuf;

use pipeline::{
    CommitIdentity, CommitSha, RepoPath, SyncError, VersionControl, DEFAULT_COMMIT_MESSAGE,
};
use tracing::{info, instrument};

/// What the committer did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResult {
    /// The bibliography matches `HEAD`; nothing was committed.
    NoChange,
    /// A commit was created.
    Committed {
        commit: CommitSha,
        pushed: bool,
    },
}

/// Commits the bibliography, and nothing else, under a fixed identity.
#[derive(Debug, Clone)]
pub struct CommitNode {
    root: PathBuf,
    path: RepoPath,
    identity: CommitIdentity,
    message: String,
    push: bool,
}

impl CommitNode {
    /// A committer with the default identity and message that pushes.
    pub fn new(root: impl Into<PathBuf>, path: RepoPath) -> Self {
        Self {
            root: root.into(),
            path,
            identity: CommitIdentity::default(),
            message: DEFAULT_COMMIT_MESSAGE.to_string(),
            push: true,
        }
    }

    /// Author and committer of the sync commit.
    #[must_use]
    pub fn with_identity(mut self, identity: CommitIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Commit message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// When `false`, the commit stays local.
    #[must_use]
    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    /// The bibliography path, relative to the repository root.
    pub fn path(&self) -> &RepoPath {
        &self.path
    }

    fn on_disk(&self) -> bool {
        self.root.join(self.path.as_str()).exists()
    }

    /// Commits and pushes the bibliography if it differs from `HEAD`.
    ///
    /// Staging, diffing, and committing failures map to the `commit` step; a
    /// rejected push maps to `push` and is not retried.
    #[instrument(skip_all, fields(path = %self.path))]
    pub fn run(&self, vcs: &dyn VersionControl) -> Result<CommitResult, SyncError> {
        if !self.on_disk() && !vcs.is_tracked(&self.path).map_err(SyncError::Commit)? {
            info!("Bibliography neither exists nor is tracked; nothing to commit");
            return Ok(CommitResult::NoChange);
        }

        vcs.stage(&self.path).map_err(SyncError::Commit)?;
        if !vcs.has_staged_changes(&self.path).map_err(SyncError::Commit)? {
            info!("No changes to commit");
            return Ok(CommitResult::NoChange);
        }

        let commit = vcs
            .commit(&self.path, &self.identity, &self.message)
            .map_err(SyncError::Commit)?;
        if self.push {
            vcs.push().map_err(SyncError::Push)?;
        } else {
            info!(commit = %commit, "Push disabled; leaving commit local");
        }
        Ok(CommitResult::Committed { commit, pushed: self.push })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeVcs;
    use pipeline::RunStep;
    use std::path::Path;

    fn node(dir: &Path) -> CommitNode {
        CommitNode::new(dir, RepoPath::new("references.bib").unwrap())
    }

    fn seeded() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(dir.path().join("references.bib"), "@article{a,\n  title = {A}\n}\n")
            .unwrap();
        dir
    }

    #[test]
    fn identical_file_commits_and_pushes_nothing() {
        let dir = seeded();
        let vcs = FakeVcs::unchanged();

        assert_eq!(node(dir.path()).run(&vcs).unwrap(), CommitResult::NoChange);
        assert_eq!(vcs.calls(), vec!["stage references.bib", "has_staged_changes"]);
    }

    #[test]
    fn changed_file_is_committed_once_with_fixed_identity_then_pushed() {
        let dir = seeded();
        let vcs = FakeVcs::with_changes();

        let result = node(dir.path()).run(&vcs).unwrap();

        assert!(matches!(result, CommitResult::Committed { pushed: true, .. }));
        assert_eq!(
            vcs.calls(),
            vec![
                "stage references.bib",
                "has_staged_changes",
                "commit references.bib by GitHub Action <action@github.com>: \
                 Auto-sync: Updated references.bib from Zotero after wiki sync",
                "push",
            ]
        );
    }

    #[test]
    fn missing_untracked_file_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let vcs = FakeVcs::default();

        assert_eq!(node(dir.path()).run(&vcs).unwrap(), CommitResult::NoChange);
        assert_eq!(vcs.calls(), vec!["is_tracked"]);
    }

    #[test]
    fn rejected_push_fails_the_push_step() {
        let dir = seeded();
        let vcs = FakeVcs { push_fails: true, ..FakeVcs::with_changes() };

        let err = node(dir.path()).run(&vcs).unwrap_err();
        assert_eq!(err.step(), RunStep::Push);
        assert_eq!(vcs.calls().iter().filter(|c| *c == "push").count(), 1);
    }

    #[test]
    fn push_can_be_disabled() {
        let dir = seeded();
        let vcs = FakeVcs::with_changes();

        let result = node(dir.path()).with_push(false).run(&vcs).unwrap();

        assert!(matches!(result, CommitResult::Committed { pushed: false, .. }));
        assert!(!vcs.calls().contains(&"push".to_string()));
    }

    #[test]
    fn custom_identity_and_message_are_used() {
        let dir = seeded();
        let vcs = FakeVcs::with_changes();
        let identity = CommitIdentity::new("Bib Bot", "bot@example.org").unwrap();

        node(dir.path())
            .with_identity(identity)
            .with_message("Refresh citations")
            .run(&vcs)
            .unwrap();

        let expected = "commit references.bib by Bib Bot <bot@example.org>: Refresh citations";
        assert!(vcs.calls().iter().any(|c| c == expected));
    }
}
