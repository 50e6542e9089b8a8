//! Environment provisioning checks.
//!
//! Runs before any mutation. Every failure is fatal and reported as the
//! `provision` step; there is nothing to retry.

use std::path::{Path, PathBuf};

use pipeline::{RepoPath, SyncError, SyncExecutor, VersionControl, ZoteroCredentials};
use tracing::{debug, instrument};

/// Verifies that a run can start.
#[derive(Debug, Clone)]
pub struct Provisioner {
    root: PathBuf,
    bibliography: RepoPath,
}

impl Provisioner {
    /// Checks for the repository at `root` holding `bibliography`.
    pub fn new(root: impl Into<PathBuf>, bibliography: RepoPath) -> Self {
        Self { root: root.into(), bibliography }
    }

    /// Checks tooling, working tree, bibliography location, and credentials.
    #[instrument(skip_all, fields(root = %self.root.display(), bibliography = %self.bibliography))]
    pub fn check(
        &self,
        vcs: &dyn VersionControl,
        executor: &dyn SyncExecutor,
        credentials: Option<&ZoteroCredentials>,
    ) -> Result<(), SyncError> {
        vcs.verify().map_err(|e| SyncError::Provisioning { message: e.to_string() })?;

        let target = self.root.join(self.bibliography.as_str());
        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        if !parent.is_dir() {
            return Err(SyncError::Provisioning {
                message: format!(
                    "directory {} for the bibliography does not exist",
                    parent.display()
                ),
            });
        }

        if executor.requires_credentials() && credentials.is_none() {
            return Err(SyncError::Provisioning {
                message: format!(
                    "Zotero credentials missing: set {} and {}",
                    pipeline::credentials::API_KEY_ENV,
                    pipeline::credentials::USER_ID_ENV
                ),
            });
        }

        debug!("Environment ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSync, FakeVcs};
    use pipeline::RunStep;

    fn bib() -> RepoPath {
        RepoPath::new("references.bib").unwrap()
    }

    #[test]
    fn ready_environment_passes() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let provisioner = Provisioner::new(dir.path(), bib());
        let creds = ZoteroCredentials::new("key", "123");
        provisioner
            .check(&FakeVcs::default(), &FakeSync::requiring_credentials(), creds.as_ref())
            .expect("provisioning should pass");
    }

    #[test]
    fn missing_credentials_fail_only_when_needed() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let provisioner = Provisioner::new(dir.path(), bib());

        let err = provisioner
            .check(&FakeVcs::default(), &FakeSync::requiring_credentials(), None)
            .unwrap_err();
        assert_eq!(err.step(), RunStep::Provision);
        assert!(err.to_string().contains("ZOTERO_API_KEY"));

        provisioner
            .check(&FakeVcs::default(), &FakeSync::default(), None)
            .expect("executor without Zotero needs no credentials");
    }

    #[test]
    fn missing_bibliography_directory_fails() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let bibliography = RepoPath::new("docs/references.bib").unwrap();
        let provisioner = Provisioner::new(dir.path(), bibliography);
        let err = provisioner.check(&FakeVcs::default(), &FakeSync::default(), None).unwrap_err();
        assert!(matches!(err, SyncError::Provisioning { .. }));
    }

    #[test]
    fn broken_git_fails() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let provisioner = Provisioner::new(dir.path(), bib());
        let vcs = FakeVcs { verify_fails: true, ..FakeVcs::default() };
        assert!(provisioner.check(&vcs, &FakeSync::default(), None).is_err());
        assert_eq!(vcs.calls(), vec!["verify".to_string()]);
    }
}
