//! Git working-tree adapter.
//!
//! Shells out to the `git` binary. Every invocation goes through a
//! [`CommandExecutor`] so tests can script responses without a repository.

use std::path::{Path, PathBuf};
use std::process::Command;

use pipeline::{
    BranchName, CommitIdentity, CommitSha, RemoteName, RepoPath, VcsError, VersionControl,
};
use tracing::{debug, info, instrument};

/// Raw result of one process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs.
pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error>;
}

/// Runs programs with [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        let output = Command::new(program).args(args).current_dir(cwd).output()?;
        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Where `push` sends `HEAD`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushTarget {
    /// Remote name; `None` pushes to the upstream of the current branch.
    pub remote: Option<RemoteName>,
    /// Destination branch; requires `remote`.
    pub branch: Option<BranchName>,
}

/// A git working tree rooted at `root`.
#[derive(Debug, Clone)]
pub struct GitRepository<E = ProcessCommandExecutor> {
    root: PathBuf,
    executor: E,
    push_target: PushTarget,
}

impl GitRepository<ProcessCommandExecutor> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_executor(root, ProcessCommandExecutor)
    }
}

impl<E: CommandExecutor> GitRepository<E> {
    pub fn with_executor(root: impl Into<PathBuf>, executor: E) -> Self {
        Self { root: root.into(), executor, push_target: PushTarget::default() }
    }

    #[must_use]
    pub fn with_push_target(mut self, push_target: PushTarget) -> Self {
        self.push_target = push_target;
        self
    }

    /// Working tree root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the repository's git directory (`.git` or a
    /// worktree's private directory).
    pub fn git_dir(&self) -> Result<PathBuf, VcsError> {
        let out = self.run(args(&["rev-parse", "--absolute-git-dir"]))?;
        Ok(PathBuf::from(out.trim()))
    }

    fn run(&self, args: Vec<String>) -> Result<String, VcsError> {
        let command = format!("git {}", args.join(" "));
        let result = self.run_status(args)?;
        if result.success {
            return Ok(result.stdout);
        }
        Err(failed(command, result))
    }

    fn run_status(&self, args: Vec<String>) -> Result<CommandResult, VcsError> {
        debug!(args = ?args, "git");
        self.executor.execute("git", &args, &self.root).map_err(|error| VcsError::SpawnFailed {
            command: format!("git {}", args.join(" ")),
            message: error.to_string(),
        })
    }
}

impl<E: CommandExecutor> VersionControl for GitRepository<E> {
    fn verify(&self) -> Result<(), VcsError> {
        self.run(args(&["--version"]))?;
        let inside = self.run(args(&["rev-parse", "--is-inside-work-tree"]))?;
        if inside.trim() != "true" {
            return Err(VcsError::UnexpectedOutput {
                command: "git rev-parse --is-inside-work-tree".to_string(),
                output: inside.trim().to_string(),
            });
        }
        Ok(())
    }

    fn is_tracked(&self, path: &RepoPath) -> Result<bool, VcsError> {
        let a = args(&["ls-files", "--error-unmatch", "--", path.as_str()]);
        let command = format!("git {}", a.join(" "));
        let result = self.run_status(a)?;
        match result.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(failed(command, result)),
        }
    }

    fn stage(&self, path: &RepoPath) -> Result<(), VcsError> {
        self.run(args(&["add", "-A", "--", path.as_str()]))?;
        Ok(())
    }

    fn has_staged_changes(&self, path: &RepoPath) -> Result<bool, VcsError> {
        let a = args(&["diff", "--cached", "--quiet", "--", path.as_str()]);
        let command = format!("git {}", a.join(" "));
        let result = self.run_status(a)?;
        match result.code {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(failed(command, result)),
        }
    }

    #[instrument(skip(self, message), fields(path = %path, author = %identity))]
    fn commit(
        &self,
        path: &RepoPath,
        identity: &CommitIdentity,
        message: &str,
    ) -> Result<CommitSha, VcsError> {
        self.run(vec![
            "-c".to_string(),
            format!("user.name={}", identity.name),
            "-c".to_string(),
            format!("user.email={}", identity.email),
            "commit".to_string(),
            "-m".to_string(),
            message.to_string(),
            "--".to_string(),
            path.as_str().to_string(),
        ])?;

        let head = self.run(args(&["rev-parse", "HEAD"]))?;
        let sha = CommitSha::new(head.trim()).ok_or_else(|| VcsError::UnexpectedOutput {
            command: "git rev-parse HEAD".to_string(),
            output: head.clone(),
        })?;
        info!(commit = %sha, "Created commit");
        Ok(sha)
    }

    #[instrument(skip(self))]
    fn push(&self) -> Result<(), VcsError> {
        let mut a = args(&["push"]);
        match (&self.push_target.remote, &self.push_target.branch) {
            (Some(remote), Some(branch)) => {
                a.push(remote.to_string());
                a.push(format!("HEAD:refs/heads/{branch}"));
            }
            (Some(remote), None) => {
                a.push(remote.to_string());
                a.push("HEAD".to_string());
            }
            _ => {}
        }
        self.run(a)?;
        info!("Pushed");
        Ok(())
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn failed(command: String, result: CommandResult) -> VcsError {
    let stderr = if result.stderr.trim().is_empty() { result.stdout } else { result.stderr };
    VcsError::CommandFailed { command, code: result.code, stderr: stderr.trim().to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MockExecutor {
        calls: Arc<Mutex<Vec<Vec<String>>>>,
        responses: Arc<Mutex<VecDeque<CommandResult>>>,
    }

    impl MockExecutor {
        fn new(responses: Vec<CommandResult>) -> Self {
            Self { calls: Arc::default(), responses: Arc::new(Mutex::new(responses.into())) }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().expect("mock calls lock poisoned").clone()
        }
    }

    impl CommandExecutor for MockExecutor {
        fn execute(
            &self,
            program: &str,
            args: &[String],
            _cwd: &Path,
        ) -> Result<CommandResult, std::io::Error> {
            assert_eq!(program, "git");
            self.calls.lock().expect("mock calls lock poisoned").push(args.to_vec());
            Ok(self
                .responses
                .lock()
                .expect("mock responses lock poisoned")
                .pop_front()
                .expect("missing mock response"))
        }
    }

    fn ok(stdout: &str) -> CommandResult {
        CommandResult {
            success: true,
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    fn exit(code: i32, stderr: &str) -> CommandResult {
        CommandResult {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn bib() -> RepoPath {
        RepoPath::new("references.bib").unwrap()
    }

    #[test]
    fn staged_diff_exit_codes_map_to_change_flag() {
        let mock = MockExecutor::new(vec![ok(""), exit(1, "")]);
        let repo = GitRepository::with_executor("/repo", mock.clone());

        assert!(!repo.has_staged_changes(&bib()).unwrap());
        assert!(repo.has_staged_changes(&bib()).unwrap());
        assert_eq!(mock.calls()[0], args(&["diff", "--cached", "--quiet", "--", "references.bib"]));
    }

    #[test]
    fn staged_diff_other_codes_are_errors() {
        let mock = MockExecutor::new(vec![exit(128, "fatal: not a git repository")]);
        let repo = GitRepository::with_executor("/repo", mock);
        let err = repo.has_staged_changes(&bib()).unwrap_err();
        assert!(matches!(err, VcsError::CommandFailed { code: Some(128), .. }));
    }

    #[test]
    fn commit_uses_identity_and_only_the_bibliography() {
        let mock = MockExecutor::new(vec![ok("[main abc] msg\n"), ok("abc123def\n")]);
        let repo = GitRepository::with_executor("/repo", mock.clone());

        let sha = repo.commit(&bib(), &CommitIdentity::default(), "Auto-sync").unwrap();

        assert_eq!(sha.as_str(), "abc123def");
        assert_eq!(
            mock.calls()[0],
            args(&[
                "-c",
                "user.name=GitHub Action",
                "-c",
                "user.email=action@github.com",
                "commit",
                "-m",
                "Auto-sync",
                "--",
                "references.bib",
            ])
        );
    }

    #[test]
    fn push_target_shapes_the_push_command() {
        let mock = MockExecutor::new(vec![ok(""), ok(""), ok("")]);
        let plain = GitRepository::with_executor("/repo", mock.clone());
        plain.push().unwrap();

        let remote_only =
            GitRepository::with_executor("/repo", mock.clone()).with_push_target(PushTarget {
                remote: RemoteName::new("origin"),
                branch: None,
            });
        remote_only.push().unwrap();

        let full = GitRepository::with_executor("/repo", mock.clone()).with_push_target(PushTarget {
            remote: RemoteName::new("origin"),
            branch: BranchName::new("main"),
        });
        full.push().unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0], args(&["push"]));
        assert_eq!(calls[1], args(&["push", "origin", "HEAD"]));
        assert_eq!(calls[2], args(&["push", "origin", "HEAD:refs/heads/main"]));
    }

    #[test]
    fn rejected_push_reports_stderr() {
        let mock = MockExecutor::new(vec![exit(1, "! [rejected] main -> main (fetch first)\n")]);
        let repo = GitRepository::with_executor("/repo", mock);
        match repo.push().unwrap_err() {
            VcsError::CommandFailed { command, stderr, .. } => {
                assert_eq!(command, "git push");
                assert!(stderr.contains("rejected"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn verify_requires_a_work_tree() {
        let mock = MockExecutor::new(vec![ok("git version 2.43.0\n"), ok("false\n")]);
        let repo = GitRepository::with_executor("/repo", mock);
        assert!(matches!(repo.verify(), Err(VcsError::UnexpectedOutput { .. })));
    }

    #[test]
    fn tracked_check_distinguishes_untracked_from_errors() {
        let mock = MockExecutor::new(vec![
            ok("references.bib\n"),
            exit(1, "error: pathspec"),
            exit(128, "fatal"),
        ]);
        let repo = GitRepository::with_executor("/repo", mock);
        assert!(repo.is_tracked(&bib()).unwrap());
        assert!(!repo.is_tracked(&bib()).unwrap());
        assert!(repo.is_tracked(&bib()).is_err());
    }
}
