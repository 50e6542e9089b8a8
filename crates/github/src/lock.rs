//! Repository-wide advisory run lock.
//!
//! Runs against the same repository take an exclusive `flock`-style lock on a
//! file inside the git directory before touching the bibliography and hold it
//! through the push. A second run polls until the lock frees up or the timeout
//! passes.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fs2::FileExt;
use pipeline::{LockError, LockGuard, RunLock, Timestamp};
use serde::Serialize;
use tracing::{debug, info, warn};

/// File name of the lock inside the git directory.
pub const LOCK_FILE_NAME: &str = "bibsync.lock";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Written into the lock file so a blocked run can say who holds it.
#[derive(Debug, Serialize)]
struct LockHolder {
    pid: u32,
    acquired_at: String,
}

/// Exclusive lock on a file.
#[derive(Debug, Clone)]
pub struct FileRunLock {
    path: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
}

impl FileRunLock {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { path: path.into(), timeout, poll_interval: DEFAULT_POLL_INTERVAL }
    }

    /// The lock for the repository whose git directory is `git_dir`.
    pub fn in_git_dir(git_dir: &Path, timeout: Duration) -> Self {
        Self::new(git_dir.join(LOCK_FILE_NAME), timeout)
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, e: std::io::Error) -> LockError {
        LockError::Io { path: self.path.display().to_string(), message: e.to_string() }
    }

    fn open(&self) -> Result<File, LockError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.io_error(e))
    }
}

/// Keeps the file locked until dropped.
struct HeldLock {
    file: File,
    path: PathBuf,
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
        } else {
            debug!(path = %self.path.display(), "Released run lock");
        }
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[async_trait]
impl RunLock for FileRunLock {
    async fn acquire(&self) -> Result<LockGuard, LockError> {
        let mut file = self.open()?;
        let started = Instant::now();
        let mut announced = false;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if is_contended(&e) => {
                    let waited = started.elapsed();
                    if waited >= self.timeout {
                        return Err(LockError::Timeout {
                            path: self.path.display().to_string(),
                            waited,
                        });
                    }
                    if !announced {
                        let holder = std::fs::read_to_string(&self.path).unwrap_or_default();
                        info!(
                            path = %self.path.display(),
                            holder = %holder.trim(),
                            "Waiting for another run to finish"
                        );
                        announced = true;
                    }
                    tokio::time::sleep(self.poll_interval.min(self.timeout - waited)).await;
                }
                Err(e) => return Err(self.io_error(e)),
            }
        }

        let holder = LockHolder {
            pid: std::process::id(),
            acquired_at: Timestamp::now().to_string(),
        };
        let record = serde_json::to_string(&holder).unwrap_or_default();
        file.set_len(0)
            .and_then(|()| file.write_all(record.as_bytes()))
            .map_err(|e| self.io_error(e))?;

        info!(path = %self.path.display(), "Acquired run lock");
        Ok(LockGuard::new(HeldLock { file, path: self.path.clone() }))
    }
}
