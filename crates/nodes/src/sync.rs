//! Sync executors: the only components that rewrite the bibliography.
//!
//! [`BuiltinSyncExecutor`] runs load → fetch → merge → write in-process.
//! [`ExternalSyncExecutor`] hands the whole job to a configured command and
//! lets the change committer's diff decide what happened.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    merge, Bibliography, BibliographyError, CitationSource, MergeOptions, RecordSet,
    ReferenceSource, SyncError, SyncExecutor, SyncSummary, WikiPageUrl, ZoteroCredentials,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

// ---------------------------------------------------------------------------
// Built-in
// ---------------------------------------------------------------------------

/// Fetches Zotero and wiki citations and merges them into the bibliography.
pub struct BuiltinSyncExecutor {
    path: PathBuf,
    references: Option<Arc<dyn ReferenceSource>>,
    citations: Option<Arc<dyn CitationSource>>,
    pages: Vec<WikiPageUrl>,
    options: MergeOptions,
}

impl BuiltinSyncExecutor {
    /// An executor for the bibliography at `path` with no sources attached.
    pub fn new(path: impl Into<PathBuf>, options: MergeOptions) -> Self {
        Self { path: path.into(), references: None, citations: None, pages: Vec::new(), options }
    }

    /// Pulls references from `source`. Makes the executor require credentials.
    #[must_use]
    pub fn with_references(mut self, source: Arc<dyn ReferenceSource>) -> Self {
        self.references = Some(source);
        self
    }

    /// Extracts citations from each of `pages` through `source`.
    #[must_use]
    pub fn with_citations(
        mut self,
        source: Arc<dyn CitationSource>,
        pages: Vec<WikiPageUrl>,
    ) -> Self {
        self.citations = Some(source);
        self.pages = pages;
        self
    }

    /// Absolute path of the bibliography file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn fetch(&self, credentials: Option<&ZoteroCredentials>) -> Result<RecordSet, SyncError> {
        let mut records = RecordSet::default();

        if let Some(source) = &self.references {
            let credentials = credentials.ok_or_else(|| SyncError::Provisioning {
                message: "Zotero credentials are required but were not provided".to_string(),
            })?;
            records.references = source.fetch(credentials).await?;
            info!(count = records.references.len(), "Fetched Zotero references");
        }

        if let Some(source) = &self.citations {
            for page in &self.pages {
                match source.citations(page).await {
                    Ok(found) => {
                        debug!(page = %page, count = found.len(), "Extracted wiki citations");
                        records.citations.extend(found);
                    }
                    Err(e) => warn!(page = %page, error = %e, "Skipping wiki page"),
                }
            }
        }

        Ok(records)
    }
}

impl std::fmt::Debug for BuiltinSyncExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinSyncExecutor")
            .field("path", &self.path)
            .field("zotero", &self.references.is_some())
            .field("pages", &self.pages)
            .field("options", &self.options)
            .finish()
    }
}

#[async_trait]
impl SyncExecutor for BuiltinSyncExecutor {
    fn requires_credentials(&self) -> bool {
        self.references.is_some()
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn execute(
        &self,
        credentials: Option<&ZoteroCredentials>,
    ) -> Result<SyncSummary, SyncError> {
        let existing = load(&self.path).await?;
        debug!(entries = existing.len(), "Loaded bibliography");

        let records = self.fetch(credentials).await?;
        let outcome = merge(&existing, &records, &self.options);
        let summary = SyncSummary {
            added: outcome.added,
            updated: outcome.updated,
            total: outcome.bibliography.len(),
        };

        if outcome.changed() {
            store(&self.path, &outcome.bibliography).await?;
            info!(
                added = summary.added,
                updated = summary.updated,
                total = summary.total,
                "Bibliography updated"
            );
        } else {
            info!(total = summary.total, "Bibliography already up to date");
        }
        Ok(summary)
    }
}

/// Reads and parses the bibliography; a missing file is an empty one.
async fn load(path: &Path) -> Result<Bibliography, SyncError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Bibliography::parse(&text)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Bibliography::new()),
        Err(e) => Err(io_error(path, e).into()),
    }
}

async fn store(path: &Path, bibliography: &Bibliography) -> Result<(), SyncError> {
    tokio::fs::write(path, bibliography.render()).await.map_err(|e| io_error(path, e))?;
    Ok(())
}

fn io_error(path: &Path, e: std::io::Error) -> BibliographyError {
    BibliographyError::Io { path: path.display().to_string(), message: e.to_string() }
}

// ---------------------------------------------------------------------------
// External
// ---------------------------------------------------------------------------

/// Command line of an external sync program, e.g. `python wiki_sync.py`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCommand {
    /// Program name or path, resolved through `PATH`.
    pub program: String,
    /// Arguments, passed without a shell.
    #[serde(default)]
    pub args: Vec<String>,
}

impl std::fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs an external program in the repository root.
///
/// Credentials reach the child only through its environment
/// (`ZOTERO_API_KEY`, `ZOTERO_USER_ID`). Counts are unknown, so the summary is
/// all zero.
#[derive(Debug, Clone)]
pub struct ExternalSyncExecutor {
    command: ExternalCommand,
    cwd: PathBuf,
    needs_credentials: bool,
}

impl ExternalSyncExecutor {
    /// Runs `command` with `cwd` as its working directory.
    pub fn new(command: ExternalCommand, cwd: impl Into<PathBuf>) -> Self {
        Self { command, cwd: cwd.into(), needs_credentials: true }
    }

    /// Whether the program needs Zotero credentials (default `true`).
    #[must_use]
    pub fn with_credentials_required(mut self, required: bool) -> Self {
        self.needs_credentials = required;
        self
    }
}

#[async_trait]
impl SyncExecutor for ExternalSyncExecutor {
    fn requires_credentials(&self) -> bool {
        self.needs_credentials
    }

    #[instrument(skip_all, fields(command = %self.command))]
    async fn execute(
        &self,
        credentials: Option<&ZoteroCredentials>,
    ) -> Result<SyncSummary, SyncError> {
        let mut command = tokio::process::Command::new(&self.command.program);
        command.args(&self.command.args).current_dir(&self.cwd).kill_on_drop(true);
        if let Some(credentials) = credentials {
            command.envs(credentials.env_pairs());
        }

        let status = command.status().await.map_err(|e| SyncError::Executor {
            message: format!("cannot start `{}`: {e}", self.command),
        })?;
        if !status.success() {
            return Err(SyncError::Executor {
                message: format!("`{}` exited with {status}", self.command),
            });
        }

        info!("External sync finished");
        Ok(SyncSummary::default())
    }
}
