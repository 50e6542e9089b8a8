//! `.bibsync/config.toml`.
//!
//! Every key has a default, so a repository without a config file gets the
//! behaviour of the stock workflow: sync `references.bib` from Zotero and the
//! workbench wiki page, commit as `GitHub Action`, run daily at 06:00 UTC.
//! Secrets never live here; they come from the environment.

use std::path::{Component, Path, PathBuf};

use nodes::ExternalCommand;
use pipeline::merge::DEFAULT_SOURCE_TAG;
use pipeline::{
    BranchName, CommitIdentity, DailySchedule, RemoteName, RepoPath, SyncError, TriggerPolicy,
    WikiPageUrl, DEFAULT_COMMIT_MESSAGE,
};
use serde::{Deserialize, Serialize};
use wiki::WikiConfig;
use zotero::ZoteroConfig;

/// Config file location relative to the repository root.
pub const DEFAULT_CONFIG_PATH: &str = ".bibsync/config.toml";

const DEFAULT_WIKI_PAGE: &str =
    "https://en.wikiversity.org/wiki/AIXworkbench/Papers/Building-the-Workbench";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Repository-relative bibliography path.
    pub bibliography: String,
    pub wiki: WikiSection,
    pub zotero: ZoteroSection,
    pub commit: CommitSection,
    pub trigger: TriggerSection,
    pub executor: ExecutorSection,
    pub lock: LockSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bibliography: "references.bib".to_string(),
            wiki: WikiSection::default(),
            zotero: ZoteroSection::default(),
            commit: CommitSection::default(),
            trigger: TriggerSection::default(),
            executor: ExecutorSection::default(),
            lock: LockSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiSection {
    /// Pages whose citations are harvested.
    pub pages: Vec<String>,
    /// `tags` value written into generated entries.
    pub source_tag: String,
    #[serde(flatten)]
    pub client: WikiConfig,
}

impl Default for WikiSection {
    fn default() -> Self {
        Self {
            pages: vec![DEFAULT_WIKI_PAGE.to_string()],
            source_tag: DEFAULT_SOURCE_TAG.to_string(),
            client: WikiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoteroSection {
    pub enabled: bool,
    #[serde(flatten)]
    pub client: ZoteroConfig,
}

impl Default for ZoteroSection {
    fn default() -> Self {
        Self { enabled: true, client: ZoteroConfig::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitSection {
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    /// Remote to push to; the current branch's upstream when unset.
    pub remote: Option<String>,
    /// Destination branch; requires `remote`.
    pub branch: Option<String>,
    pub push: bool,
}

impl Default for CommitSection {
    fn default() -> Self {
        Self {
            author_name: CommitIdentity::DEFAULT_NAME.to_string(),
            author_email: CommitIdentity::DEFAULT_EMAIL.to_string(),
            message: DEFAULT_COMMIT_MESSAGE.to_string(),
            remote: None,
            branch: None,
            push: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerSection {
    /// Daily cron expression, `M H * * *` in UTC.
    pub schedule: String,
    /// Paths (or globs) whose modification by a push starts a run.
    pub watch_paths: Vec<String>,
    /// Whether manual dispatch starts a run.
    pub manual: bool,
}

impl Default for TriggerSection {
    fn default() -> Self {
        Self {
            schedule: "0 6 * * *".to_string(),
            watch_paths: [
                "wiki_sync.py",
                "crates/**",
                "Cargo.toml",
                ".github/workflows/wiki-sync.yml",
            ]
            .map(String::from)
            .to_vec(),
            manual: true,
        }
    }
}

/// Which sync executor a run uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExecutorSection {
    /// In-process fetch and merge.
    #[default]
    Builtin,
    /// A program run in the repository root, e.g. `["python", "wiki_sync.py"]`.
    External {
        command: Vec<String>,
        #[serde(default = "default_true")]
        requires_credentials: bool,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSection {
    /// Lock file, relative to the repository root. Defaults to a file in the
    /// git directory.
    pub path: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for LockSection {
    fn default() -> Self {
        Self { path: None, timeout_secs: 300 }
    }
}

fn invalid(message: impl Into<String>) -> SyncError {
    SyncError::Configuration { message: message.into() }
}

impl Config {
    /// Loads the config.
    ///
    /// `explicit` is a path given on the command line and must exist.
    /// Otherwise [`DEFAULT_CONFIG_PATH`] under `repo` is read if present.
    pub fn load(repo: &Path, explicit: Option<&Path>) -> Result<Self, SyncError> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (repo.join(DEFAULT_CONFIG_PATH), false),
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!(path = %path.display(), "No config file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(invalid(format!("cannot read {}: {e}", path.display()))),
        };

        let config = Self::from_toml(&text).map_err(|e| match e {
            SyncError::Configuration { message } => {
                invalid(format!("{}: {message}", path.display()))
            }
            other => other,
        })?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn from_toml(text: &str) -> Result<Self, SyncError> {
        let config: Self =
            toml::from_str(text).map_err(|e| invalid(e.to_string().trim().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would only fail later, mid-run.
    pub fn validate(&self) -> Result<(), SyncError> {
        self.bibliography_path()?;
        self.trigger_policy()?;
        self.wiki_pages()?;
        self.commit_identity()?;
        if self.commit.message.trim().is_empty() {
            return Err(invalid("commit.message must not be empty"));
        }
        self.push_target()?;
        if let ExecutorSection::External { command, .. } = &self.executor {
            if command.first().map_or(true, |p| p.trim().is_empty()) {
                return Err(invalid("executor.command must name a program"));
            }
        }
        if self.zotero.client.page_size == 0 || self.zotero.client.page_size > 100 {
            return Err(invalid("zotero.page_size must be between 1 and 100"));
        }
        Ok(())
    }

    /// The bibliography path; must be relative and stay inside the repository.
    pub fn bibliography_path(&self) -> Result<RepoPath, SyncError> {
        let path = Path::new(&self.bibliography);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(invalid(format!(
                "bibliography '{}' must be a relative path inside the repository",
                self.bibliography
            )));
        }
        RepoPath::new(self.bibliography.trim_start_matches("./"))
            .ok_or_else(|| invalid("bibliography must not be empty"))
    }

    pub fn trigger_policy(&self) -> Result<TriggerPolicy, SyncError> {
        let schedule =
            DailySchedule::parse(&self.trigger.schedule).map_err(|e| invalid(e.to_string()))?;
        TriggerPolicy::new(schedule, &self.trigger.watch_paths, self.trigger.manual)
            .map_err(|e| invalid(e.to_string()))
    }

    pub fn wiki_pages(&self) -> Result<Vec<WikiPageUrl>, SyncError> {
        self.wiki
            .pages
            .iter()
            .map(|page| {
                let page = page.trim();
                if !(page.starts_with("https://") || page.starts_with("http://")) {
                    return Err(invalid(format!("wiki page '{page}' is not an http(s) URL")));
                }
                WikiPageUrl::new(page).ok_or_else(|| invalid("wiki page must not be empty"))
            })
            .collect()
    }

    pub fn commit_identity(&self) -> Result<CommitIdentity, SyncError> {
        CommitIdentity::new(&self.commit.author_name, &self.commit.author_email)
            .ok_or_else(|| invalid("commit.author_name and commit.author_email must not be empty"))
    }

    pub fn push_target(&self) -> Result<github::PushTarget, SyncError> {
        let remote = self.commit.remote.as_deref().map(RemoteName::new);
        let branch = self.commit.branch.as_deref().map(BranchName::new);
        match (remote, branch) {
            (Some(None), _) => Err(invalid("commit.remote must not be empty")),
            (_, Some(None)) => Err(invalid("commit.branch must not be empty")),
            (None, Some(Some(_))) => Err(invalid("commit.branch requires commit.remote")),
            (remote, branch) => Ok(github::PushTarget {
                remote: remote.flatten(),
                branch: branch.flatten(),
            }),
        }
    }

    /// The external command, when one is configured.
    pub fn external_command(&self) -> Option<(ExternalCommand, bool)> {
        match &self.executor {
            ExecutorSection::Builtin => None,
            ExecutorSection::External { command, requires_credentials } => {
                let (program, args) = command.split_first()?;
                let command = ExternalCommand { program: program.clone(), args: args.to_vec() };
                Some((command, *requires_credentials))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{TriggerEvent, TriggerKind};

    #[test]
    fn empty_file_means_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.bibliography_path().unwrap().as_str(), "references.bib");
        assert_eq!(
            config.commit_identity().unwrap().to_string(),
            "GitHub Action <action@github.com>"
        );
        assert_eq!(config.commit.message, DEFAULT_COMMIT_MESSAGE);
        assert_eq!(config.lock.timeout_secs, 300);
        assert_eq!(config.trigger_policy().unwrap().schedule().expression(), "0 6 * * *");
    }

    #[test]
    fn default_watch_list_matches_the_sync_code_and_workflow() {
        let policy = Config::default().trigger_policy().unwrap();
        let push = |p: &str| TriggerEvent::Push { changed_paths: vec![p.to_string()] };

        assert_eq!(
            policy.evaluate(&push("wiki_sync.py")).map(|i| i.trigger),
            Some(TriggerKind::Push)
        );
        assert!(policy.evaluate(&push(".github/workflows/wiki-sync.yml")).is_some());
        assert!(policy.evaluate(&push("crates/nodes/src/sync.rs")).is_some());
        assert!(policy.evaluate(&push("Cargo.toml")).is_some());
        assert!(policy.evaluate(&push("README.md")).is_none());
    }

    #[test]
    fn full_file_round_trips_every_section() {
        let config = Config::from_toml(
            r#"
            bibliography = "docs/refs.bib"

            [wiki]
            pages = ["https://wiki.example.org/wiki/Page"]
            source_tag = "source:example"
            raw = false

            [zotero]
            enabled = true
            library = "group"
            page_size = 50
            max_retries = 5

            [commit]
            author_name = "Bib Bot"
            author_email = "bot@example.org"
            remote = "origin"
            branch = "main"
            push = false

            [trigger]
            schedule = "30 2 * * *"
            watch_paths = ["scripts/**"]
            manual = false

            [executor]
            kind = "external"
            command = ["python", "wiki_sync.py"]

            [lock]
            timeout_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.bibliography_path().unwrap().as_str(), "docs/refs.bib");
        assert!(!config.wiki.client.raw);
        assert_eq!(config.zotero.client.library, zotero::LibraryKind::Group);
        assert_eq!(config.zotero.client.page_size, 50);
        assert_eq!(config.push_target().unwrap().branch.unwrap().as_str(), "main");
        assert!(!config.commit.push);
        let (command, needs_credentials) = config.external_command().unwrap();
        assert_eq!(command.to_string(), "python wiki_sync.py");
        assert!(needs_credentials);
        assert_eq!(config.lock.timeout_secs, 10);
    }

    #[test]
    fn invalid_values_are_rejected_at_load_time() {
        let cases = [
            "bibliography = \"/etc/refs.bib\"",
            "bibliography = \"../refs.bib\"",
            "[trigger]\nschedule = \"0 6 * * 1\"",
            "[trigger]\nwatch_paths = [\"[\"]",
            "[wiki]\npages = [\"ftp://example.org\"]",
            "[commit]\nauthor_email = \"\"",
            "[commit]\nbranch = \"main\"",
            "[executor]\nkind = \"external\"\ncommand = []",
            "[zotero]\npage_size = 0",
            "unknown = [",
        ];
        for text in cases {
            let err = Config::from_toml(text).unwrap_err();
            assert!(matches!(err, SyncError::Configuration { .. }), "{text}: {err:?}");
        }
    }

    #[test]
    fn missing_default_file_is_fine_but_missing_explicit_file_is_not() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        assert_eq!(Config::load(dir.path(), None).unwrap(), Config::default());

        let missing = dir.path().join("nope.toml");
        assert!(Config::load(dir.path(), Some(&missing)).is_err());
    }

    #[test]
    fn reads_the_repository_config_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        std::fs::create_dir(dir.path().join(".bibsync")).unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_PATH), "[zotero]\nenabled = false\n")
            .unwrap();

        let config = Config::load(dir.path(), None).unwrap();
        assert!(!config.zotero.enabled);
    }
}
