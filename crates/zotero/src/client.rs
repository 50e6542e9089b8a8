use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use pipeline::{Bibliography, Entry, ReferenceSource, RetryPolicy, SourceError, ZoteroCredentials};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Public Zotero Web API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.zotero.org";

const API_VERSION: &str = "3";
/// Zotero caps `limit` at 100 items per request.
const MAX_PAGE_SIZE: u32 = 100;
/// Upper bound on a single computed back-off delay.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Whether the credentials' id names a user library or a group library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    /// `/users/{id}`
    #[default]
    User,
    /// `/groups/{id}`
    Group,
}

impl LibraryKind {
    fn path_segment(self) -> &'static str {
        match self {
            LibraryKind::User => "users",
            LibraryKind::Group => "groups",
        }
    }
}

/// Client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoteroConfig {
    /// API root, without trailing slash.
    pub base_url: String,
    /// Library type.
    pub library: LibraryKind,
    /// Items per request (1–100).
    pub page_size: u32,
    /// Retries per page for 429/503 responses and transport failures.
    pub max_retries: u32,
    /// First back-off delay when the server gives no hint; grows exponentially.
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
    /// Per-request timeout.
    #[serde(with = "millis")]
    pub timeout: Duration,
}

impl Default for ZoteroConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            library: LibraryKind::User,
            page_size: MAX_PAGE_SIZE,
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// One parsed response page.
struct Page {
    entries: Vec<Entry>,
    total: Option<usize>,
    backoff: Option<Duration>,
}

/// Zotero Web API client.
#[derive(Debug, Clone)]
pub struct ZoteroClient {
    http: Client,
    config: ZoteroConfig,
}

impl ZoteroClient {
    /// Creates a client. Fails only if the TLS backend cannot be initialised.
    pub fn new(config: ZoteroConfig) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("bibsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Transport {
                url: config.base_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { http, config })
    }

    /// The active configuration.
    pub fn config(&self) -> &ZoteroConfig {
        &self.config
    }

    fn page_size(&self) -> u32 {
        self.config.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    fn items_url(&self, owner: &str) -> String {
        format!(
            "{}/{}/{}/items/top",
            self.config.base_url.trim_end_matches('/'),
            self.config.library.path_segment(),
            owner
        )
    }

    /// Back-off schedule used when the server gives no `Retry-After` hint.
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.initial_backoff)
            .with_multiplier(2.0)
            .with_max_interval(MAX_BACKOFF)
            .with_max_elapsed_time(None) // bounded by max_retries instead
            .build()
    }

    async fn fetch_page_with_retry(
        &self,
        credentials: &ZoteroCredentials,
        start: usize,
    ) -> Result<Page, SourceError> {
        let mut backoff = self.backoff();
        let mut attempt = 0u32;
        loop {
            let err = match self.fetch_page(credentials, start).await {
                Ok(page) => return Ok(page),
                Err(err) => err,
            };
            let RetryPolicy::Retryable { after } = err.retry_policy() else {
                return Err(err);
            };
            if attempt >= self.config.max_retries {
                return Err(err);
            }
            let Some(delay) = after.or_else(|| backoff.next_backoff()) else {
                return Err(err);
            };
            attempt += 1;
            warn!(
                error = %err,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying Zotero request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn fetch_page(
        &self,
        credentials: &ZoteroCredentials,
        start: usize,
    ) -> Result<Page, SourceError> {
        let shown_url = self.items_url("***");
        let limit = self.page_size().to_string();
        let start_param = start.to_string();

        let response = self
            .http
            .get(self.items_url(credentials.user_id()))
            .query(&[
                ("format", "bibtex"),
                ("limit", limit.as_str()),
                ("start", start_param.as_str()),
            ])
            .header("Zotero-API-Key", credentials.api_key())
            .header("Zotero-API-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| SourceError::Transport {
                url: shown_url.clone(),
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::Unauthorized { url: shown_url, status: status.as_u16() });
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                url: shown_url,
                status: status.as_u16(),
                retry_after: seconds_header(&headers, "Retry-After")
                    .or_else(|| seconds_header(&headers, "Backoff")),
            });
        }

        let body = response.text().await.map_err(|e| SourceError::Transport {
            url: shown_url.clone(),
            message: e.without_url().to_string(),
        })?;
        let bibliography = Bibliography::parse(&body).map_err(|e| SourceError::Malformed {
            url: shown_url.clone(),
            message: e.to_string(),
        })?;

        Ok(Page {
            entries: bibliography.entries().cloned().collect(),
            total: headers
                .get("Total-Results")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok()),
            backoff: seconds_header(&headers, "Backoff"),
        })
    }
}

#[async_trait]
impl ReferenceSource for ZoteroClient {
    #[instrument(skip_all, fields(library = ?self.config.library))]
    async fn fetch(&self, credentials: &ZoteroCredentials) -> Result<Vec<Entry>, SourceError> {
        let page_size = self.page_size() as usize;
        let mut entries = Vec::new();
        let mut start = 0usize;

        loop {
            let page = self.fetch_page_with_retry(credentials, start).await?;
            let received = page.entries.len();
            debug!(start, received, total = ?page.total, "Fetched Zotero page");
            entries.extend(page.entries);
            start += page_size;

            let more = match page.total {
                Some(total) => start < total,
                None => received >= page_size,
            };
            if !more || received == 0 {
                break;
            }
            if let Some(delay) = page.backoff {
                info!(delay_secs = delay.as_secs(), "Zotero requested back-off");
                tokio::time::sleep(delay).await;
            }
        }

        info!(count = entries.len(), "Fetched Zotero library");
        Ok(entries)
    }
}

fn seconds_header(headers: &HeaderMap, name: &str) -> Option<Duration> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
