//! bibsync MediaWiki adapter.
//!
//! Implements the [`pipeline::CitationSource`] trait by fetching a page over
//! HTTP and running the domain citation extractor over its text.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** URL rewriting and HTTP live here; extraction rules live
//! in [`pipeline::citations`].
//!
//! ## Page format
//!
//! By default the page is requested as raw wikitext (`?action=raw`), which is
//! where `<ref>` tags and `{{cite}}` templates actually appear. Setting
//! [`WikiConfig::raw`] to `false` fetches the URL unchanged.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{extract_citations, CitationSource, SourceError, WikiCitation, WikiPageUrl};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiConfig {
    /// Request raw wikitext instead of the rendered page.
    pub raw: bool,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self { raw: true, timeout_secs: 30 }
    }
}

/// MediaWiki page client.
#[derive(Debug, Clone)]
pub struct WikiClient {
    http: Client,
    config: WikiConfig,
}

impl WikiClient {
    /// Creates a client.
    pub fn new(config: WikiConfig) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("bibsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Transport { url: String::new(), message: e.to_string() })?;
        Ok(Self { http, config })
    }

    /// The URL actually requested for `page`.
    pub fn request_url(&self, page: &WikiPageUrl) -> Result<Url, SourceError> {
        let mut url = Url::parse(page.as_str()).map_err(|e| SourceError::Malformed {
            url: page.to_string(),
            message: format!("invalid page URL: {e}"),
        })?;
        if self.config.raw && !url.query_pairs().any(|(k, _)| k == "action") {
            url.query_pairs_mut().append_pair("action", "raw");
        }
        Ok(url)
    }

    /// Fetches the page text.
    pub async fn page_text(&self, page: &WikiPageUrl) -> Result<String, SourceError> {
        let url = self.request_url(page)?;
        let shown = page.to_string();
        let response = self.http.get(url).send().await.map_err(|e| SourceError::Transport {
            url: shown.clone(),
            message: e.without_url().to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: shown,
                status: status.as_u16(),
                retry_after: None,
            });
        }
        response.text().await.map_err(|e| SourceError::Transport {
            url: shown,
            message: e.without_url().to_string(),
        })
    }
}

#[async_trait]
impl CitationSource for WikiClient {
    #[instrument(skip(self), fields(page = %page))]
    async fn citations(&self, page: &WikiPageUrl) -> Result<Vec<WikiCitation>, SourceError> {
        let text = self.page_text(page).await?;
        let citations = extract_citations(&text, page);
        info!(count = citations.len(), "Extracted wiki citations");
        Ok(citations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::CitationKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(server: &MockServer, p: &str) -> WikiPageUrl {
        WikiPageUrl::new(format!("{}{}", server.uri(), p)).unwrap()
    }

    #[tokio::test]
    async fn fetches_raw_wikitext_and_extracts_citations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/Building-the-Workbench"))
            .and(query_param("action", "raw"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "Intro.<ref>Doe, J. (2020). A workbench paper.</ref>\n\
                 {{cite web | title = Tools | url = https://x.org }}\n\
                 [https://example.org/p A Linked Paper]",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = WikiClient::new(WikiConfig::default()).unwrap();
        let found = client.citations(&page(&server, "/wiki/Building-the-Workbench")).await.unwrap();

        let kinds: Vec<_> = found.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![CitationKind::RefTag, CitationKind::CiteTemplate, CitationKind::ExternalLink]
        );
        assert_eq!(
            found[0].source_url.as_str(),
            format!("{}/wiki/Building-the-Workbench", server.uri())
        );
    }

    #[tokio::test]
    async fn http_errors_surface_as_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = WikiClient::new(WikiConfig::default()).unwrap();
        let err = client.citations(&page(&server, "/wiki/Missing")).await.unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 404, .. }));
    }

    #[test]
    fn raw_action_is_appended_once() {
        let client = WikiClient::new(WikiConfig::default()).unwrap();
        let request_url = |url: &str| {
            let page = WikiPageUrl::new(url).unwrap();
            client.request_url(&page).unwrap().to_string()
        };

        assert_eq!(
            request_url("https://en.wikiversity.org/wiki/Page"),
            "https://en.wikiversity.org/wiki/Page?action=raw"
        );
        assert_eq!(
            request_url("https://w.org/index.php?title=Page&action=raw"),
            "https://w.org/index.php?title=Page&action=raw"
        );
    }

    #[test]
    fn rendered_mode_keeps_the_url() {
        let client = WikiClient::new(WikiConfig { raw: false, ..WikiConfig::default() }).unwrap();
        let p = WikiPageUrl::new("https://w.org/wiki/Page").unwrap();
        assert_eq!(client.request_url(&p).unwrap().as_str(), "https://w.org/wiki/Page");
    }

    #[test]
    fn invalid_urls_are_malformed() {
        let client = WikiClient::new(WikiConfig::default()).unwrap();
        let p = WikiPageUrl::new("not a url").unwrap();
        assert!(matches!(client.request_url(&p), Err(SourceError::Malformed { .. })));
    }
}
