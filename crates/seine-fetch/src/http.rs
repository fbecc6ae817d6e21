//! reqwest-backed [`Fetcher`] adapter.

use crate::extract::page_from_html;
use async_trait::async_trait;
use seine_types::errors::Result;
use seine_types::{CrawlError, FetchedPage, Fetcher};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// HTTP fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User-Agent header sent with every request.
    pub user_agent: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("seine/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Fetches pages over HTTP and extracts them into the page model.
///
/// Non-success statuses are reported back with no page so the pipeline can
/// feed the status into the rate limiter and decide on retries; only
/// transport-level failures become errors.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CrawlError::fetch_failed("", format!("building http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| CrawlError::fetch_failed(url.as_str(), e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            warn!(%url, status, "Fetch returned non-success status");
            return Ok(FetchedPage { status, page: None });
        }

        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::fetch_failed(url.as_str(), e.to_string()))?;

        let page = page_from_html(url, &body);
        debug!(
            %url,
            status,
            links = page.links.len(),
            words = page.metadata.word_count,
            "Fetched page"
        );
        Ok(FetchedPage {
            status,
            page: Some(page),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_versioned_user_agent() {
        let config = FetchConfig::default();
        assert!(config.user_agent.starts_with("seine/"));
        assert!(!config.request_timeout.is_zero());
    }

    #[tokio::test]
    async fn builds_a_client_from_defaults() {
        assert!(HttpFetcher::new(FetchConfig::default()).is_ok());
    }
}
