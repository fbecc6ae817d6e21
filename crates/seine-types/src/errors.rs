//! Error types for the Seine crawl engine.

use thiserror::Error;

/// Result alias used across the Seine crates.
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Errors surfaced by the crawl core.
///
/// Stage workers never panic-propagate; internal failures are converted into
/// terminal [`crate::CrawlResult`]s carrying one of these values. Callers
/// dispatch on the variant rather than the message.
#[derive(Error, Debug)]
pub enum CrawlError {
    /// Discovery rejected a URL; never retried.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The rate limiter refused the domain; retryable while budget remains.
    #[error("circuit open for domain {domain}")]
    CircuitOpen { domain: String },

    /// The fetch produced no page or failed in transport; retryable while
    /// budget remains.
    #[error("fetch failed for {url}: {message}")]
    FetchFailed { url: String, message: String },

    /// Unexpected failure reading or writing the cache or spill files.
    /// Non-retryable; surfaced as a bug signal.
    #[error("cache i/o failure for {url}: {message}")]
    CacheIo {
        url: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The surrounding operation was cancelled; terminates workers without
    /// producing a result.
    #[error("operation cancelled")]
    Cancelled,

    /// Operation raced shutdown of the resource manager.
    #[error("resource manager is shut down")]
    ShutdownClosed,
}

impl CrawlError {
    /// Create an invalid-URL error.
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a circuit-open error for a domain.
    pub fn circuit_open(domain: impl Into<String>) -> Self {
        Self::CircuitOpen {
            domain: domain.into(),
        }
    }

    /// Create a fetch-failed error.
    pub fn fetch_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FetchFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a cache I/O error with an underlying cause.
    pub fn cache_io<E>(url: impl Into<String>, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::CacheIo {
            url: url.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a cache I/O error without a cause.
    pub fn cache_io_msg(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CacheIo {
            url: url.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Whether the extraction stage may retry after this error, budget
    /// permitting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::FetchFailed { .. })
    }
}
