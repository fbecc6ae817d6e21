//! Collaborator ports the pipeline is generic over.
//!
//! Concrete adapters (the reqwest fetcher, the adaptive limiter, output
//! sinks) implement these traits; tests substitute recording fakes at the
//! same seams.

use crate::errors::Result;
use crate::page::Page;
use crate::result::CrawlResult;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;

/// Outcome of one fetch attempt.
///
/// `page: None` with a status means the server answered but produced nothing
/// crawlable; the extraction worker treats that as a retryable failure.
#[derive(Debug)]
pub struct FetchedPage {
    /// HTTP status of the response, or a synthetic code for transport errors.
    pub status: u16,
    /// The extracted page, when the fetch yielded one.
    pub page: Option<Page>,
}

/// Fetches a URL and extracts a [`Page`] from the response.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &url::Url) -> Result<FetchedPage>;
}

/// Transforms a fetched page into its processed form (markdown, enrichment).
///
/// Runs inside the processing stage; errors become terminal failures for the
/// page's URL.
#[async_trait]
pub trait PageProcessor: Send + Sync {
    async fn process(&self, page: Page) -> Result<Page>;
}

/// Destination for finished crawl results.
///
/// The pipeline calls `write` exactly once per delivered result and `close`
/// exactly once at shutdown. Implementations must tolerate concurrent
/// `write` calls unless documented single-writer.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write(&self, result: &CrawlResult) -> anyhow::Result<()>;
    async fn flush(&self) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
    /// Human-readable sink name for logs.
    fn name(&self) -> &str;
}

/// Observation reported to the rate limiter after a fetch attempt.
#[derive(Debug, Clone)]
pub struct Feedback {
    /// HTTP status code; 0 or a synthetic 5xx for transport failures.
    pub status: u16,
    /// Wall-clock latency of the attempt.
    pub latency: Duration,
    /// Transport-level error, if the attempt never got a response.
    pub error: Option<String>,
}

impl Feedback {
    /// A successful observation.
    pub fn ok(status: u16, latency: Duration) -> Self {
        Self {
            status,
            latency,
            error: None,
        }
    }

    /// A failed observation with a transport error message.
    pub fn error(latency: Duration, message: impl Into<String>) -> Self {
        Self {
            status: 0,
            latency,
            error: Some(message.into()),
        }
    }
}

/// One-shot accounting token for a single request against a domain.
///
/// Releasing more than once is a no-op; dropping an unreleased permit
/// releases it. A permit holds at most a half-open probe slot and never a
/// reference to limiter internals.
#[derive(Debug, Default)]
pub struct Permit {
    probe: Option<OwnedSemaphorePermit>,
}

impl Permit {
    /// Permit granted outside of half-open probing.
    pub fn unrestricted() -> Self {
        Self { probe: None }
    }

    /// Permit carrying a half-open probe slot, returned on release.
    pub fn with_probe(probe: OwnedSemaphorePermit) -> Self {
        Self { probe: Some(probe) }
    }

    /// Release the permit. Idempotent.
    pub fn release(&mut self) {
        self.probe.take();
    }
}

/// Grants timed permission to contact a domain and adapts from feedback.
///
/// Acquisition blocks until a token is available; callers cancel by racing
/// the future against their cancellation token. Refusal while a domain's
/// circuit is open is the distinguished
/// [`CircuitOpen`](crate::errors::CrawlError::CircuitOpen) error.
#[async_trait]
pub trait RateLimit: Send + Sync {
    async fn acquire(&self, domain: &str) -> Result<Permit>;

    /// Best-effort delivery of an observation for the domain that granted
    /// the permit. Dropped feedback delays adaptation but never corrupts
    /// state.
    fn feedback(&self, domain: &str, feedback: Feedback);
}

/// Limiter that always grants. Used when rate limiting is disabled.
#[derive(Debug, Default)]
pub struct UnlimitedRateLimit;

#[async_trait]
impl RateLimit for UnlimitedRateLimit {
    async fn acquire(&self, _domain: &str) -> Result<Permit> {
        Ok(Permit::unrestricted())
    }

    fn feedback(&self, _domain: &str, _feedback: Feedback) {}
}
