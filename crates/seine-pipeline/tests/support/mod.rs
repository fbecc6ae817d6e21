//! Test doubles for pipeline integration tests: stub fetchers, a flaky
//! limiter, and a recording sink.

use async_trait::async_trait;
use parking_lot::Mutex;
use seine_types::errors::Result;
use seine_types::{
    CrawlResult, Feedback, FetchedPage, Fetcher, OutputSink, Page, Permit, RateLimit,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

/// Fetcher that synthesizes a page for every URL. URLs whose path contains
/// `fail` get a 500 with no page instead.
#[derive(Debug, Default)]
pub struct StubFetcher {
    pub fetches: AtomicUsize,
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if url.path().contains("fail") {
            return Ok(FetchedPage {
                status: 500,
                page: None,
            });
        }
        let mut page = Page::new(url.clone());
        page.title = format!("stub page for {url}");
        page.text = "stub body".to_string();
        page.metadata.word_count = 2;
        Ok(FetchedPage {
            status: 200,
            page: Some(page),
        })
    }
}

/// Fetcher that never yields a page.
#[derive(Debug, Default)]
pub struct NoPageFetcher {
    pub fetches: AtomicUsize,
}

#[async_trait]
impl Fetcher for NoPageFetcher {
    async fn fetch(&self, _url: &Url) -> Result<FetchedPage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(FetchedPage {
            status: 503,
            page: None,
        })
    }
}

/// Fetcher that parks until cancellation tears the worker down.
#[derive(Debug, Default)]
pub struct HangingFetcher;

#[async_trait]
impl Fetcher for HangingFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        let page = Page::new(url.clone());
        Ok(FetchedPage {
            status: 200,
            page: Some(page),
        })
    }
}

/// Fetcher that tracks its own peak concurrency.
#[derive(Debug, Default)]
pub struct ConcurrencyProbeFetcher {
    current: AtomicUsize,
    pub peak: AtomicUsize,
}

#[async_trait]
impl Fetcher for ConcurrencyProbeFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        let page = Page::new(url.clone());
        Ok(FetchedPage {
            status: 200,
            page: Some(page),
        })
    }
}

/// Limiter that refuses the first `rejections` acquires with a circuit-open
/// error, then grants everything.
#[derive(Debug, Default)]
pub struct FlakyLimiter {
    rejections: AtomicUsize,
    pub acquires: AtomicUsize,
}

impl FlakyLimiter {
    pub fn rejecting(rejections: usize) -> Self {
        Self {
            rejections: AtomicUsize::new(rejections),
            acquires: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RateLimit for FlakyLimiter {
    async fn acquire(&self, domain: &str) -> Result<Permit> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        let remaining = self.rejections.load(Ordering::SeqCst);
        if remaining > 0 {
            self.rejections.store(remaining - 1, Ordering::SeqCst);
            return Err(seine_types::CrawlError::circuit_open(domain));
        }
        Ok(Permit::unrestricted())
    }

    fn feedback(&self, _domain: &str, _feedback: Feedback) {}
}

/// Sink that records what was written and how it was closed.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub written: Mutex<Vec<(String, bool)>>,
    pub close_calls: AtomicUsize,
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn write(&self, result: &CrawlResult) -> anyhow::Result<()> {
        self.written.lock().push((result.url.clone(), result.success));
        Ok(())
    }

    async fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Drain the result channel to closure, failing the test if it never closes.
pub async fn drain(
    mut rx: tokio::sync::mpsc::Receiver<CrawlResult>,
) -> Vec<CrawlResult> {
    tokio::time::timeout(Duration::from_secs(10), async move {
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    })
    .await
    .expect("result channel did not close in time")
}
