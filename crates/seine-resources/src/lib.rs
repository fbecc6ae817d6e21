//! # Seine Resources
//!
//! Resource management for the Seine crawl engine:
//!
//! - an in-memory LRU page cache with disk spillover for evicted entries
//! - an admission semaphore bounding global in-flight extractions
//! - a durable append-only checkpoint log of completed URLs
//!
//! The [`ResourceManager`] coordinates the three, creates the spill and
//! checkpoint directories on construction, and shuts everything down
//! idempotently via [`close`](ResourceManager::close).

pub mod admission;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod metrics;

pub use admission::{Admission, AdmissionSlot};
pub use cache::PageCache;
pub use checkpoint::CheckpointLog;
pub use config::ResourceConfig;
pub use metrics::{ResourceMetrics, ResourceMetricsSnapshot};

use seine_types::errors::Result;
use seine_types::{CrawlError, Page};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Owns the page cache, spill directory, admission budget, and checkpoint
/// log.
///
/// `close` is safe to call from any task and more than once; afterwards
/// cache operations fail with `ShutdownClosed`, admission acquires fail, and
/// checkpoints drop silently.
pub struct ResourceManager {
    cache: PageCache,
    admission: Admission,
    checkpoint: Option<CheckpointLog>,
    metrics: Arc<ResourceMetrics>,
    closed: AtomicBool,
}

impl ResourceManager {
    /// Build the manager, creating the spill and checkpoint directories if
    /// configured.
    pub async fn new(config: ResourceConfig) -> Result<Self> {
        let config = config.validate();
        let metrics = Arc::new(ResourceMetrics::new());

        if let Some(dir) = config.spill_dir.as_ref() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| CrawlError::cache_io("", "creating spill directory", e))?;
        }

        let checkpoint = match config.checkpoint_path.clone() {
            Some(path) => Some(
                CheckpointLog::open(path, config.checkpoint_interval, metrics.clone())
                    .await
                    .map_err(|e| CrawlError::cache_io("", "opening checkpoint log", e))?,
            ),
            None => None,
        };

        info!(
            cache_capacity = config.cache_capacity,
            max_in_flight = config.max_in_flight,
            spill = config.spill_dir.is_some(),
            checkpointing = checkpoint.is_some(),
            "Resource manager initialized"
        );

        Ok(Self {
            cache: PageCache::new(
                config.cache_capacity,
                config.spill_dir.clone(),
                metrics.clone(),
            ),
            admission: Admission::new(config.max_in_flight, metrics.clone()),
            checkpoint,
            metrics,
            closed: AtomicBool::new(false),
        })
    }

    /// Look up a cached page by URL, consulting the spill index on a miss.
    pub async fn get_page(&self, key: &str) -> Result<Option<Page>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CrawlError::ShutdownClosed);
        }
        self.cache.get(key).await
    }

    /// Store a page snapshot under its URL.
    pub async fn store_page(&self, key: &str, page: &Page) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CrawlError::ShutdownClosed);
        }
        self.cache.store(key, page).await
    }

    /// Wait for an in-flight admission slot.
    pub async fn acquire_slot(&self) -> Result<AdmissionSlot> {
        self.admission.acquire().await
    }

    /// Record a completed URL in the checkpoint log. Non-blocking.
    pub fn checkpoint(&self, url: &str) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Some(log) = self.checkpoint.as_ref() {
            log.checkpoint(url);
        }
    }

    /// Resource counters snapshot.
    pub fn metrics(&self) -> ResourceMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Direct access to the cache, for invariant checks.
    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    /// Direct access to the admission budget.
    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    /// Shut down: fail pending admissions, drain and stop the checkpoint
    /// writer. Idempotent and callable from any task.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.admission.close();
        if let Some(log) = self.checkpoint.as_ref() {
            log.close().await;
        }
        info!("Resource manager closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use url::Url;

    fn page(path: &str) -> Page {
        Page::new(Url::parse(&format!("https://example.com{path}")).unwrap())
    }

    #[tokio::test]
    async fn round_trip_through_manager() {
        let manager = ResourceManager::new(ResourceConfig::default()).await.unwrap();
        let p = page("/a");
        manager.store_page("https://example.com/a", &p).await.unwrap();
        let got = manager.get_page("https://example.com/a").await.unwrap();
        assert!(got.is_some());
        assert_eq!(manager.metrics().cache_hits, 1);
    }

    #[tokio::test]
    async fn new_creates_spill_and_checkpoint_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = ResourceConfig {
            spill_dir: Some(dir.path().join("spill")),
            checkpoint_path: Some(dir.path().join("state/ckpt.log")),
            ..ResourceConfig::default()
        };
        let manager = ResourceManager::new(config).await.unwrap();
        assert!(dir.path().join("spill").is_dir());
        assert!(dir.path().join("state/ckpt.log").is_file());
        manager.close().await;
    }

    #[tokio::test]
    async fn close_fails_cache_ops_and_drops_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let config = ResourceConfig {
            checkpoint_path: Some(dir.path().join("ckpt.log")),
            checkpoint_interval: Duration::from_millis(1),
            ..ResourceConfig::default()
        };
        let manager = ResourceManager::new(config).await.unwrap();
        manager.close().await;
        manager.close().await;

        assert!(matches!(
            manager.get_page("https://example.com/a").await,
            Err(CrawlError::ShutdownClosed)
        ));
        assert!(matches!(
            manager.store_page("https://example.com/a", &page("/a")).await,
            Err(CrawlError::ShutdownClosed)
        ));
        assert!(matches!(
            manager.acquire_slot().await,
            Err(CrawlError::ShutdownClosed)
        ));

        // Silently dropped, no panic.
        manager.checkpoint("https://example.com/a");
    }

    #[tokio::test]
    async fn checkpoint_contents_survive_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt.log");
        let config = ResourceConfig {
            checkpoint_path: Some(path.clone()),
            checkpoint_interval: Duration::from_millis(1),
            ..ResourceConfig::default()
        };
        let manager = ResourceManager::new(config).await.unwrap();
        manager.checkpoint("https://example.com/1");
        manager.checkpoint("https://example.com/2");
        manager.close().await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.contains(&"https://example.com/1"));
        assert!(lines.contains(&"https://example.com/2"));
    }
}
