//! LRU page cache with disk spillover.
//!
//! The cache map and the spill index share one mutex; serialization and file
//! I/O always happen outside it. A key lives in the cache or in the spill
//! index, never both. Values are snapshot copies: callers get fresh `Page`
//! clones, so nothing outside the cache can mutate what it holds.

use crate::metrics::ResourceMetrics;
use lru::LruCache;
use parking_lot::Mutex;
use seine_types::errors::Result;
use seine_types::{CrawlError, Page};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

struct CacheInner {
    /// `None` when caching is disabled (capacity 0).
    lru: Option<LruCache<String, Arc<Page>>>,
    /// Key to spill-file path for evicted entries.
    spill: HashMap<String, PathBuf>,
}

/// In-memory LRU of crawled pages with optional spill-to-disk on eviction.
pub struct PageCache {
    inner: Mutex<CacheInner>,
    spill_dir: Option<PathBuf>,
    metrics: Arc<ResourceMetrics>,
}

impl PageCache {
    pub(crate) fn new(
        capacity: usize,
        spill_dir: Option<PathBuf>,
        metrics: Arc<ResourceMetrics>,
    ) -> Self {
        let lru = NonZeroUsize::new(capacity).map(LruCache::new);
        Self {
            inner: Mutex::new(CacheInner {
                lru,
                spill: HashMap::new(),
            }),
            spill_dir,
            metrics,
        }
    }

    /// Store a snapshot of `page` under `key`, evicting (and spilling) the
    /// least-recently-used entry on overflow. No-op when caching is disabled.
    pub async fn store(&self, key: &str, page: &Page) -> Result<()> {
        let (evicted, stale_spill) = {
            let mut inner = self.inner.lock();
            let Some(lru) = inner.lru.as_mut() else {
                return Ok(());
            };
            let displaced = lru.push(key.to_string(), Arc::new(page.clone()));
            // The key now lives in the cache; any spill entry for it is stale.
            let stale_spill = inner.spill.remove(key);
            // `push` hands back the old value for the same key on update, or
            // the evicted LRU pair on overflow. Only the latter spills.
            let evicted = displaced.filter(|(displaced_key, _)| displaced_key.as_str() != key);
            (evicted, stale_spill)
        };

        if let Some(path) = stale_spill {
            remove_spill_file(&path).await;
        }

        if let Some((evicted_key, evicted_page)) = evicted {
            self.metrics.cache_evictions.fetch_add(1, Ordering::Relaxed);
            self.spill_evicted(evicted_key, evicted_page).await?;
        }
        Ok(())
    }

    /// Look up a page: cache first (promoting on hit), then the spill index.
    /// A spill hit rehydrates the page back into the cache and deletes the
    /// file. Returns a snapshot copy.
    pub async fn get(&self, key: &str) -> Result<Option<Page>> {
        let spill_path = {
            let mut inner = self.inner.lock();
            if let Some(lru) = inner.lru.as_mut() {
                if let Some(cached) = lru.get(key) {
                    self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some((**cached).clone()));
                }
            }
            match inner.spill.remove(key) {
                Some(path) => path,
                None => {
                    self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
            }
        };

        // Rehydrate outside the lock.
        let bytes = tokio::fs::read(&spill_path)
            .await
            .map_err(|e| CrawlError::cache_io(key, "reading spill file", e))?;
        let page: Page = serde_json::from_slice(&bytes)
            .map_err(|e| CrawlError::cache_io(key, "decoding spill file", e))?;
        remove_spill_file(&spill_path).await;

        // Re-insert; this may cascade another eviction.
        self.store(key, &page).await?;
        self.metrics.pages_rehydrated.fetch_add(1, Ordering::Relaxed);
        debug!(key, "Rehydrated page from spill");
        Ok(Some(page))
    }

    /// Whether `key` is currently in the in-memory cache. Does not promote.
    pub fn contains_cached(&self, key: &str) -> bool {
        self.inner
            .lock()
            .lru
            .as_ref()
            .is_some_and(|lru| lru.contains(key))
    }

    /// Whether `key` is currently in the spill index.
    pub fn contains_spilled(&self, key: &str) -> bool {
        self.inner.lock().spill.contains_key(key)
    }

    /// Number of entries resident in memory.
    pub fn len(&self) -> usize {
        self.inner.lock().lru.as_ref().map_or(0, |lru| lru.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn spill_evicted(&self, key: String, page: Arc<Page>) -> Result<()> {
        let Some(dir) = self.spill_dir.as_ref() else {
            return Ok(());
        };

        let bytes = serde_json::to_vec(&*page)
            .map_err(|e| CrawlError::cache_io(&key, "encoding spill file", e))?;
        let path = dir.join(spill_file_name(&key));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| CrawlError::cache_io(&key, "writing spill file", e))?;

        let (raced_reinsert, previous) = {
            let mut inner = self.inner.lock();
            let back_in_cache = inner
                .lru
                .as_ref()
                .is_some_and(|lru| lru.contains(key.as_str()));
            if back_in_cache {
                (true, None)
            } else {
                (false, inner.spill.insert(key.clone(), path.clone()))
            }
        };

        if raced_reinsert {
            // The key was re-stored while we were writing; the cache copy
            // wins and the fresh spill file is discarded.
            remove_spill_file(&path).await;
            return Ok(());
        }
        if let Some(previous) = previous {
            // An older spill file for the same key; superseded.
            remove_spill_file(&previous).await;
        }
        self.metrics.pages_spilled.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// `spill-<unix-nanos>-<hex-fnv64(key)>.spill.json`
fn spill_file_name(key: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("spill-{}-{:016x}.spill.json", nanos, fnv64(key))
}

/// FNV-1a, 64-bit. The constants are fixed by the on-disk naming format.
fn fnv64(key: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in key.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

async fn remove_spill_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove spill file");
        }
    }
}
