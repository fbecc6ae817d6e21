//! Resource metrics collection.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters for cache, spill, admission, and checkpoint activity.
///
/// All fields are atomics updated from worker tasks and read by monitoring.
#[derive(Debug, Default)]
pub struct ResourceMetrics {
    /// Pages served from the in-memory cache.
    pub cache_hits: AtomicU64,
    /// Lookups that found neither cache nor spill entry.
    pub cache_misses: AtomicU64,
    /// Entries evicted from the cache.
    pub cache_evictions: AtomicU64,
    /// Evicted entries written to spill files.
    pub pages_spilled: AtomicU64,
    /// Spill files read back into the cache.
    pub pages_rehydrated: AtomicU64,
    /// Checkpoint entries dropped on buffer overflow or after close.
    pub checkpoint_dropped: AtomicU64,
    /// Checkpoint entries written to disk.
    pub checkpoint_written: AtomicU64,
    /// Workers currently holding an admission slot.
    pub admission_active: AtomicUsize,
}

impl ResourceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time snapshot for reporting.
    pub fn snapshot(&self) -> ResourceMetricsSnapshot {
        ResourceMetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_evictions: self.cache_evictions.load(Ordering::Relaxed),
            pages_spilled: self.pages_spilled.load(Ordering::Relaxed),
            pages_rehydrated: self.pages_rehydrated.load(Ordering::Relaxed),
            checkpoint_dropped: self.checkpoint_dropped.load(Ordering::Relaxed),
            checkpoint_written: self.checkpoint_written.load(Ordering::Relaxed),
            admission_active: self.admission_active.load(Ordering::Relaxed),
        }
    }
}

/// Consistent view of resource metrics at one moment.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResourceMetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub pages_spilled: u64,
    pub pages_rehydrated: u64,
    pub checkpoint_dropped: u64,
    pub checkpoint_written: u64,
    pub admission_active: usize,
}

impl ResourceMetricsSnapshot {
    /// Hit rate over all lookups; 0.0 when nothing was looked up.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = ResourceMetrics::new();
        metrics.cache_hits.store(3, Ordering::Relaxed);
        metrics.cache_misses.store(1, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 3);
        assert_eq!(snapshot.cache_hit_rate(), 0.75);
    }
}
