//! Per-stage pipeline metrics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Processed/failed counters for one stage.
#[derive(Debug, Default)]
pub struct StageMetrics {
    pub processed: AtomicU64,
    pub failed: AtomicU64,
}

impl StageMetrics {
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StageSnapshot {
        StageSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Counters for all pipeline stages.
///
/// `cache` is a bookkeeping bucket, not a worker pool: a cache hit counts
/// there and deliberately not under `extraction`, so the two never mix.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub discovery: StageMetrics,
    pub extraction: StageMetrics,
    pub processing: StageMetrics,
    pub output: StageMetrics,
    pub cache: StageMetrics,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time snapshot of all stage counters.
    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        let discovery = self.discovery.snapshot();
        let extraction = self.extraction.snapshot();
        let processing = self.processing.snapshot();
        let output = self.output.snapshot();
        let cache = self.cache.snapshot();
        // Totals count every non-cache stage success once.
        let total_processed =
            discovery.processed + extraction.processed + processing.processed + output.processed;
        let total_failed = discovery.failed + extraction.failed + processing.failed + output.failed;
        PipelineMetricsSnapshot {
            discovery,
            extraction,
            processing,
            output,
            cache,
            total_processed,
            total_failed,
        }
    }
}

/// Consistent view of one stage's counters.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct StageSnapshot {
    pub processed: u64,
    pub failed: u64,
}

/// Consistent view of the whole pipeline's counters.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineMetricsSnapshot {
    pub discovery: StageSnapshot,
    pub extraction: StageSnapshot,
    pub processing: StageSnapshot,
    pub output: StageSnapshot,
    pub cache: StageSnapshot,
    pub total_processed: u64,
    pub total_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_hits_do_not_mix_into_extraction() {
        let metrics = PipelineMetrics::new();
        metrics.extraction.record_processed();
        metrics.cache.record_processed();
        metrics.cache.record_processed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.extraction.processed, 1);
        assert_eq!(snapshot.cache.processed, 2);
        // Cache hits are excluded from the pipeline totals.
        assert_eq!(snapshot.total_processed, 1);
    }

    #[test]
    fn totals_sum_across_stages() {
        let metrics = PipelineMetrics::new();
        metrics.discovery.record_processed();
        metrics.extraction.record_processed();
        metrics.processing.record_processed();
        metrics.output.record_processed();
        metrics.extraction.record_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_processed, 4);
        assert_eq!(snapshot.total_failed, 1);
    }
}
