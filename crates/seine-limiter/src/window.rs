//! Sliding-window error model.
//!
//! A fixed ring of `(total, errors)` buckets spanning `stats_window`, each
//! covering `stats_bucket` of wall-clock time. Buckets are reused in place;
//! a bucket whose epoch no longer matches the current ring position is reset
//! on access, which evicts stale data lazily.

use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    /// `now_ms / bucket_ms` at the time this bucket was last written.
    epoch: u64,
    total: u64,
    errors: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct SlidingWindow {
    buckets: Vec<Bucket>,
    bucket_ms: u64,
}

impl SlidingWindow {
    pub(crate) fn new(window: Duration, bucket: Duration) -> Self {
        let bucket_ms = (bucket.as_millis() as u64).max(1);
        let count = ((window.as_millis() as u64) / bucket_ms).max(1) as usize;
        Self {
            buckets: vec![Bucket::default(); count],
            bucket_ms,
        }
    }

    /// Record one observation at `now_ms`.
    pub(crate) fn record(&mut self, now_ms: u64, error: bool) {
        let epoch = now_ms / self.bucket_ms;
        let len = self.buckets.len() as u64;
        let bucket = &mut self.buckets[(epoch % len) as usize];
        if bucket.epoch != epoch {
            *bucket = Bucket {
                epoch,
                total: 0,
                errors: 0,
            };
        }
        bucket.total += 1;
        if error {
            bucket.errors += 1;
        }
    }

    /// Sum of `(total, errors)` across buckets still inside the window.
    pub(crate) fn totals(&self, now_ms: u64) -> (u64, u64) {
        let epoch = now_ms / self.bucket_ms;
        let len = self.buckets.len() as u64;
        let mut total = 0;
        let mut errors = 0;
        for bucket in &self.buckets {
            if bucket.total == 0 && bucket.errors == 0 {
                continue;
            }
            if bucket.epoch <= epoch && epoch - bucket.epoch < len {
                total += bucket.total;
                errors += bucket.errors;
            }
        }
        (total, errors)
    }

    /// Windowed error rate; 0.0 with no live samples.
    pub(crate) fn error_rate(&self, now_ms: u64) -> f64 {
        let (total, errors) = self.totals(now_ms);
        if total == 0 {
            return 0.0;
        }
        errors as f64 / total as f64
    }
}
