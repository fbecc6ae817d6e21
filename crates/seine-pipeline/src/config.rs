//! Pipeline configuration.

use std::time::Duration;

/// Worker pool sizes, channel capacity, and retry policy for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Workers normalizing and validating seed URLs.
    pub discovery_workers: usize,
    /// Workers fetching pages (each holds a rate-limit permit and an
    /// admission slot around its fetch).
    pub extraction_workers: usize,
    /// Workers running the page processor.
    pub processing_workers: usize,
    /// Workers forwarding results to the caller and the sink.
    pub output_workers: usize,
    /// Capacity of every inter-stage channel; backpressure propagates
    /// upstream through it.
    pub buffer_size: usize,
    /// First retry backoff; doubled per attempt.
    pub retry_base_delay: Duration,
    /// Backoff ceiling.
    pub retry_max_delay: Duration,
    /// Total attempts allowed per URL; 0 disables retries.
    pub retry_max_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            discovery_workers: 2,
            extraction_workers: num_cpus::get().max(4),
            processing_workers: 2,
            output_workers: 2,
            buffer_size: 64,
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(10),
            retry_max_attempts: 3,
        }
    }
}

impl PipelineConfig {
    /// Clamp every knob into its usable range; non-positive retry delays
    /// fall back to the defaults.
    pub fn validate(mut self) -> Self {
        let defaults = Self::default();
        self.discovery_workers = self.discovery_workers.max(1);
        self.extraction_workers = self.extraction_workers.max(1);
        self.processing_workers = self.processing_workers.max(1);
        self.output_workers = self.output_workers.max(1);
        self.buffer_size = self.buffer_size.max(1);
        if self.retry_base_delay.is_zero() {
            self.retry_base_delay = defaults.retry_base_delay;
        }
        if self.retry_max_delay.is_zero() {
            self.retry_max_delay = defaults.retry_max_delay;
        }
        if self.retry_max_delay < self.retry_base_delay {
            self.retry_max_delay = self.retry_base_delay;
        }
        self
    }
}
