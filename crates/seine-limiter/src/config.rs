//! Limiter configuration.

use std::time::Duration;

/// Adaptive rate limiter configuration.
///
/// All durations are wall-clock. `validate()` normalizes out-of-range
/// values instead of failing, so a partially specified config degrades to
/// something sane.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Master switch; when false, acquire always grants immediately and
    /// feedback is discarded.
    pub enabled: bool,
    /// Requests per second a fresh domain starts at.
    pub initial_rps: f64,
    /// Floor the multiplicative decrease never goes below.
    pub min_rps: f64,
    /// Ceiling the additive increase never exceeds.
    pub max_rps: f64,
    /// Token bucket burst capacity, in tokens.
    pub token_bucket_capacity: f64,
    /// Added to rps on each healthy observation.
    pub aimd_increase: f64,
    /// Fraction removed from rps on error or degraded latency (0..1).
    pub aimd_decrease: f64,
    /// Latency at or below which a 2xx response counts as healthy.
    pub latency_target: Duration,
    /// Multiplier over `latency_target` past which a 2xx response triggers
    /// a decrease.
    pub latency_degrade_factor: f64,
    /// Windowed error rate at which the circuit trips, given enough samples.
    pub error_rate_threshold: f64,
    /// Minimum live samples before the windowed error rate can trip.
    pub min_samples_to_trip: u64,
    /// Consecutive failures that trip the circuit regardless of the window.
    pub consecutive_fail_threshold: u32,
    /// How long an open circuit refuses traffic before probing.
    pub open_state_duration: Duration,
    /// Concurrent probe permits granted in the half-open state.
    pub half_open_probes: u32,
    /// Span of the sliding error window.
    pub stats_window: Duration,
    /// Span of one bucket within the window.
    pub stats_bucket: Duration,
    /// Idle time after which a domain's state is reaped.
    pub domain_state_ttl: Duration,
    /// Number of independently locked shards.
    pub shards: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_rps: 1.5,
            min_rps: 0.1,
            max_rps: 12.0,
            token_bucket_capacity: 4.0,
            aimd_increase: 0.25,
            aimd_decrease: 0.5,
            latency_target: Duration::from_millis(500),
            latency_degrade_factor: 2.0,
            error_rate_threshold: 0.5,
            min_samples_to_trip: 5,
            consecutive_fail_threshold: 3,
            open_state_duration: Duration::from_secs(30),
            half_open_probes: 3,
            stats_window: Duration::from_secs(60),
            stats_bucket: Duration::from_secs(10),
            domain_state_ttl: Duration::from_secs(3600),
            shards: 16,
        }
    }
}

impl RateLimitConfig {
    /// Clamp every knob into its usable range.
    pub fn validate(mut self) -> Self {
        let defaults = Self::default();

        if self.shards == 0 {
            self.shards = 1;
        }
        if self.min_rps <= 0.0 {
            self.min_rps = defaults.min_rps;
        }
        if self.max_rps < self.min_rps {
            self.max_rps = self.min_rps;
        }
        self.initial_rps = self.initial_rps.clamp(self.min_rps, self.max_rps);
        if self.token_bucket_capacity < 1.0 {
            self.token_bucket_capacity = 1.0;
        }
        if self.aimd_increase <= 0.0 {
            self.aimd_increase = defaults.aimd_increase;
        }
        if !(0.0..1.0).contains(&self.aimd_decrease) {
            self.aimd_decrease = defaults.aimd_decrease;
        }
        if self.latency_degrade_factor < 1.0 {
            self.latency_degrade_factor = defaults.latency_degrade_factor;
        }
        if !(0.0..=1.0).contains(&self.error_rate_threshold) || self.error_rate_threshold == 0.0 {
            self.error_rate_threshold = defaults.error_rate_threshold;
        }
        if self.half_open_probes == 0 {
            self.half_open_probes = 1;
        }
        if self.stats_bucket.is_zero() {
            self.stats_bucket = defaults.stats_bucket;
        }
        if self.stats_window < self.stats_bucket {
            self.stats_window = self.stats_bucket;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_self_consistent() {
        let cfg = RateLimitConfig::default();
        assert!(cfg.min_rps <= cfg.initial_rps && cfg.initial_rps <= cfg.max_rps);
        assert!(cfg.stats_window >= cfg.stats_bucket);
    }

    #[test]
    fn validate_clamps_degenerate_values() {
        let cfg = RateLimitConfig {
            shards: 0,
            min_rps: -1.0,
            max_rps: 0.0,
            initial_rps: 100.0,
            token_bucket_capacity: 0.0,
            aimd_decrease: 2.0,
            half_open_probes: 0,
            stats_bucket: Duration::ZERO,
            ..RateLimitConfig::default()
        }
        .validate();

        assert_eq!(cfg.shards, 1);
        assert!(cfg.min_rps > 0.0);
        assert!(cfg.max_rps >= cfg.min_rps);
        assert!(cfg.initial_rps <= cfg.max_rps);
        assert!(cfg.token_bucket_capacity >= 1.0);
        assert!((0.0..1.0).contains(&cfg.aimd_decrease));
        assert_eq!(cfg.half_open_probes, 1);
        assert!(!cfg.stats_bucket.is_zero());
        assert!(cfg.stats_window >= cfg.stats_bucket);
    }
}
