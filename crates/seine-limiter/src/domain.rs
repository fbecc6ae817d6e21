//! Per-domain limiter state: token bucket, AIMD rate, sliding window,
//! circuit breaker.
//!
//! All mutation happens under the owning shard's lock; nothing here blocks.

use crate::config::RateLimitConfig;
use crate::window::SlidingWindow;
use seine_types::Feedback;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Circuit breaker state for one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Permits granted per token bucket.
    Closed,
    /// All acquires refused until the cooldown elapses.
    Open,
    /// A bounded number of concurrent probes allowed through.
    HalfOpen,
}

/// How a feedback observation is classified for AIMD and the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observation {
    /// 2xx within the latency target.
    Healthy,
    /// 2xx but slower than target x degrade factor.
    Degraded,
    /// 5xx, 429, or transport failure.
    Error,
    /// Everything else (3xx, non-429 4xx, latency between target and the
    /// degrade threshold): counted as a sample, rate unchanged.
    Neutral,
}

fn classify(cfg: &RateLimitConfig, feedback: &Feedback) -> Observation {
    let is_error = feedback.error.is_some()
        || feedback.status == 0
        || feedback.status >= 500
        || feedback.status == 429;
    if is_error {
        return Observation::Error;
    }
    if (200..300).contains(&feedback.status) {
        if feedback.latency <= cfg.latency_target {
            return Observation::Healthy;
        }
        if feedback.latency > cfg.latency_target.mul_f64(cfg.latency_degrade_factor) {
            return Observation::Degraded;
        }
    }
    Observation::Neutral
}

/// Mutable state for one domain, guarded by its shard lock.
#[derive(Debug)]
pub(crate) struct DomainState {
    /// Current refill rate, adjusted by AIMD.
    pub(crate) rps: f64,
    /// Available tokens, fractional for smooth refill.
    pub(crate) tokens: f64,
    last_refill_ms: u64,
    window: SlidingWindow,
    pub(crate) consecutive_failures: u32,
    pub(crate) circuit: CircuitState,
    /// Time of the last circuit transition.
    pub(crate) changed_at_ms: u64,
    /// Half-open probe slots; replaced wholesale on each transition into
    /// HalfOpen so stale probes cannot inflate the budget.
    pub(crate) probes: Arc<Semaphore>,
    pub(crate) last_access_ms: u64,
}

impl DomainState {
    pub(crate) fn new(cfg: &RateLimitConfig, now_ms: u64) -> Self {
        Self {
            rps: cfg.initial_rps,
            tokens: cfg.token_bucket_capacity,
            last_refill_ms: now_ms,
            window: SlidingWindow::new(cfg.stats_window, cfg.stats_bucket),
            consecutive_failures: 0,
            circuit: CircuitState::Closed,
            changed_at_ms: now_ms,
            probes: Arc::new(Semaphore::new(cfg.half_open_probes as usize)),
            last_access_ms: now_ms,
        }
    }

    /// Lazily refill the bucket from the wall-clock delta.
    fn refill(&mut self, cfg: &RateLimitConfig, now_ms: u64) {
        let elapsed_ms = now_ms.saturating_sub(self.last_refill_ms);
        if elapsed_ms > 0 {
            let refill = (elapsed_ms as f64 / 1000.0) * self.rps;
            self.tokens = (self.tokens + refill).min(cfg.token_bucket_capacity);
            self.last_refill_ms = now_ms;
        }
    }

    /// Take one token, or report how many milliseconds until one is due.
    pub(crate) fn try_take(&mut self, cfg: &RateLimitConfig, now_ms: u64) -> Result<(), u64> {
        self.refill(cfg, now_ms);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }
        let deficit = 1.0 - self.tokens;
        let wait_ms = ((deficit / self.rps) * 1000.0).ceil() as u64;
        Err(wait_ms.max(1))
    }

    pub(crate) fn trip_open(&mut self, now_ms: u64) {
        self.circuit = CircuitState::Open;
        self.changed_at_ms = now_ms;
    }

    pub(crate) fn to_half_open(&mut self, cfg: &RateLimitConfig, now_ms: u64) {
        self.circuit = CircuitState::HalfOpen;
        self.changed_at_ms = now_ms;
        self.probes = Arc::new(Semaphore::new(cfg.half_open_probes as usize));
    }

    fn to_closed(&mut self, now_ms: u64) {
        self.circuit = CircuitState::Closed;
        self.changed_at_ms = now_ms;
        self.consecutive_failures = 0;
    }

    /// Apply one observation: record it in the window, adjust rps by AIMD,
    /// and drive the circuit.
    pub(crate) fn apply_feedback(
        &mut self,
        cfg: &RateLimitConfig,
        feedback: &Feedback,
        now_ms: u64,
    ) {
        let observation = classify(cfg, feedback);
        self.window
            .record(now_ms, observation == Observation::Error);

        match observation {
            Observation::Healthy => {
                self.rps = (self.rps + cfg.aimd_increase).min(cfg.max_rps);
                self.consecutive_failures = 0;
                if self.circuit == CircuitState::HalfOpen {
                    self.to_closed(now_ms);
                }
            }
            Observation::Degraded => {
                self.rps = (self.rps * (1.0 - cfg.aimd_decrease)).max(cfg.min_rps);
            }
            Observation::Error => {
                self.rps = (self.rps * (1.0 - cfg.aimd_decrease)).max(cfg.min_rps);
                self.consecutive_failures += 1;
                match self.circuit {
                    CircuitState::Closed => {
                        if self.should_trip(cfg, now_ms) {
                            self.trip_open(now_ms);
                        }
                    }
                    CircuitState::HalfOpen => self.trip_open(now_ms),
                    CircuitState::Open => {}
                }
            }
            Observation::Neutral => {}
        }
    }

    fn should_trip(&self, cfg: &RateLimitConfig, now_ms: u64) -> bool {
        if self.consecutive_failures >= cfg.consecutive_fail_threshold {
            return true;
        }
        let (total, errors) = self.window.totals(now_ms);
        total >= cfg.min_samples_to_trip
            && (errors as f64 / total as f64) >= cfg.error_rate_threshold
    }

    pub(crate) fn error_rate(&self, now_ms: u64) -> f64 {
        self.window.error_rate(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cfg() -> RateLimitConfig {
        RateLimitConfig {
            initial_rps: 2.0,
            min_rps: 0.5,
            max_rps: 8.0,
            token_bucket_capacity: 2.0,
            aimd_increase: 1.0,
            aimd_decrease: 0.5,
            latency_target: Duration::from_millis(100),
            latency_degrade_factor: 2.0,
            min_samples_to_trip: 3,
            consecutive_fail_threshold: 2,
            ..RateLimitConfig::default()
        }
    }

    fn healthy() -> Feedback {
        Feedback::ok(200, Duration::from_millis(50))
    }

    fn server_error() -> Feedback {
        Feedback::ok(503, Duration::from_millis(50))
    }

    #[test]
    fn bucket_starts_full_and_drains() {
        let cfg = cfg();
        let mut state = DomainState::new(&cfg, 1_000);
        assert!(state.try_take(&cfg, 1_000).is_ok());
        assert!(state.try_take(&cfg, 1_000).is_ok());
        let wait = state.try_take(&cfg, 1_000).unwrap_err();
        // One token at 2 rps is 500ms away.
        assert_eq!(wait, 500);
    }

    #[test]
    fn refill_tracks_elapsed_time() {
        let cfg = cfg();
        let mut state = DomainState::new(&cfg, 1_000);
        state.tokens = 0.0;
        assert!(state.try_take(&cfg, 1_000).is_err());
        // 500ms at 2 rps refills exactly one token.
        assert!(state.try_take(&cfg, 1_500).is_ok());
    }

    #[test]
    fn healthy_feedback_raises_rps_additively() {
        let cfg = cfg();
        let mut state = DomainState::new(&cfg, 1_000);
        state.apply_feedback(&cfg, &healthy(), 1_000);
        assert!((state.rps - 3.0).abs() < 1e-9);
        // Capped at max_rps.
        for _ in 0..10 {
            state.apply_feedback(&cfg, &healthy(), 1_000);
        }
        assert!((state.rps - cfg.max_rps).abs() < 1e-9);
    }

    #[test]
    fn degraded_latency_halves_rps() {
        let cfg = cfg();
        let mut state = DomainState::new(&cfg, 1_000);
        let slow = Feedback::ok(200, Duration::from_millis(500));
        state.apply_feedback(&cfg, &slow, 1_000);
        assert!((state.rps - 1.0).abs() < 1e-9);
        assert_eq!(state.circuit, CircuitState::Closed);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn latency_between_target_and_degrade_threshold_is_neutral() {
        let cfg = cfg();
        let mut state = DomainState::new(&cfg, 1_000);
        let middling = Feedback::ok(200, Duration::from_millis(150));
        state.apply_feedback(&cfg, &middling, 1_000);
        assert!((state.rps - 2.0).abs() < 1e-9);
    }

    #[test]
    fn consecutive_failures_trip_the_circuit() {
        let cfg = cfg();
        let mut state = DomainState::new(&cfg, 1_000);
        state.apply_feedback(&cfg, &server_error(), 1_000);
        assert_eq!(state.circuit, CircuitState::Closed);
        state.apply_feedback(&cfg, &server_error(), 1_100);
        assert_eq!(state.circuit, CircuitState::Open);
    }

    #[test]
    fn windowed_error_rate_trips_with_enough_samples() {
        let cfg = RateLimitConfig {
            consecutive_fail_threshold: 100, // keep the consecutive path out
            error_rate_threshold: 0.5,
            ..cfg()
        };
        let mut state = DomainState::new(&cfg, 1_000);
        state.apply_feedback(&cfg, &healthy(), 1_000);
        state.apply_feedback(&cfg, &server_error(), 1_010);
        // Two samples: below min_samples_to_trip, still closed.
        assert_eq!(state.circuit, CircuitState::Closed);
        state.apply_feedback(&cfg, &server_error(), 1_020);
        // Three samples, error rate 2/3 >= 0.5.
        assert_eq!(state.circuit, CircuitState::Open);
    }

    #[test]
    fn healthy_resets_consecutive_failures() {
        let cfg = cfg();
        let mut state = DomainState::new(&cfg, 1_000);
        state.apply_feedback(&cfg, &server_error(), 1_000);
        assert_eq!(state.consecutive_failures, 1);
        state.apply_feedback(&cfg, &healthy(), 1_100);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn half_open_closes_on_health_and_reopens_on_error() {
        let cfg = cfg();
        let mut state = DomainState::new(&cfg, 1_000);
        state.trip_open(1_000);
        state.to_half_open(&cfg, 2_000);
        assert_eq!(state.circuit, CircuitState::HalfOpen);

        state.apply_feedback(&cfg, &server_error(), 2_100);
        assert_eq!(state.circuit, CircuitState::Open);
        assert_eq!(state.changed_at_ms, 2_100);

        state.to_half_open(&cfg, 3_000);
        state.apply_feedback(&cfg, &healthy(), 3_100);
        assert_eq!(state.circuit, CircuitState::Closed);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn transport_error_classifies_as_error() {
        let cfg = cfg();
        let mut state = DomainState::new(&cfg, 1_000);
        let fb = Feedback::error(Duration::from_millis(10), "connection refused");
        state.apply_feedback(&cfg, &fb, 1_000);
        assert_eq!(state.consecutive_failures, 1);
        assert!((state.rps - 1.0).abs() < 1e-9);
    }
}
