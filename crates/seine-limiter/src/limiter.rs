//! Sharded adaptive rate limiter.
//!
//! Domains hash to one of `shards` partitions, each an independently locked
//! map of [`DomainState`]. Acquire runs the circuit and token-bucket logic
//! under the shard lock and sleeps outside it; feedback is applied under the
//! same lock, so per-domain transitions are serialized.

use crate::clock::{Clock, RealClock};
use crate::config::RateLimitConfig;
use crate::domain::{CircuitState, DomainState};
use async_trait::async_trait;
use parking_lot::Mutex;
use seine_types::errors::Result;
use seine_types::{CrawlError, Feedback, Permit, RateLimit};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Adaptive per-domain rate limiter.
///
/// See the crate docs for the adaptation model. Construct with [`new`],
/// wrap in `Arc`, then call [`start_reaper`] to begin evicting idle domain
/// states.
///
/// [`new`]: AdaptiveRateLimiter::new
/// [`start_reaper`]: AdaptiveRateLimiter::start_reaper
pub struct AdaptiveRateLimiter {
    cfg: RateLimitConfig,
    shards: Vec<Mutex<HashMap<String, DomainState>>>,
    clock: Arc<dyn Clock>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

/// Observable state for one domain, for logs and tests.
#[derive(Debug, Clone)]
pub struct DomainStats {
    pub rps: f64,
    pub available_tokens: f64,
    pub circuit: CircuitState,
    pub error_rate: f64,
    pub consecutive_failures: u32,
}

impl AdaptiveRateLimiter {
    /// Create a limiter with the real system clock.
    pub fn new(cfg: RateLimitConfig) -> Arc<Self> {
        Self::with_clock(cfg, Arc::new(RealClock))
    }

    /// Create a limiter with an injected clock. Used by tests to drive the
    /// window and cooldown arithmetic deterministically.
    pub fn with_clock(cfg: RateLimitConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        let cfg = cfg.validate();
        let shards = (0..cfg.shards)
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Arc::new(Self {
            cfg,
            shards,
            clock,
            reaper: Mutex::new(None),
        })
    }

    /// Start the background task that evicts domain states idle longer than
    /// `domain_state_ttl`. Call once after wrapping in `Arc`.
    pub fn start_reaper(self: &Arc<Self>) {
        if !self.cfg.enabled {
            return;
        }
        let limiter = Arc::clone(self);
        let period = self.cfg.domain_state_ttl.min(Duration::from_secs(60));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period.max(Duration::from_millis(100)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let evicted = limiter.evict_stale(limiter.clock.now_ms());
                if evicted > 0 {
                    debug!(evicted, "Reaped idle domain states");
                }
            }
        });
        *self.reaper.lock() = Some(handle);
    }

    /// Stop the reaper. Idempotent; outstanding permits stay valid.
    pub fn shutdown(&self) {
        if let Some(handle) = self.reaper.lock().take() {
            handle.abort();
        }
    }

    /// Evict states whose last access is older than the TTL. Returns how
    /// many were removed.
    pub fn evict_stale(&self, now_ms: u64) -> usize {
        let ttl_ms = self.cfg.domain_state_ttl.as_millis() as u64;
        let mut evicted = 0;
        for shard in &self.shards {
            let mut map = shard.lock();
            let before = map.len();
            map.retain(|_, state| now_ms.saturating_sub(state.last_access_ms) < ttl_ms);
            evicted += before - map.len();
        }
        evicted
    }

    /// Snapshot of one domain's state, if tracked.
    pub fn domain_stats(&self, domain: &str) -> Option<DomainStats> {
        let now = self.clock.now_ms();
        let shard = self.shard_for(domain).lock();
        shard.get(domain).map(|state| DomainStats {
            rps: state.rps,
            available_tokens: state.tokens,
            circuit: state.circuit,
            error_rate: state.error_rate(now),
            consecutive_failures: state.consecutive_failures,
        })
    }

    /// Number of domains currently tracked across all shards.
    pub fn tracked_domains(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    fn shard_for(&self, domain: &str) -> &Mutex<HashMap<String, DomainState>> {
        let mut hasher = DefaultHasher::new();
        domain.hash(&mut hasher);
        let idx = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    async fn acquire_inner(&self, domain: &str) -> Result<Permit> {
        let open_ms = self.cfg.open_state_duration.as_millis() as u64;
        loop {
            let wait_ms = {
                let mut shard = self.shard_for(domain).lock();
                let now = self.clock.now_ms();
                let state = shard
                    .entry(domain.to_string())
                    .or_insert_with(|| DomainState::new(&self.cfg, now));
                state.last_access_ms = now;

                if state.circuit == CircuitState::Open {
                    if now.saturating_sub(state.changed_at_ms) >= open_ms {
                        state.to_half_open(&self.cfg, now);
                        info!(domain, "Circuit half-open, probing recovery");
                    } else {
                        return Err(CrawlError::circuit_open(domain));
                    }
                }

                if state.circuit == CircuitState::HalfOpen {
                    return match state.probes.clone().try_acquire_owned() {
                        Ok(slot) => {
                            // Probes bypass the token wait; their volume is
                            // already bounded by the probe budget.
                            if state.tokens >= 1.0 {
                                state.tokens -= 1.0;
                            }
                            Ok(Permit::with_probe(slot))
                        }
                        Err(_) => Err(CrawlError::circuit_open(domain)),
                    };
                }

                match state.try_take(&self.cfg, now) {
                    Ok(()) => return Ok(Permit::unrestricted()),
                    Err(wait) => wait,
                }
            };
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }
    }
}

#[async_trait]
impl RateLimit for AdaptiveRateLimiter {
    async fn acquire(&self, domain: &str) -> Result<Permit> {
        if !self.cfg.enabled {
            return Ok(Permit::unrestricted());
        }
        self.acquire_inner(domain).await
    }

    fn feedback(&self, domain: &str, feedback: Feedback) {
        if !self.cfg.enabled {
            return;
        }
        let mut shard = self.shard_for(domain).lock();
        let now = self.clock.now_ms();
        let state = shard
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(&self.cfg, now));
        state.last_access_ms = now;

        let before = state.circuit;
        state.apply_feedback(&self.cfg, &feedback, now);
        if before != state.circuit {
            match state.circuit {
                CircuitState::Open => warn!(
                    domain,
                    error_rate = state.error_rate(now),
                    consecutive = state.consecutive_failures,
                    "Circuit opened"
                ),
                CircuitState::Closed => info!(domain, "Circuit closed"),
                CircuitState::HalfOpen => {}
            }
        }
    }
}
