//! # Seine Limiter
//!
//! Adaptive per-domain rate limiting for the Seine crawl engine.
//!
//! Each domain gets a token bucket whose refill rate is adjusted by AIMD
//! (additive increase on healthy responses, multiplicative decrease on
//! errors or degraded latency), a sliding-window error model, and a
//! three-state circuit breaker (Closed / Open / HalfOpen) that refuses
//! traffic to unhealthy domains for a cooldown period before probing
//! recovery.
//!
//! Domain states are sharded across independently locked maps; a background
//! reaper evicts states that have not been touched within the configured
//! TTL.

pub mod clock;
pub mod config;
pub mod domain;
pub mod limiter;
mod window;

pub use clock::{Clock, RealClock};
pub use config::RateLimitConfig;
pub use domain::CircuitState;
pub use limiter::{AdaptiveRateLimiter, DomainStats};
