//! Clock abstraction for testability.

/// Source of wall-clock milliseconds for bucket refill, window bucketing,
/// and circuit cooldowns.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Real system clock implementation.
#[derive(Default, Debug)]
pub struct RealClock;

impl Clock for RealClock {
    fn now_ms(&self) -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|e| {
                tracing::error!("System time is before Unix epoch: {}", e);
                std::time::Duration::from_secs(0)
            });
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }
}
