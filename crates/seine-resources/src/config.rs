//! Resource manager configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the cache, admission, and checkpoint subsystems.
///
/// Zero values disable the associated feature: a zero `cache_capacity`
/// disables caching, a zero `max_in_flight` disables admission control, and
/// unset paths disable spillover and checkpointing.
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    /// Maximum pages held in memory before eviction.
    pub cache_capacity: usize,
    /// Global in-flight extraction budget.
    pub max_in_flight: usize,
    /// Directory evicted pages spill into.
    pub spill_dir: Option<PathBuf>,
    /// Append-only log of completed URLs.
    pub checkpoint_path: Option<PathBuf>,
    /// How often buffered checkpoint entries are flushed.
    pub checkpoint_interval: Duration,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 256,
            max_in_flight: 32,
            spill_dir: None,
            checkpoint_path: None,
            checkpoint_interval: Duration::from_secs(2),
        }
    }
}

impl ResourceConfig {
    /// Normalize out-of-range values.
    pub fn validate(mut self) -> Self {
        if self.checkpoint_interval.is_zero() {
            self.checkpoint_interval = Duration::from_millis(1);
        }
        self
    }
}
