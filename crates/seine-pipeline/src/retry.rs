//! Retry backoff arithmetic.

use crate::config::PipelineConfig;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff before jitter: `min(base * 2^attempt, max)`.
pub(crate) fn exponential_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

/// The actual sleep: the exponential delay scaled by a uniform factor in
/// `[0, 1)`, so concurrent retries against one domain spread out.
pub(crate) fn backoff_delay(config: &PipelineConfig, attempt: u32) -> Duration {
    let delay = exponential_delay(config.retry_base_delay, config.retry_max_delay, attempt);
    delay.mul_f64(rand::thread_rng().gen_range(0.0..1.0))
}

/// Whether another attempt fits inside the retry budget.
pub(crate) fn budget_remains(config: &PipelineConfig, attempt: u32) -> bool {
    config.retry_max_attempts > 0 && attempt + 1 < config.retry_max_attempts
}
