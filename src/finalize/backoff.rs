// Exponential backoff with a cap. Pure computation; the coordinator owns the
// actual sleeping.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry tuning for the finalization coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Adds up to 25% random extra delay so concurrent finalizers don't
    /// collide on the same retry schedule.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            jitter: false,
        }
    }
}

/// Delay before the retry that follows attempt `attempt` (1-based):
/// `min(initial_delay * 2^(attempt-1), max_delay)`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let uncapped = config
        .initial_delay
        .saturating_mul(2u32.saturating_pow(exponent));
    let capped = uncapped.min(config.max_delay);
    if config.jitter {
        capped + jitter_for(capped)
    } else {
        capped
    }
}

fn jitter_for(delay: Duration) -> Duration {
    use rand::Rng;
    let quarter_ms = delay.as_millis() as u64 / 4;
    if quarter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=quarter_ms))
}
