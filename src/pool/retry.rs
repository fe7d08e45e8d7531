//! Retry policy for transport failures

use rand::Rng;
use std::time::Duration;

/// How often and how patiently failed sends are repeated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for a single delay
    pub max_backoff: Duration,
    /// Randomize each delay between half and the full value
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(2000),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Never retry
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Retry `max_retries` times without waiting
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let delay = self
            .initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff);

        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let half = delay / 2;
        let spread = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
        half + Duration::from_millis(spread)
    }
}
