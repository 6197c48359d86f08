use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }

    /// Whether another attempt is allowed after `attempt` attempts have failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    ///
    /// `base * 2^(attempt-1)` capped at `max_delay`, plus up to `max_jitter`.
    /// A server-provided `floor` (e.g. a rate-limit reset) raises the delay,
    /// still capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, floor: Option<Duration>) -> Duration {
        let exp = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let mut delay = self.base_delay.saturating_mul(exp).min(self.max_delay);

        if let Some(floor) = floor {
            delay = delay.max(floor.min(self.max_delay));
        }

        delay + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(0..=max_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
