//! Retry policy for callback delivery: decides backoff delays.

use std::time::Duration;

use crate::config::CallbackConfig;

/// How often and how patiently a notification is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per notification, first attempt included.
    pub max_attempts: u32,

    /// Delay after the first failure.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CallbackConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CallbackConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay(),
            multiplier: config.multiplier,
        }
    }

    /// No waiting between attempts (tests, scenario runs).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before the next attempt, given the attempts already made (1-indexed).
    ///
    /// delay = base_delay * multiplier^(attempts - 1)
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
    }

    /// Another attempt is allowed after `attempts` failures.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
