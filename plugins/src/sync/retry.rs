use std::time::Duration;

use collector_core::config::RetryConfig;
use collector_core::error::SynchronizationError;

/// Decides whether and when a failed synchronization request is retried.
pub trait RetryPolicy: Send + Sync {
    fn name(&self) -> &str;

    /// Delay before the next attempt, given how many attempts were made so
    /// far. `None` gives up.
    fn next_delay(&self, attempts_made: u32, error: &SynchronizationError) -> Option<Duration>;

    fn max_attempts(&self) -> u32;
}

/// Retries retryable errors after a constant delay, up to a fixed number of
/// attempts in total.
#[derive(Debug, Clone)]
pub struct FixedDelayRetry {
    max_attempts: u32,
    delay: Duration,
}

impl FixedDelayRetry {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self::new(cfg.max_attempts, Duration::from_millis(cfg.delay_ms))
    }

    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl RetryPolicy for FixedDelayRetry {
    fn name(&self) -> &str {
        "fixed-delay"
    }

    fn next_delay(&self, attempts_made: u32, error: &SynchronizationError) -> Option<Duration> {
        if attempts_made >= self.max_attempts || !error.is_retryable() {
            return None;
        }
        Some(self.delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
