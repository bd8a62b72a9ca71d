//! Retry and backoff policies
//!
//! Every retry loop in the relay (reconnecting a network, polling for
//! finality, re-sending the completion callback) takes one of these instead
//! of hard-coding its sleep and attempt count, so tests can run the loops on
//! tokio's paused clock.

use std::time::Duration;

/// Backoff policy for a retry loop
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
    /// Multiplier applied per attempt, 1.0 for a fixed delay
    pub backoff_multiplier: f64,
    /// Maximum number of attempts, `None` for unbounded
    pub max_attempts: Option<u32>,
}

impl BackoffPolicy {
    /// Same delay between every attempt
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_backoff: delay,
            max_backoff: delay,
            backoff_multiplier: 1.0,
            max_attempts: Some(max_attempts),
        }
    }

    /// Same delay between attempts, retried forever
    pub fn forever(delay: Duration) -> Self {
        Self {
            initial_backoff: delay,
            max_backoff: delay,
            backoff_multiplier: 1.0,
            max_attempts: None,
        }
    }

    /// Calculate backoff duration for a given attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn should_retry(&self, attempts: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts < max,
            None => true,
        }
    }
}
