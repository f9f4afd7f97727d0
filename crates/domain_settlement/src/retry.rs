//! Retry policy for transient failures

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default backoff between attempts in milliseconds
pub const DEFAULT_RETRY_DELAYS_MS: [u64; 3] = [200, 1_000, 5_000];

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Bounded retry with a configured backoff schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before retry n is `delays_ms[n - 1]`, the last entry repeating
    pub delays_ms: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delays_ms: DEFAULT_RETRY_DELAYS_MS.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delays_ms: Vec<u64>) -> Self {
        Self {
            max_retries,
            delays_ms,
        }
    }

    /// No waiting between attempts
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Vec::new())
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether another attempt is allowed after `attempts_made`
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts()
    }

    /// Delay before the retry following `attempts_made` attempts
    pub fn delay_after(&self, attempts_made: u32) -> Duration {
        if attempts_made == 0 || self.delays_ms.is_empty() {
            return Duration::ZERO;
        }
        let idx = (attempts_made as usize - 1).min(self.delays_ms.len() - 1);
        Duration::from_millis(self.delays_ms[idx])
    }
}
