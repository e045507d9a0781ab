// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry with exponential backoff.
//!
//! Retriability is a pure function of the error ([`Error::is_retryable`]):
//! network failures, 5xx and 429 retry; auth, permission, other 4xx,
//! parse/security rejections and an open circuit do not. The backoff sleep
//! is a plain tokio timer, so dropping the future cancels the loop between
//! attempts.
//!
//! # Example
//!
//! ```
//! use gridsql::resilience::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.max_attempts, 3);
//! assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
//! assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
//! ```

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::Result;

/// Exponential backoff policy.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. 1 disables retrying.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry is `base_delay * multiplier`.
    #[serde(default = "default_base_delay", with = "millis")]
    pub base_delay: Duration,
    /// Delays are capped here.
    #[serde(default = "default_max_delay", with = "millis")]
    pub max_delay: Duration,
    /// Geometric growth factor.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}
fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}
fn default_multiplier() -> f64 {
    2.0
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Minimal delays for tests.
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(8),
            multiplier: 2.0,
        }
    }

    /// Backoff before retry `attempt` (1-based):
    /// `min(base × multiplier^attempt, max)`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.base_delay.min(self.max_delay);
        }
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let delay = self.base_delay.mul_f64(factor.max(0.0));
        delay.min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, the error is non-retryable, or
/// `max_attempts` is exhausted. Returns the last error on exhaustion.
pub async fn retry<F, Fut, T>(operation_name: &str, policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt, "operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt >= max_attempts || !err.is_retryable() {
                    return Err(err);
                }
                let delay = policy.backoff_delay(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %crate::security::mask_secrets(&err.to_string()),
                    "operation failed, retrying"
                );
                crate::metrics::record_retry(operation_name);
                sleep(delay).await;
            }
        }
    }
}
