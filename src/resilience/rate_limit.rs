// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Token bucket admission control.
//!
//! Classical token bucket: a real-valued counter refilled at `rate`
//! tokens per second up to `burst`. [`TokenBucket::allow`] answers
//! immediately; [`TokenBucket::wait`] sleeps out the deficit and re-checks.
//! One bucket guards one client; the open platform enforces its own
//! per-tenant quota on top.
//!
//! # Example
//!
//! ```
//! use gridsql::resilience::rate_limit::{RateLimitConfig, TokenBucket};
//!
//! let bucket = TokenBucket::new(RateLimitConfig { rate: 10.0, burst: 2 });
//! assert!(bucket.allow());
//! assert!(bucket.allow());
//! assert!(!bucket.allow()); // burst exhausted
//! ```

use std::time::Instant;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::time::{sleep, Duration};

use crate::error::{Error, Result};

/// Token bucket tuning.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitConfig {
    /// Tokens replenished per second.
    #[serde(default = "default_rate")]
    pub rate: f64,
    /// Bucket capacity; bounds the largest instantaneous burst.
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_rate() -> f64 {
    50.0
}
fn default_burst() -> u32 {
    100
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            burst: default_burst(),
        }
    }
}

/// Admission statistics, copied out under the lock.
#[derive(Debug, Clone, Default)]
pub struct RateLimitStats {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub rejected_requests: u64,
    pub last_request_at: Option<Instant>,
}

#[derive(Debug)]
struct BucketState {
    config: RateLimitConfig,
    tokens: f64,
    last_refill: Instant,
    stats: RateLimitStats,
}

impl BucketState {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        self.tokens = (self.tokens + self.config.rate * elapsed.as_secs_f64())
            .min(f64::from(self.config.burst));
        self.last_refill = now;
    }

    fn try_take(&mut self, n: u32, now: Instant) -> bool {
        self.stats.total_requests += 1;
        self.stats.last_request_at = Some(now);
        self.refill(now);
        if self.tokens >= f64::from(n) {
            self.tokens -= f64::from(n);
            self.stats.allowed_requests += 1;
            true
        } else {
            self.stats.rejected_requests += 1;
            false
        }
    }

    /// Time until `n` tokens will be available at the current rate.
    fn deficit_delay(&mut self, n: u32, now: Instant) -> Duration {
        self.refill(now);
        let needed = f64::from(n) - self.tokens;
        if needed <= 0.0 || self.config.rate <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(needed / self.config.rate)
    }
}

/// Token bucket rate limiter.
///
/// A single mutex guards the counter; every operation is O(1) and never
/// held across an await point.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket that starts full.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: f64::from(config.burst),
                last_refill: Instant::now(),
                stats: RateLimitStats::default(),
                config,
            }),
        }
    }

    /// Admit one request if a token is available.
    #[must_use]
    pub fn allow(&self) -> bool {
        self.allow_n(1)
    }

    /// Admit `n` requests if enough tokens are available.
    #[must_use]
    pub fn allow_n(&self, n: u32) -> bool {
        if n == 0 {
            return true;
        }
        self.state.lock().try_take(n, Instant::now())
    }

    /// Wait until one token is available.
    pub async fn wait(&self) -> Result<()> {
        self.wait_n(1).await
    }

    /// Wait until `n` tokens are available.
    ///
    /// Sleeps out the deficit-derived delay and re-checks in a loop. The
    /// sleep is a plain tokio timer, so dropping the future cancels the
    /// wait with no side effects.
    pub async fn wait_n(&self, n: u32) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        if f64::from(n) > f64::from(self.state.lock().config.burst) {
            return Err(Error::RateLimited(format!(
                "requested {n} tokens exceeds burst capacity"
            )));
        }
        loop {
            if self.allow_n(n) {
                return Ok(());
            }
            let delay = self.state.lock().deficit_delay(n, Instant::now());
            sleep(delay.max(Duration::from_millis(1))).await;
        }
    }

    /// Current token count (refilled to now). Test and stats use.
    #[must_use]
    pub fn tokens(&self) -> f64 {
        let mut state = self.state.lock();
        state.refill(Instant::now());
        state.tokens
    }

    /// Snapshot of admission statistics.
    #[must_use]
    pub fn stats(&self) -> RateLimitStats {
        self.state.lock().stats.clone()
    }

    /// Refill the bucket and clear statistics.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tokens = f64::from(state.config.burst);
        state.last_refill = Instant::now();
        state.stats = RateLimitStats::default();
    }

    /// Swap in a new configuration. Current tokens are preserved but
    /// clamped to the new burst.
    pub fn update_config(&self, config: RateLimitConfig) {
        let mut state = self.state.lock();
        state.config = config;
        state.tokens = state.tokens.min(f64::from(config.burst));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(rate: f64, burst: u32) -> TokenBucket {
        TokenBucket::new(RateLimitConfig { rate, burst })
    }

    #[test]
    fn test_burst_admits_then_rejects() {
        let tb = bucket(1.0, 3);
        assert!(tb.allow());
        assert!(tb.allow());
        assert!(tb.allow());
        assert!(!tb.allow());
    }

    #[test]
    fn test_tokens_never_exceed_burst() {
        let tb = bucket(1000.0, 5);
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(tb.tokens() <= 5.0);
    }

    #[test]
    fn test_tokens_never_negative() {
        let tb = bucket(1.0, 2);
        for _ in 0..10 {
            let _ = tb.allow();
            assert!(tb.tokens() >= 0.0);
        }
    }

    #[test]
    fn test_allow_n_respects_count() {
        let tb = bucket(1.0, 10);
        assert!(tb.allow_n(10));
        assert!(!tb.allow_n(1));
        assert!(tb.allow_n(0));
    }

    #[test]
    fn test_refill_restores_tokens() {
        let tb = bucket(1000.0, 10);
        assert!(tb.allow_n(10));
        assert!(!tb.allow());
        std::thread::sleep(std::time::Duration::from_millis(15));
        assert!(tb.allow());
    }

    #[test]
    fn test_stats_track_outcomes() {
        let tb = bucket(1.0, 1);
        assert!(tb.allow());
        assert!(!tb.allow());

        let stats = tb.stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.allowed_requests, 1);
        assert_eq!(stats.rejected_requests, 1);
        assert!(stats.last_request_at.is_some());
    }

    #[test]
    fn test_update_config_clamps_tokens() {
        let tb = bucket(1.0, 100);
        tb.update_config(RateLimitConfig { rate: 1.0, burst: 5 });
        assert!(tb.tokens() <= 5.0);
    }

    #[test]
    fn test_reset_refills_and_clears() {
        let tb = bucket(0.001, 2);
        assert!(tb.allow_n(2));
        tb.reset();
        assert!(tb.allow_n(2));
        // reset cleared the earlier samples, so only the post-reset take
        // is counted
        assert_eq!(tb.stats().total_requests, 1);
    }

    #[tokio::test]
    async fn test_wait_blocks_until_refill() {
        let tb = bucket(100.0, 1);
        assert!(tb.allow());
        let start = std::time::Instant::now();
        tb.wait().await.unwrap();
        // one token at 100/s arrives in ~10ms
        assert!(start.elapsed() >= std::time::Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_wait_rejects_impossible_request() {
        let tb = bucket(10.0, 5);
        let err = tb.wait_n(6).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::RateLimit);
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_available() {
        let tb = bucket(10.0, 5);
        let start = std::time::Instant::now();
        tb.wait_n(3).await.unwrap();
        assert!(start.elapsed() < std::time::Duration::from_millis(50));
    }
}
