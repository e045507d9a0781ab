// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Circuit breaker for the API request path.
//!
//! Three states:
//! - Closed: normal operation, requests pass through
//! - Open: downstream unhealthy, requests fail fast without attempting
//! - HalfOpen: probing whether the downstream recovered
//!
//! Transitions: `max_failures` consecutive failures in Closed trip the
//! breaker; after `open_timeout` a bounded number of probes is admitted;
//! `max_probe` consecutive probe successes close the breaker and any probe
//! failure reopens it. Success in Closed resets the failure counter.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed = 0,
    HalfOpen = 1,
    Open = 2,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::HalfOpen => write!(f, "half_open"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failures in Closed that trip the breaker.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    /// How long the breaker stays Open before admitting probes.
    #[serde(default = "default_open_timeout", with = "secs")]
    pub open_timeout: Duration,
    /// Consecutive probe successes required to close from HalfOpen.
    #[serde(default = "default_max_probe")]
    pub max_probe: u32,
    /// Statistics window. Reserved: outcome accounting currently resets
    /// per success, not on an interval.
    #[serde(default = "default_interval", with = "secs")]
    pub interval: Duration,
}

fn default_max_failures() -> u32 {
    5
}
fn default_open_timeout() -> Duration {
    Duration::from_secs(60)
}
fn default_max_probe() -> u32 {
    3
}
fn default_interval() -> Duration {
    Duration::from_secs(60)
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            open_timeout: default_open_timeout(),
            max_probe: default_max_probe(),
            interval: default_interval(),
        }
    }
}

impl CircuitConfig {
    /// Fast trip and fast recovery for tests.
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_failures: 2,
            open_timeout: Duration::from_millis(50),
            max_probe: 1,
            interval: Duration::from_secs(60),
        }
    }
}

/// Snapshot of breaker counters.
#[derive(Debug, Clone)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub failures: u32,
    pub probe_requests: u32,
    pub last_failure_at: Option<Instant>,
}

/// Observer invoked on every state change, on a detached task.
pub type StateChangeCallback = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    probe_requests: u32,
    last_failure_at: Option<Instant>,
}

/// Circuit breaker guarding one downstream.
pub struct CircuitBreaker {
    config: CircuitConfig,
    state: Mutex<BreakerState>,
    on_state_change: Mutex<Option<StateChangeCallback>>,
}

impl CircuitBreaker {
    /// Create a breaker in the Closed state.
    #[must_use]
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                probe_requests: 0,
                last_failure_at: None,
            }),
            on_state_change: Mutex::new(None),
        }
    }

    /// Register a state-change observer.
    ///
    /// The observer runs on its own tokio task per transition; a panic
    /// inside it is caught and logged and never reaches the request path.
    pub fn set_state_change_callback(&self, callback: StateChangeCallback) {
        *self.on_state_change.lock() = Some(callback);
    }

    /// Execute an operation through the breaker.
    ///
    /// Returns [`Error::CircuitOpen`] without invoking the operation when
    /// the breaker is Open and `open_timeout` has not elapsed.
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.admit() {
            crate::metrics::record_circuit_call("rejected");
            warn!("circuit open, request rejected");
            return Err(Error::CircuitOpen);
        }

        match op().await {
            Ok(value) => {
                crate::metrics::record_circuit_call("success");
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                crate::metrics::record_circuit_call("failure");
                self.record_failure();
                Err(err)
            }
        }
    }

    /// Current state, promoting Open to HalfOpen if the timeout elapsed.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Snapshot of counters.
    #[must_use]
    pub fn stats(&self) -> CircuitStats {
        let state = self.state.lock();
        CircuitStats {
            state: state.state,
            failures: state.failures,
            probe_requests: state.probe_requests,
            last_failure_at: state.last_failure_at,
        }
    }

    /// Force the breaker back to Closed and clear counters.
    pub fn reset(&self) {
        let transition = {
            let mut state = self.state.lock();
            let from = state.state;
            state.state = CircuitState::Closed;
            state.failures = 0;
            state.probe_requests = 0;
            state.last_failure_at = None;
            (from != CircuitState::Closed).then_some((from, CircuitState::Closed))
        };
        if let Some((from, to)) = transition {
            self.notify(from, to);
        }
    }

    fn admit(&self) -> bool {
        let now = Instant::now();
        let (admitted, transition) = {
            let mut state = self.state.lock();
            match state.state {
                CircuitState::Closed => (true, None),
                CircuitState::Open => {
                    let elapsed = state
                        .last_failure_at
                        .map(|at| now.saturating_duration_since(at))
                        .unwrap_or(Duration::MAX);
                    if elapsed > self.config.open_timeout {
                        state.state = CircuitState::HalfOpen;
                        state.probe_requests = 0;
                        (true, Some((CircuitState::Open, CircuitState::HalfOpen)))
                    } else {
                        (false, None)
                    }
                }
                CircuitState::HalfOpen => (state.probe_requests < self.config.max_probe, None),
            }
        };
        if let Some((from, to)) = transition {
            self.notify(from, to);
        }
        admitted
    }

    fn record_success(&self) {
        let transition = {
            let mut state = self.state.lock();
            match state.state {
                CircuitState::Closed => {
                    state.failures = 0;
                    None
                }
                CircuitState::HalfOpen => {
                    state.probe_requests += 1;
                    if state.probe_requests >= self.config.max_probe {
                        state.state = CircuitState::Closed;
                        state.failures = 0;
                        state.probe_requests = 0;
                        Some((CircuitState::HalfOpen, CircuitState::Closed))
                    } else {
                        None
                    }
                }
                CircuitState::Open => None,
            }
        };
        if let Some((from, to)) = transition {
            self.notify(from, to);
        }
    }

    fn record_failure(&self) {
        let now = Instant::now();
        let transition = {
            let mut state = self.state.lock();
            match state.state {
                CircuitState::Closed => {
                    state.failures += 1;
                    state.last_failure_at = Some(now);
                    if state.failures >= self.config.max_failures {
                        state.state = CircuitState::Open;
                        Some((CircuitState::Closed, CircuitState::Open))
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    state.probe_requests += 1;
                    state.state = CircuitState::Open;
                    state.last_failure_at = Some(now);
                    Some((CircuitState::HalfOpen, CircuitState::Open))
                }
                CircuitState::Open => {
                    state.last_failure_at = Some(now);
                    None
                }
            }
        };
        if let Some((from, to)) = transition {
            self.notify(from, to);
        }
    }

    fn notify(&self, from: CircuitState, to: CircuitState) {
        debug!(%from, %to, "circuit state change");
        crate::metrics::set_circuit_state(to as u8);
        let callback = self.on_state_change.lock().clone();
        if let Some(callback) = callback {
            // Detached task per change: a slow or panicking observer must
            // not block or poison the request path.
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if catch_unwind(AssertUnwindSafe(|| callback(from, to))).is_err() {
                        warn!(%from, %to, "circuit state-change callback panicked");
                    }
                });
            } else if catch_unwind(AssertUnwindSafe(|| callback(from, to))).is_err() {
                warn!(%from, %to, "circuit state-change callback panicked");
            }
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state.lock().state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn fail(cb: &CircuitBreaker) -> Result<()> {
        cb.call(|| async { Err::<(), _>(Error::Network("boom".into())) })
            .await
            .map(|_| ())
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<i32> {
        cb.call(|| async { Ok(42) }).await
    }

    #[tokio::test]
    async fn test_passes_successful_calls() {
        let cb = CircuitBreaker::new(CircuitConfig::test());
        assert_eq!(succeed(&cb).await.unwrap(), 42);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures() {
        let cb = CircuitBreaker::new(CircuitConfig {
            max_failures: 3,
            open_timeout: Duration::from_secs(60),
            ..CircuitConfig::test()
        });

        for _ in 0..3 {
            assert!(fail(&cb).await.is_err());
        }
        assert_eq!(cb.state(), CircuitState::Open);

        // Fast-fail without touching the operation.
        let touched = AtomicUsize::new(0);
        let result = cb
            .call(|| async {
                touched.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .await;
        assert!(matches!(result, Err(Error::CircuitOpen)));
        assert_eq!(touched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter_in_closed() {
        let cb = CircuitBreaker::new(CircuitConfig {
            max_failures: 2,
            open_timeout: Duration::from_secs(60),
            ..CircuitConfig::test()
        });

        assert!(fail(&cb).await.is_err());
        assert!(succeed(&cb).await.is_ok());
        assert!(fail(&cb).await.is_err());
        // Two failures total but never two consecutive: still closed.
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_half_open_recovery() {
        let cb = CircuitBreaker::new(CircuitConfig {
            max_failures: 1,
            open_timeout: Duration::from_millis(20),
            max_probe: 2,
            interval: Duration::from_secs(60),
        });

        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        // First probe admitted and succeeds; breaker still half-open.
        assert!(succeed(&cb).await.is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // Second consecutive success closes.
        assert!(succeed(&cb).await.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new(CircuitConfig {
            max_failures: 1,
            open_timeout: Duration::from_millis(20),
            max_probe: 2,
            interval: Duration::from_secs(60),
        });

        assert!(fail(&cb).await.is_err());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_half_open_bounds_probe_count() {
        let cb = CircuitBreaker::new(CircuitConfig {
            max_failures: 1,
            open_timeout: Duration::from_millis(10),
            max_probe: 1,
            interval: Duration::from_secs(60),
        });

        assert!(fail(&cb).await.is_err());
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Promote to half-open without recording an outcome, then verify
        // only max_probe probes are admitted.
        assert!(cb.admit());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.state.lock().probe_requests = 1;
        assert!(!cb.admit());
    }

    #[tokio::test]
    async fn test_callback_fires_and_panics_are_contained() {
        let cb = Arc::new(CircuitBreaker::new(CircuitConfig {
            max_failures: 1,
            open_timeout: Duration::from_secs(60),
            ..CircuitConfig::test()
        }));
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_clone = fired.clone();
        cb.set_state_change_callback(Arc::new(move |from, to| {
            assert_eq!(from, CircuitState::Closed);
            assert_eq!(to, CircuitState::Open);
            fired_clone.fetch_add(1, Ordering::SeqCst);
            panic!("observer bug");
        }));

        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.state(), CircuitState::Open);

        // Give the detached task a moment; the panic must not surface.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Breaker still usable after the callback panicked.
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(succeed(&cb).await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_clears_counters() {
        let cb = CircuitBreaker::new(CircuitConfig::test());
        assert!(fail(&cb).await.is_err());
        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.probe_requests, 0);
        assert!(stats.last_failure_at.is_none());
    }
}
