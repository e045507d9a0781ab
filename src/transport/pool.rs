// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP connection pool.
//!
//! Thin wrapper over a [`reqwest::Client`], which owns the actual socket
//! pool. This layer makes the tunables explicit, keeps running latency
//! statistics, and supports live config swaps: a rebuild replaces the
//! inner client for new requests while in-flight requests finish on the
//! old one.

use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Connection pool tunables.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PoolConfig {
    /// Upper bound on concurrent connections the client will open.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Idle connections kept per host.
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,
    /// TCP connect timeout.
    #[serde(default = "default_connect_timeout", with = "secs")]
    pub connect_timeout: Duration,
    /// Idle connections are dropped after this long.
    #[serde(default = "default_idle_timeout", with = "secs")]
    pub idle_timeout: Duration,
    /// TCP keep-alive probe interval.
    #[serde(default = "default_keep_alive", with = "secs")]
    pub keep_alive: Duration,
}

fn default_max_connections() -> usize {
    100
}
fn default_max_idle() -> usize {
    10
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_idle_timeout() -> Duration {
    Duration::from_secs(90)
}
fn default_keep_alive() -> Duration {
    Duration::from_secs(30)
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

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_idle: default_max_idle(),
            connect_timeout: default_connect_timeout(),
            idle_timeout: default_idle_timeout(),
            keep_alive: default_keep_alive(),
        }
    }
}

/// Pool statistics, copied out under the lock.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub total_requests: u64,
    pub failed_requests: u64,
    /// Running latency estimate. First sample is taken as-is, every later
    /// sample folds in as `(avg + sample) / 2`, an intentional O(1)
    /// EMA-like approximation, not an arithmetic mean.
    pub average_latency: Duration,
    pub last_request_at: Option<Instant>,
}

/// Reusable HTTP transport with stats.
pub struct ConnectionPool {
    client: RwLock<reqwest::Client>,
    config: RwLock<PoolConfig>,
    request_timeout: Duration,
    stats: Mutex<PoolStats>,
}

impl ConnectionPool {
    /// Build a pool. `request_timeout` is the end-to-end deadline applied
    /// to every request sent through the pool.
    pub fn new(config: PoolConfig, request_timeout: Duration) -> Result<Self> {
        let client = build_client(&config, request_timeout)?;
        Ok(Self {
            client: RwLock::new(client),
            config: RwLock::new(config),
            request_timeout,
            stats: Mutex::new(PoolStats::default()),
        })
    }

    /// Current inner client. Cheap to clone; clones share the socket pool.
    #[must_use]
    pub fn client(&self) -> reqwest::Client {
        self.client.read().clone()
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> PoolConfig {
        *self.config.read()
    }

    /// Execute a request, recording latency and failure statistics.
    pub async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let client = self.client();
        let start = Instant::now();
        let result = client.execute(request).await;
        let latency = start.elapsed();

        let mut stats = self.stats.lock();
        stats.total_requests += 1;
        stats.last_request_at = Some(Instant::now());
        stats.average_latency = if stats.average_latency.is_zero() {
            latency
        } else {
            (stats.average_latency + latency) / 2
        };
        if result.is_err() {
            stats.failed_requests += 1;
        }
        drop(stats);

        result.map_err(Error::from)
    }

    /// Snapshot of pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.stats.lock().clone()
    }

    /// Rebuild the transport with a new configuration. In-flight requests
    /// keep their client; subsequent requests use the new one.
    pub fn update_config(&self, config: PoolConfig) -> Result<()> {
        let client = build_client(&config, self.request_timeout)?;
        *self.client.write() = client;
        *self.config.write() = config;
        debug!("connection pool rebuilt with new configuration");
        Ok(())
    }

    /// GET the given URL and report 2xx as healthy.
    pub async fn health_check(&self, url: &str) -> Result<bool> {
        let parsed = url::Url::parse(url)
            .map_err(|e| Error::Config(format!("invalid health check url: {e}")))?;
        let request = reqwest::Request::new(reqwest::Method::GET, parsed);
        let response = self.execute(request).await?;
        Ok(response.status().is_success())
    }

    /// Drop idle connections. Idempotent; the OS closes sockets once the
    /// last client clone goes away.
    pub fn close(&self) {
        *self.client.write() = reqwest::Client::new();
    }
}

fn build_client(config: &PoolConfig, request_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(config.max_idle.min(config.max_connections))
        .pool_idle_timeout(config.idle_timeout)
        .connect_timeout(config.connect_timeout)
        .tcp_keepalive(config.keep_alive)
        .timeout(request_timeout)
        .build()
        .map_err(|e| Error::Config(format!("failed to build http client: {e}")))
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &*self.config.read())
            .finish_non_exhaustive()
    }
}
