//! Configuration for the adapter client.
//!
//! # Example
//!
//! ```
//! use gridsql::{AuthMode, Config};
//!
//! let config = Config {
//!     app_id: "cli_a1b2c3d4e5f6g7h8".into(),
//!     app_secret: "0123456789abcdef0123456789abcdef".into(),
//!     app_token: "bascnXXXXXXXX".into(),
//!     ..Config::default()
//! };
//! assert!(config.validate().is_ok());
//! assert_eq!(config.auth_mode, AuthMode::Tenant);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::resilience::circuit_breaker::CircuitConfig;
use crate::resilience::rate_limit::RateLimitConfig;
use crate::resilience::retry::RetryPolicy;
use crate::transport::pool::PoolConfig;

/// How the client authenticates against the open platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// App credentials minted into a tenant access token.
    Tenant,
    /// Caller-supplied user access token.
    User,
}

/// Client configuration.
///
/// All fields have workable defaults; at minimum `app_id`, `app_secret`
/// and `app_token` must be set (plus `access_token` in user mode). The
/// crate itself never reads environment variables; callers load and
/// forward settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Feishu application id (issued with a `cli_` prefix).
    #[serde(default)]
    pub app_id: String,

    /// Feishu application secret.
    #[serde(default)]
    pub app_secret: String,

    /// API origin. The `/open-apis` prefix is appended per request.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Authentication mode.
    #[serde(default = "default_auth_mode")]
    pub auth_mode: AuthMode,

    /// User access token (required in [`AuthMode::User`]).
    #[serde(default)]
    pub access_token: String,

    /// Base (multi-dimensional table container) token.
    #[serde(default)]
    pub app_token: String,

    /// Per-request deadline, enforced by the HTTP client.
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// Retry behavior for API requests.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Token bucket admission control.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker thresholds.
    #[serde(default)]
    pub circuit: CircuitConfig,

    /// HTTP connection pool tunables.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Whether table/field descriptors are cached per client.
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    /// Descriptor cache entry lifetime.
    #[serde(default = "default_cache_ttl", with = "duration_secs")]
    pub cache_ttl: Duration,

    /// Record count per batch endpoint call (capped at 500 by the service).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// `user_id_type` forwarded on record queries, when set.
    #[serde(default)]
    pub user_id_type: Option<String>,

    /// Verbose request/response logging.
    #[serde(default)]
    pub debug: bool,
}

fn default_base_url() -> String {
    "https://open.feishu.cn".to_string()
}
fn default_auth_mode() -> AuthMode {
    AuthMode::Tenant
}
fn default_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_cache_enabled() -> bool {
    true
}
fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}
fn default_batch_size() -> usize {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: String::new(),
            base_url: default_base_url(),
            auth_mode: default_auth_mode(),
            access_token: String::new(),
            app_token: String::new(),
            timeout: default_timeout(),
            retry: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            circuit: CircuitConfig::default(),
            pool: PoolConfig::default(),
            cache_enabled: default_cache_enabled(),
            cache_ttl: default_cache_ttl(),
            batch_size: default_batch_size(),
            user_id_type: None,
            debug: false,
        }
    }
}

impl Config {
    /// Validate credentials and required fields.
    pub fn validate(&self) -> Result<()> {
        crate::security::validate_app_credentials(&self.app_id, &self.app_secret)?;
        if self.app_token.is_empty() {
            return Err(Error::Config("app_token is required".into()));
        }
        if self.auth_mode == AuthMode::User && self.access_token.is_empty() {
            return Err(Error::Config(
                "access_token is required in user auth mode".into(),
            ));
        }
        if self.batch_size == 0 || self.batch_size > crate::protocol::MAX_BATCH_RECORDS {
            return Err(Error::Config(format!(
                "batch_size must be between 1 and {}",
                crate::protocol::MAX_BATCH_RECORDS
            )));
        }
        Ok(())
    }
}

/// Serde helper: durations expressed as whole seconds in config sources.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
