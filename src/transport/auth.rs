// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Access token management.
//!
//! Tenant mode mints a `tenant_access_token` from the app credentials;
//! user mode adopts a caller-supplied token with an optimistic 24-hour
//! lifetime. Readers take a shared lock; a token inside the 5-minute
//! refresh window upgrades to the exclusive lock, re-checks, and
//! refreshes. At most one refresh is in flight per client, and every
//! reader sees either the old or the new token atomically.
//!
//! The refresh request goes straight through the pool: wrapping it in the
//! retry engine or the circuit breaker would double-count auth failures
//! against the request path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{AuthMode, Config};
use crate::error::{Error, Result};
use crate::security::mask_secrets;
use crate::transport::pool::ConnectionPool;

/// Tokens are refreshed once they are this close to expiry.
const REFRESH_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Lifetime assumed for caller-supplied user tokens.
const USER_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

const TENANT_TOKEN_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";

#[derive(Debug, Serialize)]
struct TenantTokenRequest<'a> {
    app_id: &'a str,
    app_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TenantTokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    expire: i64,
    #[serde(default)]
    tenant_access_token: String,
}

#[derive(Debug, Clone)]
struct TokenState {
    value: String,
    expires_at: Instant,
}

/// Fetches and refreshes access tokens for one client.
pub struct TokenManager {
    auth_mode: AuthMode,
    app_id: String,
    app_secret: String,
    user_token: String,
    base_url: String,
    pool: Arc<ConnectionPool>,
    state: RwLock<Option<TokenState>>,
}

impl TokenManager {
    #[must_use]
    pub fn new(config: &Config, pool: Arc<ConnectionPool>) -> Self {
        Self {
            auth_mode: config.auth_mode,
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            user_token: config.access_token.clone(),
            base_url: config.base_url.clone(),
            pool,
            state: RwLock::new(None),
        }
    }

    /// A valid bearer token, refreshing first when inside the window.
    pub async fn token(&self) -> Result<String> {
        {
            let state = self.state.read().await;
            if let Some(state) = state.as_ref() {
                if Instant::now() + REFRESH_WINDOW < state.expires_at {
                    return Ok(state.value.clone());
                }
            }
        }

        let mut state = self.state.write().await;
        // Double-check: another caller may have refreshed while this one
        // waited on the write lock.
        if let Some(current) = state.as_ref() {
            if Instant::now() + REFRESH_WINDOW < current.expires_at {
                return Ok(current.value.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let value = fresh.value.clone();
        *state = Some(fresh);
        Ok(value)
    }

    /// Force a refresh on the next [`token`](Self::token) call.
    pub async fn invalidate(&self) {
        *self.state.write().await = None;
    }

    /// Drop the cached token. Part of client close.
    pub async fn clear(&self) {
        *self.state.write().await = None;
    }

    async fn fetch_token(&self) -> Result<TokenState> {
        match self.auth_mode {
            AuthMode::User => {
                debug!("adopting user access token");
                Ok(TokenState {
                    value: self.user_token.clone(),
                    expires_at: Instant::now() + USER_TOKEN_LIFETIME,
                })
            }
            AuthMode::Tenant => self.fetch_tenant_token().await,
        }
    }

    async fn fetch_tenant_token(&self) -> Result<TokenState> {
        let url = url::Url::parse(&format!("{}{}", self.base_url, TENANT_TOKEN_PATH))
            .map_err(|e| Error::Config(format!("invalid base_url: {e}")))?;

        let body = serde_json::to_vec(&TenantTokenRequest {
            app_id: &self.app_id,
            app_secret: &self.app_secret,
        })
        .map_err(|e| Error::Config(format!("failed to encode token request: {e}")))?;

        let mut request = reqwest::Request::new(reqwest::Method::POST, url);
        request.headers_mut().insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        *request.body_mut() = Some(reqwest::Body::from(body));

        let response = self.pool.execute(request).await.map_err(|e| {
            crate::metrics::record_token_refresh("error");
            warn!(error = %mask_secrets(&e.to_string()), "tenant token request failed");
            e
        })?;

        let payload: TenantTokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("failed to read token response: {e}")))?;

        if payload.code != 0 {
            crate::metrics::record_token_refresh("rejected");
            warn!(
                code = payload.code,
                msg = %mask_secrets(&payload.msg),
                "tenant token rejected"
            );
            return Err(Error::Auth(format!(
                "token request failed with code {}: {}",
                payload.code, payload.msg
            )));
        }
        if payload.tenant_access_token.is_empty() {
            return Err(Error::Auth("token response carried no token".into()));
        }

        crate::metrics::record_token_refresh("success");
        debug!(expire_secs = payload.expire, "tenant token refreshed");
        Ok(TokenState {
            value: payload.tenant_access_token,
            expires_at: Instant::now() + Duration::from_secs(payload.expire.max(0) as u64),
        })
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("auth_mode", &self.auth_mode)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_config() -> Config {
        Config {
            app_id: "cli_a1b2c3d4e5f6g7h8".into(),
            app_secret: "0123456789abcdef0123456789abcdef".into(),
            app_token: "bascnAbCdEfGh".into(),
            auth_mode: AuthMode::User,
            access_token: "u-usertoken12345678".into(),
            ..Config::default()
        }
    }

    fn pool() -> Arc<ConnectionPool> {
        Arc::new(
            ConnectionPool::new(Default::default(), Duration::from_secs(2)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_user_mode_adopts_supplied_token() {
        let manager = TokenManager::new(&user_config(), pool());
        let token = manager.token().await.unwrap();
        assert_eq!(token, "u-usertoken12345678");
    }

    #[tokio::test]
    async fn test_user_token_cached_across_calls() {
        let manager = TokenManager::new(&user_config(), pool());
        let first = manager.token().await.unwrap();
        let second = manager.token().await.unwrap();
        assert_eq!(first, second);
        assert!(manager.state.read().await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_clears_cached_token() {
        let manager = TokenManager::new(&user_config(), pool());
        let _ = manager.token().await.unwrap();
        manager.invalidate().await;
        assert!(manager.state.read().await.is_none());
    }

    #[test]
    fn test_token_response_parses_envelope() {
        let payload: TenantTokenResponse = serde_json::from_str(
            r#"{"code":0,"msg":"ok","tenant_access_token":"t-abc","expire":7200}"#,
        )
        .unwrap();
        assert_eq!(payload.code, 0);
        assert_eq!(payload.tenant_access_token, "t-abc");
        assert_eq!(payload.expire, 7200);
    }
}
