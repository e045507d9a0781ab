// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The request executor: admission control, auth, circuit breaking,
//! sending, classification, and the outer retry loop.
//!
//! Per-attempt order:
//! 1. token bucket `allow`: a local rejection is returned before the
//!    breaker sees anything and never counts against it
//! 2. access token (refreshes inside the 5-minute window)
//! 3. inside the breaker: build `base_url + "/open-apis" + path + query`,
//!    serialize the JSON body, set `Authorization`/`Content-Type`/
//!    `User-Agent`, send through the pool
//! 4. read the body
//! 5. classify: 2xx with a zero envelope code is success; everything else
//!    maps onto the error taxonomy the retry engine inspects
//!
//! The retry engine wraps the whole sequence, so a refilled bucket or a
//! recovered downstream is observed by later attempts.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::Envelope;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::rate_limit::TokenBucket;
use crate::resilience::retry::{retry, RetryPolicy};
use crate::security::mask_secrets;
use crate::transport::auth::TokenManager;
use crate::transport::pool::ConnectionPool;

const API_PREFIX: &str = "/open-apis";
const USER_AGENT_VALUE: &str = concat!("gridsql/", env!("CARGO_PKG_VERSION"));

/// One API call, independent of transport details.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    pub fn with_body<T: serde::Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = Some(
            serde_json::to_value(body)
                .map_err(|e| Error::Parse(format!("failed to encode request body: {e}")))?,
        );
        Ok(self)
    }
}

/// Response with the raw body preserved for typed decoding.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Decode the body as JSON.
    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::Api {
                code: 0,
                msg: format!("failed to decode response body: {e}"),
            })
    }

    /// Decode the envelope and unwrap its data, classifying non-zero codes.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T> {
        self.parse_json::<Envelope<T>>()?.into_data()
    }
}

/// Seam between the translation layers and the HTTP pipeline. The bridge,
/// statement executor, paginator and migrator all speak through this
/// trait, which keeps them testable against a stub.
#[async_trait]
pub trait ApiExecutor: Send + Sync {
    /// Execute one API request through the full pipeline.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse>;
}

#[derive(Debug, Deserialize)]
struct EnvelopeProbe {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

/// Production executor composing bucket, auth, breaker, pool and retry.
pub struct HttpExecutor {
    base_url: String,
    retry_policy: RetryPolicy,
    bucket: Arc<TokenBucket>,
    breaker: Arc<CircuitBreaker>,
    pool: Arc<ConnectionPool>,
    auth: Arc<TokenManager>,
    debug: bool,
}

impl HttpExecutor {
    #[must_use]
    pub fn new(
        base_url: String,
        retry_policy: RetryPolicy,
        bucket: Arc<TokenBucket>,
        breaker: Arc<CircuitBreaker>,
        pool: Arc<ConnectionPool>,
        auth: Arc<TokenManager>,
        debug: bool,
    ) -> Self {
        Self {
            base_url,
            retry_policy,
            bucket,
            breaker,
            pool,
            auth,
            debug,
        }
    }

    /// Swap the retry policy.
    pub fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.retry_policy = policy;
    }

    fn build_url(&self, request: &ApiRequest) -> Result<url::Url> {
        let mut parsed = url::Url::parse(&format!(
            "{}{}{}",
            self.base_url, API_PREFIX, request.path
        ))
        .map_err(|e| Error::Config(format!("invalid request url: {e}")))?;
        if !request.query.is_empty() {
            let mut pairs = parsed.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(parsed)
    }

    async fn attempt(&self, request: &ApiRequest, attempt: u32) -> Result<ApiResponse> {
        if !self.bucket.allow() {
            crate::metrics::record_rate_limit_rejection();
            return Err(Error::RateLimited(
                "local admission control rejected the request".into(),
            ));
        }

        let token = self.auth.token().await?;
        let url = self.build_url(request)?;

        let mut http_request = reqwest::Request::new(request.method.clone(), url);
        let headers = http_request.headers_mut();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::Config(format!("invalid token header: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| Error::Parse(format!("failed to encode body: {e}")))?;
            *http_request.body_mut() = Some(reqwest::Body::from(bytes));
        }

        let response = self
            .breaker
            .call(|| self.pool.execute(http_request))
            .await?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response body: {e}")))?
            .to_vec();

        if self.debug {
            debug!(
                method = %request.method,
                path = %request.path,
                attempt,
                status,
                bytes = body.len(),
                "api response"
            );
        }

        self.classify(request, status, body)
    }

    fn classify(&self, request: &ApiRequest, status: u16, body: Vec<u8>) -> Result<ApiResponse> {
        let probe: Option<EnvelopeProbe> = serde_json::from_slice(&body).ok();

        if (200..300).contains(&status) {
            if let Some(probe) = probe {
                if probe.code != 0 {
                    return Err(Error::from_server_code(probe.code, probe.msg));
                }
            }
            return Ok(ApiResponse { status, body });
        }

        if let Some(probe) = probe {
            if probe.code != 0 {
                return Err(Error::from_server_code(probe.code, probe.msg));
            }
        }
        match status {
            401 | 403 => Err(Error::Auth(format!(
                "http {status} for {} {}",
                request.method, request.path
            ))),
            429 => Err(Error::RateLimited(format!(
                "server throttled {} {}",
                request.method, request.path
            ))),
            _ => Err(Error::Http {
                status,
                method: request.method.to_string(),
                path: request.path.clone(),
            }),
        }
    }
}

#[async_trait]
impl ApiExecutor for HttpExecutor {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let started = Instant::now();
        let method = request.method.to_string();
        let operation = format!("{} {}", method, request.path);

        let request_ref = &request;
        let result = retry(&operation, &self.retry_policy, move |attempt| async move {
            self.attempt(request_ref, attempt).await
        })
        .await;

        crate::metrics::record_request_latency(&method, started.elapsed());
        match &result {
            Ok(_) => crate::metrics::record_request(&method, "success"),
            Err(Error::RateLimited(_)) => crate::metrics::record_request(&method, "rejected"),
            Err(err) => {
                crate::metrics::record_request(&method, "error");
                warn!(
                    method = %method,
                    path = %request.path,
                    kind = %err.kind(),
                    error = %mask_secrets(&err.to_string()),
                    "api request failed"
                );
            }
        }
        result
    }
}

impl std::fmt::Debug for HttpExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExecutor")
            .field("base_url", &self.base_url)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}
