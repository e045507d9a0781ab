// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy for the adapter.
//!
//! Every layer wraps, never swallows: the resilience components return their
//! own kinds, the executor attaches request context (method, path, attempt),
//! and the bridge attaches table/record context. Consumers classify errors
//! through [`Error::kind`], [`Error::is_retryable`] and
//! [`Error::is_permission`] rather than matching on display strings.

use thiserror::Error;

/// Stable error classification tags.
///
/// The string form of each kind is part of the public contract and is safe
/// to log, assert on, and ship across process boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid credentials or missing required configuration.
    Config,
    /// Token request rejected, or HTTP 401/403.
    Auth,
    /// Server returned a permission-denied code.
    Permission,
    /// Transport error or timeout.
    Network,
    /// Local admission rejection or server 429.
    RateLimit,
    /// Circuit breaker is open.
    CircuitOpen,
    /// SQL grammar or identifier rejected.
    Parse,
    /// Injection pattern rejected.
    Security,
    /// Any other non-zero server code or HTTP failure.
    Api,
}

impl ErrorKind {
    /// Stable string tag for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::CircuitOpen => "circuit_open",
            Self::Parse => "parse",
            Self::Security => "security",
            Self::Api => "api",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for all adapter operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration (credentials, missing fields).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Authentication failed (token endpoint error or 401/403).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The server denied the operation. Surfaced verbatim.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Transport-level failure (connect, DNS, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Admission control rejected the request locally, or the server
    /// answered 429.
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// The circuit breaker is open; the request was not sent.
    #[error("circuit breaker open, request rejected")]
    CircuitOpen,

    /// SQL text or an identifier failed to parse.
    #[error("parse error: {0}")]
    Parse(String),

    /// The statement matched an injection pattern and was rejected.
    #[error("statement rejected: {0}")]
    Security(String),

    /// The server envelope carried a non-zero code.
    #[error("api error {code}: {msg}")]
    Api { code: i64, msg: String },

    /// Non-2xx HTTP response whose body did not parse as an envelope.
    #[error("http {status} for {method} {path}")]
    Http {
        status: u16,
        method: String,
        path: String,
    },

    /// No table with the given name exists in the base.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// No field with the given name exists on the table.
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// The record id could not be resolved.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// A multi-row raw operation failed partway through. Rows applied
    /// before the failure stay committed; the remote cannot roll back.
    #[error("operation failed after {affected} row(s) were applied: {source}")]
    PartialFailure {
        affected: u64,
        #[source]
        source: Box<Error>,
    },
}

// Feishu server code bands. The open platform reserves 99991661-99991679
// for token errors and 1254nnn for bitable application errors.
const AUTH_CODE_MIN: i64 = 99_991_661;
const AUTH_CODE_MAX: i64 = 99_991_679;
const RATE_LIMIT_CODES: [i64; 2] = [99_991_400, 1_254_290];
const PERMISSION_CODES: [i64; 3] = [1_254_302, 1_254_303, 99_991_672];

impl Error {
    /// Build the right variant for a non-zero server envelope code.
    #[must_use]
    pub fn from_server_code(code: i64, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        if (AUTH_CODE_MIN..=AUTH_CODE_MAX).contains(&code) {
            Self::Auth(format!("server code {code}: {msg}"))
        } else if RATE_LIMIT_CODES.contains(&code) {
            Self::RateLimited(format!("server code {code}: {msg}"))
        } else if PERMISSION_CODES.contains(&code) {
            Self::Permission(format!("server code {code}: {msg}"))
        } else {
            Self::Api { code, msg }
        }
    }

    /// Classification tag for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Permission(_) => ErrorKind::Permission,
            Self::Network(_) => ErrorKind::Network,
            Self::RateLimited(_) => ErrorKind::RateLimit,
            Self::CircuitOpen => ErrorKind::CircuitOpen,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Security(_) => ErrorKind::Security,
            Self::Api { .. }
            | Self::Http { .. }
            | Self::TableNotFound(_)
            | Self::FieldNotFound(_)
            | Self::RecordNotFound(_) => ErrorKind::Api,
            Self::PartialFailure { source, .. } => source.kind(),
        }
    }

    /// Whether the retry engine may re-attempt the operation.
    ///
    /// Network and 5xx/429 failures retry; auth, permission, client errors,
    /// parse/security rejections, and an open circuit do not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited(_) => true,
            Self::Api { code, .. } => *code >= 500 || !(400..500).contains(code),
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::PartialFailure { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Whether this error is an authorization problem the caller must fix.
    #[must_use]
    pub fn is_permission(&self) -> bool {
        matches!(self.kind(), ErrorKind::Auth | ErrorKind::Permission)
    }

    /// Rows applied before a partial failure, zero otherwise.
    #[must_use]
    pub fn affected_before_failure(&self) -> u64 {
        match self {
            Self::PartialFailure { affected, .. } => *affected,
            _ => 0,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_stable() {
        assert_eq!(Error::Config("x".into()).kind().as_str(), "config");
        assert_eq!(Error::Auth("x".into()).kind().as_str(), "auth");
        assert_eq!(Error::Permission("x".into()).kind().as_str(), "permission");
        assert_eq!(Error::Network("x".into()).kind().as_str(), "network");
        assert_eq!(Error::RateLimited("x".into()).kind().as_str(), "rate_limit");
        assert_eq!(Error::CircuitOpen.kind().as_str(), "circuit_open");
        assert_eq!(Error::Parse("x".into()).kind().as_str(), "parse");
        assert_eq!(Error::Security("x".into()).kind().as_str(), "security");
        assert_eq!(
            Error::Api { code: 1, msg: "x".into() }.kind().as_str(),
            "api"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Network("reset".into()).is_retryable());
        assert!(Error::RateLimited("429".into()).is_retryable());
        assert!(Error::Api { code: 500, msg: String::new() }.is_retryable());
        assert!(Error::Http { status: 503, method: "GET".into(), path: "/".into() }.is_retryable());
        assert!(Error::Http { status: 429, method: "GET".into(), path: "/".into() }.is_retryable());

        assert!(!Error::Auth("bad secret".into()).is_retryable());
        assert!(!Error::CircuitOpen.is_retryable());
        assert!(!Error::Parse("syntax".into()).is_retryable());
        assert!(!Error::Security("injection".into()).is_retryable());
        assert!(!Error::Api { code: 404, msg: String::new() }.is_retryable());
        assert!(!Error::Http { status: 400, method: "GET".into(), path: "/".into() }.is_retryable());
    }

    #[test]
    fn test_server_code_banding() {
        assert_eq!(
            Error::from_server_code(99_991_663, "token expired").kind(),
            ErrorKind::Auth
        );
        assert_eq!(
            Error::from_server_code(99_991_400, "too fast").kind(),
            ErrorKind::RateLimit
        );
        assert_eq!(
            Error::from_server_code(1_254_302, "no access").kind(),
            ErrorKind::Permission
        );
        assert_eq!(
            Error::from_server_code(1_254_001, "bad request").kind(),
            ErrorKind::Api
        );
    }

    #[test]
    fn test_permission_helper() {
        assert!(Error::Auth("x".into()).is_permission());
        assert!(Error::Permission("x".into()).is_permission());
        assert!(!Error::Network("x".into()).is_permission());
    }

    #[test]
    fn test_partial_failure_delegates() {
        let err = Error::PartialFailure {
            affected: 3,
            source: Box::new(Error::Network("reset".into())),
        };
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.is_retryable());
        assert_eq!(err.affected_before_failure(), 3);
    }
}
