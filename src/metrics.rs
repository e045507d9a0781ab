//! Metrics instrumentation.
//!
//! Uses the `metrics` crate for backend-agnostic collection; the embedding
//! application chooses the exporter.
//!
//! # Metric Naming Convention
//! - `gridsql_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `method`, `outcome` on request metrics
//! - `state` on circuit gauge updates

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Record an API request outcome (`success`, `error`, `rejected`).
pub fn record_request(method: &str, outcome: &str) {
    counter!(
        "gridsql_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record end-to-end request latency.
pub fn record_request_latency(method: &str, duration: Duration) {
    histogram!(
        "gridsql_request_seconds",
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(
        "gridsql_retries_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a local rate-limit rejection.
pub fn record_rate_limit_rejection() {
    counter!("gridsql_rate_limit_rejections_total").increment(1);
}

/// Record a circuit breaker outcome (`success`, `failure`, `rejected`).
pub fn record_circuit_call(outcome: &str) {
    counter!(
        "gridsql_circuit_calls_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set the circuit state gauge (0 = closed, 1 = half-open, 2 = open).
pub fn set_circuit_state(state: u8) {
    gauge!("gridsql_circuit_state").set(f64::from(state));
}

/// Record rows fetched by the paginator in one page.
pub fn record_page(rows: usize) {
    counter!("gridsql_pages_total").increment(1);
    histogram!("gridsql_page_rows").record(rows as f64);
}

/// Record a token refresh.
pub fn record_token_refresh(outcome: &str) {
    counter!(
        "gridsql_token_refresh_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
