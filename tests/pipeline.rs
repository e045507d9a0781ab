// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! End-to-end pipeline tests against a local HTTP server.
//!
//! A `tiny_http` server stands in for the remote service so the tests
//! can observe exactly what the adapter puts on the wire: auth headers,
//! retry counts, filter DSL bodies, pagination, and the per-record bulk
//! loops.

use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use gridsql::resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitState};
use gridsql::resilience::rate_limit::{RateLimitConfig, TokenBucket};
use gridsql::resilience::retry::RetryPolicy;
use gridsql::transport::auth::TokenManager;
use gridsql::transport::pool::{ConnectionPool, PoolConfig};
use gridsql::transport::{ApiExecutor, ApiRequest, HttpExecutor};
use gridsql::{AuthMode, Client, Config, ErrorKind, FieldValue, Warning};

// --- test server harness ---

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: String,
    path: String,
    query: String,
    body: String,
    headers: Vec<(String, String)>,
}

impl RecordedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn body_json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

type Handler = Box<dyn Fn(&RecordedRequest) -> (u16, String) + Send + Sync>;

struct TestServer {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown: Arc<AtomicBool>,
}

impl TestServer {
    fn spawn(handler: Handler) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind test server");
        let addr = server.server_addr().to_ip().expect("test server ip");
        let base_url = format!("http://{addr}");

        let requests: Arc<Mutex<Vec<RecordedRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let requests_thread = requests.clone();
        let shutdown_thread = shutdown.clone();
        std::thread::spawn(move || {
            while !shutdown_thread.load(Ordering::Acquire) {
                let Ok(Some(mut request)) = server.recv_timeout(Duration::from_millis(20)) else {
                    continue;
                };
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);

                let url = request.url().to_string();
                let (path, query) = match url.split_once('?') {
                    Some((path, query)) => (path.to_string(), query.to_string()),
                    None => (url, String::new()),
                };
                let recorded = RecordedRequest {
                    method: request.method().to_string(),
                    path,
                    query,
                    body,
                    headers: request
                        .headers()
                        .iter()
                        .map(|h| (h.field.to_string(), h.value.to_string()))
                        .collect(),
                };

                let (status, response_body) = handler(&recorded);
                requests_thread.lock().unwrap().push(recorded);

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("header");
                let response = tiny_http::Response::from_string(response_body)
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown,
        }
    }

    fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn count_matching(&self, method: &str, path_fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path.contains(path_fragment))
            .count()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

fn token_body() -> String {
    json!({
        "code": 0,
        "msg": "ok",
        "tenant_access_token": "t-test-token",
        "expire": 7200
    })
    .to_string()
}

fn ok(data: Value) -> (u16, String) {
    (200, json!({"code": 0, "msg": "success", "data": data}).to_string())
}

fn users_tables() -> (u16, String) {
    ok(json!({
        "has_more": false,
        "items": [{"table_id": "tblusers", "name": "users"}]
    }))
}

fn users_fields() -> (u16, String) {
    ok(json!({
        "has_more": false,
        "items": [
            {"field_id": "fld0", "field_name": "id", "type": 1, "is_primary": true},
            {"field_id": "fld1", "field_name": "name", "type": 1},
            {"field_id": "fld2", "field_name": "age", "type": 2},
            {"field_id": "fld3", "field_name": "active", "type": 7}
        ]
    }))
}

fn test_config(base_url: &str) -> Config {
    Config {
        app_id: "cli_a1b2c3d4e5f6g7h8".into(),
        app_secret: "0123456789abcdef0123456789abcdef".into(),
        app_token: "basctest".into(),
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(2),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
        },
        rate_limit: RateLimitConfig {
            rate: 100_000.0,
            burst: 100_000,
        },
        circuit: CircuitConfig {
            max_failures: 1_000,
            open_timeout: Duration::from_secs(60),
            max_probe: 1,
            interval: Duration::from_secs(60),
        },
        ..Config::default()
    }
}

// --- tests ---

#[tokio::test]
async fn test_executor_shapes_requests() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else if request.path.ends_with("/tables") {
            users_tables()
        } else {
            (404, String::new())
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();
    let tables = client.list_tables().await.unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "users");

    let requests = server.requests();
    // Initial token fetch, then the table listing.
    assert!(requests[0].path.ends_with("/auth/v3/tenant_access_token/internal"));
    let listing = &requests[1];
    assert_eq!(listing.method, "GET");
    assert_eq!(listing.path, "/open-apis/bitable/v1/apps/basctest/tables");
    assert_eq!(listing.header("Authorization"), Some("Bearer t-test-token"));
    assert_eq!(listing.header("Content-Type"), Some("application/json"));
    assert!(listing.header("User-Agent").unwrap().starts_with("gridsql/"));

    client.close().await;
}

#[tokio::test]
async fn test_token_fetched_once_and_reused() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else {
            users_tables()
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();
    let _ = client.list_tables().await.unwrap();
    let _ = client.list_tables().await.unwrap();

    assert_eq!(server.count_matching("POST", "tenant_access_token"), 1);
    client.close().await;
}

#[tokio::test]
async fn test_auth_rejection_surfaces_auth_error() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (
                200,
                json!({"code": 99991663, "msg": "app secret invalid"}).to_string(),
            )
        } else {
            (404, String::new())
        }
    }));

    let err = Client::connect(test_config(&server.base_url)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);
    assert!(err.is_permission());
}

#[tokio::test]
async fn test_retry_attempt_count_on_5xx() {
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_seen = attempts.clone();

    let server = TestServer::spawn(Box::new(move |request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else if attempts_seen.fetch_add(1, Ordering::SeqCst) < 2 {
            (503, "upstream unavailable".into())
        } else {
            users_tables()
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();
    let tables = client.list_tables().await.unwrap();
    assert_eq!(tables.len(), 1);

    // Two 503s, then success: exactly three attempts on the GET.
    assert_eq!(server.count_matching("GET", "/tables"), 3);
    client.close().await;
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else {
            (400, "bad request".into())
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();
    let err = client.list_tables().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Api);
    assert!(!err.is_retryable());
    assert_eq!(server.count_matching("GET", "/tables"), 1);
    client.close().await;
}

#[tokio::test]
async fn test_server_429_retries_then_surfaces_rate_limit() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else {
            (429, String::new())
        }
    }));

    let mut config = test_config(&server.base_url);
    config.retry.max_attempts = 2;
    let client = Client::connect(config).await.unwrap();

    let err = client.list_tables().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimit);
    assert_eq!(server.count_matching("GET", "/tables"), 2);
    client.close().await;
}

#[tokio::test]
async fn test_circuit_opens_on_network_failures_and_fast_fails() {
    // Nothing listens on this port; every send is a transport error.
    let pool = Arc::new(
        ConnectionPool::new(PoolConfig::default(), Duration::from_millis(300)).unwrap(),
    );
    let config = Config {
        app_id: "cli_a1b2c3d4e5f6g7h8".into(),
        app_secret: "0123456789abcdef0123456789abcdef".into(),
        app_token: "basctest".into(),
        auth_mode: AuthMode::User,
        access_token: "u-test".into(),
        base_url: "http://127.0.0.1:1".into(),
        ..Config::default()
    };
    let breaker = Arc::new(CircuitBreaker::new(CircuitConfig {
        max_failures: 3,
        open_timeout: Duration::from_secs(60),
        max_probe: 1,
        interval: Duration::from_secs(60),
    }));
    let executor = HttpExecutor::new(
        config.base_url.clone(),
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            multiplier: 2.0,
        },
        Arc::new(TokenBucket::new(RateLimitConfig::default())),
        breaker.clone(),
        pool.clone(),
        Arc::new(TokenManager::new(&config, pool)),
        false,
    );

    for _ in 0..3 {
        let err = executor
            .execute(ApiRequest::get("/bitable/v1/apps/basctest/tables"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    // Within the open window the failure is immediate and local.
    let started = std::time::Instant::now();
    let err = executor
        .execute(ApiRequest::get("/bitable/v1/apps/basctest/tables"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CircuitOpen);
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn test_local_rate_limit_rejection() {
    let bucket = TokenBucket::new(RateLimitConfig {
        rate: 10.0,
        burst: 20,
    });
    let mut admitted = 0;
    let mut rejected = 0;
    for _ in 0..25 {
        if bucket.allow() {
            admitted += 1;
        } else {
            rejected += 1;
        }
    }
    assert_eq!(admitted, 20);
    assert_eq!(rejected, 5);
}

#[tokio::test]
async fn test_select_translates_to_search_filter() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else if request.path.ends_with("/tables") {
            users_tables()
        } else if request.path.ends_with("/fields") {
            users_fields()
        } else if request.path.ends_with("/records/search") {
            ok(json!({
                "has_more": false,
                "items": [{
                    "record_id": "rec1",
                    "fields": {
                        "name": [{"text": "Alice", "type": "text"}],
                        "age": 30
                    }
                }]
            }))
        } else {
            (404, String::new())
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();
    let result = client
        .statements()
        .execute_sql("SELECT name, age FROM users WHERE age > 18 LIMIT 10")
        .await
        .unwrap();

    assert_eq!(result.columns, vec!["name", "age"]);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(
        result.rows[0].get("name"),
        Some(&FieldValue::Text("Alice".into()))
    );
    assert_eq!(result.rows[0].get("age"), Some(&FieldValue::Number(30.0)));

    let search = server
        .requests()
        .into_iter()
        .find(|r| r.path.ends_with("/records/search"))
        .expect("search request");
    assert_eq!(search.method, "POST");
    assert_eq!(
        search.path,
        "/open-apis/bitable/v1/apps/basctest/tables/tblusers/records/search"
    );
    assert!(search.query.contains("page_size=10"));
    assert_eq!(
        search.body_json(),
        json!({
            "filter": {
                "conjunction": "and",
                "conditions": [{
                    "field_name": "age",
                    "operator": "isGreater",
                    "value": [18]
                }]
            }
        })
    );

    client.close().await;
}

#[tokio::test]
async fn test_like_and_bool_filters_on_the_wire() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else if request.path.ends_with("/tables") {
            users_tables()
        } else if request.path.ends_with("/fields") {
            users_fields()
        } else if request.path.ends_with("/records/search") {
            ok(json!({"has_more": false, "items": []}))
        } else {
            (404, String::new())
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();

    let _ = client
        .statements()
        .execute_sql("SELECT * FROM users WHERE name LIKE '%zh%'")
        .await
        .unwrap();
    let _ = client
        .bridge()
        .find("users", &gridsql::Query::new().field_eq("active", true))
        .await
        .unwrap();

    let searches: Vec<RecordedRequest> = server
        .requests()
        .into_iter()
        .filter(|r| r.path.ends_with("/records/search"))
        .collect();
    assert_eq!(searches.len(), 2);

    // LIKE loses its wildcards and becomes a contains match.
    assert_eq!(
        searches[0].body_json()["filter"]["conditions"][0],
        json!({"field_name": "name", "operator": "contains", "value": ["zh"]})
    );
    // Booleans stay native, not string-coerced.
    assert_eq!(
        searches[1].body_json()["filter"]["conditions"][0],
        json!({"field_name": "active", "operator": "is", "value": [true]})
    );

    client.close().await;
}

#[tokio::test]
async fn test_insert_converts_values_by_field_type() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else if request.path.ends_with("/tables") {
            users_tables()
        } else if request.path.ends_with("/fields") {
            users_fields()
        } else if request.path.ends_with("/records") && request.method == "POST" {
            ok(json!({"record": {"record_id": "recnew", "fields": {}}}))
        } else {
            (404, String::new())
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();
    let result = client
        .statements()
        .execute_sql("INSERT INTO users (name, age, active) VALUES ('Alice', 30, true)")
        .await
        .unwrap();
    assert_eq!(result.affected, 1);

    let create = server
        .requests()
        .into_iter()
        .find(|r| r.method == "POST" && r.path.ends_with("/records"))
        .expect("create request");
    assert_eq!(
        create.body_json(),
        json!({"fields": {"name": "Alice", "age": 30.0, "active": true}})
    );

    client.close().await;
}

#[tokio::test]
async fn test_delete_all_reports_partial_failure() {
    let record_ids: Vec<String> = (1..=7).map(|i| format!("rec{i}")).collect();
    let items: Vec<Value> = record_ids
        .iter()
        .map(|id| json!({"record_id": id, "fields": {}}))
        .collect();

    let server = TestServer::spawn(Box::new(move |request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else if request.path.ends_with("/tables") {
            users_tables()
        } else if request.path.ends_with("/fields") {
            users_fields()
        } else if request.method == "GET" && request.path.ends_with("/records") {
            ok(json!({"has_more": false, "items": items}))
        } else if request.method == "DELETE" {
            if request.path.ends_with("/rec4") {
                (500, "storage error".into())
            } else {
                let id = request.path.rsplit('/').next().unwrap_or_default();
                ok(json!({"deleted": true, "record_id": id}))
            }
        } else {
            (404, String::new())
        }
    }));

    let mut config = test_config(&server.base_url);
    config.retry.max_attempts = 1;
    let client = Client::connect(config).await.unwrap();

    let err = client
        .statements()
        .execute_sql("DELETE FROM users")
        .await
        .unwrap_err();

    // Three rows were committed before the failure; the remote cannot
    // roll them back.
    assert_eq!(err.affected_before_failure(), 3);
    assert!(err.to_string().contains("3 row(s)"));

    // One list call plus four DELETE calls (three successes + the failure).
    assert_eq!(server.count_matching("GET", "/records"), 1);
    assert_eq!(server.count_matching("DELETE", "/records/"), 4);

    client.close().await;
}

#[tokio::test]
async fn test_delete_all_success_counts_and_warns() {
    let server = TestServer::spawn(Box::new(move |request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else if request.path.ends_with("/tables") {
            users_tables()
        } else if request.path.ends_with("/fields") {
            users_fields()
        } else if request.method == "GET" && request.path.ends_with("/records") {
            ok(json!({"has_more": false, "items": [
                {"record_id": "rec1", "fields": {}},
                {"record_id": "rec2", "fields": {}}
            ]}))
        } else if request.method == "DELETE" {
            let id = request.path.rsplit('/').next().unwrap_or_default();
            ok(json!({"deleted": true, "record_id": id}))
        } else {
            (404, String::new())
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();
    let result = client
        .statements()
        .execute_sql("DELETE FROM users")
        .await
        .unwrap();

    assert_eq!(result.affected, 2);
    assert!(result
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::UnboundedDelete { table } if table == "users")));

    client.close().await;
}

#[tokio::test]
async fn test_update_with_where_searches_then_puts() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else if request.path.ends_with("/tables") {
            users_tables()
        } else if request.path.ends_with("/fields") {
            users_fields()
        } else if request.path.ends_with("/records/search") {
            ok(json!({"has_more": false, "items": [
                {"record_id": "rec9", "fields": {}}
            ]}))
        } else if request.method == "PUT" {
            ok(json!({"record": {"record_id": "rec9", "fields": {}}}))
        } else {
            (404, String::new())
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();
    let result = client
        .statements()
        .execute_sql("UPDATE users SET age = 31 WHERE name = 'Alice'")
        .await
        .unwrap();
    assert_eq!(result.affected, 1);
    assert!(result.warnings.is_empty());

    let requests = server.requests();
    let put = requests
        .iter()
        .find(|r| r.method == "PUT")
        .expect("update request");
    assert!(put.path.ends_with("/records/rec9"));
    assert_eq!(put.body_json(), json!({"fields": {"age": 31.0}}));

    client.close().await;
}

#[tokio::test]
async fn test_paginator_walks_page_tokens() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else if request.path.ends_with("/tables") {
            users_tables()
        } else if request.path.ends_with("/fields") {
            users_fields()
        } else if request.method == "GET" && request.path.ends_with("/records") {
            if request.query.contains("page_token=next") {
                ok(json!({"has_more": false, "items": [
                    {"record_id": "rec3", "fields": {}}
                ]}))
            } else {
                ok(json!({"has_more": true, "page_token": "next", "items": [
                    {"record_id": "rec1", "fields": {}},
                    {"record_id": "rec2", "fields": {}}
                ]}))
            }
        } else {
            (404, String::new())
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();
    let records = client.records("tblusers").collect_all().await.unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.record_id.as_str()).collect();
    assert_eq!(ids, vec!["rec1", "rec2", "rec3"]);
    assert_eq!(server.count_matching("GET", "/records"), 2);

    client.close().await;
}

#[tokio::test]
async fn test_show_and_describe() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else if request.path.ends_with("/tables") {
            users_tables()
        } else if request.path.ends_with("/fields") {
            users_fields()
        } else {
            (404, String::new())
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();

    let result = client.statements().execute_sql("SHOW TABLES").await.unwrap();
    assert_eq!(result.tables.len(), 1);
    assert_eq!(result.tables[0].name, "users");

    let result = client.statements().execute_sql("DESCRIBE users").await.unwrap();
    assert_eq!(result.fields.len(), 4);
    assert!(result.fields.iter().any(|f| f.field_name == "age"));

    let result = client
        .statements()
        .execute_sql("SHOW COLUMNS FROM users")
        .await
        .unwrap();
    assert_eq!(result.fields.len(), 4);

    client.close().await;
}

#[tokio::test]
async fn test_injection_rejected_before_any_network_call() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else {
            users_tables()
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();
    let err = client
        .statements()
        .execute_sql("SELECT * FROM users; DROP TABLE users")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Security);

    // Only the connect-time token fetch reached the server.
    assert_eq!(server.requests().len(), 1);
    client.close().await;
}

#[derive(Default)]
struct UserRow {
    id: Option<String>,
    name: String,
    age: f64,
    active: bool,
}

impl gridsql::RecordAdapter for UserRow {
    fn table(&self) -> &str {
        "users"
    }

    fn primary_key(&self) -> Option<String> {
        self.id.clone()
    }

    fn fields(&self) -> Vec<(String, FieldValue, gridsql::FieldRole)> {
        vec![
            (
                "id".into(),
                self.id.clone().map(FieldValue::Text).unwrap_or(FieldValue::Null),
                gridsql::FieldRole::PrimaryKey,
            ),
            ("name".into(), FieldValue::Text(self.name.clone()), gridsql::FieldRole::Data),
            ("age".into(), FieldValue::Number(self.age), gridsql::FieldRole::Data),
            ("active".into(), FieldValue::Bool(self.active), gridsql::FieldRole::Data),
        ]
    }

    fn set_field(&mut self, name: &str, value: FieldValue) {
        match name {
            "name" => {
                if let FieldValue::Text(text) = value {
                    self.name = text;
                }
            }
            "age" => {
                if let FieldValue::Number(number) = value {
                    self.age = number;
                }
            }
            "active" => {
                if let FieldValue::Bool(flag) = value {
                    self.active = flag;
                }
            }
            _ => {}
        }
    }

    fn set_primary_key(&mut self, record_id: &str) {
        self.id = Some(record_id.to_string());
    }
}

#[tokio::test]
async fn test_bridge_create_writes_back_record_id() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else if request.path.ends_with("/tables") {
            users_tables()
        } else if request.path.ends_with("/fields") {
            users_fields()
        } else if request.method == "POST" && request.path.ends_with("/records") {
            ok(json!({"record": {"record_id": "recnew", "fields": {}}}))
        } else {
            (404, String::new())
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();
    let mut row = UserRow {
        id: None,
        name: "Alice".into(),
        age: 30.0,
        active: true,
    };
    let affected = client.bridge().create(&mut row).await.unwrap();
    assert_eq!(affected, 1);
    assert_eq!(row.id.as_deref(), Some("recnew"));

    // The primary key never travels in the create body.
    let create = server
        .requests()
        .into_iter()
        .find(|r| r.method == "POST" && r.path.ends_with("/records"))
        .expect("create request");
    assert_eq!(
        create.body_json(),
        json!({"fields": {"name": "Alice", "age": 30.0, "active": true}})
    );

    client.close().await;
}

#[tokio::test]
async fn test_bridge_find_into_hydrates_adapters() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else if request.path.ends_with("/tables") {
            users_tables()
        } else if request.path.ends_with("/fields") {
            users_fields()
        } else if request.path.ends_with("/records/search") {
            ok(json!({"has_more": false, "items": [{
                "record_id": "rec7",
                "fields": {
                    "name": [{"text": "Bob", "type": "text"}],
                    "age": 41,
                    "active": false
                }
            }]}))
        } else {
            (404, String::new())
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();
    let rows = client
        .bridge()
        .find_into("users", &gridsql::Query::new().field_ge("age", 40), UserRow::default)
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id.as_deref(), Some("rec7"));
    assert_eq!(rows[0].name, "Bob");
    assert_eq!(rows[0].age, 41.0);
    assert!(!rows[0].active);

    client.close().await;
}

#[tokio::test]
async fn test_bridge_update_and_delete_resolve_record_id() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else if request.path.ends_with("/tables") {
            users_tables()
        } else if request.path.ends_with("/fields") {
            users_fields()
        } else if request.method == "PUT" {
            ok(json!({"record": {"record_id": "rec7", "fields": {}}}))
        } else if request.method == "DELETE" {
            ok(json!({"deleted": true, "record_id": "rec7"}))
        } else {
            (404, String::new())
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();
    let row = UserRow {
        id: Some("rec7".into()),
        name: "Bob".into(),
        age: 42.0,
        active: true,
    };

    assert_eq!(client.bridge().update(&row, None).await.unwrap(), 1);
    assert_eq!(client.bridge().delete(&row, None).await.unwrap(), 1);

    // Without a primary key and without a query equality, there is no
    // record to address.
    let anonymous = UserRow::default();
    let err = client.bridge().update(&anonymous, None).await.unwrap_err();
    assert!(matches!(err, gridsql::Error::RecordNotFound(_)));

    let requests = server.requests();
    assert!(requests.iter().any(|r| r.method == "PUT" && r.path.ends_with("/records/rec7")));
    assert!(requests.iter().any(|r| r.method == "DELETE" && r.path.ends_with("/records/rec7")));

    client.close().await;
}

#[tokio::test]
async fn test_close_is_idempotent_and_blocks_requests() {
    let server = TestServer::spawn(Box::new(|request| {
        if request.path.contains("tenant_access_token") {
            (200, token_body())
        } else {
            users_tables()
        }
    }));

    let client = Client::connect(test_config(&server.base_url)).await.unwrap();
    client.close().await;
    client.close().await;
    assert!(client.is_closed());

    let err = client.list_tables().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}
