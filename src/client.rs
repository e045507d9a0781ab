// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The client root handle.
//!
//! One [`Client`] owns the whole pipeline (token bucket, circuit
//! breaker, connection pool, token manager, executor, descriptor cache)
//! as explicit dependencies, with no globals. Handles are cheap to clone and
//! safe to share across tasks; [`Client::close`] is idempotent and tears
//! everything down atomically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::cache::{DescriptorCache, TableDescriptor};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::exec::StatementExecutor;
use crate::migrator::Migrator;
use crate::model::{Field, Table};
use crate::paginator::Paginator;
use crate::protocol::{
    batch_create_path, batch_delete_path, batch_update_path, fields_path, record_path,
    records_path, table_path, tables_path, validate_batch_len, BatchCreateRequest,
    BatchDeleteRequest, BatchRecordsResponse, BatchUpdateRecord, BatchUpdateRequest,
    CreateTableRequest, CreateTableResponse, DeleteRecordResponse, FieldBody, FieldResponse,
    ListFieldsResponse, ListTablesResponse, RecordFieldsBody, RecordResponse, WireRecord,
};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitStats};
use crate::resilience::rate_limit::{RateLimitConfig, RateLimitStats, TokenBucket};
use crate::transport::auth::TokenManager;
use crate::transport::pool::{ConnectionPool, PoolConfig, PoolStats};
use crate::transport::{ApiExecutor, ApiRequest, HttpExecutor};

/// How often the janitor sweeps the resource registry.
const JANITOR_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Table listings page at this size.
const TABLE_PAGE_SIZE: usize = 100;

/// A disposable tracked by the client registry.
struct ManagedResource {
    name: String,
    kind: &'static str,
    registered_at: Instant,
    dispose: Option<Box<dyn FnOnce() + Send>>,
}

/// Registry of long-lived client resources, swept by the janitor and
/// disposed on close.
#[derive(Default)]
struct ResourceRegistry {
    entries: Mutex<Vec<ManagedResource>>,
}

impl ResourceRegistry {
    fn register(&self, name: String, kind: &'static str, dispose: Box<dyn FnOnce() + Send>) {
        self.entries.lock().push(ManagedResource {
            name,
            kind,
            registered_at: Instant::now(),
            dispose: Some(dispose),
        });
    }

    fn sweep(&self) {
        for entry in self.entries.lock().iter() {
            debug!(
                resource = %entry.name,
                kind = entry.kind,
                age_secs = entry.registered_at.elapsed().as_secs(),
                "resource registry sweep"
            );
        }
    }

    fn dispose_all(&self) {
        let mut entries = self.entries.lock();
        for mut entry in entries.drain(..) {
            if let Some(dispose) = entry.dispose.take() {
                dispose();
            }
        }
    }
}

/// Aggregate snapshot of the client's resilience components.
#[derive(Debug, Clone)]
pub struct ClientStats {
    pub rate_limit: RateLimitStats,
    pub circuit: CircuitStats,
    pub pool: PoolStats,
    pub cached_tables: usize,
}

struct ClientInner {
    config: Config,
    bucket: Arc<TokenBucket>,
    breaker: Arc<CircuitBreaker>,
    pool: Arc<ConnectionPool>,
    auth: Arc<TokenManager>,
    executor: Arc<dyn ApiExecutor>,
    cache: Arc<DescriptorCache>,
    registry: ResourceRegistry,
    janitor: Mutex<Option<tokio::task::JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Client for one Base (multi-dimensional table container).
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Validate the configuration, build the pipeline and fetch the
    /// initial access token.
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;

        let bucket = Arc::new(TokenBucket::new(config.rate_limit));
        let breaker = Arc::new(CircuitBreaker::new(config.circuit));
        let pool = Arc::new(ConnectionPool::new(config.pool, config.timeout)?);
        let auth = Arc::new(TokenManager::new(&config, pool.clone()));
        let executor: Arc<dyn ApiExecutor> = Arc::new(HttpExecutor::new(
            config.base_url.clone(),
            config.retry,
            bucket.clone(),
            breaker.clone(),
            pool.clone(),
            auth.clone(),
            config.debug,
        ));
        let cache = Arc::new(DescriptorCache::new(config.cache_enabled, config.cache_ttl));

        let inner = Arc::new(ClientInner {
            config,
            bucket,
            breaker,
            pool,
            auth,
            executor,
            cache,
            registry: ResourceRegistry::default(),
            janitor: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        {
            let pool = inner.pool.clone();
            inner.registry.register(
                format!("connection_pool_{:p}", Arc::as_ptr(&pool)),
                "connection_pool",
                Box::new(move || pool.close()),
            );
        }
        inner.registry.register(
            format!("circuit_breaker_{:p}", Arc::as_ptr(&inner.breaker)),
            "circuit_breaker",
            Box::new(|| {}),
        );
        inner.registry.register(
            format!("rate_limiter_{:p}", Arc::as_ptr(&inner.bucket)),
            "rate_limiter",
            Box::new(|| {}),
        );

        let client = Self { inner };
        client.spawn_janitor();

        // Fail fast on bad credentials instead of on the first query.
        client.inner.auth.token().await?;
        info!(base_url = %client.inner.config.base_url, "client connected");
        Ok(client)
    }

    fn spawn_janitor(&self) {
        let inner = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match inner.upgrade() {
                    Some(inner) => inner.registry.sweep(),
                    None => break,
                }
            }
        });
        *self.inner.janitor.lock() = Some(handle);
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The executor seam, for the translation layers.
    #[must_use]
    pub fn executor(&self) -> Arc<dyn ApiExecutor> {
        self.inner.executor.clone()
    }

    /// ORM-style record bridge.
    #[must_use]
    pub fn bridge(&self) -> Bridge {
        Bridge::new(self.clone())
    }

    /// SQL statement executor.
    #[must_use]
    pub fn statements(&self) -> StatementExecutor {
        StatementExecutor::new(self.clone())
    }

    /// Schema migrator.
    #[must_use]
    pub fn migrator(&self) -> Migrator {
        Migrator::new(self.clone())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::Config("client is closed".into()));
        }
        Ok(())
    }

    // --- metadata operations ---

    /// List every table in the base.
    pub async fn list_tables(&self) -> Result<Vec<Table>> {
        self.ensure_open()?;
        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = ApiRequest::get(tables_path(&self.inner.config.app_token))
                .with_query("page_size", TABLE_PAGE_SIZE.to_string());
            if let Some(token) = page_token.take() {
                request = request.with_query("page_token", token);
            }
            let page: ListTablesResponse =
                self.inner.executor.execute(request).await?.into_data()?;
            tables.extend(page.items);
            if !page.has_more {
                break;
            }
            page_token = page.page_token.filter(|t| !t.is_empty());
            if page_token.is_none() {
                break;
            }
        }
        Ok(tables)
    }

    /// Resolve a table name (or raw table id) to its id.
    pub async fn table_id(&self, table_name: &str) -> Result<String> {
        if let Some(descriptor) = self.inner.cache.get(table_name) {
            return Ok(descriptor.table_id.clone());
        }
        let tables = self.list_tables().await?;
        for table in &tables {
            if table.name == table_name || table.table_id == table_name {
                return Ok(table.table_id.clone());
            }
        }
        Err(Error::TableNotFound(table_name.to_string()))
    }

    /// List the fields of a table.
    pub async fn list_fields(&self, table_id: &str) -> Result<Vec<Field>> {
        self.ensure_open()?;
        let mut fields = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request =
                ApiRequest::get(fields_path(&self.inner.config.app_token, table_id))
                    .with_query("page_size", TABLE_PAGE_SIZE.to_string());
            if let Some(token) = page_token.take() {
                request = request.with_query("page_token", token);
            }
            let page: ListFieldsResponse =
                self.inner.executor.execute(request).await?.into_data()?;
            fields.extend(page.items);
            if !page.has_more {
                break;
            }
            page_token = page.page_token.filter(|t| !t.is_empty());
            if page_token.is_none() {
                break;
            }
        }

        for field in &fields {
            if !field.field_type.is_registered() {
                warn!(
                    field = %field.field_name,
                    code = field.field_type.code(),
                    "field has unregistered type code, treating as opaque"
                );
            }
        }
        Ok(fields)
    }

    /// Resolve the full descriptor for a table, via the cache when
    /// enabled.
    pub async fn descriptor(&self, table_name: &str) -> Result<Arc<TableDescriptor>> {
        if let Some(descriptor) = self.inner.cache.get(table_name) {
            return Ok(descriptor);
        }
        let table_id = self.table_id(table_name).await?;
        let fields = self.list_fields(&table_id).await?;
        let descriptor = Arc::new(TableDescriptor { table_id, fields });
        self.inner.cache.put(table_name, descriptor.clone());
        Ok(descriptor)
    }

    // --- record operations ---

    /// Create one record from wire-shaped field values.
    pub async fn create_record(
        &self,
        table_id: &str,
        fields: Map<String, Value>,
    ) -> Result<WireRecord> {
        self.ensure_open()?;
        let body = RecordFieldsBody { fields };
        body.validate()?;
        let request = ApiRequest::post(records_path(&self.inner.config.app_token, table_id))
            .with_body(&body)?;
        let response: RecordResponse = self.inner.executor.execute(request).await?.into_data()?;
        Ok(response.record)
    }

    /// Update one record.
    pub async fn update_record(
        &self,
        table_id: &str,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<WireRecord> {
        self.ensure_open()?;
        let body = RecordFieldsBody { fields };
        body.validate()?;
        let request = ApiRequest::put(record_path(
            &self.inner.config.app_token,
            table_id,
            record_id,
        ))
        .with_body(&body)?;
        let response: RecordResponse = self.inner.executor.execute(request).await?.into_data()?;
        Ok(response.record)
    }

    /// Delete one record.
    pub async fn delete_record(&self, table_id: &str, record_id: &str) -> Result<bool> {
        self.ensure_open()?;
        let request = ApiRequest::delete(record_path(
            &self.inner.config.app_token,
            table_id,
            record_id,
        ));
        let response: DeleteRecordResponse =
            self.inner.executor.execute(request).await?.into_data()?;
        Ok(response.deleted)
    }

    /// Create up to 500 records in one call.
    pub async fn batch_create_records(
        &self,
        table_id: &str,
        records: Vec<Map<String, Value>>,
    ) -> Result<Vec<WireRecord>> {
        self.ensure_open()?;
        validate_batch_len(records.len())?;
        let body = BatchCreateRequest {
            records: records
                .into_iter()
                .map(|fields| RecordFieldsBody { fields })
                .collect(),
        };
        let request = ApiRequest::post(batch_create_path(&self.inner.config.app_token, table_id))
            .with_body(&body)?;
        let response: BatchRecordsResponse =
            self.inner.executor.execute(request).await?.into_data()?;
        Ok(response.records)
    }

    /// Update up to 500 records in one call.
    pub async fn batch_update_records(
        &self,
        table_id: &str,
        records: Vec<(String, Map<String, Value>)>,
    ) -> Result<Vec<WireRecord>> {
        self.ensure_open()?;
        validate_batch_len(records.len())?;
        let body = BatchUpdateRequest {
            records: records
                .into_iter()
                .map(|(record_id, fields)| BatchUpdateRecord { record_id, fields })
                .collect(),
        };
        let request = ApiRequest::post(batch_update_path(&self.inner.config.app_token, table_id))
            .with_body(&body)?;
        let response: BatchRecordsResponse =
            self.inner.executor.execute(request).await?.into_data()?;
        Ok(response.records)
    }

    /// Delete up to 500 records in one call.
    pub async fn batch_delete_records(
        &self,
        table_id: &str,
        record_ids: Vec<String>,
    ) -> Result<()> {
        self.ensure_open()?;
        validate_batch_len(record_ids.len())?;
        let body = BatchDeleteRequest {
            records: record_ids,
        };
        let request = ApiRequest::post(batch_delete_path(&self.inner.config.app_token, table_id))
            .with_body(&body)?;
        // The executor already rejects non-zero envelope codes; the
        // payload itself carries nothing we need.
        self.inner.executor.execute(request).await?;
        Ok(())
    }

    /// A paginator over a table's records.
    #[must_use]
    pub fn records(&self, table_id: &str) -> Paginator {
        Paginator::new(
            self.inner.executor.clone(),
            self.inner.config.app_token.clone(),
            table_id,
        )
        .with_user_id_type(self.inner.config.user_id_type.clone())
    }

    // --- schema operations ---

    /// Create a table.
    pub async fn create_table(&self, request: CreateTableRequest) -> Result<CreateTableResponse> {
        self.ensure_open()?;
        request.validate()?;
        let table_name = request.table.name.clone();
        let api_request = ApiRequest::post(tables_path(&self.inner.config.app_token))
            .with_body(&request)?;
        let response: CreateTableResponse =
            self.inner.executor.execute(api_request).await?.into_data()?;
        self.inner.cache.invalidate(&table_name);
        Ok(response)
    }

    /// Drop a table by name or id.
    pub async fn drop_table(&self, table_name: &str) -> Result<()> {
        self.ensure_open()?;
        let table_id = self.table_id(table_name).await?;
        let request =
            ApiRequest::delete(table_path(&self.inner.config.app_token, &table_id));
        self.inner.executor.execute(request).await?;
        self.inner.cache.invalidate(table_name);
        Ok(())
    }

    /// Create a field on a table.
    pub async fn create_field(&self, table_id: &str, body: FieldBody) -> Result<Field> {
        self.ensure_open()?;
        let request = ApiRequest::post(fields_path(&self.inner.config.app_token, table_id))
            .with_body(&body)?;
        let response: FieldResponse =
            self.inner.executor.execute(request).await?.into_data()?;
        Ok(response.field)
    }

    /// Alter a field on a table.
    pub async fn update_field(
        &self,
        table_id: &str,
        field_id: &str,
        body: FieldBody,
    ) -> Result<Field> {
        self.ensure_open()?;
        let request = ApiRequest::put(crate::protocol::field_path(
            &self.inner.config.app_token,
            table_id,
            field_id,
        ))
        .with_body(&body)?;
        let response: FieldResponse =
            self.inner.executor.execute(request).await?.into_data()?;
        Ok(response.field)
    }

    /// Drop a cached descriptor (DDL writes outside the client call this).
    pub fn invalidate_descriptor(&self, table_name: &str) {
        self.inner.cache.invalidate(table_name);
    }

    // --- lifecycle and introspection ---

    /// GET the token endpoint and report 2xx as healthy.
    pub async fn health_check(&self) -> Result<bool> {
        self.ensure_open()?;
        let url = format!(
            "{}/open-apis/auth/v3/tenant_access_token/internal",
            self.inner.config.base_url
        );
        self.inner.pool.health_check(&url).await
    }

    /// Snapshot of all resilience component statistics.
    #[must_use]
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            rate_limit: self.inner.bucket.stats(),
            circuit: self.inner.breaker.stats(),
            pool: self.inner.pool.stats(),
            cached_tables: self.inner.cache.len(),
        }
    }

    /// Swap the rate limiter configuration.
    pub fn update_rate_limit_config(&self, config: RateLimitConfig) {
        self.inner.bucket.update_config(config);
    }

    /// Rebuild the connection pool with new settings.
    pub fn update_pool_config(&self, config: PoolConfig) -> Result<()> {
        self.inner.pool.update_config(config)
    }

    /// Reset the breaker and the bucket to their initial states.
    pub fn reset_resilience(&self) {
        self.inner.breaker.reset();
        self.inner.bucket.reset();
    }

    /// Tear down the client. Safe to call more than once.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.inner.janitor.lock().take() {
            handle.abort();
        }
        self.inner.auth.clear().await;
        self.inner.cache.clear();
        self.inner.registry.dispose_all();
        debug!("client resources released");
    }

    /// Whether close has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.config.base_url)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_disposes_once() {
        let registry = ResourceRegistry::default();
        let disposed = Arc::new(AtomicBool::new(false));
        let disposed_clone = disposed.clone();
        registry.register(
            "pool_1".into(),
            "connection_pool",
            Box::new(move || disposed_clone.store(true, Ordering::SeqCst)),
        );

        registry.sweep();
        assert!(!disposed.load(Ordering::SeqCst));

        registry.dispose_all();
        assert!(disposed.load(Ordering::SeqCst));

        // Second disposal is a no-op over the drained list.
        registry.dispose_all();
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let result = Client::connect(Config::default()).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
