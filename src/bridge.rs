// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! ORM-style record bridge.
//!
//! The bridge routes object-mapped CRUD through the executor. It never
//! reflects: the ORM layer implements [`RecordAdapter`] to expose a
//! bound object's table, primary key and field values, and the bridge
//! does the descriptor lookups, value conversion and REST calls.
//!
//! There are no transactional semantics. [`Bridge::begin`] exists to
//! preserve API shape: commit is a no-op and rollback only logs, because
//! the remote service cannot roll anything back.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::cache::TableDescriptor;
use crate::client::Client;
use crate::error::{Error, Result};
use crate::filter::{filter_from_query, sort_from_order_keys};
use crate::model::value::{from_wire, to_wire};
use crate::model::{FieldValue, Record};
use crate::protocol::WireRecord;
use crate::query::Query;

/// Role of a bound object's field, as declared by the ORM layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Ordinary data column.
    Data,
    /// The object's primary key (maps to the record id; never written).
    PrimaryKey,
    /// Auto-increment column (never written; the service assigns it).
    AutoIncrement,
    /// Creation timestamp maintained by the service.
    CreatedAt,
    /// Modification timestamp maintained by the service.
    UpdatedAt,
}

/// The seam between the ORM layer and the bridge.
///
/// Implementations expose a bound object's state without the bridge ever
/// touching reflection.
pub trait RecordAdapter: Send {
    /// Mapped table name.
    fn table(&self) -> &str;

    /// Current primary key (record id), when the object has one.
    fn primary_key(&self) -> Option<String>;

    /// All mapped fields as `(column, value, role)`.
    fn fields(&self) -> Vec<(String, FieldValue, FieldRole)>;

    /// Write a fetched value back into the object.
    fn set_field(&mut self, name: &str, value: FieldValue);

    /// Write the server-assigned record id back into the object.
    fn set_primary_key(&mut self, record_id: &str);
}

/// Emulated transaction handle.
pub struct Transaction {
    _private: (),
}

impl Transaction {
    /// No-op: every write already committed when its call returned.
    pub fn commit(self) -> Result<()> {
        Ok(())
    }

    /// Logs a warning; the remote API cannot undo committed writes.
    pub fn rollback(self) -> Result<()> {
        warn!("rollback requested, but the remote service cannot roll back committed writes");
        Ok(())
    }
}

/// Convert a wire record into host types using the table's descriptors.
#[must_use]
pub(crate) fn record_from_wire(descriptor: &TableDescriptor, wire: WireRecord) -> Record {
    let mut record = Record {
        record_id: wire.record_id,
        created_time: wire.created_time,
        last_modified_time: wire.last_modified_time,
        created_by: wire.created_by,
        last_modified_by: wire.last_modified_by,
        ..Record::default()
    };
    for (name, value) in wire.fields {
        let field_value = match descriptor.field(&name) {
            Some(field) => from_wire(field.field_type, &value),
            // Derived or unlisted columns come back opaque.
            None => FieldValue::Opaque(value),
        };
        record.fields.insert(name, field_value);
    }
    record
}

/// Build a wire field map from `(name, value)` pairs, converting through
/// the descriptors. Unknown columns pass through unconverted; nulls and
/// zero datetimes are omitted; read-only columns are skipped with a
/// warning rather than failing the whole write.
pub(crate) fn wire_fields_from_pairs<'a, I>(
    descriptor: &TableDescriptor,
    pairs: I,
) -> Result<Map<String, Value>>
where
    I: IntoIterator<Item = (&'a String, &'a FieldValue)>,
{
    let mut fields = Map::new();
    for (name, value) in pairs {
        if value.is_null() {
            continue;
        }
        match descriptor.field(name) {
            Some(field) => {
                if field.field_type.is_read_only() {
                    warn!(field = %name, "skipping write to read-only field");
                    continue;
                }
                if let Some(wire) = to_wire(field.field_type, value)? {
                    fields.insert(name.clone(), wire);
                }
            }
            None => {
                fields.insert(name.clone(), value.to_json_scalar());
            }
        }
    }
    Ok(fields)
}

/// Apply a fetched record to a bound object.
pub fn apply_record(adapter: &mut dyn RecordAdapter, record: &Record) {
    adapter.set_primary_key(&record.record_id);
    for (name, value) in &record.fields {
        adapter.set_field(name, value.clone());
    }
}

/// ORM-style CRUD over the executor.
#[derive(Clone)]
pub struct Bridge {
    client: Client,
}

impl Bridge {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Begin an emulated transaction.
    #[must_use]
    pub fn begin(&self) -> Transaction {
        Transaction { _private: () }
    }

    /// Insert the bound object as a new record. Primary key,
    /// auto-increment and auto-timestamp fields are skipped, as are
    /// zero-value datetimes. The server-assigned record id is written
    /// back; returns affected rows (always 1).
    pub async fn create(&self, adapter: &mut dyn RecordAdapter) -> Result<u64> {
        let descriptor = self.client.descriptor(adapter.table()).await?;
        let data: Vec<(String, FieldValue)> = adapter
            .fields()
            .into_iter()
            .filter(|(_, _, role)| *role == FieldRole::Data)
            .map(|(name, value, _)| (name, value))
            .collect();
        let fields = wire_fields_from_pairs(&descriptor, data.iter().map(|(n, v)| (n, v)))?;
        if fields.is_empty() {
            return Err(Error::Parse("no writable fields on the bound object".into()));
        }

        let record = self
            .client
            .create_record(&descriptor.table_id, fields)
            .await?;
        debug!(table = adapter.table(), record_id = %record.record_id, "record created");
        adapter.set_primary_key(&record.record_id);
        Ok(1)
    }

    /// Query records. No field list is sent, so derived columns come
    /// back too; WHERE, ORDER BY and LIMIT translate onto the request.
    pub async fn find(&self, table: &str, query: &Query) -> Result<Vec<Record>> {
        let descriptor = self.client.descriptor(table).await?;
        let filter = filter_from_query(query)?;
        let sort = sort_from_order_keys(query.order_keys());

        let wire_records = self
            .client
            .records(&descriptor.table_id)
            .with_filter(filter)
            .with_sort(sort)
            .with_limit(query.limit_value())
            .collect_all()
            .await?;

        Ok(wire_records
            .into_iter()
            .map(|wire| record_from_wire(&descriptor, wire))
            .collect())
    }

    /// Query records and hydrate them through a factory of bound objects.
    pub async fn find_into<A, F>(&self, table: &str, query: &Query, mut make: F) -> Result<Vec<A>>
    where
        A: RecordAdapter,
        F: FnMut() -> A,
    {
        let records = self.find(table, query).await?;
        let mut results = Vec::with_capacity(records.len());
        for record in &records {
            let mut adapter = make();
            apply_record(&mut adapter, record);
            results.push(adapter);
        }
        Ok(results)
    }

    /// Update the record backing the bound object. The record id comes
    /// from the object's primary key, else from a primary-key equality
    /// in `query`; with neither, the update fails.
    pub async fn update(
        &self,
        adapter: &dyn RecordAdapter,
        query: Option<&Query>,
    ) -> Result<u64> {
        let descriptor = self.client.descriptor(adapter.table()).await?;
        let record_id = self.resolve_record_id(adapter, query, &descriptor)?;

        let data: Vec<(String, FieldValue)> = adapter
            .fields()
            .into_iter()
            .filter(|(_, _, role)| *role == FieldRole::Data)
            .map(|(name, value, _)| (name, value))
            .collect();
        let fields = wire_fields_from_pairs(&descriptor, data.iter().map(|(n, v)| (n, v)))?;
        if fields.is_empty() {
            return Err(Error::Parse("no fields to update".into()));
        }

        self.client
            .update_record(&descriptor.table_id, &record_id, fields)
            .await?;
        Ok(1)
    }

    /// Update specific columns of one record by id.
    pub async fn update_fields(
        &self,
        table: &str,
        record_id: &str,
        values: &[(String, FieldValue)],
    ) -> Result<u64> {
        let descriptor = self.client.descriptor(table).await?;
        let fields = wire_fields_from_pairs(&descriptor, values.iter().map(|(n, v)| (n, v)))?;
        if fields.is_empty() {
            return Err(Error::Parse("no fields to update".into()));
        }
        self.client
            .update_record(&descriptor.table_id, record_id, fields)
            .await?;
        Ok(1)
    }

    /// Delete the record backing the bound object, resolving the id the
    /// same way as [`update`](Self::update).
    pub async fn delete(
        &self,
        adapter: &dyn RecordAdapter,
        query: Option<&Query>,
    ) -> Result<u64> {
        let descriptor = self.client.descriptor(adapter.table()).await?;
        let record_id = self.resolve_record_id(adapter, query, &descriptor)?;
        self.client
            .delete_record(&descriptor.table_id, &record_id)
            .await?;
        Ok(1)
    }

    /// Re-parse and dispatch raw SQL through the statement executor.
    pub async fn raw(&self, sql: &str) -> Result<crate::exec::StatementResult> {
        self.client.statements().execute_sql(sql).await
    }

    fn resolve_record_id(
        &self,
        adapter: &dyn RecordAdapter,
        query: Option<&Query>,
        descriptor: &TableDescriptor,
    ) -> Result<String> {
        if let Some(id) = adapter.primary_key() {
            if !id.is_empty() {
                return Ok(id);
            }
        }
        if let Some(query) = query {
            // A primary-key equality in the WHERE clause names the record.
            if let Some(primary) = descriptor.primary_field() {
                if let Some(value) = query.eq_value(&primary.field_name) {
                    return Ok(value.display_string());
                }
            }
            if let Some(value) = query.eq_value("record_id") {
                return Ok(value.display_string());
            }
        }
        Err(Error::RecordNotFound(format!(
            "no record id for table {}",
            adapter.table()
        )))
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge").finish_non_exhaustive()
    }
}
