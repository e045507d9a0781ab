// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Wire types for the Bitable REST surface.
//!
//! Every response arrives in an envelope `{code, msg, data}`; `code == 0`
//! denotes success. Paths are built relative to the `/open-apis` prefix
//! the executor prepends. The shapes here interoperate bit-exactly with
//! the service; do not "clean them up".

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::model::{Field, Table, User};

/// The service caps page sizes at 500 records.
pub const MAX_PAGE_SIZE: usize = 500;

/// The batch record endpoints accept at most 500 records per call.
pub const MAX_BATCH_RECORDS: usize = 500;

// --- paths ---

/// `/bitable/v1/apps/{app_token}/tables`
#[must_use]
pub fn tables_path(app_token: &str) -> String {
    format!("/bitable/v1/apps/{app_token}/tables")
}

/// `/bitable/v1/apps/{app_token}/tables/{table_id}`
#[must_use]
pub fn table_path(app_token: &str, table_id: &str) -> String {
    format!("/bitable/v1/apps/{app_token}/tables/{table_id}")
}

/// `/bitable/v1/apps/{app_token}/tables/{table_id}/fields`
#[must_use]
pub fn fields_path(app_token: &str, table_id: &str) -> String {
    format!("/bitable/v1/apps/{app_token}/tables/{table_id}/fields")
}

/// `/bitable/v1/apps/{app_token}/tables/{table_id}/fields/{field_id}`
#[must_use]
pub fn field_path(app_token: &str, table_id: &str, field_id: &str) -> String {
    format!("/bitable/v1/apps/{app_token}/tables/{table_id}/fields/{field_id}")
}

/// `/bitable/v1/apps/{app_token}/tables/{table_id}/records`
#[must_use]
pub fn records_path(app_token: &str, table_id: &str) -> String {
    format!("/bitable/v1/apps/{app_token}/tables/{table_id}/records")
}

/// `/bitable/v1/apps/{app_token}/tables/{table_id}/records/{record_id}`
#[must_use]
pub fn record_path(app_token: &str, table_id: &str, record_id: &str) -> String {
    format!("/bitable/v1/apps/{app_token}/tables/{table_id}/records/{record_id}")
}

/// `/bitable/v1/apps/{app_token}/tables/{table_id}/records/search`
#[must_use]
pub fn search_path(app_token: &str, table_id: &str) -> String {
    format!("/bitable/v1/apps/{app_token}/tables/{table_id}/records/search")
}

/// `/bitable/v1/apps/{app_token}/tables/{table_id}/records/batch_create`
#[must_use]
pub fn batch_create_path(app_token: &str, table_id: &str) -> String {
    format!("/bitable/v1/apps/{app_token}/tables/{table_id}/records/batch_create")
}

/// `/bitable/v1/apps/{app_token}/tables/{table_id}/records/batch_update`
#[must_use]
pub fn batch_update_path(app_token: &str, table_id: &str) -> String {
    format!("/bitable/v1/apps/{app_token}/tables/{table_id}/records/batch_update")
}

/// `/bitable/v1/apps/{app_token}/tables/{table_id}/records/batch_delete`
#[must_use]
pub fn batch_delete_path(app_token: &str, table_id: &str) -> String {
    format!("/bitable/v1/apps/{app_token}/tables/{table_id}/records/batch_delete")
}

// --- envelope ---

/// Standard response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwrap the payload, converting a non-zero code into the matching
    /// error classification.
    pub fn into_data(self) -> Result<T> {
        if self.code != 0 {
            return Err(Error::from_server_code(self.code, self.msg));
        }
        self.data
            .ok_or_else(|| Error::Api {
                code: 0,
                msg: "success envelope carried no data".into(),
            })
    }
}

// --- filter DSL ---

/// Server-side filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "is")]
    Is,
    #[serde(rename = "isNot")]
    IsNot,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "doesNotContain")]
    DoesNotContain,
    #[serde(rename = "isEmpty")]
    IsEmpty,
    #[serde(rename = "isNotEmpty")]
    IsNotEmpty,
    #[serde(rename = "isGreater")]
    IsGreater,
    #[serde(rename = "isGreaterEqual")]
    IsGreaterEqual,
    #[serde(rename = "isLess")]
    IsLess,
    #[serde(rename = "isLessEqual")]
    IsLessEqual,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "isAnyOf")]
    IsAnyOf,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "notIn")]
    NotIn,
}

impl FilterOperator {
    /// Operators that carry at least one value.
    #[must_use]
    pub fn needs_values(&self) -> bool {
        !matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }

    /// Wire name of the operator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Is => "is",
            Self::IsNot => "isNot",
            Self::Contains => "contains",
            Self::DoesNotContain => "doesNotContain",
            Self::IsEmpty => "isEmpty",
            Self::IsNotEmpty => "isNotEmpty",
            Self::IsGreater => "isGreater",
            Self::IsGreaterEqual => "isGreaterEqual",
            Self::IsLess => "isLess",
            Self::IsLessEqual => "isLessEqual",
            Self::Like => "like",
            Self::IsAnyOf => "isAnyOf",
            Self::In => "in",
            Self::NotIn => "notIn",
        }
    }
}

/// One server-side predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field_name: String,
    pub operator: FilterOperator,
    pub value: Vec<Value>,
}

impl FilterCondition {
    pub fn validate(&self) -> Result<()> {
        if self.field_name.is_empty() {
            return Err(Error::Parse("filter condition needs a field name".into()));
        }
        if self.operator.needs_values() && self.value.is_empty() {
            return Err(Error::Parse(format!(
                "operator {} needs at least one value",
                self.operator.as_str()
            )));
        }
        Ok(())
    }
}

/// Conjunction over a condition list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conjunction {
    And,
    Or,
}

/// The service's JSON predicate language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    pub conjunction: Conjunction,
    pub conditions: Vec<FilterCondition>,
}

impl FilterRequest {
    /// An `and` over the given conditions.
    #[must_use]
    pub fn all(conditions: Vec<FilterCondition>) -> Self {
        Self {
            conjunction: Conjunction::And,
            conditions,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.conditions.is_empty() {
            return Err(Error::Parse("filter needs at least one condition".into()));
        }
        for condition in &self.conditions {
            condition.validate()?;
        }
        Ok(())
    }
}

// --- records ---

/// Record as it travels on the wire: field values are raw JSON whose
/// interpretation needs the field descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRecord {
    #[serde(default)]
    pub record_id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub last_modified_time: i64,
    #[serde(default)]
    pub created_by: Option<User>,
    #[serde(default)]
    pub last_modified_by: Option<User>,
}

/// Query body for list and search calls.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListRecordsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterRequest>,
    /// Sort keys; a leading `-` marks descending order.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sort: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub field_names: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub text_field_as_array: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id_type: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub display_formula: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub automatic_fields: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
}

impl ListRecordsRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(size) = self.page_size {
            if size == 0 || size > MAX_PAGE_SIZE {
                return Err(Error::Parse(format!(
                    "page_size must be between 1 and {MAX_PAGE_SIZE}"
                )));
            }
        }
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        Ok(())
    }
}

/// One page of records.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRecordsResponse {
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub items: Vec<WireRecord>,
}

/// Create / update record body: `{fields}`.
#[derive(Debug, Clone, Serialize)]
pub struct RecordFieldsBody {
    pub fields: Map<String, Value>,
}

impl RecordFieldsBody {
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(Error::Parse("record body needs at least one field".into()));
        }
        Ok(())
    }
}

/// `{record}` payload returned by create and update.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordResponse {
    pub record: WireRecord,
}

/// Payload returned by record deletion.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRecordResponse {
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub record_id: String,
}

/// Batch create body.
#[derive(Debug, Clone, Serialize)]
pub struct BatchCreateRequest {
    pub records: Vec<RecordFieldsBody>,
}

/// Batch update entry and body.
#[derive(Debug, Clone, Serialize)]
pub struct BatchUpdateRecord {
    pub record_id: String,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchUpdateRequest {
    pub records: Vec<BatchUpdateRecord>,
}

/// Batch delete body: record ids.
#[derive(Debug, Clone, Serialize)]
pub struct BatchDeleteRequest {
    pub records: Vec<String>,
}

/// `{records}` payload returned by the batch endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRecordsResponse {
    #[serde(default)]
    pub records: Vec<WireRecord>,
}

pub(crate) fn validate_batch_len(len: usize) -> Result<()> {
    if len == 0 {
        return Err(Error::Parse("batch needs at least one record".into()));
    }
    if len > MAX_BATCH_RECORDS {
        return Err(Error::Parse(format!(
            "batch size {len} exceeds the {MAX_BATCH_RECORDS}-record limit"
        )));
    }
    Ok(())
}

// --- tables and fields ---

/// One page of tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTablesResponse {
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub items: Vec<Table>,
}

/// One page of fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFieldsResponse {
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub items: Vec<Field>,
}

/// Field creation / alteration body.
#[derive(Debug, Clone, Serialize)]
pub struct FieldBody {
    pub field_name: String,
    #[serde(rename = "type")]
    pub type_code: i64,
    pub ui_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub property: Map<String, Value>,
}

/// `{field}` payload returned by the field endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldResponse {
    pub field: Field,
}

/// Table creation body: `{table: {name, default_view_name, fields}}`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateTableRequest {
    pub table: TableSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_view_name: Option<String>,
    pub fields: Vec<FieldBody>,
}

impl CreateTableRequest {
    pub fn validate(&self) -> Result<()> {
        crate::security::validate_identifier(&self.table.name, "table name")?;
        if self.table.fields.is_empty() {
            return Err(Error::Parse("a table needs at least one field".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &self.table.fields {
            crate::security::validate_identifier(&field.field_name, "field name")?;
            if !seen.insert(field.field_name.as_str()) {
                return Err(Error::Parse(format!(
                    "duplicate field name {:?}",
                    field.field_name
                )));
            }
        }
        Ok(())
    }
}

/// `{table_id, default_view_id}` payload returned by table creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTableResponse {
    #[serde(default)]
    pub table_id: String,
    #[serde(default)]
    pub default_view_id: String,
}
