// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Host-side field values and bidirectional wire conversion.
//!
//! The service transmits every cell as loosely-shaped JSON whose meaning
//! depends on the column's [`FieldType`]. [`FieldValue`] is the tagged
//! host representation; [`from_wire`] and [`to_wire`] convert per type
//! code. Unknown codes degrade to [`FieldValue::Opaque`] and pass through
//! unchanged in both directions.
//!
//! Conversion rules worth knowing:
//! - datetime ingress treats integers above 10^12 as milliseconds and
//!   smaller ones as seconds; strings try RFC 3339, then
//!   `%Y-%m-%d %H:%M:%S`, then `%Y-%m-%d`
//! - zero datetimes are omitted from write bodies
//! - text ingress flattens the service's segment arrays
//!   (`[{"text": s, "type": "text"}]`) down to the joined string
//! - checkbox ingress accepts true/false/1/0/yes/no/on/off in any case

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::FieldType;

/// Integer timestamps above this are milliseconds, below are seconds.
pub const MILLISECOND_THRESHOLD: i64 = 1_000_000_000_000;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d"];

/// A host-typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absent / empty. Omitted from write bodies.
    Null,
    /// Text-like columns (text, phone, url, barcode).
    Text(String),
    /// Numeric columns (number, currency, progress, rating).
    Number(f64),
    /// Checkbox.
    Bool(bool),
    /// Date/time columns, UTC.
    DateTime(DateTime<Utc>),
    /// Single select option text.
    Selection(String),
    /// Multi select option texts.
    MultiSelection(Vec<String>),
    /// Person references by user id.
    UserRefList(Vec<String>),
    /// Attachment URLs (or tokens, when the service returns those).
    AttachmentList(Vec<String>),
    /// Raw JSON for computed or unregistered columns.
    Opaque(Value),
}

impl FieldValue {
    /// Whether this value would be omitted from a write body.
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::DateTime(dt) => dt.timestamp_millis() == 0,
            _ => false,
        }
    }

    /// Plain JSON rendering with native scalar types, used for filter
    /// values (booleans must stay booleans on the wire).
    #[must_use]
    pub fn to_json_scalar(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Text(s) | Self::Selection(s) => Value::String(s.clone()),
            Self::Number(n) => json!(n),
            Self::Bool(b) => Value::Bool(*b),
            Self::DateTime(dt) => json!(dt.timestamp_millis()),
            Self::MultiSelection(items)
            | Self::UserRefList(items)
            | Self::AttachmentList(items) => json!(items),
            Self::Opaque(v) => v.clone(),
        }
    }

    /// Best-effort numeric coercion, for client-side aggregates.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) | Self::Selection(s) => s.trim().parse().ok(),
            Self::DateTime(dt) => Some(dt.timestamp_millis() as f64),
            _ => None,
        }
    }

    /// Display rendering for listings and tests.
    #[must_use]
    pub fn display_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(s) | Self::Selection(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::Bool(b) => b.to_string(),
            Self::DateTime(dt) => dt.to_rfc3339(),
            Self::MultiSelection(items)
            | Self::UserRefList(items)
            | Self::AttachmentList(items) => items.join(", "),
            Self::Opaque(v) => v.to_string(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}
impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}
impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}
impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}
impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}
impl From<DateTime<Utc>> for FieldValue {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Convert a wire value into the host representation for a column type.
#[must_use]
pub fn from_wire(field_type: FieldType, value: &Value) -> FieldValue {
    if value.is_null() {
        return FieldValue::Null;
    }
    match field_type {
        FieldType::Text | FieldType::Phone | FieldType::Url | FieldType::Barcode => {
            FieldValue::Text(wire_text(value))
        }
        FieldType::Number | FieldType::Currency | FieldType::Progress | FieldType::Rating => {
            FieldValue::Number(wire_number(value))
        }
        FieldType::Checkbox => FieldValue::Bool(wire_bool(value)),
        FieldType::Date | FieldType::CreatedTime | FieldType::ModifiedTime => {
            match wire_datetime(value) {
                Some(dt) => FieldValue::DateTime(dt),
                None => FieldValue::Null,
            }
        }
        FieldType::SingleSelect => match wire_option_text(value) {
            Some(text) => FieldValue::Selection(text),
            None => FieldValue::Null,
        },
        FieldType::MultiSelect => FieldValue::MultiSelection(wire_option_list(value)),
        FieldType::User | FieldType::CreatedUser | FieldType::ModifiedUser => {
            FieldValue::UserRefList(wire_keyed_list(value, &["id"]))
        }
        FieldType::Attachment => {
            FieldValue::AttachmentList(wire_keyed_list(value, &["url", "token"]))
        }
        FieldType::Formula | FieldType::Lookup | FieldType::AutoNumber => {
            FieldValue::Opaque(value.clone())
        }
        FieldType::Unknown(code) => {
            warn!(code, "unknown field type code, passing value through");
            FieldValue::Opaque(value.clone())
        }
    }
}

/// Convert a host value into the wire form for a column type.
///
/// `Ok(None)` means the field is omitted from the write body (nulls and
/// zero datetimes). Writes to read-only computed columns are rejected.
pub fn to_wire(field_type: FieldType, value: &FieldValue) -> Result<Option<Value>> {
    if field_type.is_read_only() {
        return Err(Error::Parse(format!(
            "field type {} (code {}) is read-only",
            field_type.name(),
            field_type.code()
        )));
    }
    if value.is_null() {
        return Ok(None);
    }
    let wire = match field_type {
        FieldType::Text | FieldType::Phone | FieldType::Url | FieldType::Barcode => {
            Value::String(host_text(value))
        }
        FieldType::Number | FieldType::Currency | FieldType::Progress | FieldType::Rating => {
            json!(host_number(value))
        }
        FieldType::Checkbox => Value::Bool(host_bool(value)),
        FieldType::Date => match host_datetime_millis(value) {
            Some(millis) => json!(millis),
            None => return Ok(None),
        },
        FieldType::SingleSelect => match value {
            FieldValue::Text(s) | FieldValue::Selection(s) if !s.is_empty() => {
                json!({ "text": s })
            }
            FieldValue::Opaque(v) if v.get("text").is_some() => v.clone(),
            _ => return Ok(None),
        },
        FieldType::MultiSelect => {
            let items: Vec<Value> = host_string_list(value)
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(|s| json!({ "text": s }))
                .collect();
            Value::Array(items)
        }
        FieldType::User => {
            let items: Vec<Value> = host_string_list(value)
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(|s| json!({ "id": s }))
                .collect();
            Value::Array(items)
        }
        FieldType::Attachment => {
            let items: Vec<Value> = host_string_list(value)
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(|s| json!({ "url": s }))
                .collect();
            Value::Array(items)
        }
        FieldType::Unknown(_) => value.to_json_scalar(),
        // Read-only types were rejected above.
        FieldType::Formula
        | FieldType::Lookup
        | FieldType::CreatedTime
        | FieldType::ModifiedTime
        | FieldType::CreatedUser
        | FieldType::ModifiedUser
        | FieldType::AutoNumber => unreachable!("read-only types rejected earlier"),
    };
    Ok(Some(wire))
}

// --- wire → host helpers ---

fn wire_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        // Segment array: [{"text": "...", "type": "text"}, ...]
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        Value::Object(map) => map
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => scalar_to_string(other),
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn wire_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn wire_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(
            s.to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

fn wire_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let millis = if let Some(int) = n.as_i64() {
                normalize_epoch(int)
            } else {
                normalize_epoch(n.as_f64()? as i64)
            };
            Utc.timestamp_millis_opt(millis).single()
        }
        Value::String(s) => parse_datetime_text(s),
        _ => None,
    }
}

fn normalize_epoch(raw: i64) -> i64 {
    if raw.unsigned_abs() > MILLISECOND_THRESHOLD as u64 {
        raw
    } else {
        raw.saturating_mul(1000)
    }
}

fn parse_datetime_text(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
        }
    }
    None
}

fn wire_option_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("text")
            .or_else(|| map.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn wire_option_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| wire_option_text(item))
            .collect(),
        _ => Vec::new(),
    }
}

fn wire_keyed_list(value: &Value, keys: &[&str]) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => keys
                    .iter()
                    .find_map(|key| map.get(*key))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

// --- host → wire helpers ---

fn host_text(value: &FieldValue) -> String {
    value.display_string()
}

fn host_number(value: &FieldValue) -> f64 {
    value.as_number().unwrap_or(0.0)
}

fn host_bool(value: &FieldValue) -> bool {
    match value {
        FieldValue::Bool(b) => *b,
        FieldValue::Number(n) => *n != 0.0,
        FieldValue::Text(s) | FieldValue::Selection(s) => matches!(
            s.to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        _ => false,
    }
}

fn host_datetime_millis(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::DateTime(dt) => {
            let millis = dt.timestamp_millis();
            (millis != 0).then_some(millis)
        }
        FieldValue::Number(n) => Some(normalize_epoch(*n as i64)),
        FieldValue::Text(s) => parse_datetime_text(s).map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

fn host_string_list(value: &FieldValue) -> Vec<String> {
    match value {
        FieldValue::MultiSelection(items)
        | FieldValue::UserRefList(items)
        | FieldValue::AttachmentList(items) => items.clone(),
        FieldValue::Text(s) | FieldValue::Selection(s) => vec![s.clone()],
        FieldValue::Opaque(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
