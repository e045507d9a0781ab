// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Data model for the multi-dimensional table service.
//!
//! [`FieldType`] is the closed registry of column type codes the service
//! assigns; [`Field`] and [`Table`] are the descriptors fetched from the
//! metadata endpoints; [`Record`] is a host-typed row. Descriptors are
//! transient: looked up, consumed by one translation, discarded (or held
//! briefly by the per-client TTL cache).

pub mod value;

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use value::FieldValue;

/// Column type codes assigned by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Multi-line text (code 1).
    Text,
    /// Number (code 2).
    Number,
    /// Single select (code 3).
    SingleSelect,
    /// Multi select (code 4).
    MultiSelect,
    /// Date/time (code 5).
    Date,
    /// Checkbox (code 7).
    Checkbox,
    /// Person list (code 11).
    User,
    /// Phone number (code 13).
    Phone,
    /// Hyperlink (code 15).
    Url,
    /// Attachment list (code 17).
    Attachment,
    /// Barcode (code 18).
    Barcode,
    /// Progress (code 19).
    Progress,
    /// Currency (code 20).
    Currency,
    /// Rating (code 21).
    Rating,
    /// Formula, computed server-side (code 22).
    Formula,
    /// Lookup reference, computed server-side (code 23).
    Lookup,
    /// Created time, system field (code 1001).
    CreatedTime,
    /// Last modified time, system field (code 1002).
    ModifiedTime,
    /// Created by, system field (code 1003).
    CreatedUser,
    /// Modified by, system field (code 1004).
    ModifiedUser,
    /// Auto number, system field (code 1005).
    AutoNumber,
    /// A code outside the registry. Values pass through opaquely.
    Unknown(i64),
}

impl FieldType {
    /// All registered codes, in code order.
    pub const REGISTERED: [FieldType; 21] = [
        Self::Text,
        Self::Number,
        Self::SingleSelect,
        Self::MultiSelect,
        Self::Date,
        Self::Checkbox,
        Self::User,
        Self::Phone,
        Self::Url,
        Self::Attachment,
        Self::Barcode,
        Self::Progress,
        Self::Currency,
        Self::Rating,
        Self::Formula,
        Self::Lookup,
        Self::CreatedTime,
        Self::ModifiedTime,
        Self::CreatedUser,
        Self::ModifiedUser,
        Self::AutoNumber,
    ];

    /// Resolve a wire code. Unknown codes are preserved and logged once
    /// at the call site that consumes them.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Text,
            2 => Self::Number,
            3 => Self::SingleSelect,
            4 => Self::MultiSelect,
            5 => Self::Date,
            7 => Self::Checkbox,
            11 => Self::User,
            13 => Self::Phone,
            15 => Self::Url,
            17 => Self::Attachment,
            18 => Self::Barcode,
            19 => Self::Progress,
            20 => Self::Currency,
            21 => Self::Rating,
            22 => Self::Formula,
            23 => Self::Lookup,
            1001 => Self::CreatedTime,
            1002 => Self::ModifiedTime,
            1003 => Self::CreatedUser,
            1004 => Self::ModifiedUser,
            1005 => Self::AutoNumber,
            other => Self::Unknown(other),
        }
    }

    /// Wire code for this type.
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            Self::Text => 1,
            Self::Number => 2,
            Self::SingleSelect => 3,
            Self::MultiSelect => 4,
            Self::Date => 5,
            Self::Checkbox => 7,
            Self::User => 11,
            Self::Phone => 13,
            Self::Url => 15,
            Self::Attachment => 17,
            Self::Barcode => 18,
            Self::Progress => 19,
            Self::Currency => 20,
            Self::Rating => 21,
            Self::Formula => 22,
            Self::Lookup => 23,
            Self::CreatedTime => 1001,
            Self::ModifiedTime => 1002,
            Self::CreatedUser => 1003,
            Self::ModifiedUser => 1004,
            Self::AutoNumber => 1005,
            Self::Unknown(code) => *code,
        }
    }

    /// Whether the code is in the registered set.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// System fields are maintained by the service.
    #[must_use]
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            Self::CreatedTime
                | Self::ModifiedTime
                | Self::CreatedUser
                | Self::ModifiedUser
                | Self::AutoNumber
        )
    }

    /// Read-only columns reject writes: system fields plus server-computed
    /// formula and lookup columns.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.is_system() || matches!(self, Self::Formula | Self::Lookup)
    }

    /// UI type label the field endpoints expect alongside the code.
    #[must_use]
    pub fn ui_type(&self) -> &'static str {
        match self {
            Self::Text | Self::Unknown(_) => "Text",
            Self::Number => "Number",
            Self::SingleSelect => "SingleSelect",
            Self::MultiSelect => "MultiSelect",
            Self::Date => "DateTime",
            Self::Checkbox => "Checkbox",
            Self::User => "User",
            Self::Phone => "Phone",
            Self::Url => "Url",
            Self::Attachment => "Attachment",
            Self::Barcode => "Barcode",
            Self::Progress => "Progress",
            Self::Currency => "Currency",
            Self::Rating => "Rating",
            Self::Formula => "Formula",
            Self::Lookup => "Lookup",
            Self::CreatedTime => "CreatedTime",
            Self::ModifiedTime => "ModifiedTime",
            Self::CreatedUser => "CreatedUser",
            Self::ModifiedUser => "ModifiedUser",
            Self::AutoNumber => "AutoNumber",
        }
    }

    /// Human-readable name for listings.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::SingleSelect => "single select",
            Self::MultiSelect => "multi select",
            Self::Date => "date",
            Self::Checkbox => "checkbox",
            Self::User => "user",
            Self::Phone => "phone",
            Self::Url => "url",
            Self::Attachment => "attachment",
            Self::Barcode => "barcode",
            Self::Progress => "progress",
            Self::Currency => "currency",
            Self::Rating => "rating",
            Self::Formula => "formula",
            Self::Lookup => "lookup",
            Self::CreatedTime => "created time",
            Self::ModifiedTime => "modified time",
            Self::CreatedUser => "created user",
            Self::ModifiedUser => "modified user",
            Self::AutoNumber => "auto number",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_code(i64::deserialize(deserializer)?))
    }
}

/// Field descriptor as returned by the field metadata endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    #[serde(default)]
    pub field_id: String,
    pub field_name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub property: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<serde_json::Value>,
    #[serde(default)]
    pub is_primary: bool,
}

impl Field {
    /// Descriptor with just a name and type, for requests and tests.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            field_id: String::new(),
            field_name: name.into(),
            field_type,
            property: None,
            description: None,
            is_primary: false,
        }
    }
}

/// Table descriptor as returned by the table metadata endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub table_id: String,
    pub name: String,
    #[serde(default)]
    pub revision: i64,
}

/// User reference carried on system fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub en_name: String,
    #[serde(default)]
    pub email: String,
}

impl User {
    /// Display name, preferring the localized one.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.en_name
        } else {
            &self.name
        }
    }
}

/// A row with host-typed field values.
///
/// Produced by the bridge after converting wire values through the field
/// descriptors; `fields` maps field names to [`FieldValue`]s.
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub record_id: String,
    pub fields: HashMap<String, FieldValue>,
    /// Milliseconds since epoch, zero when the service omitted it.
    pub created_time: i64,
    pub last_modified_time: i64,
    pub created_by: Option<User>,
    pub last_modified_by: Option<User>,
}

impl Record {
    /// Value of a field, if present.
    #[must_use]
    pub fn get(&self, field_name: &str) -> Option<&FieldValue> {
        self.fields.get(field_name)
    }

    /// Set a field value.
    pub fn set(&mut self, field_name: impl Into<String>, value: FieldValue) {
        self.fields.insert(field_name.into(), value);
    }
}
