// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Schema reconciliation against the remote table service.
//!
//! The ORM layer hands over an explicit [`TableSchema`] (no reflection
//! in the core); the migrator creates the table when absent, otherwise
//! adds missing fields and alters fields whose mapped type changed.
//! Fields are never deleted, and the primary field is never altered.
//!
//! Per-field decision:
//!
//! ```text
//! START → exists? ── no ──→ CREATE
//!            │ yes
//!            ▼
//!        type match? ── no ──→ ALTER
//!            │ yes
//!            ▼
//!          NOOP
//! ```

use serde_json::Map;
use tracing::{info, warn};

use crate::client::Client;
use crate::error::Result;
use crate::model::{Field, FieldType};
use crate::protocol::{CreateTableRequest, FieldBody, TableSpec};

/// Default view name for migrator-created tables.
const DEFAULT_VIEW_NAME: &str = "Grid View";

/// Host-side column type, as declared by the ORM layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostType {
    Bool,
    Int,
    Uint,
    Float,
    String,
    Bytes,
    DateTime,
    /// Anything else maps to text with a warning.
    Other,
}

impl HostType {
    /// Remote type code for this host type.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Bool => FieldType::Checkbox,
            Self::Int | Self::Uint | Self::Float => FieldType::Number,
            Self::String | Self::Bytes => FieldType::Text,
            Self::DateTime => FieldType::Date,
            Self::Other => {
                warn!("unmapped host type defaults to text");
                FieldType::Text
            }
        }
    }
}

/// One column of a host schema.
#[derive(Debug, Clone)]
pub struct SchemaField {
    pub name: String,
    pub host_type: HostType,
    pub description: Option<String>,
    /// Auto-increment columns are skipped entirely; the service assigns
    /// record ids itself.
    pub auto_increment: bool,
}

impl SchemaField {
    #[must_use]
    pub fn new(name: impl Into<String>, host_type: HostType) -> Self {
        Self {
            name: name.into(),
            host_type,
            description: None,
            auto_increment: false,
        }
    }
}

/// A host schema to reconcile.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub fields: Vec<SchemaField>,
}

/// Outcome of the per-field decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    Noop,
    Create,
    Alter,
}

/// Decide what to do for one schema field given the remote state.
#[must_use]
pub fn plan_step(existing: Option<&Field>, expected: FieldType) -> MigrationStep {
    match existing {
        None => MigrationStep::Create,
        Some(field) if field.is_primary => MigrationStep::Noop,
        Some(field) if field.field_type == expected => MigrationStep::Noop,
        Some(_) => MigrationStep::Alter,
    }
}

/// Maps host schemas onto remote tables and fields.
#[derive(Clone)]
pub struct Migrator {
    client: Client,
}

impl Migrator {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create the table when absent, then reconcile its columns.
    pub async fn auto_migrate(&self, schema: &TableSchema) -> Result<()> {
        if self.has_table(&schema.name).await? {
            self.reconcile_columns(schema).await
        } else {
            self.create_table(schema).await
        }
    }

    /// Whether a table with the schema's name exists.
    pub async fn has_table(&self, table_name: &str) -> Result<bool> {
        let tables = self.client.list_tables().await?;
        Ok(tables
            .iter()
            .any(|t| t.name == table_name || t.table_id == table_name))
    }

    /// Create a table with the derived field list and default view.
    pub async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let fields: Vec<FieldBody> = schema
            .fields
            .iter()
            .filter(|field| !field.auto_increment)
            .map(|field| {
                let field_type = field.host_type.field_type();
                FieldBody {
                    field_name: field.name.clone(),
                    type_code: field_type.code(),
                    ui_type: field_type.ui_type(),
                    description: field.description.clone(),
                    property: Map::new(),
                }
            })
            .collect();

        let request = CreateTableRequest {
            table: TableSpec {
                name: schema.name.clone(),
                default_view_name: Some(DEFAULT_VIEW_NAME.into()),
                fields,
            },
        };
        self.client.create_table(request).await?;
        info!(table = %schema.name, "table created");
        Ok(())
    }

    /// Drop a table by name.
    pub async fn drop_table(&self, table_name: &str) -> Result<()> {
        self.client.drop_table(table_name).await
    }

    /// Add missing fields and alter type-changed ones. Never deletes a
    /// field; never touches the primary field.
    pub async fn reconcile_columns(&self, schema: &TableSchema) -> Result<()> {
        let table_id = self.client.table_id(&schema.name).await?;
        let existing = self.client.list_fields(&table_id).await?;
        let mut changed = false;

        for field in &schema.fields {
            if field.auto_increment {
                continue;
            }
            let expected = field.host_type.field_type();
            let current = existing.iter().find(|f| f.field_name == field.name);

            match (plan_step(current, expected), current) {
                (MigrationStep::Noop, _) => {}
                (MigrationStep::Create, _) => {
                    self.client
                        .create_field(
                            &table_id,
                            FieldBody {
                                field_name: field.name.clone(),
                                type_code: expected.code(),
                                ui_type: expected.ui_type(),
                                description: field.description.clone(),
                                property: Map::new(),
                            },
                        )
                        .await?;
                    info!(table = %schema.name, field = %field.name, "field created");
                    changed = true;
                }
                (MigrationStep::Alter, Some(current)) => {
                    self.client
                        .update_field(
                            &table_id,
                            &current.field_id,
                            FieldBody {
                                field_name: field.name.clone(),
                                type_code: expected.code(),
                                ui_type: expected.ui_type(),
                                description: field.description.clone(),
                                property: Map::new(),
                            },
                        )
                        .await?;
                    info!(
                        table = %schema.name,
                        field = %field.name,
                        from = current.field_type.code(),
                        to = expected.code(),
                        "field type altered"
                    );
                    changed = true;
                }
                // plan_step never returns Alter without an existing field.
                (MigrationStep::Alter, None) => {}
            }
        }

        if changed {
            self.client.invalidate_descriptor(&schema.name);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_type_mapping() {
        assert_eq!(HostType::Bool.field_type(), FieldType::Checkbox);
        assert_eq!(HostType::Int.field_type(), FieldType::Number);
        assert_eq!(HostType::Uint.field_type(), FieldType::Number);
        assert_eq!(HostType::Float.field_type(), FieldType::Number);
        assert_eq!(HostType::String.field_type(), FieldType::Text);
        assert_eq!(HostType::Bytes.field_type(), FieldType::Text);
        assert_eq!(HostType::DateTime.field_type(), FieldType::Date);
        assert_eq!(HostType::Other.field_type(), FieldType::Text);
    }

    #[test]
    fn test_plan_missing_field_creates() {
        assert_eq!(plan_step(None, FieldType::Text), MigrationStep::Create);
    }

    #[test]
    fn test_plan_matching_type_noops() {
        let field = Field::new("age", FieldType::Number);
        assert_eq!(
            plan_step(Some(&field), FieldType::Number),
            MigrationStep::Noop
        );
    }

    #[test]
    fn test_plan_changed_type_alters() {
        let field = Field::new("age", FieldType::Text);
        assert_eq!(
            plan_step(Some(&field), FieldType::Number),
            MigrationStep::Alter
        );
    }

    #[test]
    fn test_plan_never_alters_primary_field() {
        let field = Field {
            is_primary: true,
            ..Field::new("id", FieldType::Text)
        };
        assert_eq!(
            plan_step(Some(&field), FieldType::Number),
            MigrationStep::Noop
        );
    }
}
