// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Statement executor: dispatches a parsed [`Statement`] onto REST calls.
//!
//! SELECT goes through the search/list endpoints with server-side
//! filtering; aggregates are computed client-side over the fetched rows
//! (the service has no aggregate endpoint). Bulk UPDATE/DELETE first
//! resolves the matching record ids, then issues one call per record. The
//! batch endpoints are avoided here so a mid-stream failure has an
//! exact, reportable boundary. Rows applied before such a
//! failure stay committed; the result carries a distinguished warning
//! because the remote cannot roll back.

use tracing::warn;

use crate::bridge::wire_fields_from_pairs;
use crate::client::Client;
use crate::error::{Error, Result};
use crate::filter::filter_from_predicate;
use crate::model::{Field, FieldValue, Record, Table};
use crate::protocol::{CreateTableRequest, FieldBody, FilterRequest, TableSpec};
use crate::sql::{parser, Aggregate, AggregateFunction, ShowKind, Statement, StatementKind};

/// Default view name used when statements create tables.
const DEFAULT_VIEW_NAME: &str = "Grid View";

/// Distinguished events surfaced alongside a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// DELETE without WHERE: every record in the table was targeted.
    UnboundedDelete { table: String },
    /// UPDATE without WHERE: every record in the table was targeted.
    UnboundedUpdate { table: String },
    /// A multi-row operation failed partway; applied rows stay committed.
    PartialWriteNotRolledBack { affected: u64 },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnboundedDelete { table } => {
                write!(f, "DELETE without WHERE targets every record in {table}")
            }
            Self::UnboundedUpdate { table } => {
                write!(f, "UPDATE without WHERE targets every record in {table}")
            }
            Self::PartialWriteNotRolledBack { affected } => write!(
                f,
                "{affected} row(s) were applied before the failure and cannot be rolled back"
            ),
        }
    }
}

/// Computed aggregate of an aggregate SELECT.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub function: AggregateFunction,
    pub field: String,
    pub value: FieldValue,
}

/// Outcome of one statement.
#[derive(Debug, Default)]
pub struct StatementResult {
    /// Projection for row sets.
    pub columns: Vec<String>,
    /// Fetched rows (SELECT).
    pub rows: Vec<Record>,
    /// Rows written (INSERT/UPDATE/DELETE), tables created/dropped.
    pub affected: u64,
    /// Aggregate value, when the SELECT carried one.
    pub aggregate: Option<AggregateResult>,
    /// SHOW TABLES / SHOW DATABASES listings.
    pub tables: Vec<Table>,
    pub databases: Vec<String>,
    /// SHOW COLUMNS / DESCRIBE listings.
    pub fields: Vec<Field>,
    /// Distinguished events the caller must surface.
    pub warnings: Vec<Warning>,
}

/// Executes parsed statements against the remote service.
#[derive(Clone)]
pub struct StatementExecutor {
    client: Client,
}

impl StatementExecutor {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Parse (guarding against injection) and execute SQL text.
    pub async fn execute_sql(&self, sql: &str) -> Result<StatementResult> {
        let statement = parser::parse(sql)?;
        self.execute(statement).await
    }

    /// Execute a parsed statement.
    pub async fn execute(&self, statement: Statement) -> Result<StatementResult> {
        statement.validate()?;
        match statement.kind {
            StatementKind::Select => self.run_select(&statement).await,
            StatementKind::Insert => self.run_insert(&statement).await,
            StatementKind::Update => self.run_update(&statement).await,
            StatementKind::Delete => self.run_delete(&statement).await,
            StatementKind::Show => self.run_show(&statement).await,
            StatementKind::Describe => self.run_describe(&statement).await,
            StatementKind::Create => self.run_create(&statement).await,
            StatementKind::Drop => self.run_drop(&statement).await,
        }
    }

    async fn run_select(&self, statement: &Statement) -> Result<StatementResult> {
        let descriptor = self.client.descriptor(&statement.table).await?;
        let filter = statement
            .predicate
            .as_ref()
            .map(filter_from_predicate)
            .transpose()?;

        let sort: Vec<String> = statement
            .order_by
            .iter()
            .map(|key| {
                if key.descending {
                    format!("-{}", key.field)
                } else {
                    key.field.clone()
                }
            })
            .collect();

        // OFFSET is applied client-side, so the fetch cap must cover it.
        let offset = statement.offset.unwrap_or(0);
        let fetch_limit = statement.limit.map(|limit| limit.saturating_add(offset));

        let wire_records = self
            .client
            .records(&descriptor.table_id)
            .with_filter(filter)
            .with_sort(sort)
            .with_limit(fetch_limit)
            .collect_all()
            .await?;

        let mut rows: Vec<Record> = wire_records
            .into_iter()
            .map(|wire| crate::bridge::record_from_wire(&descriptor, wire))
            .collect();
        if offset > 0 {
            rows.drain(..offset.min(rows.len()));
        }

        let mut result = StatementResult::default();
        if let Some(aggregate) = &statement.aggregate {
            result.aggregate = Some(compute_aggregate(aggregate, &rows)?);
            result.columns = vec![format!(
                "{}({})",
                aggregate.function.name(),
                aggregate.field
            )];
        } else {
            result.columns = if statement.is_select_all() {
                descriptor
                    .fields
                    .iter()
                    .map(|f| f.field_name.clone())
                    .collect()
            } else {
                statement.fields.clone()
            };
            result.rows = rows;
        }
        Ok(result)
    }

    async fn run_insert(&self, statement: &Statement) -> Result<StatementResult> {
        let descriptor = self.client.descriptor(&statement.table).await?;
        let pairs: Vec<(String, FieldValue)> = statement
            .values
            .iter()
            .map(|(name, value)| (name.clone(), value.to_field_value()))
            .collect();
        let fields = wire_fields_from_pairs(&descriptor, pairs.iter().map(|(n, v)| (n, v)))?;
        if fields.is_empty() {
            return Err(Error::Parse("INSERT produced no writable fields".into()));
        }
        self.client
            .create_record(&descriptor.table_id, fields)
            .await?;
        Ok(StatementResult {
            affected: 1,
            ..StatementResult::default()
        })
    }

    async fn run_update(&self, statement: &Statement) -> Result<StatementResult> {
        let descriptor = self.client.descriptor(&statement.table).await?;
        let pairs: Vec<(String, FieldValue)> = statement
            .set
            .iter()
            .map(|(name, value)| (name.clone(), value.to_field_value()))
            .collect();
        let fields = wire_fields_from_pairs(&descriptor, pairs.iter().map(|(n, v)| (n, v)))?;
        if fields.is_empty() {
            return Err(Error::Parse("UPDATE produced no writable fields".into()));
        }

        let mut result = StatementResult::default();
        let filter = match &statement.predicate {
            Some(predicate) => Some(filter_from_predicate(predicate)?),
            None => {
                warn!(table = %statement.table, "UPDATE without WHERE targets all records");
                result.warnings.push(Warning::UnboundedUpdate {
                    table: statement.table.clone(),
                });
                None
            }
        };
        let targets = self.matching_record_ids(&descriptor.table_id, filter).await?;

        let mut affected: u64 = 0;
        for record_id in targets {
            if let Err(source) = self
                .client
                .update_record(&descriptor.table_id, &record_id, fields.clone())
                .await
            {
                warn!(
                    table = %statement.table,
                    affected,
                    "bulk update failed mid-stream; applied rows stay committed"
                );
                return Err(Error::PartialFailure {
                    affected,
                    source: Box::new(source),
                });
            }
            affected += 1;
        }
        result.affected = affected;
        Ok(result)
    }

    async fn run_delete(&self, statement: &Statement) -> Result<StatementResult> {
        let descriptor = self.client.descriptor(&statement.table).await?;

        let mut result = StatementResult::default();
        let filter = match &statement.predicate {
            Some(predicate) => Some(filter_from_predicate(predicate)?),
            None => {
                warn!(table = %statement.table, "DELETE without WHERE targets all records");
                result.warnings.push(Warning::UnboundedDelete {
                    table: statement.table.clone(),
                });
                None
            }
        };
        let targets = self.matching_record_ids(&descriptor.table_id, filter).await?;

        let mut affected: u64 = 0;
        for record_id in targets {
            if let Err(source) = self
                .client
                .delete_record(&descriptor.table_id, &record_id)
                .await
            {
                warn!(
                    table = %statement.table,
                    affected,
                    "bulk delete failed mid-stream; applied rows stay committed"
                );
                return Err(Error::PartialFailure {
                    affected,
                    source: Box::new(source),
                });
            }
            affected += 1;
        }
        result.affected = affected;
        Ok(result)
    }

    async fn matching_record_ids(
        &self,
        table_id: &str,
        filter: Option<FilterRequest>,
    ) -> Result<Vec<String>> {
        let records = self
            .client
            .records(table_id)
            .with_filter(filter)
            .collect_all()
            .await?;
        Ok(records.into_iter().map(|r| r.record_id).collect())
    }

    async fn run_show(&self, statement: &Statement) -> Result<StatementResult> {
        let mut result = StatementResult::default();
        match statement.show {
            Some(ShowKind::Tables) => {
                result.tables = self.client.list_tables().await?;
                result.columns = vec!["Tables".into()];
            }
            Some(ShowKind::Databases) => {
                // One client addresses one base; list it as the sole
                // database.
                result.databases = vec![self.client.config().app_token.clone()];
                result.columns = vec!["Database".into()];
            }
            Some(ShowKind::Columns) => {
                return self.run_describe(statement).await;
            }
            None => return Err(Error::Parse("SHOW needs a subject".into())),
        }
        Ok(result)
    }

    async fn run_describe(&self, statement: &Statement) -> Result<StatementResult> {
        let descriptor = self.client.descriptor(&statement.table).await?;
        Ok(StatementResult {
            columns: vec!["Field".into(), "Type".into(), "Primary".into()],
            fields: descriptor.fields.clone(),
            ..StatementResult::default()
        })
    }

    async fn run_create(&self, statement: &Statement) -> Result<StatementResult> {
        if statement.columns.is_empty() {
            return Err(Error::Parse(
                "CREATE TABLE needs at least one column definition".into(),
            ));
        }
        let request = CreateTableRequest {
            table: TableSpec {
                name: statement.table.clone(),
                default_view_name: Some(DEFAULT_VIEW_NAME.into()),
                fields: statement
                    .columns
                    .iter()
                    .map(|column| FieldBody {
                        field_name: column.name.clone(),
                        type_code: column.field_type.code(),
                        ui_type: column.field_type.ui_type(),
                        description: None,
                        property: serde_json::Map::new(),
                    })
                    .collect(),
            },
        };
        self.client.create_table(request).await?;
        Ok(StatementResult {
            affected: 1,
            ..StatementResult::default()
        })
    }

    async fn run_drop(&self, statement: &Statement) -> Result<StatementResult> {
        self.client.drop_table(&statement.table).await?;
        Ok(StatementResult {
            affected: 1,
            ..StatementResult::default()
        })
    }
}

impl std::fmt::Debug for StatementExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementExecutor").finish_non_exhaustive()
    }
}

/// Client-side aggregate over fetched rows.
fn compute_aggregate(aggregate: &Aggregate, rows: &[Record]) -> Result<AggregateResult> {
    let value = match aggregate.function {
        AggregateFunction::Count => FieldValue::Number(rows.len() as f64),
        AggregateFunction::Sum => FieldValue::Number(numeric_column(rows, &aggregate.field).sum()),
        AggregateFunction::Avg => {
            let values: Vec<f64> = numeric_column(rows, &aggregate.field).collect();
            if values.is_empty() {
                FieldValue::Number(0.0)
            } else {
                FieldValue::Number(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        AggregateFunction::Min | AggregateFunction::Max => {
            extreme_value(aggregate, rows)?
        }
    };
    Ok(AggregateResult {
        function: aggregate.function,
        field: aggregate.field.clone(),
        value,
    })
}

fn numeric_column<'a>(
    rows: &'a [Record],
    field: &'a str,
) -> impl Iterator<Item = f64> + 'a {
    rows.iter()
        .filter_map(move |row| row.get(field).and_then(FieldValue::as_number))
}

fn extreme_value(aggregate: &Aggregate, rows: &[Record]) -> Result<FieldValue> {
    let want_max = aggregate.function == AggregateFunction::Max;

    // Prefer numeric comparison; fall back to lexicographic when the
    // column never coerces to a number.
    let numbers: Vec<f64> = numeric_column(rows, &aggregate.field).collect();
    if !numbers.is_empty() {
        let extreme = numbers
            .into_iter()
            .reduce(|a, b| if (b > a) == want_max { b } else { a })
            .unwrap_or(0.0);
        return Ok(FieldValue::Number(extreme));
    }

    let mut texts: Vec<String> = rows
        .iter()
        .filter_map(|row| row.get(&aggregate.field))
        .filter(|v| !matches!(v, FieldValue::Null))
        .map(FieldValue::display_string)
        .collect();
    if texts.is_empty() {
        return Err(Error::Parse(format!(
            "no comparable values in column {}",
            aggregate.field
        )));
    }
    texts.sort();
    let extreme = if want_max {
        texts.pop().unwrap_or_default()
    } else {
        texts.into_iter().next().unwrap_or_default()
    };
    Ok(FieldValue::Text(extreme))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(field: &str, value: FieldValue) -> Record {
        let mut record = Record::default();
        record.set(field, value);
        record
    }

    fn rows(values: &[f64]) -> Vec<Record> {
        values
            .iter()
            .map(|v| row("age", FieldValue::Number(*v)))
            .collect()
    }

    fn aggregate(function: AggregateFunction, field: &str) -> Aggregate {
        Aggregate {
            function,
            field: field.into(),
        }
    }

    #[test]
    fn test_count() {
        let result =
            compute_aggregate(&aggregate(AggregateFunction::Count, "*"), &rows(&[1.0, 2.0]))
                .unwrap();
        assert_eq!(result.value, FieldValue::Number(2.0));
    }

    #[test]
    fn test_sum_and_avg() {
        let data = rows(&[10.0, 20.0, 30.0]);
        let sum = compute_aggregate(&aggregate(AggregateFunction::Sum, "age"), &data).unwrap();
        assert_eq!(sum.value, FieldValue::Number(60.0));

        let avg = compute_aggregate(&aggregate(AggregateFunction::Avg, "age"), &data).unwrap();
        assert_eq!(avg.value, FieldValue::Number(20.0));
    }

    #[test]
    fn test_avg_of_empty_column_is_zero() {
        let result =
            compute_aggregate(&aggregate(AggregateFunction::Avg, "age"), &[]).unwrap();
        assert_eq!(result.value, FieldValue::Number(0.0));
    }

    #[test]
    fn test_min_max_numeric() {
        let data = rows(&[5.0, 1.0, 9.0]);
        let min = compute_aggregate(&aggregate(AggregateFunction::Min, "age"), &data).unwrap();
        assert_eq!(min.value, FieldValue::Number(1.0));
        let max = compute_aggregate(&aggregate(AggregateFunction::Max, "age"), &data).unwrap();
        assert_eq!(max.value, FieldValue::Number(9.0));
    }

    #[test]
    fn test_min_max_falls_back_to_text() {
        let data = vec![
            row("name", FieldValue::Text("banana".into())),
            row("name", FieldValue::Text("apple".into())),
        ];
        let min = compute_aggregate(&aggregate(AggregateFunction::Min, "name"), &data).unwrap();
        assert_eq!(min.value, FieldValue::Text("apple".into()));
        let max = compute_aggregate(&aggregate(AggregateFunction::Max, "name"), &data).unwrap();
        assert_eq!(max.value, FieldValue::Text("banana".into()));
    }

    #[test]
    fn test_min_of_empty_column_errors() {
        let result = compute_aggregate(&aggregate(AggregateFunction::Min, "age"), &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sum_skips_non_numeric_values() {
        let data = vec![
            row("age", FieldValue::Number(10.0)),
            row("age", FieldValue::Text("not a number".into())),
            row("age", FieldValue::Number(5.0)),
        ];
        let result = compute_aggregate(&aggregate(AggregateFunction::Sum, "age"), &data).unwrap();
        assert_eq!(result.value, FieldValue::Number(15.0));
    }

    #[test]
    fn test_warning_display() {
        let warning = Warning::PartialWriteNotRolledBack { affected: 3 };
        assert!(warning.to_string().contains("3 row(s)"));
        let warning = Warning::UnboundedDelete {
            table: "users".into(),
        };
        assert!(warning.to_string().contains("users"));
    }
}
