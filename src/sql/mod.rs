// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL command AST.
//!
//! [`Statement`] is the uniform representation every front end produces:
//! the regex parser for SQL text, and the bridge when it re-parses raw
//! statements. Values are typed ([`ScalarValue`]) rather than smuggled
//! through string maps, and predicates carry their operator explicitly.

pub mod parser;

use std::fmt;

use crate::error::{Error, Result};
use crate::model::FieldType;

/// Statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Show,
    Create,
    Drop,
    Describe,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Show => "SHOW",
            Self::Create => "CREATE",
            Self::Drop => "DROP",
            Self::Describe => "DESCRIBE",
        };
        f.write_str(name)
    }
}

/// A literal parsed from SQL text.
///
/// Classification order for unquoted tokens: NULL, integer, float,
/// boolean, then text. Quoted tokens are always text.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ScalarValue {
    /// JSON rendering with native types preserved.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Integer(n) => serde_json::json!(n),
            Self::Float(n) => serde_json::json!(n),
            Self::Bool(b) => serde_json::json!(b),
            Self::Text(s) => serde_json::json!(s),
        }
    }

    /// Host value rendering for the bridge.
    #[must_use]
    pub fn to_field_value(&self) -> crate::model::FieldValue {
        match self {
            Self::Null => crate::model::FieldValue::Null,
            Self::Integer(n) => crate::model::FieldValue::Number(*n as f64),
            Self::Float(n) => crate::model::FieldValue::Number(*n),
            Self::Bool(b) => crate::model::FieldValue::Bool(*b),
            Self::Text(s) => crate::model::FieldValue::Text(s.clone()),
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Integer(n) => n.to_string(),
            Self::Float(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

/// Comparison operator in a WHERE predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    In,
    IsNull,
    IsNotNull,
}

impl CompareOp {
    fn render(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Like => "LIKE",
            Self::In => "IN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }
}

/// A single WHERE predicate (the grammar accepts one per statement).
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: CompareOp,
    pub values: Vec<ScalarValue>,
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            CompareOp::IsNull | CompareOp::IsNotNull => {
                write!(f, "{} {}", self.field, self.op.render())
            }
            CompareOp::In => {
                let values: Vec<String> = self.values.iter().map(ScalarValue::render).collect();
                write!(f, "{} IN ({})", self.field, values.join(", "))
            }
            _ => {
                let value = self
                    .values
                    .first()
                    .map(ScalarValue::render)
                    .unwrap_or_else(|| "NULL".to_string());
                write!(f, "{} {} {}", self.field, self.op.render(), value)
            }
        }
    }
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub field: String,
    pub descending: bool,
}

/// Aggregate functions accepted in a SELECT field list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(Self::Count),
            "SUM" => Some(Self::Sum),
            "AVG" => Some(Self::Avg),
            "MIN" => Some(Self::Min),
            "MAX" => Some(Self::Max),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// Aggregate slot on a SELECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub function: AggregateFunction,
    /// Aggregated column, `*` for COUNT(*).
    pub field: String,
}

/// SHOW statement variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowKind {
    Tables,
    Databases,
    Columns,
}

/// Column definition in CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub field_type: FieldType,
}

/// Parsed SQL command.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub table: String,
    /// SELECT projection or INSERT column list.
    pub fields: Vec<String>,
    /// INSERT column/value pairs, in statement order.
    pub values: Vec<(String, ScalarValue)>,
    /// UPDATE SET pairs, in statement order.
    pub set: Vec<(String, ScalarValue)>,
    pub predicate: Option<Predicate>,
    /// Raw WHERE text, preserved for diagnostics.
    pub where_text: Option<String>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub aggregate: Option<Aggregate>,
    pub show: Option<ShowKind>,
    /// CREATE TABLE column definitions.
    pub columns: Vec<ColumnDef>,
}

impl Statement {
    #[must_use]
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            table: String::new(),
            fields: Vec::new(),
            values: Vec::new(),
            set: Vec::new(),
            predicate: None,
            where_text: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            aggregate: None,
            show: None,
            columns: Vec::new(),
        }
    }

    /// Whether the statement carries a WHERE clause.
    #[must_use]
    pub fn has_where(&self) -> bool {
        self.predicate.is_some() || self.where_text.is_some()
    }

    /// Whether this is `SELECT *`.
    #[must_use]
    pub fn is_select_all(&self) -> bool {
        self.kind == StatementKind::Select
            && self.fields.len() == 1
            && self.fields[0] == "*"
            && self.aggregate.is_none()
    }

    /// Per-kind structural validation.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            StatementKind::Select => {
                self.require_table()?;
                if self.fields.is_empty() && self.aggregate.is_none() {
                    return Err(Error::Parse("SELECT needs a field list".into()));
                }
                if let Some(aggregate) = &self.aggregate {
                    if aggregate.field == "*" && aggregate.function != AggregateFunction::Count {
                        return Err(Error::Parse(format!(
                            "{}(*) is not defined; only COUNT accepts *",
                            aggregate.function.name()
                        )));
                    }
                }
                Ok(())
            }
            StatementKind::Insert => {
                self.require_table()?;
                if self.values.is_empty() {
                    return Err(Error::Parse("INSERT needs at least one value".into()));
                }
                Ok(())
            }
            StatementKind::Update => {
                self.require_table()?;
                if self.set.is_empty() {
                    return Err(Error::Parse("UPDATE needs a SET clause".into()));
                }
                Ok(())
            }
            // DELETE without WHERE is legal; the executor surfaces it as a
            // distinguished full-table warning.
            StatementKind::Delete | StatementKind::Create | StatementKind::Drop => {
                self.require_table()
            }
            StatementKind::Describe => self.require_table(),
            StatementKind::Show => match self.show {
                None => Err(Error::Parse("SHOW needs a subject".into())),
                Some(ShowKind::Columns) => self.require_table(),
                Some(_) => Ok(()),
            },
        }
    }

    fn require_table(&self) -> Result<()> {
        if self.table.is_empty() {
            return Err(Error::Parse(format!("{} needs a table name", self.kind)));
        }
        Ok(())
    }
}

impl fmt::Display for Statement {
    /// Render an equivalent statement. Whitespace and field order may
    /// differ from the original text; meaning does not.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StatementKind::Select => {
                let fields = if let Some(aggregate) = &self.aggregate {
                    format!("{}({})", aggregate.function.name(), aggregate.field)
                } else if self.fields.is_empty() {
                    "*".to_string()
                } else {
                    self.fields.join(", ")
                };
                write!(f, "SELECT {fields} FROM {}", self.table)?;
                self.render_tail(f)
            }
            StatementKind::Insert => {
                let fields: Vec<&str> = self.values.iter().map(|(k, _)| k.as_str()).collect();
                let values: Vec<String> =
                    self.values.iter().map(|(_, v)| v.render()).collect();
                write!(
                    f,
                    "INSERT INTO {} ({}) VALUES ({})",
                    self.table,
                    fields.join(", "),
                    values.join(", ")
                )
            }
            StatementKind::Update => {
                let assignments: Vec<String> = self
                    .set
                    .iter()
                    .map(|(k, v)| format!("{k} = {}", v.render()))
                    .collect();
                write!(f, "UPDATE {} SET {}", self.table, assignments.join(", "))?;
                self.render_tail(f)
            }
            StatementKind::Delete => {
                write!(f, "DELETE FROM {}", self.table)?;
                self.render_tail(f)
            }
            StatementKind::Show => match self.show {
                Some(ShowKind::Tables) => write!(f, "SHOW TABLES"),
                Some(ShowKind::Databases) => write!(f, "SHOW DATABASES"),
                Some(ShowKind::Columns) => write!(f, "SHOW COLUMNS FROM {}", self.table),
                None => write!(f, "SHOW"),
            },
            StatementKind::Describe => write!(f, "DESCRIBE {}", self.table),
            StatementKind::Create => {
                if self.columns.is_empty() {
                    write!(f, "CREATE TABLE {}", self.table)
                } else {
                    let columns: Vec<String> = self
                        .columns
                        .iter()
                        .map(|c| format!("{} {}", c.name, type_keyword(c.field_type)))
                        .collect();
                    write!(f, "CREATE TABLE {} ({})", self.table, columns.join(", "))
                }
            }
            StatementKind::Drop => write!(f, "DROP TABLE {}", self.table),
        }
    }
}

impl Statement {
    fn render_tail(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(predicate) = &self.predicate {
            write!(f, " WHERE {predicate}")?;
        } else if let Some(text) = &self.where_text {
            write!(f, " WHERE {text}")?;
        }
        if !self.order_by.is_empty() {
            let keys: Vec<String> = self
                .order_by
                .iter()
                .map(|k| {
                    if k.descending {
                        format!("{} DESC", k.field)
                    } else {
                        k.field.clone()
                    }
                })
                .collect();
            write!(f, " ORDER BY {}", keys.join(", "))?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {offset}")?;
        }
        Ok(())
    }
}

fn type_keyword(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Number => "NUMBER",
        FieldType::Checkbox => "BOOL",
        FieldType::Date => "DATETIME",
        FieldType::SingleSelect => "SELECT",
        FieldType::MultiSelect => "MULTISELECT",
        _ => "TEXT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_validation() {
        let mut stmt = Statement::new(StatementKind::Select);
        assert!(stmt.validate().is_err());

        stmt.table = "users".into();
        assert!(stmt.validate().is_err());

        stmt.fields = vec!["*".into()];
        assert!(stmt.validate().is_ok());
        assert!(stmt.is_select_all());
    }

    #[test]
    fn test_aggregate_star_only_for_count() {
        let mut stmt = Statement::new(StatementKind::Select);
        stmt.table = "users".into();
        stmt.fields = vec!["SUM(*)".into()];
        stmt.aggregate = Some(Aggregate {
            function: AggregateFunction::Sum,
            field: "*".into(),
        });
        assert!(stmt.validate().is_err());

        stmt.aggregate = Some(Aggregate {
            function: AggregateFunction::Count,
            field: "*".into(),
        });
        assert!(stmt.validate().is_ok());
    }

    #[test]
    fn test_insert_requires_values() {
        let mut stmt = Statement::new(StatementKind::Insert);
        stmt.table = "users".into();
        assert!(stmt.validate().is_err());
        stmt.values.push(("name".into(), ScalarValue::Text("a".into())));
        assert!(stmt.validate().is_ok());
    }

    #[test]
    fn test_update_requires_set() {
        let mut stmt = Statement::new(StatementKind::Update);
        stmt.table = "users".into();
        assert!(stmt.validate().is_err());
        stmt.set.push(("age".into(), ScalarValue::Integer(1)));
        assert!(stmt.validate().is_ok());
    }

    #[test]
    fn test_delete_without_where_is_valid() {
        let mut stmt = Statement::new(StatementKind::Delete);
        stmt.table = "users".into();
        assert!(stmt.validate().is_ok());
        assert!(!stmt.has_where());
    }

    #[test]
    fn test_show_columns_requires_table() {
        let mut stmt = Statement::new(StatementKind::Show);
        stmt.show = Some(ShowKind::Columns);
        assert!(stmt.validate().is_err());
        stmt.table = "users".into();
        assert!(stmt.validate().is_ok());

        let mut tables = Statement::new(StatementKind::Show);
        tables.show = Some(ShowKind::Tables);
        assert!(tables.validate().is_ok());
    }

    #[test]
    fn test_render_select() {
        let mut stmt = Statement::new(StatementKind::Select);
        stmt.table = "users".into();
        stmt.fields = vec!["name".into(), "age".into()];
        stmt.predicate = Some(Predicate {
            field: "age".into(),
            op: CompareOp::Gt,
            values: vec![ScalarValue::Integer(18)],
        });
        stmt.limit = Some(10);
        assert_eq!(
            stmt.to_string(),
            "SELECT name, age FROM users WHERE age > 18 LIMIT 10"
        );
    }

    #[test]
    fn test_render_insert_quotes_text() {
        let mut stmt = Statement::new(StatementKind::Insert);
        stmt.table = "users".into();
        stmt.values = vec![
            ("name".into(), ScalarValue::Text("O'Brien".into())),
            ("age".into(), ScalarValue::Integer(30)),
        ];
        assert_eq!(
            stmt.to_string(),
            "INSERT INTO users (name, age) VALUES ('O''Brien', 30)"
        );
    }

    #[test]
    fn test_render_null_predicates() {
        let mut stmt = Statement::new(StatementKind::Select);
        stmt.table = "users".into();
        stmt.fields = vec!["*".into()];
        stmt.predicate = Some(Predicate {
            field: "email".into(),
            op: CompareOp::IsNotNull,
            values: vec![],
        });
        assert_eq!(stmt.to_string(), "SELECT * FROM users WHERE email IS NOT NULL");
    }

    #[test]
    fn test_scalar_json_preserves_types() {
        assert_eq!(ScalarValue::Integer(3).to_json(), serde_json::json!(3));
        assert_eq!(ScalarValue::Bool(true).to_json(), serde_json::json!(true));
        assert_eq!(
            ScalarValue::Text("x".into()).to_json(),
            serde_json::json!("x")
        );
        assert_eq!(ScalarValue::Null.to_json(), serde_json::Value::Null);
    }
}
