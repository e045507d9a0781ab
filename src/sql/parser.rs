// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Regex-driven SQL parser.
//!
//! Single-pass and intentionally lossy: the grammar is the small shape
//! language the adapter translates, not full SQL. Quoted strings (single
//! or double) survive list splitting; unquoted values classify as NULL,
//! integer, float, boolean, then text. The injection guard runs before
//! any pattern matching.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::model::FieldType;
use crate::security;
use crate::sql::{
    Aggregate, AggregateFunction, ColumnDef, CompareOp, OrderKey, Predicate, ScalarValue,
    ShowKind, Statement, StatementKind,
};

static SELECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^SELECT\s+(.+?)\s+FROM\s+([^\s;]+)(?:\s+WHERE\s+(.+?))?(?:\s+ORDER\s+BY\s+(.+?))?(?:\s+LIMIT\s+(\d+))?(?:\s+OFFSET\s+(\d+))?\s*;?\s*$",
    )
    .expect("select pattern")
});

static INSERT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^INSERT\s+INTO\s+([^\s(;]+)\s*\((.+?)\)\s*VALUES\s*\((.+)\)\s*;?\s*$")
        .expect("insert pattern")
});

static UPDATE_WHERE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^UPDATE\s+([^\s;]+)\s+SET\s+(.+?)\s+WHERE\s+(.+?)\s*;?\s*$")
        .expect("update-where pattern")
});

static UPDATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^UPDATE\s+([^\s;]+)\s+SET\s+(.+?)\s*;?\s*$").expect("update pattern")
});

static DELETE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^DELETE\s+FROM\s+([^\s;]+)(?:\s+WHERE\s+(.+?))?\s*;?\s*$")
        .expect("delete pattern")
});

static SHOW_COLUMNS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^SHOW\s+COLUMNS\s+FROM\s+([^\s;]+)\s*;?\s*$").expect("show columns pattern")
});

static DESCRIBE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(?:DESCRIBE|DESC)\s+([^\s;]+)\s*;?\s*$").expect("describe pattern")
});

static CREATE_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?([^\s(;]+)\s*(?:\((.+)\))?\s*;?\s*$")
        .expect("create table pattern")
});

static DROP_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^DROP\s+TABLE\s+(?:IF\s+EXISTS\s+)?([^\s;]+)\s*;?\s*$")
        .expect("drop table pattern")
});

static AGGREGATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(COUNT|SUM|AVG|MIN|MAX)\s*\(\s*(\*|[^)]+?)\s*\)").expect("aggregate pattern")
});

static WHERE_IN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^(\S+)\s+IN\s*\((.+)\)$").expect("in pattern"));

static WHERE_NOT_NULL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^(\S+)\s+IS\s+NOT\s+NULL$").expect("not null pattern"));

static WHERE_NULL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^(\S+)\s+IS\s+NULL$").expect("null pattern"));

static WHERE_LIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^(\S+)\s+LIKE\s+(.+)$").expect("like pattern"));

static WHERE_COMPARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([^\s<>=!]+)\s*(>=|<=|!=|<>|>|<|=)\s*(.+)$").expect("compare pattern")
});

/// Parse SQL text into a validated [`Statement`].
pub fn parse(sql: &str) -> Result<Statement> {
    let sql = sql.trim();
    if sql.is_empty() {
        return Err(Error::Parse("empty statement".into()));
    }
    security::check_statement(sql)?;

    let upper = sql.to_ascii_uppercase();
    let statement = if upper.starts_with("SELECT") {
        parse_select(sql)
    } else if upper.starts_with("INSERT") {
        parse_insert(sql)
    } else if upper.starts_with("UPDATE") {
        parse_update(sql)
    } else if upper.starts_with("DELETE") {
        parse_delete(sql)
    } else if upper.starts_with("SHOW") {
        parse_show(sql)
    } else if upper.starts_with("CREATE") {
        parse_create(sql)
    } else if upper.starts_with("DROP") {
        parse_drop(sql)
    } else if upper.starts_with("DESCRIBE") || upper.starts_with("DESC") {
        parse_describe(sql)
    } else {
        Err(Error::Parse(format!(
            "unsupported statement: {}",
            sql.split_whitespace().next().unwrap_or("")
        )))
    }?;

    statement.validate()?;
    Ok(statement)
}

/// Classify one literal token. Surrounding quotes force text.
#[must_use]
pub fn parse_scalar(token: &str) -> ScalarValue {
    let token = token.trim();
    if let Some(stripped) = strip_quotes(token) {
        return ScalarValue::Text(stripped.to_string());
    }
    if token.eq_ignore_ascii_case("NULL") {
        return ScalarValue::Null;
    }
    if let Ok(int) = token.parse::<i64>() {
        return ScalarValue::Integer(int);
    }
    if let Ok(float) = token.parse::<f64>() {
        return ScalarValue::Float(float);
    }
    if token.eq_ignore_ascii_case("true") {
        return ScalarValue::Bool(true);
    }
    if token.eq_ignore_ascii_case("false") {
        return ScalarValue::Bool(false);
    }
    ScalarValue::Text(token.to_string())
}

fn strip_quotes(token: &str) -> Option<&str> {
    let bytes = token.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') {
            return Some(&token[1..token.len() - 1]);
        }
    }
    None
}

/// Split a comma-separated list, honoring quoted segments.
fn split_list(input: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                ',' => {
                    let item = current.trim();
                    if !item.is_empty() {
                        items.push(item.to_string());
                    }
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    let item = current.trim();
    if !item.is_empty() {
        items.push(item.to_string());
    }
    items
}

fn parse_select(sql: &str) -> Result<Statement> {
    let captures = SELECT_RE.captures(sql).ok_or_else(|| {
        Error::Parse(
            "SELECT syntax: SELECT fields FROM table [WHERE cond] [ORDER BY cols] [LIMIT n]"
                .into(),
        )
    })?;

    let mut statement = Statement::new(StatementKind::Select);
    let fields_text = captures.get(1).map_or("", |m| m.as_str()).trim();
    if fields_text.is_empty() {
        return Err(Error::Parse("SELECT needs a field list".into()));
    }

    let aggregates: Vec<_> = AGGREGATE_RE.captures_iter(fields_text).collect();
    if aggregates.len() > 1 {
        return Err(Error::Parse(
            "at most one aggregate per statement is supported".into(),
        ));
    }
    if let Some(aggregate) = aggregates.into_iter().next() {
        let function = AggregateFunction::parse(&aggregate[1])
            .ok_or_else(|| Error::Parse(format!("unknown aggregate {}", &aggregate[1])))?;
        statement.aggregate = Some(Aggregate {
            function,
            field: aggregate[2].trim().to_string(),
        });
        statement.fields = vec![fields_text.to_string()];
    } else if fields_text == "*" {
        statement.fields = vec!["*".to_string()];
    } else {
        statement.fields = split_list(fields_text);
        if statement.fields.is_empty() {
            return Err(Error::Parse("SELECT field list did not parse".into()));
        }
    }

    statement.table = captures[2].trim().to_string();

    if let Some(where_text) = captures.get(3) {
        let where_text = where_text.as_str().trim();
        statement.where_text = Some(where_text.to_string());
        statement.predicate = Some(parse_where(where_text)?);
    }
    if let Some(order_text) = captures.get(4) {
        statement.order_by = parse_order_by(order_text.as_str());
    }
    if let Some(limit) = captures.get(5) {
        statement.limit = Some(
            limit
                .as_str()
                .parse()
                .map_err(|_| Error::Parse(format!("LIMIT value out of range: {}", limit.as_str())))?,
        );
    }
    if let Some(offset) = captures.get(6) {
        statement.offset = Some(offset.as_str().parse().map_err(|_| {
            Error::Parse(format!("OFFSET value out of range: {}", offset.as_str()))
        })?);
    }
    Ok(statement)
}

fn parse_insert(sql: &str) -> Result<Statement> {
    let captures = INSERT_RE.captures(sql).ok_or_else(|| {
        Error::Parse("INSERT syntax: INSERT INTO table (f1, f2) VALUES (v1, v2)".into())
    })?;

    let mut statement = Statement::new(StatementKind::Insert);
    statement.table = captures[1].trim().to_string();

    let fields = split_list(captures[2].trim());
    if fields.is_empty() {
        return Err(Error::Parse("INSERT field list did not parse".into()));
    }
    let values: Vec<ScalarValue> = split_list(captures[3].trim())
        .into_iter()
        .map(|token| parse_scalar(&token))
        .collect();
    if fields.len() != values.len() {
        return Err(Error::Parse(format!(
            "INSERT field count ({}) does not match value count ({})",
            fields.len(),
            values.len()
        )));
    }

    statement.fields = fields.clone();
    statement.values = fields.into_iter().zip(values).collect();
    Ok(statement)
}

fn parse_update(sql: &str) -> Result<Statement> {
    let mut statement = Statement::new(StatementKind::Update);

    let (table, set_text, where_text) = if let Some(captures) = UPDATE_WHERE_RE.captures(sql) {
        (
            captures[1].trim().to_string(),
            captures[2].trim().to_string(),
            Some(captures[3].trim().to_string()),
        )
    } else if let Some(captures) = UPDATE_RE.captures(sql) {
        (
            captures[1].trim().to_string(),
            captures[2].trim().to_string(),
            None,
        )
    } else {
        return Err(Error::Parse(
            "UPDATE syntax: UPDATE table SET f1 = v1 [WHERE cond]".into(),
        ));
    };

    statement.table = table;
    statement.set = parse_assignments(&set_text)?;
    if let Some(where_text) = where_text {
        statement.predicate = Some(parse_where(&where_text)?);
        statement.where_text = Some(where_text);
    }
    Ok(statement)
}

fn parse_delete(sql: &str) -> Result<Statement> {
    let captures = DELETE_RE
        .captures(sql)
        .ok_or_else(|| Error::Parse("DELETE syntax: DELETE FROM table [WHERE cond]".into()))?;

    let mut statement = Statement::new(StatementKind::Delete);
    statement.table = captures[1].trim().to_string();
    if let Some(where_text) = captures.get(2) {
        let where_text = where_text.as_str().trim();
        statement.predicate = Some(parse_where(where_text)?);
        statement.where_text = Some(where_text.to_string());
    }
    Ok(statement)
}

fn parse_show(sql: &str) -> Result<Statement> {
    let mut statement = Statement::new(StatementKind::Show);
    let upper = sql.to_ascii_uppercase();

    if let Some(captures) = SHOW_COLUMNS_RE.captures(sql) {
        statement.show = Some(ShowKind::Columns);
        statement.table = captures[1].trim().to_string();
    } else if upper.contains("TABLES") {
        statement.show = Some(ShowKind::Tables);
    } else if upper.contains("DATABASES") {
        statement.show = Some(ShowKind::Databases);
    } else {
        return Err(Error::Parse(
            "SHOW syntax: SHOW TABLES | SHOW DATABASES | SHOW COLUMNS FROM table".into(),
        ));
    }
    Ok(statement)
}

fn parse_describe(sql: &str) -> Result<Statement> {
    let captures = DESCRIBE_RE
        .captures(sql)
        .ok_or_else(|| Error::Parse("DESCRIBE syntax: DESCRIBE table".into()))?;
    let mut statement = Statement::new(StatementKind::Describe);
    statement.table = captures[1].trim().to_string();
    Ok(statement)
}

fn parse_create(sql: &str) -> Result<Statement> {
    let captures = CREATE_TABLE_RE
        .captures(sql)
        .ok_or_else(|| Error::Parse("CREATE syntax: CREATE TABLE name (col TYPE, ...)".into()))?;

    let mut statement = Statement::new(StatementKind::Create);
    statement.table = captures[1].trim().to_string();
    security::validate_identifier(&statement.table, "table name")?;

    if let Some(columns_text) = captures.get(2) {
        for column_text in split_list(columns_text.as_str()) {
            let mut parts = column_text.split_whitespace();
            let name = match parts.next() {
                Some(name) => name.to_string(),
                None => continue,
            };
            security::validate_identifier(&name, "column name")?;
            let field_type = parts
                .next()
                .map(column_type_for_keyword)
                .unwrap_or(FieldType::Text);
            statement.columns.push(ColumnDef { name, field_type });
        }
        if statement.columns.is_empty() {
            return Err(Error::Parse("CREATE TABLE column list did not parse".into()));
        }
    }
    Ok(statement)
}

fn parse_drop(sql: &str) -> Result<Statement> {
    let captures = DROP_TABLE_RE
        .captures(sql)
        .ok_or_else(|| Error::Parse("DROP syntax: DROP TABLE name".into()))?;
    let mut statement = Statement::new(StatementKind::Drop);
    statement.table = captures[1].trim().to_string();
    Ok(statement)
}

fn column_type_for_keyword(keyword: &str) -> FieldType {
    match keyword.to_ascii_uppercase().as_str() {
        "INT" | "INTEGER" | "BIGINT" | "FLOAT" | "DOUBLE" | "DECIMAL" | "NUMBER" | "NUMERIC" => {
            FieldType::Number
        }
        "BOOL" | "BOOLEAN" | "CHECKBOX" => FieldType::Checkbox,
        "DATE" | "DATETIME" | "TIMESTAMP" => FieldType::Date,
        "SELECT" => FieldType::SingleSelect,
        "MULTISELECT" => FieldType::MultiSelect,
        _ => FieldType::Text,
    }
}

fn parse_assignments(set_text: &str) -> Result<Vec<(String, ScalarValue)>> {
    let mut assignments = Vec::new();
    for part in split_list(set_text) {
        let (field, value_text) = part
            .split_once('=')
            .ok_or_else(|| Error::Parse(format!("invalid assignment: {part:?}")))?;
        let field = field.trim();
        if field.is_empty() {
            return Err(Error::Parse(format!("invalid assignment: {part:?}")));
        }
        assignments.push((field.to_string(), parse_scalar(value_text.trim())));
    }
    if assignments.is_empty() {
        return Err(Error::Parse("SET clause did not parse".into()));
    }
    Ok(assignments)
}

/// Parse the single-predicate WHERE grammar. An invalid identifier here
/// is a hard parse error (ORDER BY, by contrast, skips bad names).
pub fn parse_where(where_text: &str) -> Result<Predicate> {
    let where_text = where_text.trim();
    if where_text.is_empty() {
        return Err(Error::Parse("WHERE clause is empty".into()));
    }

    if let Some(captures) = WHERE_NOT_NULL_RE.captures(where_text) {
        let field = validated_field(&captures[1])?;
        return Ok(Predicate {
            field,
            op: CompareOp::IsNotNull,
            values: vec![],
        });
    }
    if let Some(captures) = WHERE_NULL_RE.captures(where_text) {
        let field = validated_field(&captures[1])?;
        return Ok(Predicate {
            field,
            op: CompareOp::IsNull,
            values: vec![],
        });
    }
    if let Some(captures) = WHERE_IN_RE.captures(where_text) {
        let field = validated_field(&captures[1])?;
        let values: Vec<ScalarValue> = split_list(captures[2].trim())
            .into_iter()
            .map(|token| parse_scalar(&token))
            .collect();
        if values.is_empty() {
            return Err(Error::Parse("IN list is empty".into()));
        }
        return Ok(Predicate {
            field,
            op: CompareOp::In,
            values,
        });
    }
    if let Some(captures) = WHERE_LIKE_RE.captures(where_text) {
        let field = validated_field(&captures[1])?;
        return Ok(Predicate {
            field,
            op: CompareOp::Like,
            values: vec![parse_scalar(captures[2].trim())],
        });
    }
    if let Some(captures) = WHERE_COMPARE_RE.captures(where_text) {
        let field = validated_field(captures[1].trim())?;
        let op = match &captures[2] {
            ">=" => CompareOp::Ge,
            "<=" => CompareOp::Le,
            "!=" | "<>" => CompareOp::Ne,
            ">" => CompareOp::Gt,
            "<" => CompareOp::Lt,
            _ => CompareOp::Eq,
        };
        return Ok(Predicate {
            field,
            op,
            values: vec![parse_scalar(captures[3].trim())],
        });
    }

    Err(Error::Parse(format!(
        "unsupported WHERE clause: {where_text:?}"
    )))
}

fn validated_field(raw: &str) -> Result<String> {
    let field = raw.trim();
    security::validate_identifier(field, "field name")?;
    Ok(field.to_string())
}

/// Parse ORDER BY keys. Invalid identifiers are skipped silently.
fn parse_order_by(order_text: &str) -> Vec<OrderKey> {
    let mut keys = Vec::new();
    for part in split_list(order_text) {
        let mut tokens = part.split_whitespace();
        let Some(field) = tokens.next() else { continue };
        if !security::is_valid_identifier(field) {
            tracing::debug!(field, "skipping invalid ORDER BY identifier");
            continue;
        }
        let descending = tokens
            .next()
            .is_some_and(|d| d.eq_ignore_ascii_case("DESC"));
        keys.push(OrderKey {
            field: field.to_string(),
            descending,
        });
    }
    keys
}
