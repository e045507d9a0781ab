// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Translation of host-side predicates into the remote filter DSL.
//!
//! Both the SQL parser's [`Predicate`] and the bridge's [`Query`]
//! expression trees land here and come out as a [`FilterRequest`] with
//! conjunction `and`. Booleans are transmitted as native JSON booleans.
//! `LIKE` patterns lose their `%` and `_` wildcards because the remote
//! `contains` operator is substring-only.

use serde_json::Value;

use crate::error::Result;
use crate::protocol::{FilterCondition, FilterOperator, FilterRequest};
use crate::query::{Query, QueryOp};
use crate::security;
use crate::sql::{CompareOp, Predicate, ScalarValue};

/// Translate one SQL predicate into a server-side condition.
pub fn condition_from_predicate(predicate: &Predicate) -> Result<FilterCondition> {
    security::validate_identifier(&predicate.field, "field name")?;

    let (operator, values) = match predicate.op {
        CompareOp::Eq => (FilterOperator::Is, scalar_values(&predicate.values)),
        CompareOp::Ne => (FilterOperator::IsNot, scalar_values(&predicate.values)),
        CompareOp::Gt => (FilterOperator::IsGreater, scalar_values(&predicate.values)),
        CompareOp::Ge => (
            FilterOperator::IsGreaterEqual,
            scalar_values(&predicate.values),
        ),
        CompareOp::Lt => (FilterOperator::IsLess, scalar_values(&predicate.values)),
        CompareOp::Le => (FilterOperator::IsLessEqual, scalar_values(&predicate.values)),
        CompareOp::Like => (
            FilterOperator::Contains,
            predicate
                .values
                .iter()
                .map(|v| strip_like_wildcards(&v.to_json()))
                .collect(),
        ),
        CompareOp::In => (FilterOperator::IsAnyOf, scalar_values(&predicate.values)),
        CompareOp::IsNull => (FilterOperator::IsEmpty, vec![]),
        CompareOp::IsNotNull => (FilterOperator::IsNotEmpty, vec![]),
    };

    let condition = FilterCondition {
        field_name: predicate.field.clone(),
        operator,
        value: values,
    };
    condition.validate()?;
    Ok(condition)
}

/// Translate one SQL predicate into a complete filter.
pub fn filter_from_predicate(predicate: &Predicate) -> Result<FilterRequest> {
    Ok(FilterRequest::all(vec![condition_from_predicate(
        predicate,
    )?]))
}

/// Translate a bridge query. An unfiltered query yields `None` so the
/// caller can take the cheaper unfiltered list path.
pub fn filter_from_query(query: &Query) -> Result<Option<FilterRequest>> {
    if query.is_unfiltered() {
        return Ok(None);
    }

    let mut conditions = Vec::with_capacity(query.conditions().len());
    for condition in query.conditions() {
        security::validate_identifier(&condition.field, "field name")?;

        let (operator, values) = match condition.op {
            QueryOp::Eq => (FilterOperator::Is, field_values(condition)),
            QueryOp::Ne => (FilterOperator::IsNot, field_values(condition)),
            QueryOp::Gt => (FilterOperator::IsGreater, field_values(condition)),
            QueryOp::Ge => (FilterOperator::IsGreaterEqual, field_values(condition)),
            QueryOp::Lt => (FilterOperator::IsLess, field_values(condition)),
            QueryOp::Le => (FilterOperator::IsLessEqual, field_values(condition)),
            QueryOp::Like => (
                FilterOperator::Contains,
                condition
                    .values
                    .iter()
                    .map(|v| strip_like_wildcards(&v.to_json_scalar()))
                    .collect(),
            ),
            QueryOp::In => (FilterOperator::IsAnyOf, field_values(condition)),
            QueryOp::IsNull => (FilterOperator::IsEmpty, vec![]),
            QueryOp::IsNotNull => (FilterOperator::IsNotEmpty, vec![]),
        };

        let condition = FilterCondition {
            field_name: condition.field.clone(),
            operator,
            value: values,
        };
        condition.validate()?;
        conditions.push(condition);
    }

    Ok(Some(FilterRequest::all(conditions)))
}

/// Render ORDER BY keys as the service's sort strings (`-` = descending).
#[must_use]
pub fn sort_from_order_keys(keys: &[(String, bool)]) -> Vec<String> {
    keys.iter()
        .filter(|(field, _)| {
            // Invalid identifiers are skipped silently in ordering context.
            let valid = security::is_valid_identifier(field);
            if !valid {
                tracing::debug!(field, "skipping invalid sort identifier");
            }
            valid
        })
        .map(|(field, descending)| {
            if *descending {
                format!("-{field}")
            } else {
                field.clone()
            }
        })
        .collect()
}

fn scalar_values(values: &[ScalarValue]) -> Vec<Value> {
    values.iter().map(ScalarValue::to_json).collect()
}

fn field_values(condition: &crate::query::QueryCondition) -> Vec<Value> {
    condition
        .values
        .iter()
        .map(|v| v.to_json_scalar())
        .collect()
}

fn strip_like_wildcards(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace(['%', '_'], "")),
        other => other.clone(),
    }
}
