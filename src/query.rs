// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query expression builder for the record bridge.
//!
//! A [`Query`] is a flat conjunction of field predicates, the shape the
//! remote filter DSL can express. Conditions added to one query combine
//! with AND semantics.
//!
//! # Example
//!
//! ```
//! use gridsql::query::Query;
//!
//! let query = Query::new()
//!     .field_eq("status", "active")
//!     .field_gt("age", 18)
//!     .field_like("name", "%zh%");
//! assert_eq!(query.conditions().len(), 3);
//! ```

use crate::model::FieldValue;

/// Predicate operator in a bridge query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
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

/// One field predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCondition {
    pub field: String,
    pub op: QueryOp,
    pub values: Vec<FieldValue>,
}

/// A conjunction of predicates plus result shaping options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    conditions: Vec<QueryCondition>,
    order_by: Vec<(String, bool)>,
    limit: Option<usize>,
}

impl Query {
    /// An empty query matching every record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, field: impl Into<String>, op: QueryOp, values: Vec<FieldValue>) -> Self {
        self.conditions.push(QueryCondition {
            field: field.into(),
            op,
            values,
        });
        self
    }

    /// `field = value`
    #[must_use]
    pub fn field_eq(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.push(field, QueryOp::Eq, vec![value.into()])
    }

    /// `field != value`
    #[must_use]
    pub fn field_ne(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.push(field, QueryOp::Ne, vec![value.into()])
    }

    /// `field > value`
    #[must_use]
    pub fn field_gt(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.push(field, QueryOp::Gt, vec![value.into()])
    }

    /// `field >= value`
    #[must_use]
    pub fn field_ge(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.push(field, QueryOp::Ge, vec![value.into()])
    }

    /// `field < value`
    #[must_use]
    pub fn field_lt(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.push(field, QueryOp::Lt, vec![value.into()])
    }

    /// `field <= value`
    #[must_use]
    pub fn field_le(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.push(field, QueryOp::Le, vec![value.into()])
    }

    /// `field LIKE pattern`. The `%` and `_` wildcards are stripped during
    /// translation, the remote operator is a contains match.
    #[must_use]
    pub fn field_like(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.push(field, QueryOp::Like, vec![FieldValue::Text(pattern.into())])
    }

    /// `field IN (values...)`
    #[must_use]
    pub fn field_in<V: Into<FieldValue>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(
            field,
            QueryOp::In,
            values.into_iter().map(Into::into).collect(),
        )
    }

    /// `field IS NULL`
    #[must_use]
    pub fn field_is_null(self, field: impl Into<String>) -> Self {
        self.push(field, QueryOp::IsNull, vec![])
    }

    /// `field IS NOT NULL`
    #[must_use]
    pub fn field_is_not_null(self, field: impl Into<String>) -> Self {
        self.push(field, QueryOp::IsNotNull, vec![])
    }

    /// Append an ORDER BY key.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.order_by.push((field.into(), descending));
        self
    }

    /// Cap the result set.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The predicates, in insertion order.
    #[must_use]
    pub fn conditions(&self) -> &[QueryCondition] {
        &self.conditions
    }

    /// ORDER BY keys as `(field, descending)` pairs.
    #[must_use]
    pub fn order_keys(&self) -> &[(String, bool)] {
        &self.order_by
    }

    /// Result cap, when set.
    #[must_use]
    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    /// Whether the query has no predicates.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.conditions.is_empty()
    }

    /// The value of an equality predicate on `field`, if one exists.
    /// The bridge uses this to recover a record id from a query.
    #[must_use]
    pub fn eq_value(&self, field: &str) -> Option<&FieldValue> {
        self.conditions
            .iter()
            .find(|c| c.op == QueryOp::Eq && c.field == field)
            .and_then(|c| c.values.first())
    }
}
