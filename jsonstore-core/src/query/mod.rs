// src/query/mod.rs
//! Predicate DSL
//!
//! A [`QueryParts`] is an OR of [`QueryPart`]s, and each part is an AND of
//! [`Predicate`]s:
//!
//! ```
//! use jsonstore_core::query::{QueryPart, QueryParts};
//!
//! // (age >= 2 AND name starts with "d") OR name = "carlos"
//! let query = QueryParts::new()
//!     .or(QueryPart::new().greater_than_or_equal("age", 2).right_like("name", "d"))
//!     .or(QueryPart::new().equal("name", "carlos"));
//! assert_eq!(query.parts().len(), 2);
//! ```
//!
//! Operand shapes are fixed by the builder methods. [`Predicate::new`] is the
//! checked entry point for dynamically built predicates. Field names are
//! checked against the collection schema when the query is compiled, before
//! anything reaches the backend.

pub mod compiler;
pub mod operators;
pub mod parse;

pub use compiler::{CompiledQuery, Projection, QueryCompiler};
pub use operators::{Operand, OperandShape, Operator};
pub use parse::parse_query;

use crate::error::{JsonStoreError, Result};
use crate::value::Scalar;

/// `field <operator> operand`
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    field: String,
    operator: Operator,
    operand: Operand,
}

impl Predicate {
    /// Build a predicate, rejecting operands whose shape the operator does not accept.
    pub fn new(field: impl Into<String>, operator: Operator, operand: Operand) -> Result<Self> {
        if operand.shape() != operator.shape() {
            return Err(JsonStoreError::OperandShape {
                operator: operator.name(),
                expected: operator.shape().as_str(),
                found: operand.shape().as_str(),
            });
        }
        Ok(Predicate {
            field: field.into(),
            operator,
            operand,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }
}

/// AND-group of predicates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPart {
    predicates: Vec<Predicate>,
}

macro_rules! primitive_builders {
    ($($(#[$doc:meta])* $method:ident => $op:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $method(self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
                self.with_unchecked(field, Operator::$op, Operand::Primitive(value.into()))
            }
        )*
    };
}

impl QueryPart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    /// Add a predicate, checking the operand shape.
    pub fn with(self, field: impl Into<String>, operator: Operator, operand: Operand) -> Result<Self> {
        let predicate = Predicate::new(field, operator, operand)?;
        let mut part = self;
        part.push(predicate);
        Ok(part)
    }

    // The builders below fix the shape through their signatures.
    fn with_unchecked(mut self, field: impl Into<String>, operator: Operator, operand: Operand) -> Self {
        debug_assert_eq!(operand.shape(), operator.shape());
        self.predicates.push(Predicate {
            field: field.into(),
            operator,
            operand,
        });
        self
    }

    primitive_builders! {
        /// Case-sensitive equality
        equal => ExactEquals,
        not_equal => ExactNotEquals,
        /// Case-insensitive containment
        like => FuzzyEquals,
        not_like => FuzzyNotEquals,
        /// Case-insensitive: value ends with the operand
        left_like => FuzzyLeftEquals,
        not_left_like => FuzzyNotLeftEquals,
        /// Case-insensitive: value starts with the operand
        right_like => FuzzyRightEquals,
        not_right_like => FuzzyNotRightEquals,
        less_than => LessThan,
        less_than_or_equal => LessThanOrEquals,
        greater_than => GreaterThan,
        greater_than_or_equal => GreaterThanOrEquals,
    }

    /// Inclusive range
    pub fn between(
        self,
        field: impl Into<String>,
        start: impl Into<Scalar>,
        end: impl Into<Scalar>,
    ) -> Self {
        self.with_unchecked(field, Operator::Between, Operand::Range(start.into(), end.into()))
    }

    pub fn not_between(
        self,
        field: impl Into<String>,
        start: impl Into<Scalar>,
        end: impl Into<Scalar>,
    ) -> Self {
        self.with_unchecked(field, Operator::NotBetween, Operand::Range(start.into(), end.into()))
    }

    pub fn in_list<V: Into<Scalar>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.with_unchecked(field, Operator::In, Operand::List(values))
    }

    pub fn not_in_list<V: Into<Scalar>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.with_unchecked(field, Operator::NotIn, Operand::List(values))
    }
}

/// OR-group of query parts. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParts {
    parts: Vec<QueryPart>,
}

impl QueryParts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches every document
    pub fn all() -> Self {
        Self::default()
    }

    pub fn or(mut self, part: QueryPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn push(&mut self, part: QueryPart) {
        self.parts.push(part);
    }

    pub fn parts(&self) -> &[QueryPart] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl From<QueryPart> for QueryParts {
    fn from(part: QueryPart) -> Self {
        QueryParts { parts: vec![part] }
    }
}

impl From<Vec<QueryPart>> for QueryParts {
    fn from(parts: Vec<QueryPart>) -> Self {
        QueryParts { parts }
    }
}
