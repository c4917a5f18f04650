// src/query/operators.rs
//! Predicate operators and their SQL rendering
//!
//! Every operator accepts exactly one operand shape:
//!
//! ```text
//! ┌──────────────────────────────┬────────────┐
//! │ EXACT_*, FUZZY_*, comparison │ primitive  │
//! │ BETWEEN, NOT_BETWEEN         │ range      │
//! │ IN, NOT_IN                   │ array      │
//! └──────────────────────────────┴────────────┘
//! ```
//!
//! Note the fuzzy "left" operators anchor on the right edge of the stored
//! value (value ends with operand) and the "right" operators on the left
//! edge. Existing callers depend on this.

use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::FieldType;
use crate::value::Scalar;

/// Operand shape accepted by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    Primitive,
    Range,
    Array,
}

impl OperandShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperandShape::Primitive => "a primitive",
            OperandShape::Range => "a range",
            OperandShape::Array => "an array",
        }
    }
}

/// Right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Primitive(Scalar),
    /// Inclusive `[start, end]`
    Range(Scalar, Scalar),
    List(Vec<Scalar>),
}

impl Operand {
    pub fn shape(&self) -> OperandShape {
        match self {
            Operand::Primitive(_) => OperandShape::Primitive,
            Operand::Range(_, _) => OperandShape::Range,
            Operand::List(_) => OperandShape::Array,
        }
    }

    fn map(&self, f: impl Fn(&Scalar) -> Scalar) -> Operand {
        match self {
            Operand::Primitive(v) => Operand::Primitive(f(v)),
            Operand::Range(a, b) => Operand::Range(f(a), f(b)),
            Operand::List(items) => Operand::List(items.iter().map(f).collect()),
        }
    }

    /// Normalize boolean-ish values when the target column is BOOLEAN.
    pub(crate) fn for_field_type(&self, field_type: FieldType) -> Operand {
        if field_type == FieldType::Boolean {
            self.map(Scalar::normalize_bool)
        } else {
            self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    ExactEquals,
    ExactNotEquals,
    FuzzyEquals,
    FuzzyNotEquals,
    FuzzyLeftEquals,
    FuzzyNotLeftEquals,
    FuzzyRightEquals,
    FuzzyNotRightEquals,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
    Between,
    NotBetween,
    In,
    NotIn,
}

impl Operator {
    pub const ALL: [Operator; 16] = [
        Operator::ExactEquals,
        Operator::ExactNotEquals,
        Operator::FuzzyEquals,
        Operator::FuzzyNotEquals,
        Operator::FuzzyLeftEquals,
        Operator::FuzzyNotLeftEquals,
        Operator::FuzzyRightEquals,
        Operator::FuzzyNotRightEquals,
        Operator::LessThan,
        Operator::LessThanOrEquals,
        Operator::GreaterThan,
        Operator::GreaterThanOrEquals,
        Operator::Between,
        Operator::NotBetween,
        Operator::In,
        Operator::NotIn,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operator::ExactEquals => "EXACT_EQUALS",
            Operator::ExactNotEquals => "EXACT_NOT_EQUALS",
            Operator::FuzzyEquals => "FUZZY_EQUALS",
            Operator::FuzzyNotEquals => "FUZZY_NOT_EQUALS",
            Operator::FuzzyLeftEquals => "FUZZY_LEFT_EQUALS",
            Operator::FuzzyNotLeftEquals => "FUZZY_NOT_LEFT_EQUALS",
            Operator::FuzzyRightEquals => "FUZZY_RIGHT_EQUALS",
            Operator::FuzzyNotRightEquals => "FUZZY_NOT_RIGHT_EQUALS",
            Operator::LessThan => "LESS_THAN",
            Operator::LessThanOrEquals => "LESS_THAN_OR_EQUALS",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::GreaterThanOrEquals => "GREATER_THAN_OR_EQUALS",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT_BETWEEN",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
        }
    }

    pub fn shape(&self) -> OperandShape {
        match self {
            Operator::Between | Operator::NotBetween => OperandShape::Range,
            Operator::In | Operator::NotIn => OperandShape::Array,
            _ => OperandShape::Primitive,
        }
    }

    /// Render `column <op> ?` and push the bound parameters.
    ///
    /// The operand must already have the operator's shape.
    pub(crate) fn render(&self, column: &str, operand: &Operand, params: &mut Vec<SqlValue>) -> String {
        match (self, operand) {
            (Operator::ExactEquals, Operand::Primitive(v)) => bind(column, "=", v, params),
            (Operator::ExactNotEquals, Operand::Primitive(v)) => bind(column, "!=", v, params),
            (Operator::LessThan, Operand::Primitive(v)) => bind(column, "<", v, params),
            (Operator::LessThanOrEquals, Operand::Primitive(v)) => bind(column, "<=", v, params),
            (Operator::GreaterThan, Operand::Primitive(v)) => bind(column, ">", v, params),
            (Operator::GreaterThanOrEquals, Operand::Primitive(v)) => bind(column, ">=", v, params),

            (Operator::FuzzyEquals, Operand::Primitive(v)) => like(column, false, "%", v, "%", params),
            (Operator::FuzzyNotEquals, Operand::Primitive(v)) => like(column, true, "%", v, "%", params),
            (Operator::FuzzyLeftEquals, Operand::Primitive(v)) => like(column, false, "%", v, "", params),
            (Operator::FuzzyNotLeftEquals, Operand::Primitive(v)) => like(column, true, "%", v, "", params),
            (Operator::FuzzyRightEquals, Operand::Primitive(v)) => like(column, false, "", v, "%", params),
            (Operator::FuzzyNotRightEquals, Operand::Primitive(v)) => like(column, true, "", v, "%", params),

            (Operator::Between, Operand::Range(start, end)) => {
                params.push(start.to_sql());
                params.push(end.to_sql());
                format!("{} BETWEEN ? AND ?", column)
            }
            (Operator::NotBetween, Operand::Range(start, end)) => {
                params.push(start.to_sql());
                params.push(end.to_sql());
                format!("{} NOT BETWEEN ? AND ?", column)
            }

            (Operator::In, Operand::List(items)) => membership(column, false, items, params),
            (Operator::NotIn, Operand::List(items)) => membership(column, true, items, params),

            (operator, operand) => unreachable!(
                "{} built with {} operand; shapes are checked at construction",
                operator,
                operand.shape().as_str()
            ),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn bind(column: &str, op: &str, value: &Scalar, params: &mut Vec<SqlValue>) -> String {
    params.push(value.to_sql());
    format!("{} {} ?", column, op)
}

fn like(
    column: &str,
    negate: bool,
    prefix: &str,
    value: &Scalar,
    suffix: &str,
    params: &mut Vec<SqlValue>,
) -> String {
    params.push(SqlValue::Text(format!(
        "{}{}{}",
        prefix,
        escape_like(&value.to_text()),
        suffix
    )));
    let op = if negate { "NOT LIKE" } else { "LIKE" };
    format!("{} {} ? ESCAPE '\\'", column, op)
}

fn membership(column: &str, negate: bool, items: &[Scalar], params: &mut Vec<SqlValue>) -> String {
    if items.is_empty() {
        let constant = if negate { "1" } else { "0" };
        return constant.to_string();
    }
    params.extend(items.iter().map(Scalar::to_sql));
    let placeholders = vec!["?"; items.len()].join(", ");
    let op = if negate { "NOT IN" } else { "IN" };
    format!("{} {} ({})", column, op, placeholders)
}

/// Escape LIKE wildcards so operands match literally.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
