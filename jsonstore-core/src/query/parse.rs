// src/query/parse.rs
//! JSON form of the predicate DSL
//!
//! ```json
//! [
//!   [{"field": "age", "operator": "GREATER_THAN_OR_EQUALS", "value": 2}],
//!   [{"field": "name", "operator": "IN", "value": ["carlos", "mike"]}]
//! ]
//! ```
//!
//! The outer array is OR-joined, each inner array AND-joined. `BETWEEN`
//! takes a two-element array.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{JsonStoreError, Result};
use crate::query::{Operand, OperandShape, Operator, Predicate, QueryPart, QueryParts};
use crate::value::Scalar;

#[derive(Debug, Deserialize)]
struct RawPredicate {
    field: String,
    operator: Operator,
    value: Value,
}

/// Parse a JSON query. `null` and `[]` match everything.
pub fn parse_query(json: &Value) -> Result<QueryParts> {
    let parts = match json {
        Value::Null => return Ok(QueryParts::all()),
        Value::Array(parts) => parts,
        _ => {
            return Err(JsonStoreError::InvalidQuery(
                "Query must be an array of query parts".to_string(),
            ))
        }
    };

    let mut query = QueryParts::new();
    for part in parts {
        let predicates = part.as_array().ok_or_else(|| {
            JsonStoreError::InvalidQuery("Each query part must be an array of predicates".to_string())
        })?;
        let mut query_part = QueryPart::new();
        for raw in predicates {
            let raw: RawPredicate = serde_json::from_value(raw.clone())
                .map_err(|e| JsonStoreError::InvalidQuery(format!("Invalid predicate: {}", e)))?;
            let operand = parse_operand(raw.operator, &raw.value)?;
            query_part.push(Predicate::new(raw.field, raw.operator, operand)?);
        }
        query.push(query_part);
    }
    Ok(query)
}

fn parse_operand(operator: Operator, value: &Value) -> Result<Operand> {
    let shape_error = || JsonStoreError::OperandShape {
        operator: operator.name(),
        expected: operator.shape().as_str(),
        found: describe(value),
    };

    match operator.shape() {
        OperandShape::Primitive => Scalar::from_json(value)
            .map(Operand::Primitive)
            .ok_or_else(shape_error),
        OperandShape::Range => match value.as_array().map(Vec::as_slice) {
            Some([start, end]) => {
                match (Scalar::from_json(start), Scalar::from_json(end)) {
                    (Some(start), Some(end)) => Ok(Operand::Range(start, end)),
                    _ => Err(shape_error()),
                }
            }
            _ => Err(shape_error()),
        },
        OperandShape::Array => {
            let items = value.as_array().ok_or_else(shape_error)?;
            items
                .iter()
                .map(|item| Scalar::from_json(item).ok_or_else(shape_error))
                .collect::<Result<Vec<_>>>()
                .map(Operand::List)
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) | Value::Number(_) | Value::String(_) => "a primitive",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
