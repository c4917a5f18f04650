//! Scalar values shared by the schema mapper and the query DSL
//!
//! Search columns only ever hold scalars, so the query operands and the
//! additional search field values are restricted to the same closed set.

use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// A primitive value: text, number or boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl Scalar {
    /// Convert a JSON value; `null`, arrays and objects are not scalars.
    pub fn from_json(value: &Value) -> Option<Scalar> {
        match value {
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => Some(Scalar::Number(n.clone())),
            Value::String(s) => Some(Scalar::Text(s.clone())),
            _ => None,
        }
    }

    /// Literal text form as stored in a search column.
    ///
    /// Booleans become `1`/`0`.
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Bool(true) => "1".to_string(),
            Scalar::Bool(false) => "0".to_string(),
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }

    /// Bind value for a SQL parameter.
    pub fn to_sql(&self) -> SqlValue {
        match self {
            Scalar::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Scalar::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
            },
            Scalar::Text(s) => SqlValue::Text(s.clone()),
        }
    }

    /// Normalize a boolean-ish operand to `1`/`0`.
    ///
    /// Accepts `true`/`false`, `1`/`0` and the strings `"1"`/`"0"`/`"true"`/`"false"`.
    /// Anything else is returned unchanged.
    pub fn normalize_bool(&self) -> Scalar {
        let flag = match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Number(n) => match n.as_f64() {
                Some(f) if f == 1.0 => Some(true),
                Some(f) if f == 0.0 => Some(false),
                _ => None,
            },
            Scalar::Text(s) => match s.as_str() {
                "1" | "true" => Some(true),
                "0" | "false" => Some(false),
                _ => None,
            },
        };
        match flag {
            Some(b) => Scalar::Number(Number::from(i64::from(b))),
            None => self.clone(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

macro_rules! integer_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Scalar {
                fn from(value: $ty) -> Self {
                    Scalar::Number(Number::from(value))
                }
            }
        )*
    };
}

// i32 included so bare integer literals convert
integer_scalar!(i32, i64, u32, u64);

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        match Number::from_f64(value) {
            Some(n) => Scalar::Number(n),
            None => Scalar::Text(value.to_string()),
        }
    }
}

/// Convert a column value read back from SQLite into JSON.
pub(crate) fn sql_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
    }
}
