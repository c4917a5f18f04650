// jsonstore-core/src/schema.rs
//! Search field declarations and document flattening
//!
//! A collection declares which paths of its documents are searchable. Each
//! declared path becomes one physical column holding a stringified copy of
//! the value; the `_json` column stays the single source of truth for the
//! payload.
//!
//! Path encoding:
//! - `address.city` is stored in column `address_city`
//! - a path crossing an array of objects collects the sub-key from every
//!   element and joins the results with [`ARRAY_SEPARATOR`]
//! - booleans are stored as `1`/`0`, numbers and strings as their literal text

use ahash::AHashSet;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::error::{JsonStoreError, Result};
use crate::value::Scalar;

pub const ID_COLUMN: &str = "_id";
pub const JSON_COLUMN: &str = "_json";
pub const DIRTY_COLUMN: &str = "_dirty";
pub const DELETED_COLUMN: &str = "_deleted";
pub const OPERATION_COLUMN: &str = "_operation";

/// Columns present in every collection table, usable in any query.
pub const RESERVED_COLUMNS: [&str; 5] = [
    ID_COLUMN,
    JSON_COLUMN,
    DIRTY_COLUMN,
    DELETED_COLUMN,
    OPERATION_COLUMN,
];

/// Projection pseudo-column that turns a find into a count.
pub const COUNT_COLUMN: &str = "count";

/// Joins the values collected from an array of objects.
pub const ARRAY_SEPARATOR: &str = "-@-";

/// Characters stripped from field names before they become column names.
pub const COLUMN_DENYLIST: &[char] = &[
    '"', '\'', '`', '[', ']', '(', ')', ';', ',', ' ', '\t', '\n', '\r', '-', '+', '*', '/', '%',
    '=', '<', '>', '!', '?', '@', '$', '&', '|', '^', '~', ':', '#',
];

/// Prefix reserved for the store's own tables.
pub const INTERNAL_TABLE_PREFIX: &str = "jsonstore_";

lazy_static! {
    static ref COLLECTION_NAME: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap();
}

/// Declared type of a search field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[serde(alias = "STRING")]
    String,
    #[serde(alias = "INTEGER")]
    Integer,
    #[serde(alias = "NUMBER")]
    Number,
    #[serde(alias = "BOOLEAN")]
    Boolean,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
        }
    }

    /// SQLite column affinity, so numeric fields compare numerically.
    pub fn sql_affinity(&self) -> &'static str {
        match self {
            FieldType::String => "TEXT",
            FieldType::Integer | FieldType::Boolean => "INTEGER",
            FieldType::Number => "REAL",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl SearchField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    /// Physical column name for this field.
    pub fn column(&self) -> String {
        sanitize_column_name(&self.name)
    }
}

/// A column a query may reference: a declared field or a reserved column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    /// Name as written by the caller
    pub name: String,
    /// Physical column name
    pub column: String,
    pub field_type: FieldType,
}

impl ColumnRef {
    pub fn is_reserved(&self) -> bool {
        is_reserved_column(&self.column)
    }
}

/// Search field declaration of a collection.
///
/// Field order is the declaration order and is kept for column creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSchema {
    #[serde(default)]
    pub search_fields: Vec<SearchField>,
    /// Fields whose values are supplied at write time instead of read from the payload
    #[serde(default)]
    pub additional_search_fields: Vec<SearchField>,
}

impl CollectionSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.search_fields.push(SearchField::new(name, field_type));
        self
    }

    pub fn additional_search_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.additional_search_fields
            .push(SearchField::new(name, field_type));
        self
    }

    /// Parse a declaration from JSON
    pub fn from_value(value: &Value) -> Result<Self> {
        let schema: CollectionSchema = serde_json::from_value(value.clone())
            .map_err(|e| JsonStoreError::SchemaError(format!("Invalid schema declaration: {}", e)))?;
        schema.validate()?;
        Ok(schema)
    }

    /// All declared fields, search fields first.
    pub fn fields(&self) -> impl Iterator<Item = &SearchField> {
        self.search_fields
            .iter()
            .chain(self.additional_search_fields.iter())
    }

    /// Sanitized column names of all declared fields, in declaration order.
    pub fn columns(&self) -> Vec<String> {
        self.fields().map(SearchField::column).collect()
    }

    /// Reject declarations that cannot be mapped to distinct, safe columns.
    pub fn validate(&self) -> Result<()> {
        let mut seen = AHashSet::new();
        for field in self.fields() {
            if field.name.trim().is_empty() {
                return Err(JsonStoreError::SchemaError(
                    "Search field names must not be empty".to_string(),
                ));
            }
            let column = field.column();
            if column.is_empty() || column.chars().all(|c| c == '_') {
                return Err(JsonStoreError::SchemaError(format!(
                    "Search field '{}' has no usable characters",
                    field.name
                )));
            }
            // SQLite identifiers are case-insensitive
            let folded = column.to_ascii_lowercase();
            if is_reserved_column(&folded) || folded == COUNT_COLUMN {
                return Err(JsonStoreError::SchemaError(format!(
                    "Search field '{}' collides with a reserved column",
                    field.name
                )));
            }
            if !seen.insert(folded) {
                return Err(JsonStoreError::SchemaError(format!(
                    "Search field '{}' maps to column '{}' which is already declared",
                    field.name, column
                )));
            }
        }
        Ok(())
    }

    /// Resolve a field name used in a query, sort or projection.
    pub fn resolve(&self, field: &str) -> Option<ColumnRef> {
        if let Some(field_type) = reserved_column_type(field) {
            return Some(ColumnRef {
                name: field.to_string(),
                column: field.to_string(),
                field_type,
            });
        }
        let column = sanitize_column_name(field);
        self.fields()
            .find(|declared| declared.column() == column)
            .map(|declared| ColumnRef {
                name: field.to_string(),
                column,
                field_type: declared.field_type,
            })
    }

    /// Look up a declared (non-additional) search field by name.
    pub fn find_search_field(&self, field: &str) -> Option<&SearchField> {
        let column = sanitize_column_name(field);
        self.search_fields.iter().find(|f| f.column() == column)
    }

    /// Flatten a document into `(column, value)` pairs, in declaration order.
    ///
    /// Search field values are read from the document; additional field
    /// values come from `additional`. Missing values produce no entry.
    pub fn flatten(
        &self,
        document: &Value,
        additional: &HashMap<String, Scalar>,
    ) -> Result<Vec<(String, String)>> {
        let mut row = Vec::with_capacity(self.search_fields.len() + additional.len());
        for field in &self.search_fields {
            if let Some(entry) = flatten_field(&field.name, document) {
                row.push(entry);
            }
        }
        row.extend(self.additional_values(additional)?);
        Ok(row)
    }

    /// Map caller-supplied additional field values onto their columns.
    ///
    /// Keys must name declared additional search fields.
    pub fn additional_values(
        &self,
        additional: &HashMap<String, Scalar>,
    ) -> Result<Vec<(String, String)>> {
        for key in additional.keys() {
            let column = sanitize_column_name(key);
            if !self
                .additional_search_fields
                .iter()
                .any(|f| f.column() == column)
            {
                return Err(JsonStoreError::SchemaError(format!(
                    "'{}' is not a declared additional search field",
                    key
                )));
            }
        }

        let mut values = Vec::new();
        for field in &self.additional_search_fields {
            let column = field.column();
            let value = additional
                .iter()
                .find(|(key, _)| sanitize_column_name(key) == column)
                .map(|(_, value)| value);
            if let Some(value) = value {
                values.push((column, value.to_text()));
            }
        }
        Ok(values)
    }
}

/// Strip denylisted characters and turn a dotted path into one column name.
pub fn sanitize_column_name(name: &str) -> String {
    name.chars()
        .filter(|c| !COLUMN_DENYLIST.contains(c))
        .collect::<String>()
        .replace('.', "_")
}

/// Quote an identifier for SQL. Input is expected to be sanitized already.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', ""))
}

/// True if the sanitized-name sets differ.
pub fn check_mismatch(existing: &[String], requested: &[String]) -> bool {
    let existing: AHashSet<String> = existing.iter().map(|c| sanitize_column_name(c)).collect();
    let requested: AHashSet<String> = requested.iter().map(|c| sanitize_column_name(c)).collect();
    existing != requested
}

pub fn is_reserved_column(name: &str) -> bool {
    RESERVED_COLUMNS.contains(&name)
}

fn reserved_column_type(name: &str) -> Option<FieldType> {
    match name {
        ID_COLUMN | DIRTY_COLUMN => Some(FieldType::Integer),
        DELETED_COLUMN => Some(FieldType::Boolean),
        JSON_COLUMN | OPERATION_COLUMN => Some(FieldType::String),
        _ => None,
    }
}

/// Validate a collection name for use as a table name.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if !COLLECTION_NAME.is_match(name) {
        return Err(JsonStoreError::SchemaError(format!(
            "Invalid collection name '{}': use letters, digits and underscores, starting with a letter",
            name
        )));
    }
    if name.to_ascii_lowercase().starts_with(INTERNAL_TABLE_PREFIX) {
        return Err(JsonStoreError::SchemaError(format!(
            "Collection name '{}' uses the reserved prefix '{}'",
            name, INTERNAL_TABLE_PREFIX
        )));
    }
    Ok(())
}

/// Resolve one dotted path inside a document into its column and stored value.
///
/// This is the only place that knows the path/array encoding.
pub fn flatten_field(path: &str, document: &Value) -> Option<(String, String)> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut values = Vec::new();
    collect_scalars(document, &segments, &mut values);
    if values.is_empty() {
        return None;
    }
    Some((sanitize_column_name(path), values.join(ARRAY_SEPARATOR)))
}

fn collect_scalars(value: &Value, path: &[&str], out: &mut Vec<String>) {
    match (value, path.split_first()) {
        (Value::Array(items), _) => {
            for item in items {
                collect_scalars(item, path, out);
            }
        }
        (_, None) => {
            if let Some(scalar) = Scalar::from_json(value) {
                out.push(scalar.to_text());
            }
        }
        (Value::Object(map), Some((head, rest))) => {
            if let Some(child) = map.get(*head) {
                collect_scalars(child, rest, out);
            }
        }
        _ => {}
    }
}
