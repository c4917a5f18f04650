// jsonstore-core/src/error.rs
//! Error types for store operations.

use thiserror::Error;

use crate::document::Document;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, JsonStoreError>;

/// Errors raised by the store, the schema mapper and the query compiler.
#[derive(Error, Debug)]
pub enum JsonStoreError {
    /// Invalid schema or collection declaration
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Reopening a collection with a different search field set
    #[error(
        "Schema mismatch for collection '{collection}': existing fields {existing:?}, requested {requested:?}"
    )]
    SchemaMismatch {
        collection: String,
        existing: Vec<String>,
        requested: Vec<String>,
    },

    /// Operation on a closed store or a removed collection
    #[error("'{0}' is not open")]
    NotOpen(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Field is neither declared nor reserved
    #[error("Unknown field '{field}' in collection '{collection}'")]
    UnknownField { collection: String, field: String },

    /// Operand shape not accepted by the operator
    #[error("Operator {operator} expects {expected} operand, got {found}")]
    OperandShape {
        operator: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// Payload cannot be stored (not a JSON object)
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// A single insert, update or delete failed at the backend
    #[error("Write failed for document {id}: {reason}")]
    WriteFailure { id: i64, reason: String },

    /// Batch add aborted; nothing from the batch was kept
    #[error("Add failed after {succeeded} documents: {source}")]
    AddFailed {
        succeeded: usize,
        #[source]
        source: Box<JsonStoreError>,
    },

    /// Batch replace aborted; lists every document that could not be replaced
    #[error("Replace failed for {} documents", failed.len())]
    ReplaceFailed { failed: Vec<Document> },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for JsonStoreError {
    fn from(err: serde_json::Error) -> Self {
        JsonStoreError::Serialization(err.to_string())
    }
}

impl JsonStoreError {
    /// True for errors raised while validating a query, before any backend call.
    pub fn is_query_error(&self) -> bool {
        matches!(
            self,
            JsonStoreError::InvalidQuery(_)
                | JsonStoreError::UnknownField { .. }
                | JsonStoreError::OperandShape { .. }
        )
    }

    /// True for schema declaration errors and reopen mismatches.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            JsonStoreError::SchemaError(_) | JsonStoreError::SchemaMismatch { .. }
        )
    }
}
