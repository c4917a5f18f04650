// jsonstore-core/src/document.rs
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{JsonStoreError, Result};

/// Row id assigned on insert. Never reused after a physical delete.
pub type DocumentId = i64;

/// Stored document: id plus the canonical payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub json: Value,
}

impl Document {
    pub fn new(id: DocumentId, json: Value) -> Self {
        Document { id, json }
    }

    /// Parse `{"_id": .., "json": ..}`
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| JsonStoreError::InvalidDocument(format!("Expected {{_id, json}}: {}", e)))
    }

    pub fn to_value(&self) -> Value {
        json!({ "_id": self.id, "json": self.json })
    }
}

/// Last local write recorded in `_operation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Clean after a sync
    #[serde(rename = "")]
    None,
    /// Added without dirty tracking
    Store,
    Add,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::None => "",
            Operation::Store => "store",
            Operation::Add => "add",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = JsonStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(Operation::None),
            "store" => Ok(Operation::Store),
            "add" => Ok(Operation::Add),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(JsonStoreError::Serialization(format!(
                "Unknown operation '{}'",
                other
            ))),
        }
    }
}

/// A document with unsynchronized local changes, as handed to a sync layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirtyDocument {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub json: Value,
    /// Write timestamp in milliseconds since the Unix epoch
    #[serde(rename = "_dirty")]
    pub dirty: i64,
    #[serde(rename = "_deleted")]
    pub deleted: bool,
    #[serde(rename = "_operation")]
    pub operation: Operation,
}

/// Anything that identifies a stored document.
pub trait DocumentKey {
    fn document_id(&self) -> DocumentId;
}

impl DocumentKey for DocumentId {
    fn document_id(&self) -> DocumentId {
        *self
    }
}

impl DocumentKey for Document {
    fn document_id(&self) -> DocumentId {
        self.id
    }
}

impl DocumentKey for DirtyDocument {
    fn document_id(&self) -> DocumentId {
        self.id
    }
}

impl<K: DocumentKey + ?Sized> DocumentKey for &K {
    fn document_id(&self) -> DocumentId {
        (**self).document_id()
    }
}

/// Current time as a `_dirty` stamp.
pub(crate) fn dirty_timestamp() -> i64 {
    // 0 means clean, so never hand out 0
    chrono::Utc::now().timestamp_millis().max(1)
}
