// jsonstore-core/src/collection/dirty.rs
// Sync bookkeeping: which documents carry local changes, and acknowledging them

use log::debug;
use rusqlite::{params, OptionalExtension};
use serde_json::{Map, Value};

use super::Collection;
use crate::document::{DirtyDocument, DocumentId, DocumentKey, Operation};
use crate::error::{JsonStoreError, Result};
use crate::options::{CountOptions, FindOptions};
use crate::query::{QueryPart, QueryParts};
use crate::schema::{
    quote_identifier, DELETED_COLUMN, DIRTY_COLUMN, ID_COLUMN, JSON_COLUMN, OPERATION_COLUMN,
};

impl Collection {
    /// Acknowledge synchronized documents.
    ///
    /// Tombstones are deleted for good; other rows have their dirty metadata
    /// reset. Rows that were already clean still count. Ids with no row are
    /// skipped.
    pub fn mark_clean<K: DocumentKey>(&self, keys: &[K]) -> Result<usize> {
        self.ensure_open()?;
        self.backend.write(|conn| {
            let mut lookup = conn.prepare_cached(&format!(
                "SELECT {} FROM {} WHERE {} = ?1",
                quote_identifier(OPERATION_COLUMN),
                self.table(),
                quote_identifier(ID_COLUMN)
            ))?;
            let mut reset = conn.prepare_cached(&format!(
                "UPDATE {} SET {} = 0, {} = 0, {} = '' WHERE {} = ?1",
                self.table(),
                quote_identifier(DIRTY_COLUMN),
                quote_identifier(DELETED_COLUMN),
                quote_identifier(OPERATION_COLUMN),
                quote_identifier(ID_COLUMN)
            ))?;

            let mut cleaned = 0;
            for key in keys {
                let id = key.document_id();
                let operation: Option<String> = lookup
                    .query_row(params![id], |row| row.get(0))
                    .optional()?;
                match operation.as_deref() {
                    None => continue,
                    Some(op) if op == Operation::Delete.as_str() => {
                        self.delete_row(conn, id)?;
                    }
                    Some(_) => {
                        reset.execute(params![id])?;
                    }
                }
                cleaned += 1;
            }
            debug!("Marked {} documents clean in '{}'", cleaned, self.name);
            Ok(cleaned)
        })
    }

    /// True if the row (tombstones included) has unsynchronized changes.
    pub fn is_dirty(&self, id: DocumentId) -> Result<bool> {
        let query: QueryParts = QueryPart::new()
            .equal(ID_COLUMN, id)
            .greater_than(DIRTY_COLUMN, 0i64)
            .into();
        Ok(self.count(&query, &CountOptions::default().include_deleted(true))? > 0)
    }

    /// Number of rows with unsynchronized changes, tombstones included.
    pub fn count_all_dirty(&self) -> Result<u64> {
        self.count(
            &dirty_query(),
            &CountOptions::default().include_deleted(true),
        )
    }

    /// Every dirty row, tombstones included, oldest change first.
    pub fn all_dirty(&self) -> Result<Vec<DirtyDocument>> {
        let options = FindOptions::new()
            .with_filter([
                ID_COLUMN,
                JSON_COLUMN,
                DIRTY_COLUMN,
                DELETED_COLUMN,
                OPERATION_COLUMN,
            ])
            .sort_ascending(DIRTY_COLUMN)
            .include_deleted(true);
        self.find(&dirty_query(), &options)?
            .into_iter()
            .map(dirty_from_row)
            .collect()
    }
}

fn dirty_query() -> QueryParts {
    QueryPart::new().greater_than(DIRTY_COLUMN, 0i64).into()
}

fn dirty_from_row(row: Value) -> Result<DirtyDocument> {
    let mut row: Map<String, Value> = match row {
        Value::Object(row) => row,
        other => {
            return Err(JsonStoreError::Serialization(format!(
                "Expected a row object, got {}",
                other
            )))
        }
    };
    let int = |row: &Map<String, Value>, column: &str| -> Result<i64> {
        row.get(column).and_then(Value::as_i64).ok_or_else(|| {
            JsonStoreError::Serialization(format!("Row is missing integer column '{}'", column))
        })
    };

    let id = int(&row, ID_COLUMN)?;
    let dirty = int(&row, DIRTY_COLUMN)?;
    let deleted = int(&row, DELETED_COLUMN)? != 0;
    let operation = row
        .get(OPERATION_COLUMN)
        .and_then(Value::as_str)
        .unwrap_or("")
        .parse::<Operation>()?;
    let json = row.remove(JSON_COLUMN).unwrap_or(Value::Null);

    Ok(DirtyDocument {
        id,
        json,
        dirty,
        deleted,
        operation,
    })
}
