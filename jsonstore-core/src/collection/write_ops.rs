// jsonstore-core/src/collection/write_ops.rs
// add, replace, remove, change
//
// Every entry point runs its whole batch through Backend::write, so a
// returned error means nothing from the batch was kept.

use std::collections::HashMap;

use ahash::AHashSet;
use log::{debug, trace};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;

use super::Collection;
use crate::document::{dirty_timestamp, Document, DocumentId, DocumentKey, Operation};
use crate::error::{JsonStoreError, Result};
use crate::options::{AddOptions, ChangeOptions, FindOptions, RemoveOptions, ReplaceOptions};
use crate::query::{QueryPart, QueryParts};
use crate::schema::{
    flatten_field, quote_identifier, DELETED_COLUMN, DIRTY_COLUMN, ID_COLUMN, JSON_COLUMN,
    OPERATION_COLUMN,
};
use crate::value::Scalar;

impl Collection {
    // ========== CRUD OPERATIONS ==========

    /// Insert documents and return their new ids, in input order.
    ///
    /// With `mark_dirty` the rows are recorded as local adds; otherwise as
    /// stored clean copies. On failure nothing is inserted and the error
    /// reports how many documents had gone in before the failing one.
    pub fn add(&self, documents: &[Value], options: &AddOptions) -> Result<Vec<DocumentId>> {
        self.ensure_open()?;
        // unknown additional fields fail before touching the backend
        self.schema.additional_values(&options.additional_search_fields)?;

        let ids = self.backend.write(|conn| {
            let mut ids = Vec::with_capacity(documents.len());
            for (index, document) in documents.iter().enumerate() {
                match self.insert_row(
                    conn,
                    document,
                    &options.additional_search_fields,
                    options.mark_dirty,
                ) {
                    Ok(id) => ids.push(id),
                    Err(err) => {
                        return Err(JsonStoreError::AddFailed {
                            succeeded: index,
                            source: Box::new(err),
                        })
                    }
                }
            }
            Ok(ids)
        })?;
        debug!("Added {} documents to '{}'", ids.len(), self.name);
        Ok(ids)
    }

    /// Overwrite live documents by `_id`.
    ///
    /// Every document is attempted; if any fails, all changes are rolled
    /// back and [`JsonStoreError::ReplaceFailed`] lists the failures.
    pub fn replace(&self, documents: &[Document], options: &ReplaceOptions) -> Result<usize> {
        self.ensure_open()?;
        self.backend.write(|conn| {
            let mut replaced = 0;
            let mut failed = Vec::new();
            for document in documents {
                match self.update_row(conn, document.id, &document.json, options.mark_dirty) {
                    Ok(true) => replaced += 1,
                    Ok(false) => failed.push(document.clone()),
                    Err(err) => {
                        debug!("Replace of {} in '{}' failed: {}", document.id, self.name, err);
                        failed.push(document.clone());
                    }
                }
            }
            if !failed.is_empty() {
                return Err(JsonStoreError::ReplaceFailed { failed });
            }
            Ok(replaced)
        })
    }

    /// Remove documents by id.
    ///
    /// With `mark_dirty` (the default) rows become tombstones until
    /// [`mark_clean`](Collection::mark_clean); otherwise they are deleted.
    /// Stops at the first failure and rolls back.
    pub fn remove<K: DocumentKey>(&self, keys: &[K], options: &RemoveOptions) -> Result<usize> {
        self.ensure_open()?;
        let mut seen = AHashSet::with_capacity(keys.len());
        let ids: Vec<DocumentId> = keys
            .iter()
            .map(|key| key.document_id())
            .filter(|id| seen.insert(*id))
            .collect();

        self.backend.write(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM {} WHERE {} = ?1",
                quote_identifier(OPERATION_COLUMN),
                self.table(),
                quote_identifier(ID_COLUMN)
            ))?;
            let mut removed = 0;
            for id in &ids {
                let exists: Option<String> = stmt
                    .query_row(params![id], |row| row.get(0))
                    .optional()?;
                if exists.is_none() {
                    return Err(JsonStoreError::WriteFailure {
                        id: *id,
                        reason: "document not found".to_string(),
                    });
                }
                let result = if options.mark_dirty {
                    self.tombstone_row(conn, *id)
                } else {
                    self.delete_row(conn, *id)
                };
                let changed = result.map_err(|err| JsonStoreError::WriteFailure {
                    id: *id,
                    reason: err.to_string(),
                })?;
                if changed != 1 {
                    return Err(JsonStoreError::WriteFailure {
                        id: *id,
                        reason: format!("expected 1 row to change, got {}", changed),
                    });
                }
                removed += 1;
            }
            debug!("Removed {} documents from '{}'", removed, self.name);
            Ok(removed)
        })
    }

    /// Upsert.
    ///
    /// Each document is matched on its `replace_criteria` values. Matched
    /// rows are all replaced; a document matching nothing is inserted when
    /// `add_new` is set and skipped otherwise. Returns replaced plus inserted.
    pub fn change(&self, documents: &[Value], options: &ChangeOptions) -> Result<usize> {
        self.ensure_open()?;
        for field in &options.replace_criteria {
            if self.schema.find_search_field(field).is_none() {
                return Err(JsonStoreError::UnknownField {
                    collection: self.name.clone(),
                    field: field.clone(),
                });
            }
        }

        let compiler = self.compiler();
        let no_additional = HashMap::new();
        self.backend.write(|conn| {
            let mut changed = 0;
            for document in documents {
                ensure_object(document)?;
                let matches = match criteria_query(document, &options.replace_criteria) {
                    Some(query) => compiler
                        .compile_find(&query, &FindOptions::default())?
                        .execute(conn)?
                        .into_documents(),
                    None => Vec::new(),
                };

                if matches.is_empty() {
                    if options.add_new {
                        self.insert_row(conn, document, &no_additional, options.mark_dirty)?;
                        changed += 1;
                    }
                    continue;
                }

                for existing in matches {
                    if !self.update_row(conn, existing.id, document, options.mark_dirty)? {
                        return Err(JsonStoreError::WriteFailure {
                            id: existing.id,
                            reason: "matched document could not be updated".to_string(),
                        });
                    }
                    changed += 1;
                }
            }
            debug!("Changed {} documents in '{}'", changed, self.name);
            Ok(changed)
        })
    }

    // ========== ROW HELPERS ==========

    pub(super) fn insert_row(
        &self,
        conn: &Connection,
        document: &Value,
        additional: &HashMap<String, Scalar>,
        mark_dirty: bool,
    ) -> Result<DocumentId> {
        ensure_object(document)?;
        let (dirty, operation) = if mark_dirty {
            (dirty_timestamp(), Operation::Add)
        } else {
            (0, Operation::Store)
        };

        let mut columns = vec![
            quote_identifier(JSON_COLUMN),
            quote_identifier(DIRTY_COLUMN),
            quote_identifier(DELETED_COLUMN),
            quote_identifier(OPERATION_COLUMN),
        ];
        let mut values = vec![
            SqlValue::Text(document.to_string()),
            SqlValue::Integer(dirty),
            SqlValue::Integer(0),
            SqlValue::Text(operation.as_str().to_string()),
        ];
        for (column, value) in self.schema.flatten(document, additional)? {
            columns.push(quote_identifier(&column));
            values.push(SqlValue::Text(value));
        }

        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table(),
            columns.join(", "),
            placeholders
        );
        trace!("insert: {}", sql);
        conn.prepare_cached(&sql)?
            .execute(params_from_iter(values.iter()))?;
        Ok(conn.last_insert_rowid())
    }

    /// Rewrite a live row's payload and search columns.
    ///
    /// Additional search fields keep their values. Returns `false` when no
    /// live row has this id.
    pub(super) fn update_row(
        &self,
        conn: &Connection,
        id: DocumentId,
        document: &Value,
        mark_dirty: bool,
    ) -> Result<bool> {
        ensure_object(document)?;
        let (dirty, operation) = if mark_dirty {
            (dirty_timestamp(), Operation::Update)
        } else {
            (0, Operation::None)
        };

        let mut assignments = vec![
            format!("{} = ?", quote_identifier(JSON_COLUMN)),
            format!("{} = ?", quote_identifier(DIRTY_COLUMN)),
            format!("{} = ?", quote_identifier(OPERATION_COLUMN)),
        ];
        let mut values = vec![
            SqlValue::Text(document.to_string()),
            SqlValue::Integer(dirty),
            SqlValue::Text(operation.as_str().to_string()),
        ];
        for field in &self.schema.search_fields {
            assignments.push(format!("{} = ?", quote_identifier(&field.column())));
            values.push(match flatten_field(&field.name, document) {
                Some((_, value)) => SqlValue::Text(value),
                None => SqlValue::Null,
            });
        }
        values.push(SqlValue::Integer(id));

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ? AND {} = 0",
            self.table(),
            assignments.join(", "),
            quote_identifier(ID_COLUMN),
            quote_identifier(DELETED_COLUMN)
        );
        let changed = conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(values.iter()))?;
        Ok(changed == 1)
    }

    fn tombstone_row(&self, conn: &Connection, id: DocumentId) -> Result<usize> {
        let sql = format!(
            "UPDATE {} SET {} = 1, {} = ?1, {} = ?2 WHERE {} = ?3",
            self.table(),
            quote_identifier(DELETED_COLUMN),
            quote_identifier(DIRTY_COLUMN),
            quote_identifier(OPERATION_COLUMN),
            quote_identifier(ID_COLUMN)
        );
        let changed = conn.prepare_cached(&sql)?.execute(params![
            dirty_timestamp(),
            Operation::Delete.as_str(),
            id
        ])?;
        Ok(changed)
    }

    pub(super) fn delete_row(&self, conn: &Connection, id: DocumentId) -> Result<usize> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            self.table(),
            quote_identifier(ID_COLUMN)
        );
        Ok(conn.prepare_cached(&sql)?.execute(params![id])?)
    }
}

fn ensure_object(document: &Value) -> Result<()> {
    if document.is_object() {
        Ok(())
    } else {
        Err(JsonStoreError::InvalidDocument(format!(
            "Documents must be JSON objects, got {}",
            document
        )))
    }
}

/// Equality query over the criteria fields, or `None` when the document
/// cannot match anything (no criteria, or a criterion value is missing).
fn criteria_query(document: &Value, criteria: &[String]) -> Option<QueryParts> {
    if criteria.is_empty() {
        return None;
    }
    let mut part = QueryPart::new();
    for field in criteria {
        let (_, value) = flatten_field(field, document)?;
        part = part.equal(field.as_str(), value);
    }
    Some(part.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_criteria_query() {
        let doc = json!({"name": "carlos", "address": {"city": "Austin"}});
        assert!(criteria_query(&doc, &[]).is_none());
        assert!(criteria_query(&doc, &["age".to_string()]).is_none());

        let query = criteria_query(&doc, &["name".to_string(), "address.city".to_string()]).unwrap();
        let predicates = query.parts()[0].predicates();
        assert_eq!(predicates.len(), 2);
        assert_eq!(predicates[1].field(), "address.city");
    }

    #[test]
    fn test_ensure_object() {
        assert!(ensure_object(&json!({})).is_ok());
        assert!(matches!(
            ensure_object(&json!([1, 2])),
            Err(JsonStoreError::InvalidDocument(_))
        ));
    }
}
