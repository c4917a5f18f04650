// jsonstore-core/src/collection/mod.rs
// Collection handle: reads here, writes in write_ops.rs, sync bookkeeping in dirty.rs
//
// FILE STRUCTURE:
// ├── mod.rs       constructor, find/count, find_by_id, clear/remove collection
// ├── write_ops.rs add, replace, remove, change
// └── dirty.rs     mark_clean, is_dirty, count_all_dirty, all_dirty

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use log::debug;
use serde_json::Value;

use crate::backend::Backend;
use crate::catalog;
use crate::document::{Document, DocumentId};
use crate::error::{JsonStoreError, Result};
use crate::options::{CountOptions, FindOptions};
use crate::query::compiler::QueryOutput;
use crate::query::{QueryCompiler, QueryPart, QueryParts};
use crate::schema::{quote_identifier, CollectionSchema, ID_COLUMN};

mod dirty;
mod write_ops;

/// Ids per `IN (...)` lookup in [`Collection::find_by_id`].
pub const FIND_BY_ID_CHUNK: usize = 200;

/// Handle to one collection of a [`Store`](crate::Store).
///
/// Handles share the store's connection. After
/// [`remove_collection`](Collection::remove_collection) or
/// [`Store::close`](crate::Store::close) every operation fails with
/// [`JsonStoreError::NotOpen`].
pub struct Collection {
    name: String,
    schema: CollectionSchema,
    backend: Arc<Backend>,
    detached: AtomicBool,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("detached", &self.is_detached())
            .finish()
    }
}

impl Collection {
    // ========== CONSTRUCTOR ==========

    pub(crate) fn new(name: String, schema: CollectionSchema, backend: Arc<Backend>) -> Self {
        Collection {
            name,
            schema,
            backend,
            detached: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_detached() {
            return Err(JsonStoreError::NotOpen(self.name.clone()));
        }
        Ok(())
    }

    fn compiler(&self) -> QueryCompiler<'_> {
        QueryCompiler::new(&self.name, &self.schema)
    }

    fn table(&self) -> String {
        quote_identifier(&self.name)
    }

    // ========== QUERY OPERATIONS ==========

    /// Find matching documents.
    ///
    /// Without a `filter` each row is `{"_id": .., "json": ..}`; with one,
    /// each row is an object keyed by the requested field names. A filter of
    /// exactly `["count"]` returns a single number.
    pub fn find(&self, query: &QueryParts, options: &FindOptions) -> Result<Vec<Value>> {
        Ok(self.run_find(query, options)?.into_values())
    }

    /// Find matching documents as typed [`Document`]s.
    pub fn find_documents(&self, query: &QueryParts, options: &FindOptions) -> Result<Vec<Document>> {
        if !options.filter.is_empty() {
            return Err(JsonStoreError::InvalidQuery(
                "find_documents returns whole documents; use find for a projection".to_string(),
            ));
        }
        Ok(self.run_find(query, options)?.into_documents())
    }

    pub fn find_all(&self, options: &FindOptions) -> Result<Vec<Document>> {
        self.find_documents(&QueryParts::all(), options)
    }

    fn run_find(&self, query: &QueryParts, options: &FindOptions) -> Result<QueryOutput> {
        self.ensure_open()?;
        let compiled = self.compiler().compile_find(query, options)?;
        self.backend.read(|conn| compiled.execute(conn))
    }

    /// Look up live documents by id.
    ///
    /// The result follows the order of `ids`, with duplicates collapsed to
    /// their first occurrence and unknown ids dropped.
    pub fn find_by_id(&self, ids: &[DocumentId]) -> Result<Vec<Document>> {
        self.ensure_open()?;
        let compiler = self.compiler();
        let queries = ids
            .chunks(FIND_BY_ID_CHUNK)
            .map(|chunk| {
                let query: QueryParts = QueryPart::new()
                    .in_list(ID_COLUMN, chunk.iter().copied())
                    .into();
                compiler.compile_find(&query, &FindOptions::default())
            })
            .collect::<Result<Vec<_>>>()?;

        let mut found = AHashMap::with_capacity(ids.len());
        self.backend.read(|conn| {
            for query in &queries {
                for document in query.execute(conn)?.into_documents() {
                    found.insert(document.id, document);
                }
            }
            Ok(())
        })?;

        let mut seen = AHashSet::with_capacity(ids.len());
        let mut documents = Vec::with_capacity(found.len());
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            if let Some(document) = found.remove(id) {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    pub fn count(&self, query: &QueryParts, options: &CountOptions) -> Result<u64> {
        self.ensure_open()?;
        let compiled = self.compiler().compile_count(query, options)?;
        let output = self.backend.read(|conn| compiled.execute(conn))?;
        Ok(output.count())
    }

    /// Number of live (not tombstoned) documents
    pub fn count_all_documents(&self) -> Result<u64> {
        self.count(&QueryParts::all(), &CountOptions::default())
    }

    // ========== COLLECTION OPERATIONS ==========

    /// Delete every row, tombstones included. Ids are not reused afterwards.
    pub fn clear_collection(&self) -> Result<usize> {
        self.ensure_open()?;
        let removed = self
            .backend
            .write(|conn| Ok(conn.execute(&format!("DELETE FROM {}", self.table()), [])?))?;
        debug!("Cleared {} rows from '{}'", removed, self.name);
        Ok(removed)
    }

    /// Drop the collection's table and detach this handle.
    pub fn remove_collection(&self) -> Result<()> {
        self.ensure_open()?;
        self.backend.ensure_no_transaction("remove a collection")?;
        self.backend
            .write(|conn| catalog::drop_collection(conn, &self.name))?;
        self.detach();
        Ok(())
    }
}
