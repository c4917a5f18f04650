// jsonstore-core/src/store.rs
// Store handle: owns the connection and the collection registry

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::backend::Backend;
use crate::catalog;
use crate::collection::Collection;
use crate::config::StoreConfig;
use crate::error::{JsonStoreError, Result};
use crate::options::OpenCollectionOptions;
use crate::schema::{check_mismatch, is_reserved_column, validate_collection_name, CollectionSchema};
use crate::transaction::StoreTransaction;

/// An opened document store.
///
/// All collections of a store share one SQLite connection.
pub struct Store {
    backend: Arc<Backend>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl Store {
    pub fn open(config: StoreConfig) -> Result<Self> {
        let backend = Backend::open(&config)?;
        Ok(Store {
            backend: Arc::new(backend),
            collections: RwLock::new(HashMap::new()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreConfig::in_memory())
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.backend.path()
    }

    // ========== COLLECTIONS ==========

    /// Open a collection, creating it if needed.
    ///
    /// An existing collection must have been declared with the same set of
    /// field names, otherwise this fails with
    /// [`JsonStoreError::SchemaMismatch`] and the data is left untouched.
    /// With `drop_collection` the old table is dropped and recreated instead.
    pub fn open_collection(
        &self,
        name: &str,
        schema: CollectionSchema,
        options: &OpenCollectionOptions,
    ) -> Result<Arc<Collection>> {
        validate_collection_name(name)?;
        schema.validate()?;
        if let Some(existing) = self
            .backend
            .read(|conn| catalog::case_variant(conn, name))?
        {
            return Err(JsonStoreError::SchemaError(format!(
                "Collection '{}' clashes with existing collection '{}': names are case-insensitive",
                name, existing
            )));
        }

        let existing = self
            .backend
            .read(|conn| catalog::table_columns(conn, name))?;
        let requested = schema.columns();
        let mut reprovisioned = false;

        match existing {
            None => {
                self.backend.ensure_no_transaction("create a collection")?;
                self.backend
                    .write(|conn| catalog::create_collection(conn, name, &schema))?;
            }
            Some(columns) => {
                let existing: Vec<String> = columns
                    .into_iter()
                    .filter(|c| !is_reserved_column(c))
                    .collect();
                if check_mismatch(&existing, &requested) {
                    if !options.drop_collection {
                        return Err(JsonStoreError::SchemaMismatch {
                            collection: name.to_string(),
                            existing,
                            requested,
                        });
                    }
                    self.backend
                        .ensure_no_transaction("reprovision a collection")?;
                    info!(
                        "Reprovisioning collection '{}': {:?} -> {:?}",
                        name, existing, requested
                    );
                    self.backend.write(|conn| {
                        catalog::drop_collection(conn, name)?;
                        catalog::create_collection(conn, name, &schema)
                    })?;
                    reprovisioned = true;
                } else {
                    let stored = self.backend.read(|conn| catalog::load_schema(conn, name))?;
                    if stored.as_ref() != Some(&schema) {
                        self.backend
                            .write(|conn| catalog::save_schema(conn, name, &schema))?;
                    }
                    debug!("Reopened collection '{}'", name);
                }
            }
        }

        let collection = Arc::new(Collection::new(
            name.to_string(),
            schema,
            Arc::clone(&self.backend),
        ));
        let previous = self
            .collections
            .write()
            .insert(name.to_string(), Arc::clone(&collection));
        // the old handle points at a dropped table
        if let (Some(previous), true) = (previous, reprovisioned) {
            previous.detach();
        }
        Ok(collection)
    }

    /// Handle to an existing collection, using the schema it was created with.
    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        if let Some(collection) = self.collections.read().get(name) {
            if !collection.is_detached() {
                return Ok(Arc::clone(collection));
            }
        }

        let schema = self
            .backend
            .read(|conn| catalog::load_schema(conn, name))?
            .ok_or_else(|| JsonStoreError::NotOpen(name.to_string()))?;
        let collection = Arc::new(Collection::new(
            name.to_string(),
            schema,
            Arc::clone(&self.backend),
        ));
        self.collections
            .write()
            .insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }

    /// Names of all collections in the store, sorted
    pub fn collection_names(&self) -> Result<Vec<String>> {
        self.backend.read(catalog::collection_names)
    }

    pub fn remove_collection(&self, name: &str) -> Result<()> {
        let collection = self.collection(name)?;
        collection.remove_collection()?;
        self.collections.write().remove(name);
        Ok(())
    }

    // ========== TRANSACTIONS ==========

    /// Start an ambient transaction. Fails if one is already active.
    pub fn begin_transaction(&self) -> Result<StoreTransaction<'_>> {
        StoreTransaction::begin(&self.backend)
    }

    pub fn is_transaction_active(&self) -> bool {
        self.backend.in_transaction()
    }

    // ========== LIFECYCLE ==========

    pub fn is_open(&self) -> bool {
        self.backend.is_open()
    }

    /// Close the connection. Outstanding collection handles stop working.
    pub fn close(self) -> Result<()> {
        self.backend.close()?;
        for collection in self.collections.read().values() {
            collection.detach();
        }
        Ok(())
    }

    /// Close the store and delete its files.
    pub fn destroy(self) -> Result<()> {
        let path = self.backend.path().map(Path::to_path_buf);
        self.close()?;
        if let Some(path) = path {
            for file in database_files(&path) {
                match fs::remove_file(&file) {
                    Ok(()) => debug!("Removed {}", file.display()),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => {
                        warn!("Failed to remove {}: {}", file.display(), err);
                        return Err(err.into());
                    }
                }
            }
            info!("Destroyed store at {}", path.display());
        }
        Ok(())
    }
}

/// The database file plus its WAL and shared-memory companions.
fn database_files(path: &Path) -> Vec<PathBuf> {
    let mut files = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_files() {
        let files = database_files(Path::new("/tmp/app.db"));
        assert_eq!(
            files,
            vec![
                PathBuf::from("/tmp/app.db"),
                PathBuf::from("/tmp/app.db-wal"),
                PathBuf::from("/tmp/app.db-shm"),
                PathBuf::from("/tmp/app.db-journal"),
            ]
        );
    }
}
