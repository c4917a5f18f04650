// jsonstore-core/src/transaction.rs
// Ambient transaction spanning several store calls

use log::warn;

use crate::backend::Backend;
use crate::error::Result;

/// An open ambient transaction.
///
/// Every write made through the store's collections while this value is
/// alive joins the transaction. Nothing is committed until
/// [`commit`](StoreTransaction::commit); dropping the value without
/// committing rolls everything back.
///
/// ```rust
/// use jsonstore_core::{AddOptions, CollectionSchema, FieldType, OpenCollectionOptions, Store};
/// use serde_json::json;
///
/// let store = Store::open_in_memory()?;
/// let people = store.open_collection(
///     "people",
///     CollectionSchema::new().search_field("name", FieldType::String),
///     &OpenCollectionOptions::default(),
/// )?;
///
/// let tx = store.begin_transaction()?;
/// people.add(&[json!({"name": "carlos"})], &AddOptions::default())?;
/// tx.rollback()?;
/// assert_eq!(people.count_all_documents()?, 0);
/// # Ok::<(), jsonstore_core::JsonStoreError>(())
/// ```
#[must_use = "dropping a StoreTransaction rolls it back"]
pub struct StoreTransaction<'a> {
    backend: &'a Backend,
    finished: bool,
}

impl<'a> StoreTransaction<'a> {
    pub(crate) fn begin(backend: &'a Backend) -> Result<Self> {
        backend.begin()?;
        Ok(StoreTransaction {
            backend,
            finished: false,
        })
    }

    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.backend.commit()
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.backend.rollback()
    }
}

impl Drop for StoreTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("Transaction dropped without commit, rolling back");
        if let Err(err) = self.backend.rollback() {
            warn!("Rollback on drop failed: {}", err);
        }
    }
}
