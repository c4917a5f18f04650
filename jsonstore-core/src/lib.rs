// jsonstore-core/src/lib.rs
// Embedded JSON document store on SQLite, with search fields and dirty tracking

mod backend;
pub mod catalog;
pub mod collection;
pub mod config;
pub mod document;
pub mod durability;
pub mod error;
pub mod logging;
pub mod options;
pub mod query;
pub mod schema;
pub mod store;
pub mod transaction;
pub mod value;

// Public exports
pub use collection::Collection;
pub use config::StoreConfig;
pub use document::{DirtyDocument, Document, DocumentId, DocumentKey, Operation};
pub use durability::{DurabilityMode, JournalMode};
pub use error::{JsonStoreError, Result};
pub use logging::{get_log_level, set_log_level, LogLevel};
pub use options::{
    AddOptions, ChangeOptions, CountOptions, FindOptions, OpenCollectionOptions, RemoveOptions,
    ReplaceOptions, SortDirection, SortKey,
};
pub use query::{parse_query, Operand, Operator, Predicate, QueryPart, QueryParts};
pub use schema::{CollectionSchema, FieldType, SearchField};
pub use store::Store;
pub use transaction::StoreTransaction;
pub use value::Scalar;
