// Integration tests for store lifecycle, collection provisioning and ambient transactions
use jsonstore_core::{
    AddOptions, CollectionSchema, DurabilityMode, FieldType, FindOptions, JsonStoreError,
    OpenCollectionOptions, RemoveOptions, Store, StoreConfig,
};
use serde_json::json;
use tempfile::TempDir;

fn people_schema() -> CollectionSchema {
    CollectionSchema::new()
        .search_field("name", FieldType::String)
        .search_field("age", FieldType::Integer)
}

fn create_test_store() -> (TempDir, Store) {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(StoreConfig::at(temp_dir.path().join("test.db"))).unwrap();
    (temp_dir, store)
}

#[test]
fn test_schema_mismatch_on_reopen_keeps_rows() {
    let (temp, store) = create_test_store();
    let people = store
        .open_collection("people", people_schema(), &OpenCollectionOptions::default())
        .unwrap();
    people
        .add(
            &[json!({"name": "carlos", "age": 1}), json!({"name": "mike", "age": 3})],
            &AddOptions::default(),
        )
        .unwrap();
    store.close().unwrap();

    let store = Store::open(StoreConfig::at(temp.path().join("test.db"))).unwrap();
    let changed = CollectionSchema::new()
        .search_field("name", FieldType::String)
        .search_field("email", FieldType::String);
    let err = store
        .open_collection("people", changed, &OpenCollectionOptions::default())
        .unwrap_err();
    assert!(err.is_schema_error());
    match err {
        JsonStoreError::SchemaMismatch { existing, requested, .. } => {
            assert_eq!(existing, vec!["name", "age"]);
            assert_eq!(requested, vec!["name", "email"]);
        }
        other => panic!("unexpected error {:?}", other),
    }

    // same field set in a different order is not a mismatch
    let reordered = CollectionSchema::new()
        .search_field("age", FieldType::Integer)
        .search_field("name", FieldType::String);
    let people = store
        .open_collection("people", reordered, &OpenCollectionOptions::default())
        .unwrap();
    assert_eq!(people.count_all_documents().unwrap(), 2);
}

#[test]
fn test_drop_collection_reprovisions() {
    let (_temp, store) = create_test_store();
    let people = store
        .open_collection("people", people_schema(), &OpenCollectionOptions::default())
        .unwrap();
    people
        .add(&[json!({"name": "carlos", "age": 1})], &AddOptions::default())
        .unwrap();

    let changed = CollectionSchema::new().search_field("email", FieldType::String);
    let fresh = store
        .open_collection(
            "people",
            changed.clone(),
            &OpenCollectionOptions {
                drop_collection: true,
            },
        )
        .unwrap();
    assert_eq!(fresh.count_all_documents().unwrap(), 0);
    assert_eq!(fresh.schema(), &changed);

    // the handle for the old layout is gone
    assert!(matches!(
        people.count_all_documents(),
        Err(JsonStoreError::NotOpen(_))
    ));
}

#[test]
fn test_catalog_survives_reopen() {
    let (temp, store) = create_test_store();
    let schema = people_schema().additional_search_field("owner", FieldType::String);
    store
        .open_collection("people", schema.clone(), &OpenCollectionOptions::default())
        .unwrap()
        .add(&[json!({"name": "carlos"})], &AddOptions::default().with_additional_field("owner", "u1"))
        .unwrap();
    store
        .open_collection(
            "notes",
            CollectionSchema::new().search_field("title", FieldType::String),
            &OpenCollectionOptions::default(),
        )
        .unwrap();
    store.close().unwrap();

    let store = Store::open(
        StoreConfig::at(temp.path().join("test.db")).with_durability(DurabilityMode::Normal),
    )
    .unwrap();
    assert_eq!(store.collection_names().unwrap(), vec!["notes", "people"]);
    let people = store.collection("people").unwrap();
    assert_eq!(people.schema(), &schema);
    assert_eq!(people.find_all(&FindOptions::default()).unwrap().len(), 1);
    assert!(matches!(
        store.collection("missing"),
        Err(JsonStoreError::NotOpen(ref name)) if name == "missing"
    ));
}

#[test]
fn test_invalid_declarations() {
    let store = Store::open_in_memory().unwrap();
    let options = OpenCollectionOptions::default();
    for name in ["", "1people", "bad-name", "jsonstore_catalog", "has space"] {
        assert!(
            matches!(
                store.open_collection(name, people_schema(), &options),
                Err(JsonStoreError::SchemaError(_))
            ),
            "{} should be rejected",
            name
        );
    }

    let reserved = CollectionSchema::new().search_field("_dirty", FieldType::Integer);
    assert!(store.open_collection("a", reserved, &options).is_err());
    let colliding = CollectionSchema::new()
        .search_field("address.city", FieldType::String)
        .additional_search_field("address_city", FieldType::String);
    assert!(store.open_collection("b", colliding, &options).is_err());
}

#[test]
fn test_remove_collection_detaches_handle() {
    let store = Store::open_in_memory().unwrap();
    let people = store
        .open_collection("people", people_schema(), &OpenCollectionOptions::default())
        .unwrap();
    people
        .add(&[json!({"name": "carlos", "age": 1})], &AddOptions::default())
        .unwrap();

    people.remove_collection().unwrap();
    assert!(matches!(
        people.find_all(&FindOptions::default()),
        Err(JsonStoreError::NotOpen(ref name)) if name == "people"
    ));
    assert!(matches!(
        people.add(&[json!({})], &AddOptions::default()),
        Err(JsonStoreError::NotOpen(_))
    ));
    assert!(store.collection("people").is_err());
    assert!(store.collection_names().unwrap().is_empty());

    // the name can be provisioned again
    let people = store
        .open_collection("people", people_schema(), &OpenCollectionOptions::default())
        .unwrap();
    assert_eq!(people.count_all_documents().unwrap(), 0);
    store.remove_collection("people").unwrap();
    assert!(store.remove_collection("people").is_err());
}

#[test]
fn test_close_and_destroy() {
    let (temp, store) = create_test_store();
    let path = temp.path().join("test.db");
    let people = store
        .open_collection("people", people_schema(), &OpenCollectionOptions::default())
        .unwrap();
    store.close().unwrap();
    assert!(matches!(
        people.count_all_documents(),
        Err(JsonStoreError::NotOpen(_))
    ));
    assert!(path.exists());

    let store = Store::open(StoreConfig::at(&path)).unwrap();
    assert_eq!(store.path(), Some(path.as_path()));
    store.destroy().unwrap();
    assert!(!path.exists());
}

#[test]
fn test_ambient_transaction_commit_and_rollback() {
    let store = Store::open_in_memory().unwrap();
    let options = OpenCollectionOptions::default();
    let people = store.open_collection("people", people_schema(), &options).unwrap();
    let notes = store
        .open_collection(
            "notes",
            CollectionSchema::new().search_field("title", FieldType::String),
            &options,
        )
        .unwrap();

    let tx = store.begin_transaction().unwrap();
    assert!(store.is_transaction_active());
    people.add(&[json!({"name": "carlos"})], &AddOptions::default()).unwrap();
    notes.add(&[json!({"title": "hello"})], &AddOptions::default()).unwrap();
    tx.rollback().unwrap();
    assert!(!store.is_transaction_active());
    assert_eq!(people.count_all_documents().unwrap(), 0);
    assert_eq!(notes.count_all_documents().unwrap(), 0);

    let tx = store.begin_transaction().unwrap();
    people.add(&[json!({"name": "carlos"})], &AddOptions::default()).unwrap();
    notes.add(&[json!({"title": "hello"})], &AddOptions::default()).unwrap();
    tx.commit().unwrap();
    assert_eq!(people.count_all_documents().unwrap(), 1);
    assert_eq!(notes.count_all_documents().unwrap(), 1);
}

#[test]
fn test_dropped_transaction_rolls_back() {
    let store = Store::open_in_memory().unwrap();
    let people = store
        .open_collection("people", people_schema(), &OpenCollectionOptions::default())
        .unwrap();
    {
        let _tx = store.begin_transaction().unwrap();
        people.add(&[json!({"name": "carlos"})], &AddOptions::default()).unwrap();
    }
    assert!(!store.is_transaction_active());
    assert_eq!(people.count_all_documents().unwrap(), 0);
}

#[test]
fn test_failed_batch_inside_transaction_keeps_earlier_calls() {
    let store = Store::open_in_memory().unwrap();
    let people = store
        .open_collection("people", people_schema(), &OpenCollectionOptions::default())
        .unwrap();
    let tx = store.begin_transaction().unwrap();
    let ids = people
        .add(&[json!({"name": "carlos"}), json!({"name": "mike"})], &AddOptions::default())
        .unwrap();
    let err = people
        .remove(&[ids[0], 999], &RemoveOptions::default())
        .unwrap_err();
    assert!(matches!(err, JsonStoreError::WriteFailure { id: 999, .. }));
    assert!(store.is_transaction_active());
    tx.commit().unwrap();

    // the failed remove left nothing behind, the earlier add was committed
    assert_eq!(people.count_all_documents().unwrap(), 2);
    assert_eq!(people.count_all_dirty().unwrap(), 0);
}

#[test]
fn test_transaction_rules() {
    let store = Store::open_in_memory().unwrap();
    let people = store
        .open_collection("people", people_schema(), &OpenCollectionOptions::default())
        .unwrap();

    let tx = store.begin_transaction().unwrap();
    assert!(matches!(
        store.begin_transaction(),
        Err(JsonStoreError::Transaction(_))
    ));

    // topology changes are rejected while the transaction is open
    let err = store
        .open_collection(
            "notes",
            CollectionSchema::new().search_field("title", FieldType::String),
            &OpenCollectionOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, JsonStoreError::Transaction(_)));
    assert!(matches!(
        people.remove_collection(),
        Err(JsonStoreError::Transaction(_))
    ));

    // reopening an existing collection is fine
    store
        .open_collection("people", people_schema(), &OpenCollectionOptions::default())
        .unwrap();
    tx.commit().unwrap();

    assert!(store.begin_transaction().unwrap().commit().is_ok());
    assert_eq!(store.collection_names().unwrap(), vec!["people"]);
}

#[test]
fn test_collection_names_are_case_insensitive() {
    let store = Store::open_in_memory().unwrap();
    let people = store
        .open_collection("people", people_schema(), &OpenCollectionOptions::default())
        .unwrap();
    people
        .add(&[json!({"name": "carlos", "age": 1})], &AddOptions::default())
        .unwrap();

    let err = store
        .open_collection("People", people_schema(), &OpenCollectionOptions::default())
        .unwrap_err();
    assert!(matches!(err, JsonStoreError::SchemaError(_)));
    assert!(matches!(
        store.remove_collection("People"),
        Err(JsonStoreError::NotOpen(ref name)) if name == "People"
    ));

    // the original collection is untouched
    assert_eq!(store.collection_names().unwrap(), vec!["people"]);
    let people = store.collection("people").unwrap();
    assert_eq!(people.find_all(&FindOptions::default()).unwrap().len(), 1);
}

#[test]
fn test_retyped_reopen_keeps_previous_handle() {
    let store = Store::open_in_memory().unwrap();
    let people = store
        .open_collection("people", people_schema(), &OpenCollectionOptions::default())
        .unwrap();
    people
        .add(&[json!({"name": "carlos", "age": 1})], &AddOptions::default())
        .unwrap();

    let retyped = CollectionSchema::new()
        .search_field("name", FieldType::String)
        .search_field("age", FieldType::Number);
    let reopened = store
        .open_collection("people", retyped.clone(), &OpenCollectionOptions::default())
        .unwrap();
    assert_eq!(reopened.schema(), &retyped);

    // same columns, nothing was dropped, so both handles still work
    assert_eq!(people.count_all_documents().unwrap(), 1);
    assert_eq!(reopened.count_all_documents().unwrap(), 1);
}

#[test]
fn test_case_colliding_fields_are_schema_errors() {
    let store = Store::open_in_memory().unwrap();
    let options = OpenCollectionOptions::default();
    let doubled = people_schema().search_field("Name", FieldType::String);
    assert!(matches!(
        store.open_collection("people", doubled, &options),
        Err(JsonStoreError::SchemaError(_))
    ));
    let reserved = CollectionSchema::new().search_field("_ID", FieldType::Integer);
    assert!(matches!(
        store.open_collection("people", reserved, &options),
        Err(JsonStoreError::SchemaError(_))
    ));
    assert!(store.collection_names().unwrap().is_empty());
}
