// Integration tests for the predicate DSL against a live store
use std::sync::Arc;

use jsonstore_core::{
    parse_query, AddOptions, Collection, CollectionSchema, CountOptions, Document, FieldType,
    FindOptions, JsonStoreError, OpenCollectionOptions, QueryPart, QueryParts, Store,
};
use serde_json::json;

fn open_people() -> (Store, Arc<Collection>) {
    let store = Store::open_in_memory().unwrap();
    let people = store
        .open_collection(
            "people",
            CollectionSchema::new()
                .search_field("name", FieldType::String)
                .search_field("age", FieldType::Integer)
                .search_field("score", FieldType::Number)
                .search_field("active", FieldType::Boolean)
                .search_field("address.city", FieldType::String)
                .search_field("pets.kind", FieldType::String),
            &OpenCollectionOptions::default(),
        )
        .unwrap();
    people
        .add(
            &[
                json!({"name": "carlos", "age": 1, "score": 9.5, "active": true,
                       "address": {"city": "Austin"}, "pets": [{"kind": "cat"}, {"kind": "dog"}]}),
                json!({"name": "dgonz", "age": 2, "score": 7.25, "active": false,
                       "address": {"city": "Boston"}}),
                json!({"name": "mike", "age": 3, "score": 10, "active": true,
                       "address": {"city": "austin"}, "pets": [{"kind": "fish"}]}),
                json!({"name": "100%", "age": 10}),
            ],
            &AddOptions::default(),
        )
        .unwrap();
    (store, people)
}

fn find_names(people: &Collection, query: QueryParts) -> Vec<String> {
    names(&people.find_documents(&query, &FindOptions::default()).unwrap())
}

fn names(documents: &[Document]) -> Vec<String> {
    documents
        .iter()
        .map(|d| d.json["name"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_exact_and_numeric_operators() {
    let (_store, people) = open_people();
    assert_eq!(find_names(&people, QueryPart::new().equal("name", "mike").into()), vec!["mike"]);
    assert!(find_names(&people, QueryPart::new().equal("name", "MIKE").into()).is_empty());
    assert_eq!(
        find_names(&people, QueryPart::new().not_equal("name", "mike").into()),
        vec!["carlos", "dgonz", "100%"]
    );
    // numeric comparison, not text: 10 > 3
    assert_eq!(
        find_names(&people, QueryPart::new().greater_than("age", 2).into()),
        vec!["mike", "100%"]
    );
    assert_eq!(
        find_names(&people, QueryPart::new().less_than_or_equal("score", 9.5).into()),
        vec!["carlos", "dgonz"]
    );
}

#[test]
fn test_fuzzy_operators() {
    let (_store, people) = open_people();
    assert_eq!(find_names(&people, QueryPart::new().like("name", "ARL").into()), vec!["carlos"]);
    // right-like anchors at the start of the value
    assert_eq!(find_names(&people, QueryPart::new().right_like("name", "d").into()), vec!["dgonz"]);
    // left-like anchors at the end of the value
    assert_eq!(find_names(&people, QueryPart::new().left_like("name", "os").into()), vec!["carlos"]);
    assert_eq!(
        find_names(&people, QueryPart::new().not_right_like("name", "c").into()),
        vec!["dgonz", "mike", "100%"]
    );
    assert_eq!(
        find_names(&people, QueryPart::new().like("address.city", "austin").into()),
        vec!["carlos", "mike"]
    );
}

#[test]
fn test_like_wildcards_are_literal() {
    let (_store, people) = open_people();
    assert_eq!(find_names(&people, QueryPart::new().like("name", "0%").into()), vec!["100%"]);
    assert!(find_names(&people, QueryPart::new().like("name", "_").into()).is_empty());
}

#[test]
fn test_range_and_set_operators() {
    let (_store, people) = open_people();
    assert_eq!(
        find_names(&people, QueryPart::new().between("age", 1, 2).into()),
        vec!["carlos", "dgonz"]
    );
    assert_eq!(
        find_names(&people, QueryPart::new().not_between("age", 1, 2).into()),
        vec!["mike", "100%"]
    );
    assert_eq!(
        find_names(&people, QueryPart::new().in_list("name", ["mike", "carlos"]).into()),
        vec!["carlos", "mike"]
    );
    assert_eq!(
        find_names(&people, QueryPart::new().not_in_list("name", ["mike", "carlos"]).into()),
        vec!["dgonz", "100%"]
    );
    let nothing: Vec<&str> = Vec::new();
    assert!(find_names(&people, QueryPart::new().in_list("name", nothing.clone()).into()).is_empty());
    assert_eq!(
        find_names(&people, QueryPart::new().not_in_list("name", nothing).into()).len(),
        4
    );
}

#[test]
fn test_boolean_operands_accept_every_representation() {
    let (_store, people) = open_people();
    for operand in [json!(true), json!(1), json!("1"), json!("true")] {
        let query = parse_query(&json!([[{"field": "active", "operator": "EXACT_EQUALS", "value": operand}]]))
            .unwrap();
        assert_eq!(find_names(&people, query), vec!["carlos", "mike"]);
    }
    assert_eq!(
        find_names(&people, QueryPart::new().equal("active", false).into()),
        vec!["dgonz"]
    );
}

#[test]
fn test_array_paths_join_values() {
    let (_store, people) = open_people();
    assert_eq!(
        find_names(&people, QueryPart::new().equal("pets.kind", "cat-@-dog").into()),
        vec!["carlos"]
    );
    assert_eq!(
        find_names(&people, QueryPart::new().like("pets.kind", "dog").into()),
        vec!["carlos"]
    );
}

#[test]
fn test_or_of_and_groups() {
    let (_store, people) = open_people();
    let query = QueryParts::new()
        .or(QueryPart::new().greater_than_or_equal("age", 2).right_like("name", "d"))
        .or(QueryPart::new().equal("name", "carlos"));
    assert_eq!(find_names(&people, query), vec!["carlos", "dgonz"]);

    // a row matching several parts is returned once
    let overlapping = QueryParts::new()
        .or(QueryPart::new().equal("name", "mike"))
        .or(QueryPart::new().greater_than("age", 2));
    assert_eq!(find_names(&people, overlapping), vec!["mike", "100%"]);
}

#[test]
fn test_sort_precedence_and_paging() {
    let store = Store::open_in_memory().unwrap();
    let items = store
        .open_collection(
            "items",
            CollectionSchema::new()
                .search_field("a", FieldType::Integer)
                .search_field("b", FieldType::Integer),
            &OpenCollectionOptions::default(),
        )
        .unwrap();
    let ids = items
        .add(
            &[
                json!({"a": 1, "b": 1}),
                json!({"a": 1, "b": 2}),
                json!({"a": 0, "b": 5}),
                json!({"a": 1, "b": 2}),
            ],
            &AddOptions::default(),
        )
        .unwrap();

    let sorted = items
        .find_all(&FindOptions::new().sort_ascending("a").sort_descending("b"))
        .unwrap();
    let order: Vec<i64> = sorted.iter().map(|d| d.id).collect();
    // equal (a, b) rows fall back to insertion order
    assert_eq!(order, vec![ids[2], ids[1], ids[3], ids[0]]);

    let page = items
        .find_all(
            &FindOptions::new()
                .sort_ascending("a")
                .sort_descending("b")
                .with_limit(2)
                .with_offset(1),
        )
        .unwrap();
    let order: Vec<i64> = page.iter().map(|d| d.id).collect();
    assert_eq!(order, vec![ids[1], ids[3]]);

    assert!(items
        .find_all(&FindOptions::new().with_offset(10))
        .unwrap()
        .is_empty());
}

#[test]
fn test_projection_and_count() {
    let (_store, people) = open_people();
    let rows = people
        .find(
            &QueryPart::new().less_than("age", 3).into(),
            &FindOptions::new().with_filter(["name", "age"]),
        )
        .unwrap();
    assert_eq!(
        rows,
        vec![json!({"name": "carlos", "age": 1}), json!({"name": "dgonz", "age": 2})]
    );

    // identical projected rows collapse
    let flags = people
        .find(
            &QueryPart::new().equal("active", true).into(),
            &FindOptions::new().with_filter(["active"]),
        )
        .unwrap();
    assert_eq!(flags, vec![json!({"active": 1})]);

    let count = people
        .find(&QueryParts::all(), &FindOptions::new().with_filter(["count"]))
        .unwrap();
    assert_eq!(count, vec![json!(4)]);
    assert_eq!(
        people
            .count(&QueryPart::new().greater_than("age", 1).into(), &CountOptions::default())
            .unwrap(),
        3
    );

    let err = people
        .find_documents(&QueryParts::all(), &FindOptions::new().with_filter(["name"]))
        .unwrap_err();
    assert!(err.is_query_error());
}

#[test]
fn test_find_by_id_order_and_dedup() {
    let (_store, people) = open_people();
    let found = people.find_by_id(&[3, 1, 2, 1, 99]).unwrap();
    let ids: Vec<i64> = found.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![3, 1, 2]);
}

#[test]
fn test_find_by_id_spans_chunks() {
    let store = Store::open_in_memory().unwrap();
    let items = store
        .open_collection(
            "items",
            CollectionSchema::new().search_field("n", FieldType::Integer),
            &OpenCollectionOptions::default(),
        )
        .unwrap();
    let documents: Vec<_> = (0..450).map(|n| json!({ "n": n })).collect();
    let mut ids = items.add(&documents, &AddOptions::default()).unwrap();
    ids.reverse();
    let found = items.find_by_id(&ids).unwrap();
    assert_eq!(found.len(), 450);
    let order: Vec<i64> = found.iter().map(|d| d.id).collect();
    assert_eq!(order, ids);
}

#[test]
fn test_invalid_queries_fail_before_execution() {
    let (_store, people) = open_people();
    let err = people
        .find(&QueryPart::new().equal("email", "x").into(), &FindOptions::default())
        .unwrap_err();
    assert!(matches!(err, JsonStoreError::UnknownField { .. }));

    let err = people
        .find_all(&FindOptions::new().sort_ascending("email"))
        .unwrap_err();
    assert!(err.is_query_error());

    let err = parse_query(&json!([[{"field": "age", "operator": "BETWEEN", "value": 3}]])).unwrap_err();
    assert!(matches!(err, JsonStoreError::OperandShape { .. }));
}

#[test]
fn test_reserved_columns_are_queryable() {
    let (_store, people) = open_people();
    let query: QueryParts = QueryPart::new().in_list("_id", [2i64, 4]).into();
    assert_eq!(find_names(&people, query), vec!["dgonz", "100%"]);
}
