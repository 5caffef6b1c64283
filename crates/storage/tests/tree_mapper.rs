#![forbid(unsafe_code)]

use nestree_core::tree::AttrValue;
use nestree_storage::{StoreError, TreeConfig, TreeStore};
use serde_json::json;
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("nestree_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn config() -> TreeConfig {
    let mut config = TreeConfig::new("nodes");
    config.attrs = vec!["title".to_string()];
    config
}

fn bounds(store: &TreeStore, id: &str) -> (i64, i64) {
    let node = store.node(id).expect("node");
    (node.lft, node.rgt)
}

#[test]
fn map_forest_creates_a_nested_tree() {
    let storage_dir = temp_dir("map_forest_creates_a_nested_tree");
    let mut store = TreeStore::open(&storage_dir, config()).expect("open store");

    let items = vec![json!({
        "id": "A",
        "title": "root",
        "children": [
            { "id": "B", "title": "first" },
            { "id": "C", "title": "second" }
        ]
    })];
    let outcome = store.map_forest(&[], &items).expect("map forest");
    assert_eq!((outcome.created, outcome.updated, outcome.removed), (3, 0, 0));

    assert_eq!(bounds(&store, "A"), (1, 6));
    assert_eq!(bounds(&store, "B"), (2, 3));
    assert_eq!(bounds(&store, "C"), (4, 5));
    let a = store.node("A").expect("node A");
    assert_eq!(a.attrs.get("title"), Some(&AttrValue::from("root")));
    assert!(store.is_valid_nested_set(&[]).expect("validate"));
}

#[test]
fn map_forest_reorders_existing_siblings() {
    let storage_dir = temp_dir("map_forest_reorders_existing_siblings");
    let mut store = TreeStore::open(&storage_dir, config()).expect("open store");

    let items = vec![json!({
        "id": "A",
        "children": [ { "id": "B" }, { "id": "C" } ]
    })];
    store.map_forest(&[], &items).expect("initial map");

    let reordered = vec![json!({
        "id": "A",
        "children": [ { "id": "C" }, { "id": "B" } ]
    })];
    let outcome = store.map_forest(&[], &reordered).expect("remap");
    assert_eq!((outcome.created, outcome.updated, outcome.removed), (0, 3, 0));

    assert_eq!(bounds(&store, "C"), (2, 3));
    assert_eq!(bounds(&store, "B"), (4, 5));
    assert!(store.is_valid_nested_set(&[]).expect("validate"));
}

#[test]
fn map_tree_updates_attrs_and_removes_orphans() {
    let storage_dir = temp_dir("map_tree_updates_attrs_and_removes_orphans");
    let mut store = TreeStore::open(&storage_dir, config()).expect("open store");

    let items = vec![json!({
        "id": "A",
        "children": [
            { "id": "B", "title": "old" },
            { "id": "C", "children": [ { "id": "C1" } ] }
        ]
    })];
    store.map_forest(&[], &items).expect("initial map");

    // Keep B (renamed), drop C and everything under it.
    let next = vec![json!({ "id": "B", "title": "new" })];
    let outcome = store.map_tree("A", &next).expect("map tree");
    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.removed, 1);

    let b = store.node("B").expect("node B");
    assert_eq!(b.attrs.get("title"), Some(&AttrValue::from("new")));
    assert!(store.find("C").expect("find C").is_none());
    assert!(store.find("C1").expect("find C1").is_none());
    assert_eq!(bounds(&store, "A"), (1, 4));
    assert!(store.is_valid_nested_set(&[]).expect("validate"));
}

#[test]
fn map_tree_grafts_new_children_under_the_receiver() {
    let storage_dir = temp_dir("map_tree_grafts_new_children");
    let mut store = TreeStore::open(&storage_dir, config()).expect("open store");

    store
        .map_forest(&[], &[json!({ "id": "A" })])
        .expect("seed root");
    let outcome = store
        .map_tree(
            "A",
            &[json!({ "id": "B", "children": [ { "title": "generated" } ] })],
        )
        .expect("graft");
    assert_eq!(outcome.created, 2);

    let children = store.children_of("B").expect("children of B");
    assert_eq!(children.len(), 1);
    assert_eq!(
        children[0].attrs.get("title"),
        Some(&AttrValue::from("generated"))
    );
    assert!(children[0].id.starts_with("NODE-"));
    assert!(store.is_valid_nested_set(&[]).expect("validate"));
}

#[test]
fn mapper_rejects_malformed_input() {
    let storage_dir = temp_dir("mapper_rejects_malformed_input");
    let mut store = TreeStore::open(&storage_dir, config()).expect("open store");

    let not_an_object = vec![json!("A")];
    assert!(matches!(
        store.map_forest(&[], &not_an_object),
        Err(StoreError::InvalidInput(_))
    ));

    let unknown_attr = vec![json!({ "id": "A", "nope": 1 })];
    assert!(matches!(
        store.map_forest(&[], &unknown_attr),
        Err(StoreError::InvalidInput(_))
    ));

    // Failed mappings leave nothing behind.
    assert_eq!(store.count_in_scope(&[]).expect("count"), 0);
}
