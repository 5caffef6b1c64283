#![forbid(unsafe_code)]

use nestree_core::tree::AttrValue;
use nestree_storage::{NewNode, TreeConfig, TreeStore};
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

fn new_node(id: &str, parent: Option<&str>) -> NewNode {
    NewNode {
        id: Some(id.to_string()),
        parent: parent.map(str::to_string),
        ..NewNode::new()
    }
}

fn build_family(store: &mut TreeStore) {
    store.create(new_node("A", None)).expect("create A");
    store.create(new_node("B", Some("A"))).expect("create B");
    store.create(new_node("C", Some("B"))).expect("create C");
    store.create(new_node("D", Some("A"))).expect("create D");
    store.create(new_node("E", Some("D"))).expect("create E");
}

fn all_bounds(store: &TreeStore) -> Vec<(String, i64, i64, i64)> {
    ["A", "B", "C", "D", "E"]
        .iter()
        .map(|id| {
            let node = store.node(id).expect("node");
            (node.id.clone(), node.lft, node.rgt, node.depth)
        })
        .collect()
}

#[test]
fn rebuild_recovers_corrupted_bounds_from_parents() {
    let storage_dir = temp_dir("rebuild_recovers_corrupted_bounds_from_parents");
    let mut store = TreeStore::open(&storage_dir, TreeConfig::new("nodes")).expect("open store");
    build_family(&mut store);
    let expected = all_bounds(&store);
    drop(store);

    // Corrupt the bounds underneath the engine; parent pointers stay intact.
    let conn = rusqlite::Connection::open(storage_dir.join("nestree.db")).expect("raw open");
    conn.execute_batch("UPDATE nodes SET lft = lft * 10, rgt = rgt * 10 + 5, depth = depth + 7;")
        .expect("corrupt bounds");
    drop(conn);

    let mut store = TreeStore::open(&storage_dir, TreeConfig::new("nodes")).expect("reopen store");
    assert!(!store.is_valid_nested_set(&[]).expect("validate corrupt"));

    store.rebuild(&[]).expect("rebuild");
    assert!(store.is_valid_nested_set(&[]).expect("validate rebuilt"));
    assert_eq!(all_bounds(&store), expected);
}

#[test]
fn rebuild_twice_is_a_noop() {
    let storage_dir = temp_dir("rebuild_twice_is_a_noop");
    let mut store = TreeStore::open(&storage_dir, TreeConfig::new("nodes")).expect("open store");
    build_family(&mut store);

    store.rebuild(&[]).expect("first rebuild");
    let first = all_bounds(&store);
    store.rebuild(&[]).expect("second rebuild");
    assert_eq!(all_bounds(&store), first);
}

#[test]
fn fresh_trees_always_validate() {
    let storage_dir = temp_dir("fresh_trees_always_validate");
    let mut store = TreeStore::open(&storage_dir, TreeConfig::new("nodes")).expect("open store");
    build_family(&mut store);

    let audit = store.tree_validate(&[]).expect("audit");
    assert!(audit.ok, "unexpected defects: {:?}", audit.defects);
    assert_eq!(audit.nodes, 5);
    store.ensure_valid(&[]).expect("ensure valid");
}

#[test]
fn forest_validation_covers_every_scope() {
    let storage_dir = temp_dir("forest_validation_covers_every_scope");
    let mut config = TreeConfig::new("nodes");
    config.columns.scope = vec!["realm".to_string()];
    let mut store = TreeStore::open(&storage_dir, config).expect("open store");

    for realm in 1..=2 {
        let scope = vec![AttrValue::Int(realm)];
        let root = NewNode {
            id: Some(format!("R{realm}")),
            scope: scope.clone(),
            ..NewNode::new()
        };
        store.create(root).expect("create root");
        let child = NewNode {
            id: Some(format!("R{realm}-child")),
            parent: Some(format!("R{realm}")),
            scope,
            ..NewNode::new()
        };
        store.create(child).expect("create child");
    }

    let scopes = store.distinct_scopes().expect("distinct scopes");
    assert_eq!(scopes.len(), 2);
    assert!(store.is_valid_forest().expect("forest validation"));
}
