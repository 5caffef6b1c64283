#![forbid(unsafe_code)]

use nestree_core::tree::{AttrValue, TreeNode};
use nestree_storage::{NewNode, StoreError, TreeConfig, TreeStore};
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

fn new_node(id: &str, parent: Option<&str>) -> NewNode {
    NewNode {
        id: Some(id.to_string()),
        parent: parent.map(str::to_string),
        ..NewNode::new()
    }
}

#[test]
fn save_writes_dirty_attrs_and_clears_the_dirty_set() {
    let storage_dir = temp_dir("save_writes_dirty_attrs");
    let mut store = TreeStore::open(&storage_dir, config()).expect("open store");
    store.create(new_node("A", None)).expect("create A");

    let mut a = store.node("A").expect("node A");
    a.set_attr("title", AttrValue::from("renamed"));
    assert!(a.is_dirty("title"));
    store.save(&mut a).expect("save A");

    assert!(!a.has_dirty());
    assert_eq!(a.attrs.get("title"), Some(&AttrValue::from("renamed")));
    let fresh = store.node("A").expect("reload A");
    assert_eq!(fresh.attrs.get("title"), Some(&AttrValue::from("renamed")));
}

#[test]
fn save_applies_a_dirty_parent_as_a_move() {
    let storage_dir = temp_dir("save_applies_a_dirty_parent_as_a_move");
    let mut store = TreeStore::open(&storage_dir, config()).expect("open store");
    store.create(new_node("A", None)).expect("create A");
    store.create(new_node("B", None)).expect("create B");

    let mut b = store.node("B").expect("node B");
    b.set_parent(Some("A".to_string()));
    store.save(&mut b).expect("save B");

    assert_eq!(b.parent_id.as_deref(), Some("A"));
    assert_eq!((b.lft, b.rgt, b.depth), (2, 3, 1));
    assert_eq!(store.node("A").expect("reload A").rgt, 4);
    assert!(store.is_valid_nested_set(&[]).expect("validate"));
}

#[test]
fn save_with_a_cleared_parent_promotes_to_root() {
    let storage_dir = temp_dir("save_with_a_cleared_parent_promotes_to_root");
    let mut store = TreeStore::open(&storage_dir, config()).expect("open store");
    store.create(new_node("A", None)).expect("create A");
    store.create(new_node("B", Some("A"))).expect("create B");

    let mut b = store.node("B").expect("node B");
    b.set_parent(None);
    store.save(&mut b).expect("save B");

    assert!(b.is_root());
    assert_eq!(b.depth, 0);
    assert_eq!((b.lft, b.rgt), (3, 4));
    assert_eq!(store.node("A").expect("reload A").rgt, 2);
    assert!(store.is_valid_nested_set(&[]).expect("validate"));
}

#[test]
fn save_without_a_parent_change_keeps_the_structure() {
    let storage_dir = temp_dir("save_without_a_parent_change_keeps_the_structure");
    let mut store = TreeStore::open(&storage_dir, config()).expect("open store");
    store.create(new_node("A", None)).expect("create A");
    store.create(new_node("B", Some("A"))).expect("create B");

    let mut b = store.node("B").expect("node B");
    b.set_attr("title", AttrValue::from("still here"));
    store.save(&mut b).expect("save B");

    assert_eq!(b.parent_id.as_deref(), Some("A"));
    assert_eq!((b.lft, b.rgt, b.depth), (2, 3, 1));
}

#[test]
fn save_rejects_unsaved_handles() {
    let storage_dir = temp_dir("save_rejects_unsaved_handles");
    let mut store = TreeStore::open(&storage_dir, config()).expect("open store");

    let mut unsaved = TreeNode::unsaved(Vec::new());
    assert!(matches!(
        store.save(&mut unsaved),
        Err(StoreError::InvalidInput(_))
    ));
}
