#![forbid(unsafe_code)]

use nestree_core::tree::MovePosition;
use nestree_storage::{NewNode, TreeConfig, TreeStore};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

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

fn build_pair(store: &mut TreeStore) {
    store.create(new_node("A", None)).expect("create A");
    store.create(new_node("B", None)).expect("create B");
}

#[test]
fn moving_veto_aborts_without_an_error() {
    let storage_dir = temp_dir("moving_veto_aborts_without_an_error");
    let mut store = TreeStore::open(&storage_dir, TreeConfig::new("nodes")).expect("open store");
    build_pair(&mut store);

    let moved = Arc::new(AtomicUsize::new(0));
    let moved_probe = Arc::clone(&moved);
    store.on_moving(|_| false);
    store.on_moved(move |_| {
        moved_probe.fetch_add(1, Ordering::SeqCst);
    });

    let b = store.make_child_of("B", "A").expect("vetoed move");
    // Clean no-op: unchanged bounds, no moved notification.
    assert_eq!((b.lft, b.rgt), (3, 4));
    assert_eq!(b.parent_id, None);
    assert_eq!(moved.load(Ordering::SeqCst), 0);
    assert!(store.is_valid_nested_set(&[]).expect("validate"));
}

#[test]
fn moving_subscribers_see_node_and_target() {
    let storage_dir = temp_dir("moving_subscribers_see_node_and_target");
    let mut store = TreeStore::open(&storage_dir, TreeConfig::new("nodes")).expect("open store");
    build_pair(&mut store);

    let seen = Arc::new(AtomicUsize::new(0));
    let seen_probe = Arc::clone(&seen);
    store.on_moving(move |event| {
        assert_eq!(event.action, "moving");
        assert_eq!(event.node.id, "B");
        assert_eq!(event.target.map(|target| target.id.as_str()), Some("A"));
        assert_eq!(event.position, Some(MovePosition::Child));
        seen_probe.fetch_add(1, Ordering::SeqCst);
        true
    });

    store.make_child_of("B", "A").expect("move B under A");
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(store.node("B").expect("reload").parent_id.as_deref(), Some("A"));
}

#[test]
fn moved_fires_even_for_structural_noops() {
    let storage_dir = temp_dir("moved_fires_even_for_structural_noops");
    let mut store = TreeStore::open(&storage_dir, TreeConfig::new("nodes")).expect("open store");
    store.create(new_node("A", None)).expect("create A");
    store.create(new_node("B", Some("A"))).expect("create B");

    let moved = Arc::new(AtomicUsize::new(0));
    let moved_probe = Arc::clone(&moved);
    store.on_moved(move |_| {
        moved_probe.fetch_add(1, Ordering::SeqCst);
    });

    // B is already the last child of A: no SQL runs, the signal still fires.
    let before = store.node("B").expect("node B");
    let after = store.make_child_of("B", "A").expect("identity move");
    assert_eq!((after.lft, after.rgt), (before.lft, before.rgt));
    assert_eq!(moved.load(Ordering::SeqCst), 1);
}

#[test]
fn lifecycle_notifications_fire_per_action() {
    let storage_dir = temp_dir("lifecycle_notifications_fire_per_action");
    let mut store = TreeStore::open(&storage_dir, TreeConfig::new("nodes")).expect("open store");

    let creating = Arc::new(AtomicUsize::new(0));
    let deleting = Arc::new(AtomicUsize::new(0));
    let creating_probe = Arc::clone(&creating);
    let deleting_probe = Arc::clone(&deleting);
    store.on_event("creating", move |event| {
        assert_eq!(event.action, "creating");
        assert!(!event.node.is_persisted());
        creating_probe.fetch_add(1, Ordering::SeqCst);
    });
    store.on_event("deleting", move |event| {
        assert_eq!(event.node.id, "A");
        deleting_probe.fetch_add(1, Ordering::SeqCst);
    });

    store.create(new_node("A", None)).expect("create A");
    store.create(new_node("B", Some("A"))).expect("create B");
    assert_eq!(creating.load(Ordering::SeqCst), 2);

    store.delete("A").expect("delete A");
    assert_eq!(deleting.load(Ordering::SeqCst), 1);
}

#[test]
fn saving_and_saved_wrap_attribute_writes() {
    let storage_dir = temp_dir("saving_and_saved_wrap_attribute_writes");
    let mut config = TreeConfig::new("nodes");
    config.attrs = vec!["title".to_string()];
    let mut store = TreeStore::open(&storage_dir, config).expect("open store");
    store.create(new_node("A", None)).expect("create A");

    let saved = Arc::new(AtomicUsize::new(0));
    let saved_probe = Arc::clone(&saved);
    store.on_event("saved", move |_| {
        saved_probe.fetch_add(1, Ordering::SeqCst);
    });

    let mut a = store.node("A").expect("node A");
    a.set_attr("title", nestree_core::tree::AttrValue::from("renamed"));
    store.save(&mut a).expect("save A");
    assert_eq!(saved.load(Ordering::SeqCst), 1);
}
