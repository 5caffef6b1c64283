#![forbid(unsafe_code)]

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

/// A(1,10) { B(2,5) { C(3,4) }, D(6,9) { E(7,8) } }
fn open_family(test_name: &str) -> TreeStore {
    let storage_dir = temp_dir(test_name);
    let mut store = TreeStore::open(&storage_dir, TreeConfig::new("nodes")).expect("open store");
    store.create(new_node("A", None)).expect("create A");
    store.create(new_node("B", Some("A"))).expect("create B");
    store.create(new_node("C", Some("B"))).expect("create C");
    store.create(new_node("D", Some("A"))).expect("create D");
    store.create(new_node("E", Some("D"))).expect("create E");
    store
}

fn ids(store: &TreeStore, query: nestree_storage::TreeQuery<'_>) -> Vec<String> {
    store
        .fetch(&query)
        .expect("fetch")
        .into_iter()
        .map(|node| node.id)
        .collect()
}

#[test]
fn structural_predicates_partition_the_tree() {
    let store = open_family("structural_predicates_partition_the_tree");

    let query = store.query(&[]).expect("query").roots();
    assert_eq!(ids(&store, query), vec!["A"]);

    let query = store.query(&[]).expect("query").all_leaves();
    assert_eq!(ids(&store, query), vec!["C", "E"]);

    let query = store.query(&[]).expect("query").all_trunks();
    assert_eq!(ids(&store, query), vec!["B", "D"]);
}

#[test]
fn subtree_predicates_are_bound_driven() {
    let store = open_family("subtree_predicates_are_bound_driven");
    let a = store.node("A").expect("node A");
    let b = store.node("B").expect("node B");
    let c = store.node("C").expect("node C");

    let query = store.query(&[]).expect("query").descendants_and_self(&a);
    assert_eq!(ids(&store, query), vec!["A", "B", "C", "D", "E"]);

    let query = store.query(&[]).expect("query").descendants(&a);
    assert_eq!(ids(&store, query), vec!["B", "C", "D", "E"]);

    let query = store.query(&[]).expect("query").ancestors_and_self(&c);
    assert_eq!(ids(&store, query), vec!["A", "B", "C"]);

    let query = store.query(&[]).expect("query").ancestors(&c);
    assert_eq!(ids(&store, query), vec!["A", "B"]);

    let query = store.query(&[]).expect("query").ancestors(&c).without_roots();
    assert_eq!(ids(&store, query), vec!["B"]);

    let query = store.query(&[]).expect("query").leaves_of(&a);
    assert_eq!(ids(&store, query), vec!["C", "E"]);

    let query = store.query(&[]).expect("query").leaves_of(&c);
    assert_eq!(ids(&store, query), vec!["C"]);

    let query = store.query(&[]).expect("query").trunks_of(&a);
    assert_eq!(ids(&store, query), vec!["B", "D"]);

    let query = store.query(&[]).expect("query").descendants(&b);
    assert_eq!(ids(&store, query), vec!["C"]);
}

#[test]
fn sibling_predicates_follow_the_parent_pointer() {
    let store = open_family("sibling_predicates_follow_the_parent_pointer");
    let b = store.node("B").expect("node B");
    let a = store.node("A").expect("node A");

    let query = store.query(&[]).expect("query").siblings_and_self(&b);
    assert_eq!(ids(&store, query), vec!["B", "D"]);

    let query = store.query(&[]).expect("query").siblings(&b);
    assert_eq!(ids(&store, query), vec!["D"]);

    // Root siblings are the other roots of the scope.
    let query = store.query(&[]).expect("query").siblings_and_self(&a);
    assert_eq!(ids(&store, query), vec!["A"]);
}

#[test]
fn limit_depth_bounds_the_traversal() {
    let store = open_family("limit_depth_bounds_the_traversal");
    let a = store.node("A").expect("node A");

    let query = store
        .query(&[])
        .expect("query")
        .descendants_and_self(&a)
        .limit_depth(&a, 1);
    assert_eq!(ids(&store, query), vec!["A", "B", "D"]);

    // limit_depth(0) keeps exactly the receiver.
    let query = store
        .query(&[])
        .expect("query")
        .descendants_and_self(&a)
        .limit_depth(&a, 0);
    assert_eq!(ids(&store, query), vec!["A"]);
}

#[test]
fn navigation_helpers_resolve_relatives() {
    let store = open_family("navigation_helpers_resolve_relatives");

    assert_eq!(store.root_of("E").expect("root of E").id, "A");
    assert_eq!(
        store
            .parent_of("E")
            .expect("parent of E")
            .map(|node| node.id),
        Some("D".to_string())
    );
    assert!(store.parent_of("A").expect("parent of A").is_none());

    let children = store.children_of("A").expect("children of A");
    let child_ids: Vec<&str> = children.iter().map(|node| node.id.as_str()).collect();
    assert_eq!(child_ids, vec!["B", "D"]);

    assert_eq!(store.level_of("C").expect("level of C"), 2);
    assert_eq!(store.count_in_scope(&[]).expect("count"), 5);
}

#[test]
fn forest_helper_reassembles_the_hierarchy() {
    let store = open_family("forest_helper_reassembles_the_hierarchy");

    let forest = store.forest(&[]).expect("forest");
    assert_eq!(forest.len(), 1);
    let root = &forest[0];
    assert_eq!(root.node.id, "A");
    let child_ids: Vec<&str> = root
        .children
        .iter()
        .map(|child| child.node.id.as_str())
        .collect();
    assert_eq!(child_ids, vec!["B", "D"]);
    assert_eq!(root.children[0].children[0].node.id, "C");
    assert_eq!(root.children[1].children[0].node.id, "E");
}
