#![forbid(unsafe_code)]

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::node::TreeNode;
use super::value::AttrValue;

/// One node of an assembled in-memory forest.
#[derive(Clone, Debug, Serialize)]
pub struct ForestNode {
    pub node: TreeNode,
    pub children: Vec<ForestNode>,
}

/// Fold a flat result set into a nested forest by attaching each row to its
/// parent. Rows whose parent is not in the set become roots of the returned
/// forest, in the order given.
pub fn assemble_forest(rows: Vec<TreeNode>) -> Vec<ForestNode> {
    let ids: HashSet<String> = rows.iter().map(|row| row.id.clone()).collect();
    let mut pending: HashMap<String, Vec<TreeNode>> = HashMap::new();
    let mut roots: Vec<TreeNode> = Vec::new();
    for row in rows {
        match row.parent_id.clone().filter(|parent| ids.contains(parent)) {
            Some(parent) => pending.entry(parent).or_default().push(row),
            None => roots.push(row),
        }
    }
    roots
        .into_iter()
        .map(|root| attach(root, &mut pending))
        .collect()
}

/// Same as [`assemble_forest`] but pre-sorted by the order value (falling
/// back to the left bound when the order column is unset or non-numeric).
pub fn assemble_forest_ordered(
    mut rows: Vec<TreeNode>,
    order_column: Option<&str>,
) -> Vec<ForestNode> {
    rows.sort_by_key(|row| order_key(row, order_column));
    assemble_forest(rows)
}

fn order_key(row: &TreeNode, order_column: Option<&str>) -> i64 {
    match order_column {
        Some(column) => row
            .attrs
            .get(column)
            .and_then(AttrValue::as_int)
            .unwrap_or(row.lft),
        None => row.lft,
    }
}

fn attach(node: TreeNode, pending: &mut HashMap<String, Vec<TreeNode>>) -> ForestNode {
    let children = pending.remove(&node.id).unwrap_or_default();
    ForestNode {
        node,
        children: children
            .into_iter()
            .map(|child| attach(child, pending))
            .collect(),
    }
}
