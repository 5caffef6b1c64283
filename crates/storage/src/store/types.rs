#![forbid(unsafe_code)]

use nestree_core::tree::AttrValue;
use std::collections::BTreeMap;

/// Creation request. When `id` is unset a `NODE-xxxx` id is generated from
/// the counters table; when `parent` is set the node is relocated under it
/// after the tail insert, inside the same transaction.
#[derive(Clone, Debug, Default)]
pub struct NewNode {
    pub id: Option<String>,
    pub parent: Option<String>,
    pub scope: Vec<AttrValue>,
    pub attrs: BTreeMap<String, AttrValue>,
}

impl NewNode {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Counts reported by the tree mapper.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MapTreeOutcome {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}
