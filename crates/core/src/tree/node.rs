#![forbid(unsafe_code)]

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::position::MovePosition;
use super::value::AttrValue;

/// Dirty-set marker for the parent pointer. User attributes are tracked under
/// their own column names.
pub const PARENT_FIELD: &str = "parent";

/// In-memory handle of one tree row.
///
/// The database owns the durable state; a handle may be stale after any
/// mutation that is not local to it and must be reloaded. Bounds and depth
/// are never written through the handle: only the move engine and the set
/// builder rewrite them.
#[derive(Clone, Debug, Serialize)]
pub struct TreeNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub lft: i64,
    pub rgt: i64,
    pub depth: i64,
    /// Values of the scope columns, in descriptor order.
    pub scope: Vec<AttrValue>,
    /// User attribute columns (including the order column when configured).
    pub attrs: BTreeMap<String, AttrValue>,
    pub created_at_ms: Option<i64>,
    pub updated_at_ms: Option<i64>,
    pub deleted_at_ms: Option<i64>,
    #[serde(skip)]
    persisted: bool,
    #[serde(skip)]
    dirty: BTreeSet<String>,
}

impl TreeNode {
    /// Blank unsaved handle; bounds are assigned by the store on create.
    pub fn unsaved(scope: Vec<AttrValue>) -> Self {
        Self {
            id: String::new(),
            parent_id: None,
            lft: 0,
            rgt: 0,
            depth: 0,
            scope,
            attrs: BTreeMap::new(),
            created_at_ms: None,
            updated_at_ms: None,
            deleted_at_ms: None,
            persisted: false,
            dirty: BTreeSet::new(),
        }
    }

    /// Handle for a row read back from the store.
    pub fn loaded(
        id: String,
        parent_id: Option<String>,
        lft: i64,
        rgt: i64,
        depth: i64,
        scope: Vec<AttrValue>,
    ) -> Self {
        Self {
            id,
            parent_id,
            lft,
            rgt,
            depth,
            scope,
            attrs: BTreeMap::new(),
            created_at_ms: None,
            updated_at_ms: None,
            deleted_at_ms: None,
            persisted: true,
            dirty: BTreeSet::new(),
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn is_masked(&self) -> bool {
        self.deleted_at_ms.is_some()
    }

    // ---- dirty tracking ----------------------------------------------------

    pub fn set_parent(&mut self, parent: Option<String>) {
        self.parent_id = parent;
        self.dirty.insert(PARENT_FIELD.to_string());
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: AttrValue) {
        let name = name.into();
        self.attrs.insert(name.clone(), value);
        self.dirty.insert(name);
    }

    pub fn is_dirty(&self, field: &str) -> bool {
        self.dirty.contains(field)
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Dirty user attribute columns, excluding the parent marker.
    pub fn dirty_attrs(&self) -> impl Iterator<Item = &str> {
        self.dirty
            .iter()
            .map(String::as_str)
            .filter(|field| *field != PARENT_FIELD)
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    // ---- structural predicates ---------------------------------------------

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.persisted && self.rgt - self.lft == 1
    }

    pub fn is_trunk(&self) -> bool {
        self.persisted && !self.is_root() && !self.is_leaf()
    }

    pub fn descendant_count(&self) -> i64 {
        (self.rgt - self.lft - 1) / 2
    }

    pub fn in_same_scope(&self, other: &TreeNode) -> bool {
        self.scope == other.scope
    }

    /// Both bounds of `self` lie within `other`'s bounds (inclusive).
    pub fn inside_subtree(&self, other: &TreeNode) -> bool {
        self.lft >= other.lft && self.lft <= other.rgt && self.rgt >= other.lft && self.rgt <= other.rgt
    }

    pub fn is_ancestor_of(&self, other: &TreeNode) -> bool {
        self.lft < other.lft && self.rgt > other.rgt && self.in_same_scope(other)
    }

    pub fn is_self_or_ancestor_of(&self, other: &TreeNode) -> bool {
        self.lft <= other.lft && self.rgt >= other.rgt && self.in_same_scope(other)
    }

    pub fn is_descendant_of(&self, other: &TreeNode) -> bool {
        other.is_ancestor_of(self)
    }

    pub fn is_self_or_descendant_of(&self, other: &TreeNode) -> bool {
        other.is_self_or_ancestor_of(self)
    }

    /// Identity by primary key plus full field equality; persistence and
    /// dirty state are not part of record identity.
    pub fn is_same_as(&self, other: &TreeNode) -> bool {
        self.id == other.id
            && self.parent_id == other.parent_id
            && self.lft == other.lft
            && self.rgt == other.rgt
            && self.depth == other.depth
            && self.scope == other.scope
            && self.attrs == other.attrs
    }
}

/// Why a requested move cannot run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoveError {
    UnsavedNode,
    TargetMissing,
    SelfTarget,
    TargetInsideSubtree,
    CrossScope,
}

impl std::fmt::Display for MoveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsavedNode => write!(f, "cannot move an unsaved node"),
            Self::TargetMissing => write!(f, "move target could not be resolved"),
            Self::SelfTarget => write!(f, "a node cannot be moved relative to itself"),
            Self::TargetInsideSubtree => {
                write!(f, "move target is inside the moved subtree")
            }
            Self::CrossScope => write!(f, "move target belongs to a different scope"),
        }
    }
}

impl std::error::Error for MoveError {}

/// Fail-fast precondition check for the move engine. `target` is `None` only
/// when promoting to root.
pub fn validate_move(
    node: &TreeNode,
    target: Option<&TreeNode>,
    position: MovePosition,
) -> Result<(), MoveError> {
    if !node.is_persisted() {
        return Err(MoveError::UnsavedNode);
    }
    if matches!(position, MovePosition::Root) {
        return Ok(());
    }
    let Some(target) = target else {
        return Err(MoveError::TargetMissing);
    };
    if target.id == node.id {
        return Err(MoveError::SelfTarget);
    }
    if target.inside_subtree(node) {
        return Err(MoveError::TargetInsideSubtree);
    }
    if !target.in_same_scope(node) {
        return Err(MoveError::CrossScope);
    }
    Ok(())
}
