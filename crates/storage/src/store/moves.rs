#![forbid(unsafe_code)]

use nestree_core::tree::{
    plan_move, quote_ident, validate_move, AttrValue, MoveError, MovePlan, MovePosition, TreeNode,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, TransactionBehavior};

use super::depth::set_depth_with_subtree_tx;
use super::events::{event_name, TreeEvent, TreeEvents};
use super::support::{find_node, live_where, max_right, now_ms, required_node, scope_where};
use super::{StoreError, TreeConfig, TreeStore};

pub(in crate::store) struct MoveOutcome {
    pub node: TreeNode,
    pub target: Option<TreeNode>,
    /// False when a `moving` subscriber vetoed; the node is unchanged and no
    /// `moved` notification is due.
    pub accepted: bool,
}

impl TreeStore {
    /// Relocate a node (and its entire subtree) relative to a target. The
    /// target is always re-resolved from the store; stale handles cannot
    /// smuggle in old bounds.
    pub fn move_to(
        &mut self,
        id: &str,
        target: Option<&str>,
        position: MovePosition,
    ) -> Result<TreeNode, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = move_to_tx(&tx, &self.config, &self.events, id, target, position)?;
        tx.commit()?;
        if outcome.accepted {
            self.dispatch_event("moved", &outcome.node, outcome.target.as_ref(), Some(position));
        }
        Ok(outcome.node)
    }

    /// Append under the target as its last child.
    pub fn make_child_of(&mut self, id: &str, target: &str) -> Result<TreeNode, StoreError> {
        self.move_to(id, Some(target), MovePosition::Child)
    }

    /// Insert before the target's existing first child; equals
    /// `make_child_of` when the target has no children.
    pub fn make_first_child_of(&mut self, id: &str, target: &str) -> Result<TreeNode, StoreError> {
        if self.find(target)?.is_none() {
            return Err(StoreError::MoveNotPossible(MoveError::TargetMissing));
        }
        let first = self.children_of(target)?.into_iter().next();
        match first {
            None => self.make_child_of(id, target),
            Some(child) if child.id == id => {
                let node = self.node(id)?;
                self.dispatch_event("moved", &node, None, Some(MovePosition::Left));
                Ok(node)
            }
            Some(child) => self.move_to(id, Some(&child.id), MovePosition::Left),
        }
    }

    pub fn move_to_left_of(&mut self, id: &str, target: &str) -> Result<TreeNode, StoreError> {
        self.move_to(id, Some(target), MovePosition::Left)
    }

    pub fn move_to_right_of(&mut self, id: &str, target: &str) -> Result<TreeNode, StoreError> {
        self.move_to(id, Some(target), MovePosition::Right)
    }

    /// Detach to top level of its scope, appended after the existing roots.
    pub fn make_root(&mut self, id: &str) -> Result<TreeNode, StoreError> {
        self.move_to(id, None, MovePosition::Root)
    }
}

/// Transactional body of one move: validate, veto-check, plan, lock, rewrite
/// bounds in one statement, recompute depths, reload both endpoints.
pub(in crate::store) fn move_to_tx(
    conn: &Connection,
    cfg: &TreeConfig,
    events: &TreeEvents,
    id: &str,
    target: Option<&str>,
    position: MovePosition,
) -> Result<MoveOutcome, StoreError> {
    let node = required_node(conn, cfg, id)?;
    let target_node = match (position, target) {
        (MovePosition::Root, _) => None,
        (_, Some(target_id)) => Some(
            find_node(conn, cfg, target_id, false)?
                .ok_or(StoreError::MoveNotPossible(MoveError::TargetMissing))?,
        ),
        (_, None) => return Err(StoreError::MoveNotPossible(MoveError::TargetMissing)),
    };
    validate_move(&node, target_node.as_ref(), position)?;

    let moving = TreeEvent {
        action: "moving",
        node: &node,
        target: target_node.as_ref(),
        position: Some(position),
    };
    if !events.until(&event_name("moving", &cfg.table), &moving) {
        return Ok(MoveOutcome {
            node,
            target: target_node,
            accepted: false,
        });
    }

    let (raw_bound, new_parent) = match (position, target_node.as_ref()) {
        (MovePosition::Root, _) => (max_right(conn, cfg, &node.scope)? + 1, None),
        (MovePosition::Child, Some(t)) => (t.rgt, Some(t.id.clone())),
        (MovePosition::Left, Some(t)) => (t.lft, t.parent_id.clone()),
        (MovePosition::Right, Some(t)) => (t.rgt + 1, t.parent_id.clone()),
        (_, None) => return Err(StoreError::MoveNotPossible(MoveError::TargetMissing)),
    };

    if let Some(plan) = plan_move(node.lft, node.rgt, raw_bound) {
        lock_bound_range_tx(conn, cfg, &node.scope, plan.a, plan.d)?;
        rewrite_bounds_tx(conn, cfg, &node, new_parent.as_deref(), plan)?;
        set_depth_with_subtree_tx(conn, cfg, id)?;
    }

    let node = required_node(conn, cfg, id)?;
    let target_node = match target {
        Some(target_id) => find_node(conn, cfg, target_id, false)?,
        None => None,
    };
    Ok(MoveOutcome {
        node,
        target: target_node,
        accepted: true,
    })
}

/// Materialize the affected row set before rewriting it. The immediate
/// transaction already holds the database write lock; this is the range-lock
/// acquisition point for the bounds being rewritten.
fn lock_bound_range_tx(
    conn: &Connection,
    cfg: &TreeConfig,
    scope: &[AttrValue],
    low: i64,
    high: i64,
) -> Result<usize, StoreError> {
    let mut wheres = vec![format!(
        "({lft} BETWEEN ? AND ? OR {rgt} BETWEEN ? AND ?)",
        lft = quote_ident(&cfg.columns.left),
        rgt = quote_ident(&cfg.columns.right),
    )];
    let mut params = vec![
        SqlValue::Integer(low),
        SqlValue::Integer(high),
        SqlValue::Integer(low),
        SqlValue::Integer(high),
    ];
    scope_where(cfg, scope, &mut wheres, &mut params)?;
    live_where(cfg, &mut wheres);
    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        quote_ident("id"),
        quote_ident(&cfg.table),
        wheres.join(" AND ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut locked = 0usize;
    while rows.next()?.is_some() {
        locked += 1;
    }
    Ok(locked)
}

/// The single conditional update: bounds inside `[a,b]` shift by `d-b`,
/// bounds inside `[c,d]` shift by `a-c`, the moved row's parent pointer is
/// rewritten in the same statement.
fn rewrite_bounds_tx(
    conn: &Connection,
    cfg: &TreeConfig,
    node: &TreeNode,
    new_parent: Option<&str>,
    plan: MovePlan,
) -> Result<(), StoreError> {
    let table = quote_ident(&cfg.table);
    let lft = quote_ident(&cfg.columns.left);
    let rgt = quote_ident(&cfg.columns.right);
    let parent = quote_ident(&cfg.columns.parent);
    let id_col = quote_ident("id");

    let mut sql = format!(
        "UPDATE {table} SET \
         {lft} = CASE \
           WHEN {lft} BETWEEN ? AND ? THEN {lft} + ? \
           WHEN {lft} BETWEEN ? AND ? THEN {lft} + ? \
           ELSE {lft} END, \
         {rgt} = CASE \
           WHEN {rgt} BETWEEN ? AND ? THEN {rgt} + ? \
           WHEN {rgt} BETWEEN ? AND ? THEN {rgt} + ? \
           ELSE {rgt} END, \
         {parent} = CASE WHEN {id_col} = ? THEN ? ELSE {parent} END"
    );
    let mut params: Vec<SqlValue> = vec![
        SqlValue::Integer(plan.a),
        SqlValue::Integer(plan.b),
        SqlValue::Integer(plan.lower_shift()),
        SqlValue::Integer(plan.c),
        SqlValue::Integer(plan.d),
        SqlValue::Integer(plan.upper_shift()),
        SqlValue::Integer(plan.a),
        SqlValue::Integer(plan.b),
        SqlValue::Integer(plan.lower_shift()),
        SqlValue::Integer(plan.c),
        SqlValue::Integer(plan.d),
        SqlValue::Integer(plan.upper_shift()),
        SqlValue::Text(node.id.clone()),
        match new_parent {
            Some(parent_id) => SqlValue::Text(parent_id.to_string()),
            None => SqlValue::Null,
        },
    ];
    if cfg.timestamps {
        sql.push_str(&format!(", {} = ?", quote_ident("updated_at_ms")));
        params.push(SqlValue::Integer(now_ms()));
    }

    let mut wheres = vec![format!(
        "({lft} BETWEEN ? AND ? OR {rgt} BETWEEN ? AND ?)"
    )];
    params.extend([
        SqlValue::Integer(plan.a),
        SqlValue::Integer(plan.d),
        SqlValue::Integer(plan.a),
        SqlValue::Integer(plan.d),
    ]);
    scope_where(cfg, &node.scope, &mut wheres, &mut params)?;
    live_where(cfg, &mut wheres);
    sql.push_str(" WHERE ");
    sql.push_str(&wheres.join(" AND "));

    conn.execute(&sql, params_from_iter(params))?;
    Ok(())
}
