#![forbid(unsafe_code)]

use nestree_core::tree::{
    quote_ident, subtree_width, AttrValue, MovePosition, TreeNode, PARENT_FIELD,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, TransactionBehavior};
use std::collections::BTreeMap;

use super::moves::move_to_tx;
use super::support::{
    find_node, live_where, max_right, next_counter, now_ms, required_node, scope_where,
    value_to_sql,
};
use super::types::NewNode;
use super::{StoreError, TreeConfig, TreeStore};

impl TreeStore {
    /// Insert a node at the tail of its scope; when a parent is given the
    /// node is relocated under it inside the same transaction.
    pub fn create(&mut self, request: NewNode) -> Result<TreeNode, StoreError> {
        for name in request.attrs.keys() {
            if !self.config.is_attr_column(name) {
                return Err(StoreError::InvalidInput("unknown attribute column"));
            }
        }
        let mut provisional = TreeNode::unsaved(request.scope.clone());
        provisional.id = request.id.clone().unwrap_or_default();
        provisional.parent_id = request.parent.clone();
        provisional.attrs = request.attrs.clone();
        self.dispatch_event("creating", &provisional, None, None);

        let now = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = match &request.id {
            Some(id) => {
                let id = id.trim();
                if id.is_empty() {
                    return Err(StoreError::InvalidInput("node id must not be empty"));
                }
                if find_node(&tx, &self.config, id, true)?.is_some() {
                    return Err(StoreError::AlreadyExists {
                        entity: "node",
                        id: id.to_string(),
                    });
                }
                id.to_string()
            }
            None => {
                let seq = next_counter(&tx, &self.config.table, "node_seq")?;
                format!("NODE-{seq:04}")
            }
        };
        insert_at_tail_tx(&tx, &self.config, &id, &request.scope, &request.attrs, now)?;
        let relocation = match &request.parent {
            Some(parent) => Some(move_to_tx(
                &tx,
                &self.config,
                &self.events,
                &id,
                Some(parent),
                MovePosition::Child,
            )?),
            None => None,
        };
        let node = required_node(&tx, &self.config, &id)?;
        tx.commit()?;

        if let Some(relocation) = relocation {
            if relocation.accepted {
                self.dispatch_event(
                    "moved",
                    &node,
                    relocation.target.as_ref(),
                    Some(MovePosition::Child),
                );
            }
        }
        Ok(node)
    }

    /// Write the handle's dirty attribute columns; a dirty parent pointer
    /// becomes the pending move, applied inside the same transaction. The
    /// handle is refreshed from the store afterwards.
    pub fn save(&mut self, node: &mut TreeNode) -> Result<(), StoreError> {
        if !node.is_persisted() {
            return Err(StoreError::InvalidInput(
                "save requires a persisted handle; use create",
            ));
        }
        for name in node.dirty_attrs() {
            if !self.config.is_attr_column(name) {
                return Err(StoreError::InvalidInput("unknown attribute column"));
            }
        }
        self.dispatch_event("saving", node, None, None);

        let pending_move: Option<Option<String>> = node
            .is_dirty(PARENT_FIELD)
            .then(|| node.parent_id.clone());
        let now = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let dirty: Vec<(String, AttrValue)> = node
            .dirty_attrs()
            .map(|name| {
                (
                    name.to_string(),
                    node.attrs.get(name).cloned().unwrap_or(AttrValue::Null),
                )
            })
            .collect();
        update_attrs_tx(&tx, &self.config, &node.id, &dirty, now)?;
        let relocation = match &pending_move {
            Some(None) => Some(move_to_tx(
                &tx,
                &self.config,
                &self.events,
                &node.id,
                None,
                MovePosition::Root,
            )?),
            Some(Some(parent)) => Some(move_to_tx(
                &tx,
                &self.config,
                &self.events,
                &node.id,
                Some(parent),
                MovePosition::Child,
            )?),
            None => {
                super::depth::set_depth_with_subtree_tx(&tx, &self.config, &node.id)?;
                None
            }
        };
        let reloaded = required_node(&tx, &self.config, &node.id)?;
        tx.commit()?;

        *node = reloaded;
        self.dispatch_event("saved", node, None, None);
        if let Some(relocation) = relocation {
            if relocation.accepted {
                let position = match pending_move {
                    Some(None) => MovePosition::Root,
                    _ => MovePosition::Child,
                };
                self.dispatch_event("moved", node, relocation.target.as_ref(), Some(position));
            }
        }
        Ok(())
    }

    /// Remove (or mask, in soft-delete mode) the node and its entire subtree
    /// and close the bound gap. Returns the number of rows pruned.
    pub fn delete(&mut self, id: &str) -> Result<usize, StoreError> {
        let node = self.node(id)?;
        self.dispatch_event("deleting", &node, None, None);

        let now = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        lock_tail_tx(&tx, &self.config, &node)?;
        let pruned = prune_subtree_tx(&tx, &self.config, &node, now)?;
        tx.commit()?;
        Ok(pruned)
    }

    /// Reopen the bound range of a masked node and unmask it together with
    /// the descendants whose bounds lie strictly inside it.
    pub fn restore(&mut self, id: &str) -> Result<TreeNode, StoreError> {
        if !self.config.soft_delete {
            return Err(StoreError::InvalidInput(
                "restore requires a soft-delete store",
            ));
        }
        let node = self.node_any(id)?;
        if !node.is_masked() {
            return Ok(node);
        }
        self.dispatch_event("restoring", &node, None, None);

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        reopen_range_tx(&tx, &self.config, &node)?;
        unmask_tx(&tx, &self.config, &node)?;
        let restored = required_node(&tx, &self.config, id)?;
        tx.commit()?;

        self.dispatch_event("restored", &restored, None, None);
        Ok(restored)
    }
}

/// Assign tail bounds under the scope's current maximum and insert the row
/// as a childless root.
pub(in crate::store) fn insert_at_tail_tx(
    conn: &Connection,
    cfg: &TreeConfig,
    id: &str,
    scope: &[AttrValue],
    attrs: &BTreeMap<String, AttrValue>,
    now: i64,
) -> Result<(), StoreError> {
    if scope.len() != cfg.columns.scope.len() {
        return Err(StoreError::InvalidInput(
            "scope width does not match the configured scope columns",
        ));
    }
    let tail = max_right(conn, cfg, scope)?;

    let mut columns = vec![
        quote_ident("id"),
        quote_ident(&cfg.columns.left),
        quote_ident(&cfg.columns.right),
        quote_ident(&cfg.columns.depth),
    ];
    let mut params: Vec<SqlValue> = vec![
        SqlValue::Text(id.to_string()),
        SqlValue::Integer(tail + 1),
        SqlValue::Integer(tail + 2),
        SqlValue::Integer(0),
    ];
    for (column, value) in cfg.columns.scope.iter().zip(scope) {
        columns.push(quote_ident(column));
        params.push(value_to_sql(value));
    }
    for (name, value) in attrs {
        columns.push(quote_ident(name));
        params.push(value_to_sql(value));
    }
    if cfg.timestamps {
        columns.push(quote_ident("created_at_ms"));
        columns.push(quote_ident("updated_at_ms"));
        params.push(SqlValue::Integer(now));
        params.push(SqlValue::Integer(now));
    }
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {}({}) VALUES ({})",
        quote_ident(&cfg.table),
        columns.join(", "),
        placeholders
    );
    conn.execute(&sql, params_from_iter(params))?;
    Ok(())
}

pub(in crate::store) fn update_attrs_tx(
    conn: &Connection,
    cfg: &TreeConfig,
    id: &str,
    attrs: &[(String, AttrValue)],
    now: i64,
) -> Result<(), StoreError> {
    if attrs.is_empty() && !cfg.timestamps {
        return Ok(());
    }
    let mut sets = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();
    for (name, value) in attrs {
        sets.push(format!("{} = ?", quote_ident(name)));
        params.push(value_to_sql(value));
    }
    if cfg.timestamps {
        sets.push(format!("{} = ?", quote_ident("updated_at_ms")));
        params.push(SqlValue::Integer(now));
    }
    if sets.is_empty() {
        return Ok(());
    }
    params.push(SqlValue::Text(id.to_string()));
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        quote_ident(&cfg.table),
        sets.join(", "),
        quote_ident("id"),
    );
    let updated = conn.execute(&sql, params_from_iter(params))?;
    if updated == 0 {
        return Err(StoreError::NotFound {
            entity: "node",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Range-lock acquisition for the delete path: everything at or right of the
/// doomed subtree's left bound.
fn lock_tail_tx(conn: &Connection, cfg: &TreeConfig, node: &TreeNode) -> Result<(), StoreError> {
    let mut wheres = vec![format!("{} >= ?", quote_ident(&cfg.columns.left))];
    let mut params = vec![SqlValue::Integer(node.lft)];
    scope_where(cfg, &node.scope, &mut wheres, &mut params)?;
    live_where(cfg, &mut wheres);
    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        quote_ident("id"),
        quote_ident(&cfg.table),
        wheres.join(" AND ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(params))?;
    while rows.next()?.is_some() {}
    Ok(())
}

/// Remove (or mask) self plus descendants, then shift every later bound left
/// by the width of the removed range.
pub(in crate::store) fn prune_subtree_tx(
    conn: &Connection,
    cfg: &TreeConfig,
    node: &TreeNode,
    now: i64,
) -> Result<usize, StoreError> {
    let table = quote_ident(&cfg.table);
    let lft = quote_ident(&cfg.columns.left);
    let rgt = quote_ident(&cfg.columns.right);
    let width = subtree_width(node.lft, node.rgt);

    let mut wheres = vec![format!("{lft} >= ?"), format!("{rgt} <= ?")];
    let mut params = vec![SqlValue::Integer(node.lft), SqlValue::Integer(node.rgt)];
    scope_where(cfg, &node.scope, &mut wheres, &mut params)?;
    live_where(cfg, &mut wheres);
    let pruned = if cfg.soft_delete {
        let sql = format!(
            "UPDATE {table} SET {} = ? WHERE {}",
            quote_ident("deleted_at_ms"),
            wheres.join(" AND ")
        );
        let mut masked_params = vec![SqlValue::Integer(now)];
        masked_params.extend(params);
        conn.execute(&sql, params_from_iter(masked_params))?
    } else {
        let sql = format!("DELETE FROM {table} WHERE {}", wheres.join(" AND "));
        conn.execute(&sql, params_from_iter(params))?
    };

    shift_bounds_tx(conn, cfg, &node.scope, &cfg.columns.left, node.rgt, -width)?;
    shift_bounds_tx(conn, cfg, &node.scope, &cfg.columns.right, node.rgt, -width)?;
    Ok(pruned)
}

/// Reopen the bound range ahead of a restore: shift every live bound at or
/// past the masked node's left bound right by the range width.
pub(in crate::store) fn reopen_range_tx(
    conn: &Connection,
    cfg: &TreeConfig,
    node: &TreeNode,
) -> Result<(), StoreError> {
    let width = subtree_width(node.lft, node.rgt);
    shift_bounds_tx(conn, cfg, &node.scope, &cfg.columns.left, node.lft - 1, width)?;
    shift_bounds_tx(conn, cfg, &node.scope, &cfg.columns.right, node.lft - 1, width)?;
    Ok(())
}

fn unmask_tx(conn: &Connection, cfg: &TreeConfig, node: &TreeNode) -> Result<(), StoreError> {
    let table = quote_ident(&cfg.table);
    let deleted = quote_ident("deleted_at_ms");
    let sql = format!(
        "UPDATE {table} SET {deleted} = NULL WHERE {} = ?",
        quote_ident("id")
    );
    conn.execute(&sql, rusqlite::params![node.id])?;

    let mut wheres = vec![
        format!("{} > ?", quote_ident(&cfg.columns.left)),
        format!("{} < ?", quote_ident(&cfg.columns.right)),
        format!("{deleted} IS NOT NULL"),
    ];
    let mut params = vec![SqlValue::Integer(node.lft), SqlValue::Integer(node.rgt)];
    scope_where(cfg, &node.scope, &mut wheres, &mut params)?;
    let sql = format!(
        "UPDATE {table} SET {deleted} = NULL WHERE {}",
        wheres.join(" AND ")
    );
    conn.execute(&sql, params_from_iter(params))?;
    Ok(())
}

/// Shift one bound column by `delta` for every live row strictly past
/// `threshold`.
fn shift_bounds_tx(
    conn: &Connection,
    cfg: &TreeConfig,
    scope: &[AttrValue],
    column: &str,
    threshold: i64,
    delta: i64,
) -> Result<(), StoreError> {
    let bound = quote_ident(column);
    let mut wheres = vec![format!("{bound} > ?")];
    let mut params = vec![SqlValue::Integer(delta), SqlValue::Integer(threshold)];
    scope_where(cfg, scope, &mut wheres, &mut params)?;
    live_where(cfg, &mut wheres);
    let sql = format!(
        "UPDATE {} SET {bound} = {bound} + ? WHERE {}",
        quote_ident(&cfg.table),
        wheres.join(" AND ")
    );
    conn.execute(&sql, params_from_iter(params))?;
    Ok(())
}
