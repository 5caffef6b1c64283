#![forbid(unsafe_code)]

use nestree_core::tree::{quote_ident, TreeNode};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, TransactionBehavior};

use super::support::{live_where, required_node, scope_where};
use super::{StoreError, TreeConfig, TreeStore};

impl TreeStore {
    /// Recompute the cached depth of one node from its ancestor count.
    pub fn set_depth(&mut self, id: &str) -> Result<TreeNode, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let node = set_depth_tx(&tx, &self.config, id)?;
        tx.commit()?;
        Ok(node)
    }

    /// Recompute the cached depth of one node and shift its whole subtree by
    /// the same delta.
    pub fn set_depth_with_subtree(&mut self, id: &str) -> Result<TreeNode, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let node = set_depth_with_subtree_tx(&tx, &self.config, id)?;
        tx.commit()?;
        Ok(node)
    }

    /// Computed level: the number of strict ancestors, read from the bounds.
    pub fn level_of(&self, id: &str) -> Result<i64, StoreError> {
        let node = self.node(id)?;
        ancestor_count(&self.conn, &self.config, &node)
    }
}

/// One-statement ancestor count over the bound inequality.
pub(in crate::store) fn ancestor_count(
    conn: &Connection,
    cfg: &TreeConfig,
    node: &TreeNode,
) -> Result<i64, StoreError> {
    let mut wheres = vec![
        format!("{} < ?", quote_ident(&cfg.columns.left)),
        format!("{} > ?", quote_ident(&cfg.columns.right)),
    ];
    let mut params = vec![SqlValue::Integer(node.lft), SqlValue::Integer(node.rgt)];
    scope_where(cfg, &node.scope, &mut wheres, &mut params)?;
    live_where(cfg, &mut wheres);
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {}",
        quote_ident(&cfg.table),
        wheres.join(" AND ")
    );
    Ok(conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?)
}

pub(in crate::store) fn set_depth_tx(
    conn: &Connection,
    cfg: &TreeConfig,
    id: &str,
) -> Result<TreeNode, StoreError> {
    let node = required_node(conn, cfg, id)?;
    let level = ancestor_count(conn, cfg, &node)?;
    write_depth(conn, cfg, id, level)?;
    required_node(conn, cfg, id)
}

pub(in crate::store) fn set_depth_with_subtree_tx(
    conn: &Connection,
    cfg: &TreeConfig,
    id: &str,
) -> Result<TreeNode, StoreError> {
    let node = required_node(conn, cfg, id)?;
    let level = ancestor_count(conn, cfg, &node)?;
    let delta = level - node.depth;
    write_depth(conn, cfg, id, level)?;
    if delta != 0 && !node.is_leaf() {
        let mut wheres = vec![
            format!("{} > ?", quote_ident(&cfg.columns.left)),
            format!("{} < ?", quote_ident(&cfg.columns.right)),
        ];
        let mut params = vec![
            SqlValue::Integer(delta),
            SqlValue::Integer(node.lft),
            SqlValue::Integer(node.rgt),
        ];
        scope_where(cfg, &node.scope, &mut wheres, &mut params)?;
        live_where(cfg, &mut wheres);
        let depth = quote_ident(&cfg.columns.depth);
        let sql = format!(
            "UPDATE {} SET {depth} = {depth} + ? WHERE {}",
            quote_ident(&cfg.table),
            wheres.join(" AND ")
        );
        conn.execute(&sql, params_from_iter(params))?;
    }
    required_node(conn, cfg, id)
}

fn write_depth(
    conn: &Connection,
    cfg: &TreeConfig,
    id: &str,
    level: i64,
) -> Result<(), StoreError> {
    let sql = format!(
        "UPDATE {} SET {} = ?1 WHERE {} = ?2",
        quote_ident(&cfg.table),
        quote_ident(&cfg.columns.depth),
        quote_ident("id"),
    );
    conn.execute(&sql, rusqlite::params![level, id])?;
    Ok(())
}
