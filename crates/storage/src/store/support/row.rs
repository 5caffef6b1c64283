#![forbid(unsafe_code)]

use nestree_core::tree::{quote_ident, AttrValue, TreeNode};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::sql::{live_where, scope_where, value_from_sql};
use crate::store::{StoreError, TreeConfig};

/// SELECT list in the fixed order `node_from_row` reads it back.
pub(in crate::store) fn select_list(cfg: &TreeConfig) -> String {
    let columns = &cfg.columns;
    let mut list = vec![
        quote_ident("id"),
        quote_ident(&columns.parent),
        quote_ident(&columns.left),
        quote_ident(&columns.right),
        quote_ident(&columns.depth),
    ];
    for column in &columns.scope {
        list.push(quote_ident(column));
    }
    for column in cfg.attr_columns() {
        list.push(quote_ident(column));
    }
    if cfg.timestamps {
        list.push(quote_ident("created_at_ms"));
        list.push(quote_ident("updated_at_ms"));
    }
    if cfg.soft_delete {
        list.push(quote_ident("deleted_at_ms"));
    }
    list.join(", ")
}

pub(in crate::store) fn node_from_row(
    cfg: &TreeConfig,
    row: &Row<'_>,
) -> rusqlite::Result<TreeNode> {
    let id: String = row.get(0)?;
    let parent_id: Option<String> = row.get(1)?;
    let lft: i64 = row.get(2)?;
    let rgt: i64 = row.get(3)?;
    let depth: i64 = row.get(4)?;
    let mut index = 5;
    let mut scope = Vec::with_capacity(cfg.columns.scope.len());
    for _ in &cfg.columns.scope {
        scope.push(value_from_sql(row.get_ref(index)?));
        index += 1;
    }
    let mut node = TreeNode::loaded(id, parent_id, lft, rgt, depth, scope);
    let attr_names: Vec<String> = cfg.attr_columns().map(str::to_string).collect();
    for name in attr_names {
        let value = value_from_sql(row.get_ref(index)?);
        if !matches!(value, AttrValue::Null) {
            node.attrs.insert(name, value);
        }
        index += 1;
    }
    if cfg.timestamps {
        node.created_at_ms = row.get(index)?;
        node.updated_at_ms = row.get(index + 1)?;
        index += 2;
    }
    if cfg.soft_delete {
        node.deleted_at_ms = row.get(index)?;
    }
    Ok(node)
}

pub(in crate::store) fn find_node(
    conn: &Connection,
    cfg: &TreeConfig,
    id: &str,
    include_masked: bool,
) -> Result<Option<TreeNode>, StoreError> {
    let mut sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1",
        select_list(cfg),
        quote_ident(&cfg.table),
        quote_ident("id"),
    );
    if cfg.soft_delete && !include_masked {
        sql.push_str(&format!(" AND {} IS NULL", quote_ident("deleted_at_ms")));
    }
    Ok(conn
        .query_row(&sql, params![id], |row| node_from_row(cfg, row))
        .optional()?)
}

pub(in crate::store) fn required_node(
    conn: &Connection,
    cfg: &TreeConfig,
    id: &str,
) -> Result<TreeNode, StoreError> {
    find_node(conn, cfg, id, false)?.ok_or_else(|| StoreError::NotFound {
        entity: "node",
        id: id.to_string(),
    })
}

/// Current tail of the scope: the highest right bound among live rows.
pub(in crate::store) fn max_right(
    conn: &Connection,
    cfg: &TreeConfig,
    scope: &[AttrValue],
) -> Result<i64, StoreError> {
    let mut wheres = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();
    scope_where(cfg, scope, &mut wheres, &mut params)?;
    live_where(cfg, &mut wheres);
    let mut sql = format!(
        "SELECT MAX({}) FROM {}",
        quote_ident(&cfg.columns.right),
        quote_ident(&cfg.table),
    );
    if !wheres.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&wheres.join(" AND "));
    }
    let max: Option<i64> = conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
    Ok(max.unwrap_or(0))
}

/// Strict descendants of a node, in left-bound order.
pub(in crate::store) fn descendant_rows(
    conn: &Connection,
    cfg: &TreeConfig,
    node: &TreeNode,
) -> Result<Vec<TreeNode>, StoreError> {
    let mut wheres = vec![
        format!("{} > ?", quote_ident(&cfg.columns.left)),
        format!("{} < ?", quote_ident(&cfg.columns.right)),
    ];
    let mut params = vec![SqlValue::Integer(node.lft), SqlValue::Integer(node.rgt)];
    scope_where(cfg, &node.scope, &mut wheres, &mut params)?;
    live_where(cfg, &mut wheres);
    fetch_rows(conn, cfg, &wheres, params)
}

/// Every live row of one scope partition, in left-bound order.
pub(in crate::store) fn scope_rows(
    conn: &Connection,
    cfg: &TreeConfig,
    scope: &[AttrValue],
) -> Result<Vec<TreeNode>, StoreError> {
    let mut wheres = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();
    scope_where(cfg, scope, &mut wheres, &mut params)?;
    live_where(cfg, &mut wheres);
    fetch_rows(conn, cfg, &wheres, params)
}

fn fetch_rows(
    conn: &Connection,
    cfg: &TreeConfig,
    wheres: &[String],
    params: Vec<SqlValue>,
) -> Result<Vec<TreeNode>, StoreError> {
    let mut sql = format!(
        "SELECT {} FROM {}",
        select_list(cfg),
        quote_ident(&cfg.table)
    );
    if !wheres.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&wheres.join(" AND "));
    }
    sql.push_str(&format!(" ORDER BY {} ASC", quote_ident(&cfg.columns.left)));
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut nodes = Vec::new();
    while let Some(row) = rows.next()? {
        nodes.push(node_from_row(cfg, row)?);
    }
    Ok(nodes)
}

pub(in crate::store) fn next_counter(
    conn: &Connection,
    tree: &str,
    name: &str,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO counters(tree, name, value) VALUES (?1, ?2, 1) \
         ON CONFLICT(tree, name) DO UPDATE SET value = value + 1",
        params![tree, name],
    )?;
    Ok(conn.query_row(
        "SELECT value FROM counters WHERE tree = ?1 AND name = ?2",
        params![tree, name],
        |row| row.get(0),
    )?)
}
