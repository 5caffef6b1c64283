#![forbid(unsafe_code)]

use nestree_core::tree::{audit_nested_set, quote_ident, AttrValue, TreeAudit};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, TransactionBehavior};
use std::collections::HashMap;

use super::support::{live_where, scope_where, value_from_sql};
use super::{StoreError, TreeConfig, TreeStore};

impl TreeStore {
    /// Reassign every bound and depth in the scope from the parent pointers:
    /// DFS from the roots in order, counter incremented on entry and exit.
    /// Applying it twice is a no-op on the second application.
    pub fn rebuild(&mut self, scope: &[AttrValue]) -> Result<(), StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        rebuild_scope_tx(&tx, &self.config, scope)?;
        tx.commit()?;
        Ok(())
    }

    /// Audit one scope partition against the nested-set invariants.
    pub fn tree_validate(&self, scope: &[AttrValue]) -> Result<TreeAudit, StoreError> {
        let query = self.query(scope)?;
        let rows = self.fetch(&query)?;
        Ok(audit_nested_set(&rows))
    }

    pub fn is_valid_nested_set(&self, scope: &[AttrValue]) -> Result<bool, StoreError> {
        Ok(self.tree_validate(scope)?.ok)
    }

    /// Surface the first defect as an error; used as a post-mutation sanity
    /// check.
    pub fn ensure_valid(&self, scope: &[AttrValue]) -> Result<(), StoreError> {
        let audit = self.tree_validate(scope)?;
        match audit.defects.into_iter().next() {
            None => Ok(()),
            Some(defect) => Err(StoreError::InvariantViolation(defect)),
        }
    }

    /// Every scope tuple present in the table (a single empty tuple for
    /// unscoped trees).
    pub fn distinct_scopes(&self) -> Result<Vec<Vec<AttrValue>>, StoreError> {
        if !self.config.columns.is_scoped() {
            return Ok(vec![Vec::new()]);
        }
        let list = self
            .config
            .columns
            .scope
            .iter()
            .map(|column| quote_ident(column))
            .collect::<Vec<_>>()
            .join(", ");
        let mut wheres = Vec::new();
        live_where(&self.config, &mut wheres);
        let mut sql = format!(
            "SELECT DISTINCT {list} FROM {}",
            quote_ident(&self.config.table)
        );
        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY {list}"));
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut scopes = Vec::new();
        while let Some(row) = rows.next()? {
            let mut scope = Vec::with_capacity(self.config.columns.scope.len());
            for index in 0..self.config.columns.scope.len() {
                scope.push(value_from_sql(row.get_ref(index)?));
            }
            scopes.push(scope);
        }
        Ok(scopes)
    }

    /// Validate every scope partition of the table.
    pub fn is_valid_forest(&self) -> Result<bool, StoreError> {
        for scope in self.distinct_scopes()? {
            if !self.is_valid_nested_set(&scope)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

struct RebuildRow {
    id: String,
    parent_id: Option<String>,
    lft: i64,
    rgt: i64,
    depth: i64,
}

fn rebuild_scope_tx(
    conn: &Connection,
    cfg: &TreeConfig,
    scope: &[AttrValue],
) -> Result<(), StoreError> {
    let mut wheres = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();
    scope_where(cfg, scope, &mut wheres, &mut params)?;
    live_where(cfg, &mut wheres);
    let mut sql = format!(
        "SELECT {}, {}, {}, {}, {} FROM {}",
        quote_ident("id"),
        quote_ident(&cfg.columns.parent),
        quote_ident(&cfg.columns.left),
        quote_ident(&cfg.columns.right),
        quote_ident(&cfg.columns.depth),
        quote_ident(&cfg.table),
    );
    if !wheres.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&wheres.join(" AND "));
    }
    sql.push_str(&format!(
        " ORDER BY {} ASC",
        quote_ident(cfg.columns.order_column())
    ));

    let mut rows: Vec<RebuildRow> = Vec::new();
    {
        let mut stmt = conn.prepare(&sql)?;
        let mut fetched = stmt.query(params_from_iter(params))?;
        while let Some(row) = fetched.next()? {
            rows.push(RebuildRow {
                id: row.get(0)?,
                parent_id: row.get(1)?,
                lft: row.get(2)?,
                rgt: row.get(3)?,
                depth: row.get(4)?,
            });
        }
    }

    let known: HashMap<&str, usize> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| (row.id.as_str(), index))
        .collect();
    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut roots: Vec<usize> = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        match row
            .parent_id
            .as_deref()
            .and_then(|parent| known.get(parent).copied())
        {
            Some(parent_index) => children.entry(parent_index).or_default().push(index),
            // Missing parents are treated as roots so a rebuild always
            // terminates with a coherent forest.
            None => roots.push(index),
        }
    }

    let mut assigned: Vec<(i64, i64, i64)> = vec![(0, 0, 0); rows.len()];
    let mut counter = 0i64;
    for root in roots {
        assign_bounds(root, 0, &children, &mut counter, &mut assigned);
    }

    let update_sql = format!(
        "UPDATE {} SET {} = ?1, {} = ?2, {} = ?3 WHERE {} = ?4",
        quote_ident(&cfg.table),
        quote_ident(&cfg.columns.left),
        quote_ident(&cfg.columns.right),
        quote_ident(&cfg.columns.depth),
        quote_ident("id"),
    );
    let mut stmt = conn.prepare(&update_sql)?;
    for (index, row) in rows.iter().enumerate() {
        let (lft, rgt, depth) = assigned[index];
        if row.lft != lft || row.rgt != rgt || row.depth != depth {
            stmt.execute(rusqlite::params![lft, rgt, depth, row.id])?;
        }
    }
    Ok(())
}

fn assign_bounds(
    index: usize,
    depth: i64,
    children: &HashMap<usize, Vec<usize>>,
    counter: &mut i64,
    assigned: &mut Vec<(i64, i64, i64)>,
) {
    *counter += 1;
    let lft = *counter;
    if let Some(kids) = children.get(&index) {
        for child in kids {
            assign_bounds(*child, depth + 1, children, counter, assigned);
        }
    }
    *counter += 1;
    assigned[index] = (lft, *counter, depth);
}
