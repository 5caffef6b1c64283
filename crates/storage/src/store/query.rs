#![forbid(unsafe_code)]

use nestree_core::tree::{quote_ident, AttrValue, TreeNode};
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;

use super::support::{live_where, node_from_row, scope_where, select_list};
use super::{StoreError, TreeConfig, TreeStore};

/// Composable, scope-restricted predicate set over the tree table. Every
/// query starts from the scope equality clauses and the soft-delete mask;
/// results come back ordered by the order column ascending.
pub struct TreeQuery<'a> {
    cfg: &'a TreeConfig,
    wheres: Vec<String>,
    params: Vec<SqlValue>,
}

impl<'a> TreeQuery<'a> {
    fn new(cfg: &'a TreeConfig, scope: &[AttrValue]) -> Result<Self, StoreError> {
        let mut wheres = Vec::new();
        let mut params = Vec::new();
        scope_where(cfg, scope, &mut wheres, &mut params)?;
        live_where(cfg, &mut wheres);
        Ok(Self {
            cfg,
            wheres,
            params,
        })
    }

    fn push(mut self, clause: String) -> Self {
        self.wheres.push(clause);
        self
    }

    fn push_with(mut self, clause: String, values: impl IntoIterator<Item = SqlValue>) -> Self {
        self.wheres.push(clause);
        self.params.extend(values);
        self
    }

    fn left(&self) -> String {
        quote_ident(&self.cfg.columns.left)
    }

    fn right(&self) -> String {
        quote_ident(&self.cfg.columns.right)
    }

    fn parent(&self) -> String {
        quote_ident(&self.cfg.columns.parent)
    }

    // ---- predicates --------------------------------------------------------

    pub fn roots(self) -> Self {
        let clause = format!("{} IS NULL", self.parent());
        self.push(clause)
    }

    pub fn all_leaves(self) -> Self {
        let clause = format!("{} - {} = 1", self.right(), self.left());
        self.push(clause)
    }

    pub fn all_trunks(self) -> Self {
        let clause = format!(
            "{} IS NOT NULL AND {} - {} <> 1",
            self.parent(),
            self.right(),
            self.left()
        );
        self.push(clause)
    }

    /// Leaves within the receiver's subtree (the receiver itself qualifies
    /// when it is a leaf).
    pub fn leaves_of(self, node: &TreeNode) -> Self {
        let clause = format!("{} >= ? AND {} < ?", self.left(), self.left());
        self.all_leaves()
            .push_with(clause, [SqlValue::Integer(node.lft), SqlValue::Integer(node.rgt)])
    }

    pub fn trunks_of(self, node: &TreeNode) -> Self {
        self.all_trunks().descendants(node)
    }

    pub fn ancestors_and_self(self, node: &TreeNode) -> Self {
        let clause = format!("{} <= ? AND {} >= ?", self.left(), self.right());
        self.push_with(clause, [SqlValue::Integer(node.lft), SqlValue::Integer(node.rgt)])
    }

    pub fn ancestors(self, node: &TreeNode) -> Self {
        self.ancestors_and_self(node).without_self(node)
    }

    pub fn descendants_and_self(self, node: &TreeNode) -> Self {
        let clause = format!("{} >= ? AND {} < ?", self.left(), self.left());
        self.push_with(clause, [SqlValue::Integer(node.lft), SqlValue::Integer(node.rgt)])
    }

    pub fn descendants(self, node: &TreeNode) -> Self {
        self.descendants_and_self(node).without_self(node)
    }

    pub fn siblings_and_self(self, node: &TreeNode) -> Self {
        match node.parent_id.as_deref() {
            Some(parent) => {
                let clause = format!("{} = ?", self.parent());
                self.push_with(clause, [SqlValue::Text(parent.to_string())])
            }
            None => self.roots(),
        }
    }

    pub fn siblings(self, node: &TreeNode) -> Self {
        self.siblings_and_self(node).without_self(node)
    }

    pub fn children_of(self, node: &TreeNode) -> Self {
        let clause = format!("{} = ?", self.parent());
        self.push_with(clause, [SqlValue::Text(node.id.clone())])
    }

    pub fn without_node(self, id: &str) -> Self {
        let clause = format!("{} <> ?", quote_ident("id"));
        self.push_with(clause, [SqlValue::Text(id.to_string())])
    }

    pub fn without_self(self, node: &TreeNode) -> Self {
        let id = node.id.clone();
        self.without_node(&id)
    }

    pub fn without_roots(self) -> Self {
        let clause = format!("{} IS NOT NULL", self.parent());
        self.push(clause)
    }

    /// Restrict to `levels` levels below the receiver (`0` keeps only rows at
    /// the receiver's own depth).
    pub fn limit_depth(self, node: &TreeNode, levels: i64) -> Self {
        let clause = format!("{} BETWEEN ? AND ?", quote_ident(&self.cfg.columns.depth));
        self.push_with(
            clause,
            [
                SqlValue::Integer(node.depth),
                SqlValue::Integer(node.depth + levels),
            ],
        )
    }

    fn sql(&self) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}",
            select_list(self.cfg),
            quote_ident(&self.cfg.table)
        );
        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.wheres.join(" AND "));
        }
        sql.push_str(&format!(
            " ORDER BY {} ASC",
            quote_ident(self.cfg.columns.order_column())
        ));
        sql
    }
}

impl TreeStore {
    /// Open a predicate handle over one scope partition.
    pub fn query(&self, scope: &[AttrValue]) -> Result<TreeQuery<'_>, StoreError> {
        TreeQuery::new(&self.config, scope)
    }

    pub fn fetch(&self, query: &TreeQuery<'_>) -> Result<Vec<TreeNode>, StoreError> {
        let sql = query.sql();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(query.params.iter().cloned()))?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(node_from_row(&self.config, row)?);
        }
        Ok(nodes)
    }

    pub fn fetch_one(&self, query: &TreeQuery<'_>) -> Result<Option<TreeNode>, StoreError> {
        Ok(self.fetch(query)?.into_iter().next())
    }
}
