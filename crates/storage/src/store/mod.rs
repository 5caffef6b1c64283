#![forbid(unsafe_code)]
//! Storage implementation (split-friendly module root).

mod depth;
mod error;
mod events;
mod lifecycle;
mod mapper;
mod moves;
mod query;
mod rebuild;
mod support;
mod types;

use nestree_core::tree::{
    assemble_forest, quote_ident, validate_column_name, AttrValue, ForestNode, TreeColumns,
    TreeNode, PARENT_FIELD,
};
use rusqlite::{params_from_iter, Connection};
use std::path::{Path, PathBuf};

pub use error::StoreError;
pub use events::{TreeEvent, TreeEvents};
pub use query::TreeQuery;
pub use types::*;

use support::*;

const DB_FILE: &str = "nestree.db";

/// Column names that belong to the engine and cannot be reconfigured.
const RESERVED_COLUMNS: [&str; 4] = ["id", "created_at_ms", "updated_at_ms", "deleted_at_ms"];

/// Table layout of one tree: structural columns, scope partitioning, user
/// attribute columns and the lifecycle switches.
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub table: String,
    pub columns: TreeColumns,
    /// User attribute columns beyond the structural set.
    pub attrs: Vec<String>,
    pub timestamps: bool,
    pub soft_delete: bool,
}

impl TreeConfig {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: TreeColumns::default(),
            attrs: Vec::new(),
            timestamps: true,
            soft_delete: false,
        }
    }

    /// Writable non-structural columns: the order column plus user attributes.
    pub fn attr_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .order
            .as_deref()
            .into_iter()
            .chain(self.attrs.iter().map(String::as_str))
    }

    pub fn is_attr_column(&self, name: &str) -> bool {
        self.attr_columns().any(|column| column == name)
    }

    fn validate(&self) -> Result<(), StoreError> {
        validate_column_name(&self.table)?;
        self.columns.validate()?;
        let mut seen: Vec<&str> = self.columns.structural().to_vec();
        if let Some(order) = self.columns.order.as_deref() {
            if order == PARENT_FIELD {
                return Err(StoreError::InvalidInput(
                    "order column name is reserved for the parent marker",
                ));
            }
            seen.push(order);
        }
        seen.extend(self.columns.scope.iter().map(String::as_str));
        for attr in &self.attrs {
            validate_column_name(attr)?;
            if seen.contains(&attr.as_str()) {
                return Err(StoreError::InvalidInput(
                    "attribute column duplicates a structural or scope column",
                ));
            }
            // "parent" is the dirty-set marker for the parent pointer.
            if attr == PARENT_FIELD {
                return Err(StoreError::InvalidInput(
                    "attribute column name is reserved for the parent marker",
                ));
            }
            seen.push(attr);
        }
        if seen
            .iter()
            .any(|name| RESERVED_COLUMNS.contains(name))
        {
            return Err(StoreError::InvalidInput(
                "configured column collides with a reserved engine column",
            ));
        }
        Ok(())
    }
}

/// SQLite-backed nested-set store. One instance manages one tree table; the
/// database file is the store of record and handles returned to callers are
/// snapshots of it.
#[derive(Debug)]
pub struct TreeStore {
    storage_dir: PathBuf,
    conn: Connection,
    config: TreeConfig,
    events: TreeEvents,
}

impl TreeStore {
    pub fn open(storage_dir: impl AsRef<Path>, config: TreeConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;
        let db_path = storage_dir.join(DB_FILE);
        let conn = Connection::open(db_path)?;
        migrate_tree_schema(&conn, &config)?;
        Ok(Self {
            storage_dir,
            conn,
            config,
            events: TreeEvents::default(),
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    // ---- reads -------------------------------------------------------------

    /// Fresh read of one row; masked rows are not visible.
    pub fn find(&self, id: &str) -> Result<Option<TreeNode>, StoreError> {
        find_node(&self.conn, &self.config, id, false)
    }

    pub fn node(&self, id: &str) -> Result<TreeNode, StoreError> {
        self.find(id)?.ok_or_else(|| StoreError::NotFound {
            entity: "node",
            id: id.to_string(),
        })
    }

    /// Fresh read including masked rows (the restore path needs it).
    pub fn node_any(&self, id: &str) -> Result<TreeNode, StoreError> {
        find_node(&self.conn, &self.config, id, true)?.ok_or_else(|| StoreError::NotFound {
            entity: "node",
            id: id.to_string(),
        })
    }

    pub fn parent_of(&self, id: &str) -> Result<Option<TreeNode>, StoreError> {
        let node = self.node(id)?;
        match node.parent_id.as_deref() {
            Some(parent) => self.find(parent),
            None => Ok(None),
        }
    }

    pub fn children_of(&self, id: &str) -> Result<Vec<TreeNode>, StoreError> {
        let node = self.node(id)?;
        let query = self.query(&node.scope)?.children_of(&node);
        self.fetch(&query)
    }

    pub fn root_of(&self, id: &str) -> Result<TreeNode, StoreError> {
        let node = self.node(id)?;
        let query = self.query(&node.scope)?.ancestors_and_self(&node).roots();
        self.fetch_one(&query)?.ok_or_else(|| StoreError::NotFound {
            entity: "root",
            id: id.to_string(),
        })
    }

    pub fn roots(&self, scope: &[AttrValue]) -> Result<Vec<TreeNode>, StoreError> {
        let query = self.query(scope)?.roots();
        self.fetch(&query)
    }

    pub fn count_in_scope(&self, scope: &[AttrValue]) -> Result<i64, StoreError> {
        let mut wheres = Vec::new();
        let mut params = Vec::new();
        scope_where(&self.config, scope, &mut wheres, &mut params)?;
        live_where(&self.config, &mut wheres);
        let mut sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&self.config.table));
        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres.join(" AND "));
        }
        Ok(self
            .conn
            .query_row(&sql, params_from_iter(params), |row| row.get(0))?)
    }

    /// Whole scope folded into a nested forest, children in tree order.
    pub fn forest(&self, scope: &[AttrValue]) -> Result<Vec<ForestNode>, StoreError> {
        let query = self.query(scope)?;
        let rows = self.fetch(&query)?;
        Ok(assemble_forest(rows))
    }
}
