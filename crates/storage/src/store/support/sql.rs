#![forbid(unsafe_code)]

use nestree_core::tree::{quote_ident, AttrValue};
use rusqlite::types::{Value as SqlValue, ValueRef};

use crate::store::{StoreError, TreeConfig};

pub(in crate::store) fn value_to_sql(value: &AttrValue) -> SqlValue {
    match value {
        AttrValue::Null => SqlValue::Null,
        AttrValue::Int(value) => SqlValue::Integer(*value),
        AttrValue::Real(value) => SqlValue::Real(*value),
        AttrValue::Text(value) => SqlValue::Text(value.clone()),
    }
}

pub(in crate::store) fn value_from_sql(value: ValueRef<'_>) -> AttrValue {
    match value {
        ValueRef::Null => AttrValue::Null,
        ValueRef::Integer(value) => AttrValue::Int(value),
        ValueRef::Real(value) => AttrValue::Real(value),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            AttrValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Append the scope equality clauses; every structural query and update is
/// restricted by them.
pub(in crate::store) fn scope_where(
    cfg: &TreeConfig,
    scope: &[AttrValue],
    wheres: &mut Vec<String>,
    params: &mut Vec<SqlValue>,
) -> Result<(), StoreError> {
    if scope.len() != cfg.columns.scope.len() {
        return Err(StoreError::InvalidInput(
            "scope width does not match the configured scope columns",
        ));
    }
    for (column, value) in cfg.columns.scope.iter().zip(scope) {
        match value {
            AttrValue::Null => wheres.push(format!("{} IS NULL", quote_ident(column))),
            _ => {
                wheres.push(format!("{} = ?", quote_ident(column)));
                params.push(value_to_sql(value));
            }
        }
    }
    Ok(())
}

/// Append the soft-delete mask; masked rows are invisible to structural
/// queries and updates.
pub(in crate::store) fn live_where(cfg: &TreeConfig, wheres: &mut Vec<String>) {
    if cfg.soft_delete {
        wheres.push(format!("{} IS NULL", quote_ident("deleted_at_ms")));
    }
}
