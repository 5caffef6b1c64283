#![forbid(unsafe_code)]

mod row;
mod schema;
mod sql;
mod time;

pub(super) use row::*;
pub(super) use schema::migrate_tree_schema;
pub(super) use sql::*;
pub(super) use time::now_ms;
