#![forbid(unsafe_code)]
//! Nested-set tree index over SQLite.

mod store;

pub use store::*;
