#![forbid(unsafe_code)]
//! Nested-set domain model: column descriptor, node handle, bounds algebra,
//! structural validation and forest assembly. Everything here is pure; the
//! database side lives in the storage crate.

mod bounds;
mod columns;
mod forest;
mod node;
mod position;
mod validate;
mod value;

pub use bounds::*;
pub use columns::*;
pub use forest::*;
pub use node::*;
pub use position::*;
pub use validate::*;
pub use value::*;
