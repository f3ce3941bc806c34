//! Uniform table access over external data sources.
//!
//! A host engine resolves a table through [`CatalogSession`], which
//! builds an immutable [`TableDef`] and instantiates the matching
//! backend behind a [`TableCursor`]. The cursor drives the backend
//! through one open/read/write/delete/close protocol and materializes
//! column values lazily, including the pseudo-columns.
pub mod access;
pub mod catalog;
pub mod column;
pub mod config;
pub mod cursor;
pub mod def;
pub mod dir;
pub mod error;
pub mod file;
pub mod introspect;
pub mod oem;
pub mod os;
pub mod remote;
pub mod session;
pub mod vir;

mod index;
mod rowset;

pub use crate::access::{Access, OpenArgs, RowInfo};
pub use crate::catalog::CatalogSession;
pub use crate::column::ColumnAccessor;
pub use crate::config::Config;
pub use crate::cursor::{
    Cardinality, ColumnId, DeleteTarget, KeyOp, Level, Mode, Position, QueryContext, ReadStatus,
    Stage, TableCursor, Usage, Warning,
};
pub use crate::def::{AccessDef, TableDef};
pub use crate::error::{Error, Result};
pub use crate::session::{GlobalState, ShareHandle, TableShare, UserContext};
