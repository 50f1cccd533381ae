//! Compilation targets for checked expressions.
//!
//! Each backend consumes the event stream produced by
//! [`crate::compile::walk`]:
//!
//! - **[sql]** - parameterized `WHERE` / select-list fragments for SQLite
//!   and PostgreSQL
//! - **[document]** - MongoDB-shaped query documents
//! - **[memory]** - closures evaluated against in-memory records
//!
//! All three are expected to select the same records for the same
//! expression; the in-memory backend is the reference.
pub mod document;
pub mod memory;
pub mod sql;

pub use document::DocumentCompiler;
pub use memory::{Predicate, Projection};
pub use sql::{Dialect, SqlClause, SqlCompiler, SqlOptions, SqlValue};
