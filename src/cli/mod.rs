//! CLI support for odata-expr
//!
//! Provides programmatic access to the `check` command so other tools can
//! embed it.

mod check;
mod convert;
mod schema;

pub use check::{CheckOptions, CheckResult, Expression, execute_check};
pub use convert::{json_to_record, json_to_records};
pub use schema::Schema;

use std::io;

use thiserror::Error;

/// Errors that can occur during CLI operations
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Query(#[from] crate::Error),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid schema: {0}")]
    Schema(String),
    /// A record in the input does not fit the schema
    #[error("Invalid record: {0}")]
    Record(String),
    #[error("Unknown backend '{0}'. Expected sqlite, postgres, document or memory.")]
    UnknownBackend(String),
    #[error("No input provided. Use --input or pipe JSON to stdin.")]
    NoInput,
}
