//! Compile OData expressions against a schema, and run them over JSON input

use serde_json::Value as Json;
use tracing::debug;

use super::{CliError, Schema, json_to_records};
use crate::{
    Backend, JsonOptions,
    model::AllowList,
    output::{compiled_to_json, computed_to_json},
    query,
};

/// The query option being checked
#[derive(Debug, Clone)]
pub enum Expression {
    Filter(String),
    Search(String),
    Compute(String),
}

/// Options for the check command
#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub expression: Expression,
    /// Schema file contents
    pub schema: String,
    /// sqlite, postgres, document or memory
    pub backend: String,
    /// Allow-listed property paths; every property when absent
    pub allow: Option<Vec<String>>,
    /// JSON records for the memory backend
    pub input: Option<String>,
    /// Render Int64 and Decimal values as strings
    pub ieee754_compatible: bool,
    /// Only parse and type-check, don't compile
    pub syntax_only: bool,
}

/// Result of a check operation
#[derive(Debug)]
pub enum CheckResult {
    /// The expression parsed and type-checked
    SyntaxValid,
    /// The compiled artifact, or the records an in-memory run produced
    Success(Json),
}

fn backend(name: &str) -> Result<Backend, CliError> {
    match name.to_ascii_lowercase().as_str() {
        "sqlite" => Ok(Backend::sqlite()),
        "postgres" | "postgresql" => Ok(Backend::postgres()),
        "document" | "mongodb" => Ok(Backend::Document),
        "memory" => Ok(Backend::Memory),
        _ => Err(CliError::UnknownBackend(name.to_string())),
    }
}

/// Execute an odata-expr check operation
pub fn execute_check(options: &CheckOptions) -> Result<CheckResult, CliError> {
    let schema = Schema::from_json(&options.schema)?;
    let entity = schema.root();
    let allowed = match &options.allow {
        Some(paths) => AllowList::new(paths.iter().map(|p| p.trim())),
        None => AllowList::all(entity),
    };

    if options.syntax_only {
        match &options.expression {
            Expression::Filter(text) => query::parse_filter(text, entity, &allowed).map(|_| ())?,
            Expression::Search(text) => query::parse_search(text, entity, &allowed).map(|_| ())?,
            Expression::Compute(text) => query::parse_compute(text, entity, &allowed).map(|_| ())?,
        }
        return Ok(CheckResult::SyntaxValid);
    }

    let backend = backend(&options.backend)?;
    let records = match (&backend, &options.input) {
        (Backend::Memory, Some(input)) => {
            let json: Json = serde_json::from_str(input)?;
            json_to_records(&json, entity)?
        }
        (Backend::Memory, None) => return Err(CliError::NoInput),
        _ => Vec::new(),
    };
    debug!(backend = backend.name(), records = records.len(), "running check");

    let json_options = JsonOptions {
        ieee754_compatible: options.ieee754_compatible,
    };
    let output = match &options.expression {
        Expression::Filter(text) => {
            let compiled = query::compile_filter(text, entity, &allowed, &backend)?;
            compiled_to_json(&compiled, &records, json_options)
        }
        Expression::Search(text) => {
            let compiled = query::compile_search(text, entity, &allowed, &backend)?;
            compiled_to_json(&compiled, &records, json_options)
        }
        Expression::Compute(text) => {
            let computed = query::compile_compute(text, entity, &allowed, &backend)?;
            computed_to_json(&computed, &records, json_options)
        }
    };
    Ok(CheckResult::Success(output))
}
