//! One-call entry points: parse an option value against an entity type and
//! an allow-list, then compile it for a backend.
//!
//! ```
//! use odata_expr::{AllowList, Backend, Compiled, EntityType, Property, PrimitiveKind, compile_filter};
//!
//! let people = EntityType::new("Person", "people")
//!     .property(Property::primitive("name", PrimitiveKind::String))
//!     .property(Property::primitive("age", PrimitiveKind::Int32));
//! let allowed = AllowList::all(&people);
//!
//! let Compiled::Sql(sql) = compile_filter("age gt 30", &people, &allowed, &Backend::sqlite()).unwrap() else {
//!     unreachable!()
//! };
//! assert_eq!(sql.clause, r#""people"."age" > ?"#);
//! ```

use serde_json::Value as Json;
use thiserror::Error;
use tracing::debug;

use crate::{
    ast::{ComputeItem, Expr},
    backend::{
        Predicate, Projection, document, memory,
        sql::{self, Dialect, SqlClause, SqlOptions},
    },
    compile::CompileError,
    lexer::LexError,
    model::{AllowList, EntityType},
    parser::{DEFAULT_MAX_DEPTH, ParseError, Parser},
    search,
};

/// Everything that can go wrong between option text and compiled artifact.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl Error {
    /// Whether the request referenced a property it may not read.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Error::Parse(e) if e.is_authorization())
    }
}

impl From<LexError> for Error {
    fn from(e: LexError) -> Self {
        Error::Parse(e.into())
    }
}

#[derive(Debug, Clone)]
pub enum Backend {
    Sql(SqlOptions),
    Document,
    Memory,
}

impl Backend {
    pub fn sqlite() -> Self {
        Backend::Sql(SqlOptions::new(Dialect::Sqlite))
    }

    pub fn postgres() -> Self {
        Backend::Sql(SqlOptions::new(Dialect::Postgres))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Sql(options) => options.dialect.name(),
            Backend::Document => "document",
            Backend::Memory => "memory",
        }
    }
}

/// A compiled `$filter` or `$search`.
#[derive(Debug)]
pub enum Compiled {
    Sql(SqlClause),
    Document(Json),
    Memory(Predicate),
}

/// Compiled `$compute` items.
#[derive(Debug)]
pub enum Computed {
    /// A select list of `expr AS "alias"`
    Sql(SqlClause),
    /// A projection document
    Document(Json),
    Memory(Projection),
}

pub fn parse_filter(text: &str, entity: &EntityType, allowed: &AllowList) -> Result<Expr, Error> {
    Ok(Parser::new(text, entity, allowed)?.parse_filter()?)
}

pub fn parse_compute(text: &str, entity: &EntityType, allowed: &AllowList) -> Result<Vec<ComputeItem>, Error> {
    Ok(Parser::new(text, entity, allowed)?.parse_compute()?)
}

/// Lowers a `$search` onto the filter tree it stands for.
pub fn parse_search(text: &str, entity: &EntityType, allowed: &AllowList) -> Result<Expr, Error> {
    let search = search::parse_search(text, DEFAULT_MAX_DEPTH)?;
    Ok(search::lower(&search, &search::searchable(entity, allowed)))
}

/// Compiles an already checked boolean expression.
pub fn compile_expr(expr: &Expr, entity: &EntityType, backend: &Backend) -> Result<Compiled, Error> {
    debug!(backend = backend.name(), "compiling filter");
    let compiled = match backend {
        Backend::Sql(options) => Compiled::Sql(sql::compile(expr, entity, options)?),
        Backend::Document => Compiled::Document(document::compile(expr)?),
        Backend::Memory => Compiled::Memory(memory::compile(expr)?),
    };
    Ok(compiled)
}

pub fn compile_filter(
    text: &str,
    entity: &EntityType,
    allowed: &AllowList,
    backend: &Backend,
) -> Result<Compiled, Error> {
    let expr = parse_filter(text, entity, allowed)?;
    compile_expr(&expr, entity, backend)
}

pub fn compile_search(
    text: &str,
    entity: &EntityType,
    allowed: &AllowList,
    backend: &Backend,
) -> Result<Compiled, Error> {
    let expr = parse_search(text, entity, allowed)?;
    compile_expr(&expr, entity, backend)
}

pub fn compile_compute(
    text: &str,
    entity: &EntityType,
    allowed: &AllowList,
    backend: &Backend,
) -> Result<Computed, Error> {
    let items = parse_compute(text, entity, allowed)?;
    debug!(backend = backend.name(), items = items.len(), "compiling compute");
    let computed = match backend {
        Backend::Sql(options) => Computed::Sql(sql::compile_compute(&items, entity, options)?),
        Backend::Document => Computed::Document(document::compile_compute(&items)?),
        Backend::Memory => Computed::Memory(memory::compile_compute(&items)?),
    };
    Ok(computed)
}
