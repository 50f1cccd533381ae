pub mod ast;
pub mod backend;
pub mod codec;
pub mod compile;
pub mod evaluator;
pub mod lexer;
pub mod literal;
pub mod model;
pub mod output;
pub mod parser;
pub mod query;
pub mod search;
pub mod value;

#[cfg(feature = "cli")]
pub mod cli;

pub use ast::{ComputeItem, Expr, Token};
pub use backend::{Dialect, Predicate, Projection, SqlClause, SqlOptions, SqlValue};
pub use codec::JsonOptions;
pub use compile::{CompileError, Event, Handled, Listener, walk};
pub use lexer::{LexError, Lexer};
pub use model::{AllowList, EntityType, EnumType, Property};
pub use output::{to_json, to_json_pretty};
pub use parser::{ParseError, ParseErrorKind, Parser, ParserOptions};
pub use query::{
    Backend, Compiled, Computed, Error, compile_compute, compile_filter, compile_search, parse_compute, parse_filter,
    parse_search,
};
pub use value::{Primitive, PrimitiveKind, Record, Value};
