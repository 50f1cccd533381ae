//! # OData Expressions - Abstract Syntax Tree
//!
//! This module defines the Abstract Syntax Tree (AST) for OData v4.01
//! `$filter` and `$compute` expressions. `$search` has its own small grammar
//! (see [`crate::search`]) and is lowered onto this tree.
//!
//! ## Architecture Overview
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expressions]** - Expression nodes (literals, fields, operators, calls, lambdas)
//! - **[operators]** - Binary and prefix operators with their precedence
//! - **[functions]** - Canonical functions and their signatures
//! - **[types]** - Static types checked while parsing
//!
//! ## Quick Start
//!
//! ```text
//! price gt 10 and items/any(i:i/qty ge 2)
//! ```
//!
//! Selects entities priced above 10 that have at least one related item
//! with a quantity of two or more.
//!
//! ## Core Concepts
//!
//! ### Precedence
//!
//! Higher binds tighter; every binary operator is left-associative.
//!
//! | Operators                  | Precedence |
//! |----------------------------|------------|
//! | `in`                       | 8          |
//! | `not`, `-`                 | 7          |
//! | `mul`, `div`, `divby`, `mod` | 6        |
//! | `add`, `sub`               | 5          |
//! | `gt`, `ge`, `lt`, `le`     | 4          |
//! | `eq`, `ne`                 | 3          |
//! | `and`                      | 2          |
//! | `or`                       | 1          |
//!
//! ### Resolved References
//!
//! Field references are resolved against entity metadata while parsing and
//! carry their storage key and static type. A property that exists but is
//! not in the request's allow-list never reaches the tree.
//!
//! ### Lambda Scope
//!
//! Inside `items/any(i: ...)` the variable `i` ranges over the related
//! items; `i/price` reads an item, while `price` and `$it/price` still read
//! the root entity.
//!
//! ## Examples
//!
//! ### Null-Safe Equality
//!
//! ```text
//! age eq null
//! ```
//!
//! ### Membership
//!
//! ```text
//! color in ('Red', 'Blue')
//! ```
//!
//! ### Computed Values
//!
//! ```text
//! price mul qty as total, year(created) as created_year
//! ```
pub mod expressions;
pub mod functions;
pub mod operators;
pub mod tokens;
pub mod types;

pub use expressions::{ComputeItem, Expr, FieldRef, Lambda, Navigation, Quantifier};
pub use functions::{Function, SignatureError};
pub use operators::{BinaryOp, Operator, UnaryOp};
pub use tokens::{Token, TokenKind};
pub use types::Type;
