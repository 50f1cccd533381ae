use std::{fmt, sync::Arc};

use crate::{
    ast::{BinaryOp, Function, Type, UnaryOp, operators::IN_PRECEDENCE},
    model::{EntityType, Link},
    value::{Primitive, PrimitiveKind},
};

/// A resolved, allow-listed property reference.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    /// Name as written in the expression
    pub name: String,
    /// Storage key the backends read
    pub source: String,
    /// Lambda variable the path starts at, `None` for the root entity
    pub variable: Option<String>,
    pub ty: Type,
}

/// A collection navigation property a lambda ranges over.
#[derive(Debug, Clone, PartialEq)]
pub struct Navigation {
    pub name: String,
    pub source: String,
    /// Lambda variable the path starts at, `None` for the root entity
    pub variable: Option<String>,
    pub target: Arc<EntityType>,
    pub link: Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    Any,
    All,
}

impl Quantifier {
    pub fn keyword(self) -> &'static str {
        match self {
            Quantifier::Any => "any",
            Quantifier::All => "all",
        }
    }
}

/// `nav/any(v:body)`, `nav/all(v:body)` or `nav/any()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub navigation: Navigation,
    pub quantifier: Quantifier,
    /// Bound only inside `body`
    pub variable: String,
    /// `None` only for `any()`, which tests that the collection is non-empty
    pub body: Option<Box<Expr>>,
}

/// Abstract Syntax Tree node of a filter or compute expression.
///
/// Built once per request by the parser and consumed by one compilation
/// pass; field references are already resolved and authorized.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value
    ///
    /// # Example
    /// ```text
    /// 'red'
    /// 2020-01-01
    /// ```
    Literal(Primitive),

    /// Property of the root entity or of a lambda variable
    ///
    /// # Example
    /// ```text
    /// price
    /// i/price
    /// $it/price
    /// ```
    Field(FieldRef),

    /// Binary operation
    ///
    /// # Example
    /// ```text
    /// price mul 2 gt 10
    /// ```
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Prefix operation
    ///
    /// # Example
    /// ```text
    /// not active
    /// -price
    /// ```
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// Membership in a non-empty list of non-null literals
    ///
    /// # Example
    /// ```text
    /// color in ('Red', 'Blue')
    /// ```
    In {
        operand: Box<Expr>,
        list: Vec<Primitive>,
    },

    /// Canonical function call with validated arguments
    ///
    /// # Example
    /// ```text
    /// contains(name, 'x')
    /// ```
    Call { function: Function, args: Vec<Expr> },

    /// Quantified predicate over a collection navigation property
    ///
    /// # Example
    /// ```text
    /// items/any(i:i/price gt 10)
    /// ```
    Lambda(Lambda),
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Operator precedence; `None` for nodes that are not operators.
    pub fn precedence(&self) -> Option<u8> {
        match self {
            Expr::Binary { op, .. } => Some(op.precedence()),
            Expr::Unary { .. } => Some(UnaryOp::PRECEDENCE),
            Expr::In { .. } => Some(IN_PRECEDENCE),
            _ => None,
        }
    }

    /// The static type of the expression.
    pub fn ty(&self) -> Type {
        match self {
            Expr::Literal(value) => Type::of(value),
            Expr::Field(field) => field.ty.clone(),
            Expr::Binary { op, left, right } => {
                if !op.is_arithmetic() {
                    return Type::BOOLEAN;
                }
                match (left.ty().kind(), right.ty().kind()) {
                    (Some(a), Some(b)) => {
                        let promoted = a.promote(b);
                        if *op == BinaryOp::DivBy && promoted == PrimitiveKind::Int64 {
                            Type::Primitive(PrimitiveKind::Decimal)
                        } else {
                            Type::Primitive(promoted)
                        }
                    }
                    (Some(kind), None) | (None, Some(kind)) => Type::Primitive(kind),
                    (None, None) => Type::Null,
                }
            }
            Expr::Unary { op: UnaryOp::Not, .. } => Type::BOOLEAN,
            Expr::Unary { op: UnaryOp::Negate, operand } => operand.ty(),
            Expr::In { .. } | Expr::Lambda(_) => Type::BOOLEAN,
            Expr::Call { function, args } => {
                let types: Vec<Type> = args.iter().map(Expr::ty).collect();
                function.check(&types).unwrap_or(Type::Null)
            }
        }
    }
}

impl fmt::Display for Expr {
    /// Renders the expression back to OData syntax with minimal parentheses.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = crate::compile::to_odata(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// One `expr as alias` item of a `$compute` option.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeItem {
    pub expr: Expr,
    pub alias: String,
}
