//! The compilation protocol between the AST and the backends.
//!
//! [`walk`] traverses an expression once, depth first, and reports it to a
//! [`Listener`] as a flat stream of [`Event`]s. Groups are inserted wherever
//! the backend's infix rendering would otherwise change the meaning:
//!
//! - a child binding looser than its parent operator,
//! - a right child binding exactly as tight (operators are left-associative),
//! - any operator node under a prefix operator,
//! - a prefix operator under a binary one.
//!
//! So `1 add 2 mul 3` streams without groups while `(1 add 2) mul 3` keeps
//! its parentheses, and every backend sees the same grouping.

pub mod assemble;

use thiserror::Error;
use tracing::trace;

use crate::{
    ast::{Expr, FieldRef, Function, Lambda, Navigation, Operator, Quantifier},
    parser::DEFAULT_MAX_DEPTH,
    value::Primitive,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// The backend has no way to express a valid construct
    #[error("{backend} backend cannot express {what}")]
    Unsupported { backend: &'static str, what: String },
    /// A listener answered [`Handled::No`]
    #[error("listener did not handle {0}")]
    Unhandled(&'static str),
    #[error("expression nesting exceeds {0} levels")]
    DepthExceeded(usize),
    /// Events arrived in an order no expression produces
    #[error("malformed event stream: {0}")]
    Malformed(&'static str),
}

impl CompileError {
    pub fn unsupported(backend: &'static str, what: impl Into<String>) -> Self {
        CompileError::Unsupported {
            backend,
            what: what.into(),
        }
    }
}

/// One step of the compilation event stream.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    GroupOpen,
    GroupClose,
    Operator(Operator),
    Literal(&'a Primitive),
    Field(&'a FieldRef),
    FunctionOpen { function: Function, arity: usize },
    ArgumentSeparator,
    FunctionClose,
    ListOpen,
    ListClose,
    LambdaOpen {
        navigation: &'a Navigation,
        quantifier: Quantifier,
        variable: &'a str,
        has_body: bool,
    },
    LambdaClose,
}

impl Event<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Event::GroupOpen => "group-open",
            Event::GroupClose => "group-close",
            Event::Operator(_) => "operator",
            Event::Literal(_) => "literal",
            Event::Field(_) => "field",
            Event::FunctionOpen { .. } => "function-open",
            Event::ArgumentSeparator => "argument-separator",
            Event::FunctionClose => "function-close",
            Event::ListOpen => "list-open",
            Event::ListClose => "list-close",
            Event::LambdaOpen { .. } => "lambda-open",
            Event::LambdaClose => "lambda-close",
        }
    }
}

/// A listener's answer to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Yes,
    /// The listener does not know the event; compilation stops
    No,
}

/// Receives the event stream of one expression.
pub trait Listener {
    fn handle(&mut self, event: Event<'_>) -> Result<Handled, CompileError>;
}

/// Walks `expr` with the default depth bound.
pub fn walk<L: Listener + ?Sized>(expr: &Expr, listener: &mut L) -> Result<(), CompileError> {
    walk_with_depth(expr, listener, DEFAULT_MAX_DEPTH)
}

/// Walks `expr`, failing once nesting exceeds `max_depth`.
///
/// Left operands of a binary operator share their parent's level, the way
/// the parser accumulates them, so long `or` chains stay shallow.
pub fn walk_with_depth<L: Listener + ?Sized>(
    expr: &Expr,
    listener: &mut L,
    max_depth: usize,
) -> Result<(), CompileError> {
    Walker { listener, max_depth }.node(expr, 1)
}

struct Walker<'l, L: ?Sized> {
    listener: &'l mut L,
    max_depth: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl<L: Listener + ?Sized> Walker<'_, L> {
    fn emit(&mut self, event: Event<'_>) -> Result<(), CompileError> {
        trace!(event = event.name(), "compile event");
        match self.listener.handle(event)? {
            Handled::Yes => Ok(()),
            Handled::No => Err(CompileError::Unhandled(event.name())),
        }
    }

    fn child(&mut self, parent: &Expr, child: &Expr, side: Side, depth: usize) -> Result<(), CompileError> {
        let grouped = needs_group(parent, child, side);
        if grouped {
            self.emit(Event::GroupOpen)?;
        }
        let next = if side == Side::Left && !grouped { depth } else { depth + 1 };
        self.node(child, next)?;
        if grouped {
            self.emit(Event::GroupClose)?;
        }
        Ok(())
    }

    fn node(&mut self, expr: &Expr, depth: usize) -> Result<(), CompileError> {
        if depth > self.max_depth {
            return Err(CompileError::DepthExceeded(self.max_depth));
        }

        match expr {
            Expr::Literal(value) => self.emit(Event::Literal(value)),
            Expr::Field(field) => self.emit(Event::Field(field)),
            Expr::Binary { op, left, right } => {
                self.child(expr, left, Side::Left, depth)?;
                self.emit(Event::Operator(Operator::Binary(*op)))?;
                self.child(expr, right, Side::Right, depth)
            }
            Expr::Unary { op, operand } => {
                self.emit(Event::Operator(Operator::Unary(*op)))?;
                self.child(expr, operand, Side::Right, depth)
            }
            Expr::In { operand, list } => {
                self.child(expr, operand, Side::Left, depth)?;
                self.emit(Event::Operator(Operator::In))?;
                self.emit(Event::ListOpen)?;
                for (i, value) in list.iter().enumerate() {
                    if i > 0 {
                        self.emit(Event::ArgumentSeparator)?;
                    }
                    self.emit(Event::Literal(value))?;
                }
                self.emit(Event::ListClose)
            }
            Expr::Call { function, args } => {
                self.emit(Event::FunctionOpen {
                    function: *function,
                    arity: args.len(),
                })?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.emit(Event::ArgumentSeparator)?;
                    }
                    self.node(arg, depth + 1)?;
                }
                self.emit(Event::FunctionClose)
            }
            Expr::Lambda(Lambda {
                navigation,
                quantifier,
                variable,
                body,
            }) => {
                self.emit(Event::LambdaOpen {
                    navigation,
                    quantifier: *quantifier,
                    variable,
                    has_body: body.is_some(),
                })?;
                if let Some(body) = body {
                    self.node(body, depth + 1)?;
                }
                self.emit(Event::LambdaClose)
            }
        }
    }
}

fn needs_group(parent: &Expr, child: &Expr, side: Side) -> bool {
    let (Some(parent_precedence), Some(child_precedence)) = (parent.precedence(), child.precedence()) else {
        return false;
    };
    match parent {
        Expr::Unary { .. } => true,
        _ if matches!(child, Expr::Unary { .. }) => true,
        _ => child_precedence < parent_precedence || (side == Side::Right && child_precedence == parent_precedence),
    }
}

/// Renders OData text from the event stream.
#[derive(Default)]
struct TextListener {
    out: String,
}

impl Listener for TextListener {
    fn handle(&mut self, event: Event<'_>) -> Result<Handled, CompileError> {
        match event {
            Event::GroupOpen | Event::ListOpen => self.out.push('('),
            Event::GroupClose | Event::ListClose | Event::FunctionClose | Event::LambdaClose => self.out.push(')'),
            Event::Operator(Operator::Binary(op)) => {
                self.out.push(' ');
                self.out.push_str(op.keyword());
                self.out.push(' ');
            }
            Event::Operator(Operator::Unary(op)) => {
                self.out.push_str(op.symbol());
                if op == crate::ast::UnaryOp::Not {
                    self.out.push(' ');
                }
            }
            Event::Operator(Operator::In) => self.out.push_str(" in "),
            Event::Literal(value) => self.out.push_str(&value.to_string()),
            Event::Field(field) => {
                if let Some(variable) = &field.variable {
                    self.out.push_str(variable);
                    self.out.push('/');
                }
                self.out.push_str(&field.name);
            }
            Event::FunctionOpen { function, .. } => {
                self.out.push_str(function.name());
                self.out.push('(');
            }
            Event::ArgumentSeparator => self.out.push_str(", "),
            Event::LambdaOpen {
                navigation,
                quantifier,
                variable,
                has_body,
            } => {
                if let Some(outer) = &navigation.variable {
                    self.out.push_str(outer);
                    self.out.push('/');
                }
                self.out.push_str(&navigation.name);
                self.out.push('/');
                self.out.push_str(quantifier.keyword());
                self.out.push('(');
                if has_body {
                    self.out.push_str(variable);
                    self.out.push(':');
                }
            }
        }
        Ok(Handled::Yes)
    }
}

/// Renders an expression as OData text with the parentheses the walk keeps.
pub fn to_odata(expr: &Expr) -> Result<String, CompileError> {
    let mut listener = TextListener::default();
    walk_with_depth(expr, &mut listener, usize::MAX)?;
    Ok(listener.out)
}
