//! Rebuilds a backend-specific tree from the event stream.
//!
//! Backends whose output is a tree rather than text (the document filter,
//! the in-memory closures) implement [`Assemble`] and let an [`Assembler`]
//! do the operator-precedence reduction over the flat event stream.

use crate::{
    ast::{BinaryOp, Function, Navigation, Operator, Quantifier, UnaryOp},
    compile::{CompileError, Event, Handled, Listener},
    value::Primitive,
};

/// Node constructors a tree-building backend provides.
pub trait Assemble {
    type Node;

    fn literal(&mut self, value: &Primitive) -> Result<Self::Node, CompileError>;
    fn field(&mut self, field: &crate::ast::FieldRef) -> Result<Self::Node, CompileError>;
    fn binary(&mut self, op: BinaryOp, left: Self::Node, right: Self::Node) -> Result<Self::Node, CompileError>;
    fn unary(&mut self, op: UnaryOp, operand: Self::Node) -> Result<Self::Node, CompileError>;
    fn in_list(&mut self, operand: Self::Node, list: Vec<Primitive>) -> Result<Self::Node, CompileError>;
    fn call(&mut self, function: Function, args: Vec<Self::Node>) -> Result<Self::Node, CompileError>;

    /// Called before the body of a lambda streams in.
    fn enter_lambda(&mut self, _navigation: &Navigation, _variable: &str) -> Result<(), CompileError> {
        Ok(())
    }

    /// Builds the lambda once its body is complete; also leaves its scope.
    fn lambda(
        &mut self,
        navigation: &Navigation,
        quantifier: Quantifier,
        variable: &str,
        body: Option<Self::Node>,
    ) -> Result<Self::Node, CompileError>;
}

enum FrameKind {
    Root,
    Group,
    Function { function: Function },
    List { items: Vec<Primitive> },
    Lambda {
        navigation: Navigation,
        quantifier: Quantifier,
        variable: String,
    },
}

struct Frame<N> {
    kind: FrameKind,
    operands: Vec<N>,
    operators: Vec<Operator>,
    /// Completed arguments of a function frame
    args: Vec<N>,
}

impl<N> Frame<N> {
    fn new(kind: FrameKind) -> Self {
        Frame {
            kind,
            operands: Vec::new(),
            operators: Vec::new(),
            args: Vec::new(),
        }
    }
}

/// A [`Listener`] that reduces the event stream into `A::Node`s.
pub struct Assembler<A: Assemble> {
    builder: A,
    frames: Vec<Frame<A::Node>>,
}

impl<A: Assemble> Assembler<A> {
    pub fn new(builder: A) -> Self {
        Assembler {
            builder,
            frames: vec![Frame::new(FrameKind::Root)],
        }
    }

    fn top(&mut self) -> Result<&mut Frame<A::Node>, CompileError> {
        self.frames.last_mut().ok_or(CompileError::Malformed("no open frame"))
    }

    fn pop(&mut self) -> Result<Frame<A::Node>, CompileError> {
        if self.frames.len() < 2 {
            return Err(CompileError::Malformed("close without open"));
        }
        self.frames.pop().ok_or(CompileError::Malformed("close without open"))
    }

    fn push_operand(&mut self, node: A::Node) -> Result<(), CompileError> {
        self.top()?.operands.push(node);
        Ok(())
    }

    /// Applies the top operator of the current frame.
    fn reduce_one(&mut self) -> Result<(), CompileError> {
        let frame = self.frames.last_mut().ok_or(CompileError::Malformed("no open frame"))?;
        let operator = frame.operators.pop().ok_or(CompileError::Malformed("missing operator"))?;
        let right = frame.operands.pop().ok_or(CompileError::Malformed("missing operand"))?;
        let node = match operator {
            Operator::Unary(op) => self.builder.unary(op, right)?,
            Operator::Binary(op) => {
                let left = frame.operands.pop().ok_or(CompileError::Malformed("missing left operand"))?;
                self.builder.binary(op, left, right)?
            }
            Operator::In => return Err(CompileError::Malformed("'in' without a list")),
        };
        self.push_operand(node)
    }

    /// Reduces while the pending operator binds at least as tight as `precedence`.
    fn reduce_while(&mut self, precedence: u8) -> Result<(), CompileError> {
        while let Some(top) = self.top()?.operators.last().copied() {
            if top == Operator::In || top.precedence() < precedence {
                break;
            }
            self.reduce_one()?;
        }
        Ok(())
    }

    /// Reduces the current frame to its single result.
    fn finish_frame(&mut self) -> Result<Option<A::Node>, CompileError> {
        while !self.top()?.operators.is_empty() {
            self.reduce_one()?;
        }
        let frame = self.top()?;
        if frame.operands.len() > 1 {
            return Err(CompileError::Malformed("dangling operand"));
        }
        Ok(frame.operands.pop())
    }

    /// The assembled node for the whole stream.
    pub fn finish(mut self) -> Result<A::Node, CompileError> {
        if self.frames.len() != 1 {
            return Err(CompileError::Malformed("unclosed frame"));
        }
        self.finish_frame()?.ok_or(CompileError::Malformed("empty expression"))
    }

    pub fn into_builder(self) -> A {
        self.builder
    }
}

impl<A: Assemble> Listener for Assembler<A> {
    fn handle(&mut self, event: Event<'_>) -> Result<Handled, CompileError> {
        match event {
            Event::GroupOpen => self.frames.push(Frame::new(FrameKind::Group)),
            Event::GroupClose => {
                let node = self.finish_frame()?.ok_or(CompileError::Malformed("empty group"))?;
                self.pop()?;
                self.push_operand(node)?;
            }
            Event::Operator(Operator::Unary(op)) => self.top()?.operators.push(Operator::Unary(op)),
            Event::Operator(operator) => {
                self.reduce_while(operator.precedence())?;
                self.top()?.operators.push(operator);
            }
            Event::Literal(value) => {
                if let FrameKind::List { items } = &mut self.top()?.kind {
                    items.push(value.clone());
                } else {
                    let node = self.builder.literal(value)?;
                    self.push_operand(node)?;
                }
            }
            Event::Field(field) => {
                let node = self.builder.field(field)?;
                self.push_operand(node)?;
            }
            Event::FunctionOpen { function, .. } => {
                self.frames.push(Frame::new(FrameKind::Function { function }));
            }
            Event::ArgumentSeparator => {
                if matches!(self.top()?.kind, FrameKind::List { .. }) {
                    return Ok(Handled::Yes);
                }
                let arg = self.finish_frame()?.ok_or(CompileError::Malformed("empty argument"))?;
                let frame = self.top()?;
                if !matches!(frame.kind, FrameKind::Function { .. }) {
                    return Err(CompileError::Malformed("separator outside a call"));
                }
                frame.args.push(arg);
            }
            Event::FunctionClose => {
                let last = self.finish_frame()?;
                let mut frame = self.pop()?;
                let FrameKind::Function { function, .. } = frame.kind else {
                    return Err(CompileError::Malformed("function close without open"));
                };
                frame.args.extend(last);
                let node = self.builder.call(function, frame.args)?;
                self.push_operand(node)?;
            }
            Event::ListOpen => self.frames.push(Frame::new(FrameKind::List { items: Vec::new() })),
            Event::ListClose => {
                let frame = self.pop()?;
                let FrameKind::List { items } = frame.kind else {
                    return Err(CompileError::Malformed("list close without open"));
                };
                let parent = self.top()?;
                if parent.operators.pop() != Some(Operator::In) {
                    return Err(CompileError::Malformed("list without 'in'"));
                }
                let operand = parent.operands.pop().ok_or(CompileError::Malformed("'in' without operand"))?;
                let node = self.builder.in_list(operand, items)?;
                self.push_operand(node)?;
            }
            Event::LambdaOpen {
                navigation,
                quantifier,
                variable,
                ..
            } => {
                self.builder.enter_lambda(navigation, variable)?;
                self.frames.push(Frame::new(FrameKind::Lambda {
                    navigation: navigation.clone(),
                    quantifier,
                    variable: variable.to_string(),
                }));
            }
            Event::LambdaClose => {
                let body = self.finish_frame()?;
                let frame = self.pop()?;
                let FrameKind::Lambda {
                    navigation,
                    quantifier,
                    variable,
                } = frame.kind
                else {
                    return Err(CompileError::Malformed("lambda close without open"));
                };
                let node = self.builder.lambda(&navigation, quantifier, &variable, body)?;
                self.push_operand(node)?;
            }
        }
        Ok(Handled::Yes)
    }
}
