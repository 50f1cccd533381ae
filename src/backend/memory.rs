//! Closures evaluated against in-memory [`Record`]s.
//!
//! The expression is compiled once into a tree of boxed closures; variable
//! references are resolved to a fixed number of scope hops at compile time,
//! so evaluation never looks names up.

use std::fmt;

use tracing::debug;

use crate::{
    ast::{BinaryOp, ComputeItem, Expr, FieldRef, Function, Navigation, Quantifier, UnaryOp},
    compile::{
        CompileError, walk,
        assemble::{Assemble, Assembler},
    },
    evaluator,
    value::{Primitive, Record, Value},
};

/// The record being evaluated and the records of the enclosing lambdas.
struct Frame<'a> {
    record: &'a Record,
    parent: Option<&'a Frame<'a>>,
}

impl<'a> Frame<'a> {
    fn root(record: &'a Record) -> Self {
        Frame { record, parent: None }
    }

    fn ancestor(&self, hops: usize) -> Option<&Frame<'a>> {
        let mut frame = self;
        for _ in 0..hops {
            frame = frame.parent?;
        }
        Some(frame)
    }
}

type Node = Box<dyn Fn(&Frame<'_>) -> Primitive + Send + Sync>;

fn node<F>(f: F) -> Node
where
    F: Fn(&Frame<'_>) -> Primitive + Send + Sync + 'static,
{
    Box::new(f)
}

#[derive(Default)]
struct MemoryCompiler {
    scope: Vec<String>,
}

impl MemoryCompiler {
    /// Frames between the innermost scope and the one `variable` names.
    fn hops(&self, variable: &Option<String>) -> Result<usize, CompileError> {
        match variable {
            None => Ok(self.scope.len()),
            Some(name) => self
                .scope
                .iter()
                .rev()
                .position(|bound| bound == name)
                .ok_or(CompileError::Malformed("unbound lambda variable")),
        }
    }
}

impl Assemble for MemoryCompiler {
    type Node = Node;

    fn literal(&mut self, value: &Primitive) -> Result<Node, CompileError> {
        let value = value.clone();
        Ok(node(move |_| value.clone()))
    }

    fn field(&mut self, field: &FieldRef) -> Result<Node, CompileError> {
        let hops = self.hops(&field.variable)?;
        let source = field.source.clone();
        Ok(node(move |frame| {
            frame.ancestor(hops).map_or(Primitive::Null, |scope| scope.record.primitive(&source))
        }))
    }

    fn binary(&mut self, op: BinaryOp, left: Node, right: Node) -> Result<Node, CompileError> {
        Ok(node(move |frame| evaluator::binary(op, &left(frame), &right(frame))))
    }

    fn unary(&mut self, op: UnaryOp, operand: Node) -> Result<Node, CompileError> {
        Ok(match op {
            UnaryOp::Not => node(move |frame| evaluator::not(&operand(frame))),
            UnaryOp::Negate => node(move |frame| evaluator::negate(&operand(frame))),
        })
    }

    fn in_list(&mut self, operand: Node, list: Vec<Primitive>) -> Result<Node, CompileError> {
        Ok(node(move |frame| evaluator::in_list(&operand(frame), &list)))
    }

    fn call(&mut self, function: Function, args: Vec<Node>) -> Result<Node, CompileError> {
        Ok(node(move |frame| {
            let values: Vec<Primitive> = args.iter().map(|arg| arg(frame)).collect();
            evaluator::call(function, &values)
        }))
    }

    fn enter_lambda(&mut self, _navigation: &Navigation, variable: &str) -> Result<(), CompileError> {
        self.scope.push(variable.to_string());
        Ok(())
    }

    fn lambda(
        &mut self,
        navigation: &Navigation,
        quantifier: Quantifier,
        _variable: &str,
        body: Option<Node>,
    ) -> Result<Node, CompileError> {
        self.scope.pop();
        let hops = self.hops(&navigation.variable)?;
        let source = navigation.source.clone();

        Ok(node(move |frame| {
            let items = frame.ancestor(hops).map_or(&[][..], |scope| scope.record.collection(&source));
            let Some(body) = &body else {
                return Primitive::Boolean(quantifier == Quantifier::All || !items.is_empty());
            };
            // lambdas are two-valued: a null body counts as false
            let holds = |item: &Record| {
                let inner = Frame {
                    record: item,
                    parent: Some(frame),
                };
                body(&inner) == Primitive::Boolean(true)
            };
            let result = match quantifier {
                Quantifier::Any => items.iter().any(holds),
                Quantifier::All => items.iter().all(holds),
            };
            Primitive::Boolean(result)
        }))
    }
}

fn assemble(expr: &Expr) -> Result<Node, CompileError> {
    let mut assembler = Assembler::new(MemoryCompiler::default());
    walk(expr, &mut assembler)?;
    assembler.finish()
}

/// A compiled filter.
pub struct Predicate {
    node: Node,
}

impl Predicate {
    /// Whether `record` is selected; `null` selects nothing.
    pub fn evaluate(&self, record: &Record) -> bool {
        self.value(record) == Primitive::Boolean(true)
    }

    /// The three-valued result for `record`.
    pub fn value(&self, record: &Record) -> Primitive {
        (self.node)(&Frame::root(record))
    }

    pub fn filter<'r>(&self, records: &'r [Record]) -> Vec<&'r Record> {
        records.iter().filter(|record| self.evaluate(record)).collect()
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

/// Compiled `$compute` items.
pub struct Projection {
    items: Vec<(String, Node)>,
}

impl Projection {
    /// Computed values in declaration order.
    pub fn values(&self, record: &Record) -> Vec<(String, Primitive)> {
        let frame = Frame::root(record);
        self.items.iter().map(|(alias, node)| (alias.clone(), node(&frame))).collect()
    }

    /// A copy of `record` extended with the computed values.
    pub fn apply(&self, record: &Record) -> Record {
        let mut extended = record.clone();
        for (alias, value) in self.values(record) {
            extended.insert(alias, Value::Primitive(value));
        }
        extended
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(alias, _)| alias.as_str())
    }
}

impl fmt::Debug for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.aliases()).finish()
    }
}

pub fn compile(expr: &Expr) -> Result<Predicate, CompileError> {
    let node = assemble(expr)?;
    debug!("compiled in-memory predicate");
    Ok(Predicate { node })
}

pub fn compile_compute(items: &[ComputeItem]) -> Result<Projection, CompileError> {
    let items = items
        .iter()
        .map(|item| Ok((item.alias.clone(), assemble(&item.expr)?)))
        .collect::<Result<Vec<_>, CompileError>>()?;
    Ok(Projection { items })
}
