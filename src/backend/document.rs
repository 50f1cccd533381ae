//! MongoDB-shaped query documents.
//!
//! Document stores can only test fields against constants, so the compiler
//! accepts comparisons, membership, the string-matching functions, logical
//! operators and lambdas, and constant-folds anything built from literals
//! alone. Everything else is reported as unsupported.
//!
//! Negation is pushed down to the leaves while rendering. Each leaf renders
//! to the records where it is `true`, or under negation to the records where
//! it is `false`, so `null` operands select nothing either way:
//!
//! ```text
//! not (age gt 30)      {"age": {"$lte": 30}}
//! not (age eq 30)      {"age": {"$ne": 30}}
//! ```

use serde_json::{Map, Value as Json, json};
use tracing::debug;

use crate::{
    ast::{BinaryOp, ComputeItem, Expr, FieldRef, Function, Navigation, Quantifier, Type, UnaryOp},
    compile::{
        CompileError, walk,
        assemble::{Assemble, Assembler},
    },
    evaluator,
    value::Primitive,
};

const BACKEND: &str = "document";

/// A predicate over one document (or one array element inside `$elemMatch`).
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare { path: String, op: BinaryOp, value: Primitive },
    /// A boolean field used as a predicate
    IsTrue { path: String },
    In { path: String, values: Vec<Primitive> },
    Regex { path: String, pattern: String },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    ElemMatch { path: String, quantifier: Quantifier, body: Option<Box<Filter>> },
    /// A folded predicate; `None` is `null`
    Const(Option<bool>),
}

/// Intermediate node while assembling a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum DocNode {
    Field { path: String, ty: Type },
    Literal(Primitive),
    Filter(Filter),
}

fn comparison_operator(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "$eq",
        BinaryOp::Ne => "$ne",
        BinaryOp::Gt => "$gt",
        BinaryOp::Ge => "$gte",
        BinaryOp::Lt => "$lt",
        _ => "$lte",
    }
}

fn field(path: &str, condition: Json) -> Json {
    let mut map = Map::new();
    map.insert(path.to_string(), condition);
    Json::Object(map)
}

fn values(list: &[Primitive]) -> Json {
    Json::Array(list.iter().map(Primitive::to_document_value).collect())
}

fn nothing() -> Json {
    json!({ "$nor": [{}] })
}

impl Filter {
    /// Renders the documents where the predicate is `true`, or `false` when
    /// `negated` is set.
    pub fn render(&self, negated: bool) -> Json {
        match self {
            Filter::Compare { path, op, value } => {
                let op = if negated { op.negated() } else { *op };
                field(path, json!({ comparison_operator(op): value.to_document_value() }))
            }
            Filter::IsTrue { path } => field(path, json!({ "$eq": !negated })),
            Filter::In { path, values: list } if negated => {
                field(path, json!({ "$nin": values(list), "$ne": null }))
            }
            Filter::In { path, values: list } => field(path, json!({ "$in": values(list) })),
            Filter::Regex { path, pattern } if negated => {
                field(path, json!({ "$not": { "$regex": pattern }, "$ne": null }))
            }
            Filter::Regex { path, pattern } => field(path, json!({ "$regex": pattern })),
            Filter::And(items) | Filter::Or(items) => {
                let conjunction = matches!(self, Filter::And(_)) != negated;
                let key = if conjunction { "$and" } else { "$or" };
                let rendered: Vec<Json> = items.iter().map(|item| item.render(negated)).collect();
                json!({ key: rendered })
            }
            Filter::Not(inner) => inner.render(!negated),
            Filter::ElemMatch { path, quantifier, body } => render_lambda(path, *quantifier, body.as_deref(), negated),
            Filter::Const(value) => match value.map(|b| b != negated) {
                Some(true) => json!({}),
                _ => nothing(),
            },
        }
    }
}

fn render_lambda(path: &str, quantifier: Quantifier, body: Option<&Filter>, negated: bool) -> Json {
    let non_empty = |present: bool| field(&format!("{path}.0"), json!({ "$exists": present }));

    match (quantifier, body) {
        (Quantifier::Any, None) => non_empty(!negated),
        (Quantifier::All, None) => Filter::Const(Some(true)).render(negated),
        (quantifier, Some(Filter::Const(value))) => {
            let holds = value.unwrap_or(false);
            match (quantifier, holds) {
                (Quantifier::Any, true) => non_empty(!negated),
                (Quantifier::Any, false) => Filter::Const(Some(false)).render(negated),
                (Quantifier::All, true) => Filter::Const(Some(true)).render(negated),
                (Quantifier::All, false) => non_empty(negated),
            }
        }
        (Quantifier::Any, Some(body)) => {
            let matched = json!({ "$elemMatch": body.render(false) });
            if negated {
                field(path, json!({ "$not": matched }))
            } else {
                field(path, matched)
            }
        }
        (Quantifier::All, Some(body)) => {
            let failing = json!({ "$elemMatch": { "$nor": [body.render(false)] } });
            if negated {
                field(path, failing)
            } else {
                field(path, json!({ "$not": failing }))
            }
        }
    }
}

/// Builds [`DocNode`]s, tracking the lambda variables in scope.
#[derive(Debug, Default)]
pub struct DocumentCompiler {
    scope: Vec<String>,
}

impl DocumentCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths are relative to the innermost scope; reaching outside it would
    /// need a join the query language does not have.
    fn path(&self, variable: &Option<String>, source: &str) -> Result<String, CompileError> {
        if variable.as_deref() == self.scope.last().map(String::as_str) {
            Ok(source.to_string())
        } else {
            Err(CompileError::unsupported(BACKEND, format!("reference to '{source}' outside the innermost lambda")))
        }
    }

    fn predicate(&self, node: DocNode) -> Result<Filter, CompileError> {
        match node {
            DocNode::Filter(filter) => Ok(filter),
            DocNode::Field { path, ty } if ty.is_boolean() => Ok(Filter::IsTrue { path }),
            DocNode::Literal(value) => Ok(Filter::Const(evaluator::truth(&value))),
            DocNode::Field { .. } => Err(CompileError::Malformed("non-boolean field used as a predicate")),
        }
    }

    fn compare(&self, op: BinaryOp, left: DocNode, right: DocNode) -> Result<DocNode, CompileError> {
        let filter = match (left, right) {
            (DocNode::Literal(a), DocNode::Literal(b)) => Filter::Const(evaluator::truth(&evaluator::compare(op, &a, &b))),
            (DocNode::Field { path, .. }, DocNode::Literal(value)) => compare_field(path, op, value),
            (DocNode::Literal(value), DocNode::Field { path, .. }) => compare_field(path, op.flipped(), value),
            (DocNode::Filter(filter), DocNode::Literal(Primitive::Boolean(b)))
            | (DocNode::Literal(Primitive::Boolean(b)), DocNode::Filter(filter))
                if op == BinaryOp::Eq =>
            {
                if b { filter } else { Filter::Not(Box::new(filter)) }
            }
            _ => return Err(CompileError::unsupported(BACKEND, format!("'{}' between these operands", op.keyword()))),
        };
        Ok(DocNode::Filter(filter))
    }
}

fn compare_field(path: String, op: BinaryOp, value: Primitive) -> Filter {
    if value.is_null() && op.is_relational() {
        return Filter::Const(None);
    }
    Filter::Compare { path, op, value }
}

fn join(op: BinaryOp, left: Filter, right: Filter) -> Filter {
    let mut items = Vec::new();
    for filter in [left, right] {
        match (op, filter) {
            (BinaryOp::And, Filter::And(inner)) | (BinaryOp::Or, Filter::Or(inner)) => items.extend(inner),
            (_, other) => items.push(other),
        }
    }
    if op == BinaryOp::And { Filter::And(items) } else { Filter::Or(items) }
}

impl Assemble for DocumentCompiler {
    type Node = DocNode;

    fn literal(&mut self, value: &Primitive) -> Result<DocNode, CompileError> {
        Ok(DocNode::Literal(value.clone()))
    }

    fn field(&mut self, field: &FieldRef) -> Result<DocNode, CompileError> {
        Ok(DocNode::Field {
            path: self.path(&field.variable, &field.source)?,
            ty: field.ty.clone(),
        })
    }

    fn binary(&mut self, op: BinaryOp, left: DocNode, right: DocNode) -> Result<DocNode, CompileError> {
        if op.is_logical() {
            let (left, right) = (self.predicate(left)?, self.predicate(right)?);
            return Ok(DocNode::Filter(join(op, left, right)));
        }
        if op.is_comparison() {
            return self.compare(op, left, right);
        }
        match (left, right) {
            (DocNode::Literal(a), DocNode::Literal(b)) => Ok(DocNode::Literal(evaluator::arithmetic(op, &a, &b))),
            _ => Err(CompileError::unsupported(BACKEND, format!("arithmetic '{}' on fields", op.keyword()))),
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: DocNode) -> Result<DocNode, CompileError> {
        match (op, operand) {
            (UnaryOp::Not, operand) => Ok(DocNode::Filter(Filter::Not(Box::new(self.predicate(operand)?)))),
            (UnaryOp::Negate, DocNode::Literal(value)) => Ok(DocNode::Literal(evaluator::negate(&value))),
            (UnaryOp::Negate, _) => Err(CompileError::unsupported(BACKEND, "negation of a field")),
        }
    }

    fn in_list(&mut self, operand: DocNode, list: Vec<Primitive>) -> Result<DocNode, CompileError> {
        let filter = match operand {
            DocNode::Field { path, .. } => Filter::In { path, values: list },
            DocNode::Literal(value) => Filter::Const(evaluator::truth(&evaluator::in_list(&value, &list))),
            DocNode::Filter(_) => return Err(CompileError::unsupported(BACKEND, "'in' over a computed value")),
        };
        Ok(DocNode::Filter(filter))
    }

    fn call(&mut self, function: Function, args: Vec<DocNode>) -> Result<DocNode, CompileError> {
        if args.iter().all(|arg| matches!(arg, DocNode::Literal(_))) {
            let values: Vec<Primitive> = args
                .into_iter()
                .filter_map(|arg| match arg {
                    DocNode::Literal(value) => Some(value),
                    _ => None,
                })
                .collect();
            return Ok(DocNode::Literal(evaluator::call(function, &values)));
        }

        let matcher = |pattern: &str| -> String {
            match function {
                Function::StartsWith => format!("^{}", regex::escape(pattern)),
                Function::EndsWith => format!("{}$", regex::escape(pattern)),
                Function::MatchesPattern => pattern.to_string(),
                _ => regex::escape(pattern),
            }
        };
        let regex_function = matches!(
            function,
            Function::Contains | Function::StartsWith | Function::EndsWith | Function::MatchesPattern
        );
        match <[DocNode; 2]>::try_from(args) {
            Ok([DocNode::Field { path, .. }, DocNode::Literal(value)]) if regex_function => {
                let filter = match value.as_str() {
                    Some(pattern) => Filter::Regex {
                        path,
                        pattern: matcher(pattern),
                    },
                    None => Filter::Const(None),
                };
                Ok(DocNode::Filter(filter))
            }
            _ => Err(CompileError::unsupported(BACKEND, format!("{}() over these arguments", function.name()))),
        }
    }

    fn enter_lambda(&mut self, navigation: &Navigation, variable: &str) -> Result<(), CompileError> {
        self.path(&navigation.variable, &navigation.source)?;
        self.scope.push(variable.to_string());
        Ok(())
    }

    fn lambda(
        &mut self,
        navigation: &Navigation,
        quantifier: Quantifier,
        _variable: &str,
        body: Option<DocNode>,
    ) -> Result<DocNode, CompileError> {
        let body = body.map(|node| self.predicate(node)).transpose()?;
        self.scope.pop();
        Ok(DocNode::Filter(Filter::ElemMatch {
            path: self.path(&navigation.variable, &navigation.source)?,
            quantifier,
            body: body.map(Box::new),
        }))
    }
}

fn assemble(expr: &Expr) -> Result<DocNode, CompileError> {
    let mut assembler = Assembler::new(DocumentCompiler::new());
    walk(expr, &mut assembler)?;
    assembler.finish()
}

/// Compiles a boolean expression into a query document.
pub fn compile(expr: &Expr) -> Result<Json, CompileError> {
    let node = assemble(expr)?;
    let filter = DocumentCompiler::new().predicate(node)?;
    debug!("compiled document filter");
    Ok(filter.render(false))
}

/// Compiles `$compute` items into a projection; only fields and literals
/// can be projected.
pub fn compile_compute(items: &[ComputeItem]) -> Result<Json, CompileError> {
    let mut projection = Map::new();
    for item in items {
        let value = match assemble(&item.expr)? {
            DocNode::Field { path, .. } => Json::String(format!("${path}")),
            DocNode::Literal(value) => json!({ "$literal": value.to_document_value() }),
            DocNode::Filter(_) => {
                return Err(CompileError::unsupported(BACKEND, format!("computed value '{}'", item.alias)));
            }
        };
        projection.insert(item.alias.clone(), value);
    }
    Ok(Json::Object(projection))
}
