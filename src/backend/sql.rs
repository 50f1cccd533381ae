//! SQL text generation.
//!
//! The compiler keeps a stack of fragment frames, one per open group, call,
//! list or lambda. Values never appear in the text: every literal becomes a
//! parameter, and placeholders are numbered once the whole clause is known.
//!
//! ```text
//! price gt 10 and contains(name, 'x')
//! ```
//!
//! compiles for SQLite to
//!
//! ```text
//! "orders"."price" > ? AND (instr("orders"."name", ?) > 0)
//! ```

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta, Utc};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde_json::{Value as Json, json};
use tracing::debug;
use uuid::Uuid;

use crate::{
    ast::{BinaryOp, ComputeItem, Expr, Function, Operator, Quantifier, UnaryOp},
    codec::{self, JsonOptions},
    compile::{CompileError, Event, Handled, Listener, walk},
    evaluator,
    model::EntityType,
    value::Primitive,
};

const BACKEND: &str = "sql";

/// Truncated remainder for SQLite, whose `%` casts both operands to integers.
const SQLITE_MODULO: &str = "({0} - {1} * CAST({0} / NULLIF({1}, 0) AS INTEGER))";

/// A bind parameter in the driver-neutral form the compiler emits.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Decimal(Decimal),
    Text(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(DateTime<FixedOffset>),
    Interval(TimeDelta),
    Uuid(Uuid),
}

impl SqlValue {
    /// JSON rendering used when printing a compiled clause.
    pub fn to_json(&self) -> Json {
        match self {
            SqlValue::Null => Json::Null,
            SqlValue::Boolean(b) => json!(b),
            SqlValue::Integer(n) => json!(n),
            SqlValue::Real(n) => Primitive::Double(*n).to_json(JsonOptions::default()),
            SqlValue::Decimal(d) => Json::String(d.to_string()),
            SqlValue::Text(s) => json!(s),
            SqlValue::Blob(bytes) => Json::String(codec::encode_binary(bytes)),
            SqlValue::Date(d) => Primitive::Date(*d).to_json(JsonOptions::default()),
            SqlValue::Time(t) => Primitive::TimeOfDay(*t).to_json(JsonOptions::default()),
            SqlValue::Timestamp(ts) => Primitive::DateTimeOffset(*ts).to_json(JsonOptions::default()),
            SqlValue::Interval(d) => Primitive::Duration(*d).to_json(JsonOptions::default()),
            SqlValue::Uuid(u) => Json::String(u.hyphenated().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" => Some(Dialect::Sqlite),
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            _ => None,
        }
    }

    /// Lowers a parameter to the storage form the dialect compares against.
    ///
    /// SQLite has no temporal, decimal or boolean storage classes: booleans
    /// become `0`/`1`, temporal values fixed-width text (timestamps in UTC),
    /// durations seconds and decimals reals. PostgreSQL keeps typed values.
    pub fn bind(self, value: SqlValue) -> SqlValue {
        if self == Dialect::Postgres {
            return value;
        }
        match value {
            SqlValue::Boolean(b) => SqlValue::Integer(i64::from(b)),
            SqlValue::Decimal(d) => d.to_f64().map_or(SqlValue::Null, SqlValue::Real),
            SqlValue::Date(d) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
            SqlValue::Time(t) => SqlValue::Text(t.format("%H:%M:%S%.6f").to_string()),
            SqlValue::Timestamp(ts) => {
                SqlValue::Text(ts.with_timezone(&Utc).format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string())
            }
            SqlValue::Interval(d) => SqlValue::Real(codec::duration_seconds(&d)),
            SqlValue::Uuid(u) => SqlValue::Text(u.hyphenated().to_string()),
            other => other,
        }
    }

    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${index}"),
        }
    }

    fn binary(self, op: BinaryOp) -> &'static str {
        use BinaryOp::*;
        match (self, op) {
            (Dialect::Sqlite, Eq) => " IS ",
            (Dialect::Sqlite, Ne) => " IS NOT ",
            (Dialect::Postgres, Eq) => " IS NOT DISTINCT FROM ",
            (Dialect::Postgres, Ne) => " IS DISTINCT FROM ",
            (_, Gt) => " > ",
            (_, Ge) => " >= ",
            (_, Lt) => " < ",
            (_, Le) => " <= ",
            (_, And) => " AND ",
            (_, Or) => " OR ",
            (_, Add) => " + ",
            (_, Sub) => " - ",
            (_, Mul) => " * ",
            (_, Div) => " / NULLIF(",
            (_, DivBy) => " * 1.0 / NULLIF(",
            (_, Mod) => " % NULLIF(",
        }
    }

    /// Call template with `{n}` standing for the n-th argument.
    fn template(self, function: Function, arity: usize) -> Result<String, CompileError> {
        use Function::*;
        let sqlite = self == Dialect::Sqlite;
        let template = match function {
            Contains if sqlite => "(instr({0}, {1}) > 0)",
            Contains => "(strpos({0}, {1}) > 0)",
            StartsWith if sqlite => "(instr({0}, {1}) = 1)",
            StartsWith => "starts_with({0}, {1})",
            EndsWith if sqlite => "(substr({0}, length({0}) - length({1}) + 1) = {1})",
            EndsWith => "(right({0}, length({1})) = {1})",
            IndexOf if sqlite => "(instr({0}, {1}) - 1)",
            IndexOf => "(strpos({0}, {1}) - 1)",
            Length => "length({0})",
            Substring if arity == 3 && sqlite => "substr({0}, max({1}, 0) + 1, max({2}, 0))",
            Substring if sqlite => "substr({0}, max({1}, 0) + 1)",
            Substring if arity == 3 => "substr({0}, greatest({1}, 0) + 1, greatest({2}, 0))",
            Substring => "substr({0}, greatest({1}, 0) + 1)",
            ToLower => "lower({0})",
            ToUpper => "upper({0})",
            Trim => "trim({0})",
            Concat => {
                let parts: Vec<String> = (0..arity).map(|i| format!("{{{i}}}")).collect();
                return Ok(format!("({})", parts.join(" || ")));
            }
            MatchesPattern if sqlite => return Err(CompileError::unsupported(BACKEND, "matchesPattern on sqlite")),
            MatchesPattern => "({0} ~ {1})",
            Year if sqlite => "CAST(strftime('%Y', {0}) AS INTEGER)",
            Month if sqlite => "CAST(strftime('%m', {0}) AS INTEGER)",
            Day if sqlite => "CAST(strftime('%d', {0}) AS INTEGER)",
            Hour if sqlite => "CAST(strftime('%H', {0}) AS INTEGER)",
            Minute if sqlite => "CAST(strftime('%M', {0}) AS INTEGER)",
            Second if sqlite => "CAST(strftime('%S', {0}) AS INTEGER)",
            FractionalSeconds if sqlite => {
                "(CAST(strftime('%f', {0}) AS REAL) - CAST(strftime('%S', {0}) AS INTEGER))"
            }
            Year => "CAST(EXTRACT(YEAR FROM {0}) AS INTEGER)",
            Month => "CAST(EXTRACT(MONTH FROM {0}) AS INTEGER)",
            Day => "CAST(EXTRACT(DAY FROM {0}) AS INTEGER)",
            Hour => "CAST(EXTRACT(HOUR FROM {0}) AS INTEGER)",
            Minute => "CAST(EXTRACT(MINUTE FROM {0}) AS INTEGER)",
            Second => "CAST(FLOOR(EXTRACT(SECOND FROM {0})) AS INTEGER)",
            FractionalSeconds => "(EXTRACT(SECOND FROM {0}) - FLOOR(EXTRACT(SECOND FROM {0})))",
            Date if sqlite => "date({0})",
            Date => "CAST({0} AT TIME ZONE 'UTC' AS DATE)",
            Time if sqlite => "(strftime('%H:%M:%f', {0}) || '000')",
            Time => "CAST({0} AT TIME ZONE 'UTC' AS TIME)",
            TotalOffsetMinutes => {
                return Err(CompileError::unsupported(BACKEND, "totaloffsetminutes: stored timestamps carry no offset"));
            }
            TotalSeconds if sqlite => "({0})",
            TotalSeconds => "EXTRACT(EPOCH FROM {0})",
            Now if sqlite => "strftime('%Y-%m-%dT%H:%M:%f000Z', 'now')",
            Now => "now()",
            Round => "round({0})",
            Floor if sqlite => {
                "(CASE WHEN {0} < CAST({0} AS INTEGER) THEN CAST({0} AS INTEGER) - 1 ELSE CAST({0} AS INTEGER) END)"
            }
            Ceiling if sqlite => {
                "(CASE WHEN {0} > CAST({0} AS INTEGER) THEN CAST({0} AS INTEGER) + 1 ELSE CAST({0} AS INTEGER) END)"
            }
            Floor => "floor({0})",
            Ceiling => "ceiling({0})",
            MinDateTime | MaxDateTime => return Err(CompileError::Malformed("constant function has no template")),
        };
        Ok(template.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SqlOptions {
    pub dialect: Dialect,
    /// Alias qualifying root-entity columns; the entity's table name if unset
    pub table_alias: Option<String>,
}

impl SqlOptions {
    pub fn new(dialect: Dialect) -> Self {
        SqlOptions {
            dialect,
            table_alias: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.table_alias = Some(alias.to_string());
        self
    }
}

/// A compiled fragment and its parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlClause {
    pub clause: String,
    pub params: Vec<SqlValue>,
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Text(String),
    Param(SqlValue),
}

fn text(s: impl Into<String>) -> Piece {
    Piece::Text(s.into())
}

enum FrameKind {
    Root,
    Group,
    Function { function: Function, arity: usize },
    List,
    Lambda { quantifier: Quantifier, head: String, has_body: bool },
}

struct Frame {
    kind: FrameKind,
    pieces: Vec<Piece>,
    /// Completed arguments of a call frame
    args: Vec<Vec<Piece>>,
    /// Closes a `NULLIF(` once the operand after it is complete
    pending: Option<&'static str>,
    /// Left operand of a SQLite `mod`, waiting for the right one
    modulo: Option<Vec<Piece>>,
    /// Precedence of each binary operator in `pieces` and the index after it
    operators: Vec<(u8, usize)>,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Frame {
            kind,
            pieces: Vec::new(),
            args: Vec::new(),
            pending: None,
            modulo: None,
            operators: Vec::new(),
        }
    }

    /// Index where the left operand of an operator binding at `precedence`
    /// begins: right after the last looser operator.
    fn operand_start(&self, precedence: u8) -> usize {
        self.operators
            .iter()
            .rev()
            .find(|&&(p, _)| p < precedence)
            .map_or(0, |&(_, at)| at)
    }

    /// Forgets operators inside the operand that begins at `start`.
    fn seal(&mut self, start: usize) {
        self.operators.retain(|&(_, at)| at <= start);
    }
}

/// Substitutes argument fragments into a call template.
fn expand(template: &str, args: &[Vec<Piece>]) -> Result<Vec<Piece>, CompileError> {
    let mut pieces = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        pieces.push(text(&rest[..open]));
        let close = rest[open..].find('}').ok_or(CompileError::Malformed("unterminated template slot"))? + open;
        let index: usize = rest[open + 1..close]
            .parse()
            .map_err(|_| CompileError::Malformed("template slot is not an index"))?;
        let arg = args.get(index).ok_or(CompileError::Malformed("template slot without argument"))?;
        pieces.extend(arg.iter().cloned());
        rest = &rest[close + 1..];
    }
    pieces.push(text(rest));
    Ok(pieces)
}

/// Streams an expression into SQL fragments.
pub struct SqlCompiler {
    dialect: Dialect,
    root_alias: String,
    frames: Vec<Frame>,
}

impl SqlCompiler {
    pub fn new(entity: &EntityType, options: &SqlOptions) -> Self {
        SqlCompiler {
            dialect: options.dialect,
            root_alias: options.table_alias.clone().unwrap_or_else(|| entity.source.clone()),
            frames: vec![Frame::new(FrameKind::Root)],
        }
    }

    fn top(&mut self) -> Result<&mut Frame, CompileError> {
        self.frames.last_mut().ok_or(CompileError::Malformed("no open frame"))
    }

    fn pop(&mut self) -> Result<Frame, CompileError> {
        if self.frames.len() < 2 {
            return Err(CompileError::Malformed("close without open"));
        }
        self.frames.pop().ok_or(CompileError::Malformed("close without open"))
    }

    /// Appends a complete operand to the current frame.
    fn unit(&mut self, pieces: impl IntoIterator<Item = Piece>) -> Result<(), CompileError> {
        let frame = self.top()?;
        match frame.modulo.take() {
            Some(left) => {
                let right: Vec<Piece> = pieces.into_iter().collect();
                frame.pieces.extend(expand(SQLITE_MODULO, &[left, right])?);
            }
            None => frame.pieces.extend(pieces),
        }
        if let Some(suffix) = frame.pending.take() {
            frame.pieces.push(text(suffix));
        }
        Ok(())
    }

    fn alias<'a>(&'a self, variable: &'a Option<String>) -> &'a str {
        variable.as_deref().unwrap_or(&self.root_alias)
    }

    fn literal(&self, value: &Primitive) -> Piece {
        match value {
            Primitive::Null => text("NULL"),
            other => Piece::Param(other.to_sql_value()),
        }
    }

    fn close_call(&mut self) -> Result<(), CompileError> {
        let mut frame = self.pop()?;
        let FrameKind::Function { function, arity } = frame.kind else {
            return Err(CompileError::Malformed("function close without open"));
        };
        if arity > 0 {
            frame.args.push(std::mem::take(&mut frame.pieces));
        }

        let pieces = match function {
            Function::MinDateTime | Function::MaxDateTime => {
                let value = if function == Function::MinDateTime {
                    evaluator::min_date_time()
                } else {
                    evaluator::max_date_time()
                };
                let value = value.ok_or(CompileError::Malformed("date-time bound out of range"))?;
                vec![Piece::Param(SqlValue::Timestamp(value))]
            }
            _ => expand(&self.dialect.template(function, arity)?, &frame.args)?,
        };
        self.unit(pieces)
    }

    fn close_lambda(&mut self) -> Result<(), CompileError> {
        let frame = self.pop()?;
        let FrameKind::Lambda {
            quantifier,
            head,
            has_body,
        } = frame.kind
        else {
            return Err(CompileError::Malformed("lambda close without open"));
        };

        let mut pieces = Vec::new();
        match (quantifier, has_body) {
            (Quantifier::Any, false) => pieces.push(text(format!("EXISTS ({head})"))),
            (Quantifier::All, false) => pieces.push(text("(1 = 1)")),
            (Quantifier::Any, true) => {
                pieces.push(text(format!("EXISTS ({head} AND (")));
                pieces.extend(frame.pieces);
                pieces.push(text("))"));
            }
            (Quantifier::All, true) => {
                pieces.push(text(format!("NOT EXISTS ({head} AND (CASE WHEN (")));
                pieces.extend(frame.pieces);
                pieces.push(text(") THEN 1 ELSE 0 END) = 0)"));
            }
        }
        self.unit(pieces)
    }

    fn into_pieces(mut self) -> Result<Vec<Piece>, CompileError> {
        if self.frames.len() != 1 {
            return Err(CompileError::Malformed("unclosed frame"));
        }
        let frame = self.top()?;
        if frame.pieces.is_empty() {
            return Err(CompileError::Malformed("empty expression"));
        }
        Ok(std::mem::take(&mut frame.pieces))
    }

    pub fn finish(self) -> Result<SqlClause, CompileError> {
        let dialect = self.dialect;
        Ok(render(dialect, self.into_pieces()?))
    }
}

/// Numbers the placeholders and lowers the parameters.
fn render(dialect: Dialect, pieces: Vec<Piece>) -> SqlClause {
    let mut clause = String::new();
    let mut params = Vec::new();
    for piece in pieces {
        match piece {
            Piece::Text(s) => clause.push_str(&s),
            Piece::Param(value) => {
                params.push(dialect.bind(value));
                clause.push_str(&dialect.placeholder(params.len()));
            }
        }
    }
    SqlClause { clause, params }
}

impl Listener for SqlCompiler {
    fn handle(&mut self, event: Event<'_>) -> Result<Handled, CompileError> {
        match event {
            Event::GroupOpen => self.frames.push(Frame::new(FrameKind::Group)),
            Event::GroupClose => {
                let frame = self.pop()?;
                if !matches!(frame.kind, FrameKind::Group) {
                    return Err(CompileError::Malformed("group close without open"));
                }
                let mut pieces = vec![text("(")];
                pieces.extend(frame.pieces);
                pieces.push(text(")"));
                self.unit(pieces)?;
            }
            Event::Operator(Operator::Binary(op)) => {
                let dialect = self.dialect;
                let frame = self.top()?;
                let start = frame.operand_start(op.precedence());

                if dialect == Dialect::Sqlite && op == BinaryOp::Mod {
                    let left = frame.pieces.split_off(start);
                    frame.seal(start);
                    frame.modulo = Some(left);
                    return Ok(Handled::Yes);
                }

                // IS [NOT] DISTINCT FROM does not chain
                let chained = frame
                    .operators
                    .iter()
                    .any(|&(p, at)| at > start && p == BinaryOp::Eq.precedence());
                if dialect == Dialect::Postgres && op.is_equality() && chained {
                    frame.pieces.insert(start, text("("));
                    frame.pieces.push(text(")"));
                    frame.seal(start);
                }

                frame.pieces.push(text(dialect.binary(op)));
                frame.operators.push((op.precedence(), frame.pieces.len()));
                if matches!(op, BinaryOp::Div | BinaryOp::DivBy | BinaryOp::Mod) {
                    frame.pending = Some(", 0)");
                }
            }
            Event::Operator(Operator::Unary(op)) => {
                let symbol = match op {
                    UnaryOp::Not => "NOT ",
                    UnaryOp::Negate => "-",
                };
                self.top()?.pieces.push(text(symbol));
            }
            Event::Operator(Operator::In) => self.top()?.pieces.push(text(" IN ")),
            Event::Literal(value) => {
                let piece = self.literal(value);
                if matches!(self.top()?.kind, FrameKind::List) {
                    self.top()?.pieces.push(piece);
                } else {
                    self.unit([piece])?;
                }
            }
            Event::Field(field) => {
                let column = format!("{}.{}", quote(self.alias(&field.variable)), quote(&field.source));
                self.unit([text(column)])?;
            }
            Event::FunctionOpen { function, arity } => {
                self.frames.push(Frame::new(FrameKind::Function { function, arity }));
            }
            Event::ArgumentSeparator => {
                let frame = self.top()?;
                match frame.kind {
                    FrameKind::List => frame.pieces.push(text(", ")),
                    FrameKind::Function { .. } => {
                        let arg = std::mem::take(&mut frame.pieces);
                        frame.args.push(arg);
                        frame.operators.clear();
                    }
                    _ => return Err(CompileError::Malformed("separator outside a call")),
                }
            }
            Event::FunctionClose => self.close_call()?,
            Event::ListOpen => self.frames.push(Frame::new(FrameKind::List)),
            Event::ListClose => {
                let frame = self.pop()?;
                if !matches!(frame.kind, FrameKind::List) {
                    return Err(CompileError::Malformed("list close without open"));
                }
                let mut pieces = vec![text("(")];
                pieces.extend(frame.pieces);
                pieces.push(text(")"));
                self.unit(pieces)?;
            }
            Event::LambdaOpen {
                navigation,
                quantifier,
                variable,
                has_body,
            } => {
                let outer = quote(self.alias(&navigation.variable));
                // `any()` binds no variable
                let inner = quote(if variable.is_empty() { &navigation.name } else { variable });
                let head = format!(
                    "SELECT 1 FROM {} AS {inner} WHERE {inner}.{} = {outer}.{}",
                    quote(&navigation.target.source),
                    quote(&navigation.link.target_key),
                    quote(&navigation.link.source_key),
                );
                self.frames.push(Frame::new(FrameKind::Lambda {
                    quantifier,
                    head,
                    has_body,
                }));
            }
            Event::LambdaClose => self.close_lambda()?,
        }
        Ok(Handled::Yes)
    }
}

/// Compiles a boolean expression into a `WHERE` fragment.
pub fn compile(expr: &Expr, entity: &EntityType, options: &SqlOptions) -> Result<SqlClause, CompileError> {
    let mut compiler = SqlCompiler::new(entity, options);
    walk(expr, &mut compiler)?;
    let clause = compiler.finish()?;
    debug!(
        dialect = options.dialect.name(),
        params = clause.params.len(),
        "compiled sql clause"
    );
    Ok(clause)
}

/// Compiles `$compute` items into a select list of `expr AS "alias"`.
pub fn compile_compute(
    items: &[ComputeItem],
    entity: &EntityType,
    options: &SqlOptions,
) -> Result<SqlClause, CompileError> {
    let mut pieces = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            pieces.push(text(", "));
        }
        let mut compiler = SqlCompiler::new(entity, options);
        walk(&item.expr, &mut compiler)?;
        pieces.extend(compiler.into_pieces()?);
        pieces.push(text(format!(" AS {}", quote(&item.alias))));
    }
    Ok(render(options.dialect, pieces))
}
