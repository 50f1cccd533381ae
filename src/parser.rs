use thiserror::Error;
use tracing::debug;

use crate::{
    ast::{
        BinaryOp, ComputeItem, Expr, FieldRef, Function, Lambda, Navigation, Operator, Quantifier,
        SignatureError, Token, TokenKind, Type, UnaryOp, operators::IN_PRECEDENCE,
    },
    lexer::{LexError, LexErrorKind, Lexer},
    literal,
    model::{AllowList, EntityType, Property, PropertyType},
};

/// Default bound on expression nesting.
pub const DEFAULT_MAX_DEPTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Maximum nesting of groups, operators, calls and lambdas
    pub max_depth: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("{0}")]
    Lex(LexErrorKind),
    #[error("empty expression")]
    Empty,
    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: &'static str, found: String },
    #[error("expected {expected}, found end of input")]
    UnexpectedEnd { expected: &'static str },
    #[error("unbalanced parenthesis")]
    UnbalancedParenthesis,
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{function}' takes {expected} argument(s), found {found}")]
    Arity {
        function: &'static str,
        expected: String,
        found: usize,
    },
    #[error("unknown property '{0}'")]
    UnknownProperty(String),
    /// The property exists but the request may not reference it
    #[error("property '{0}' is not allowed")]
    NotAllowed(String),
    #[error("lambda variable '{0}' is not in scope")]
    UnknownVariable(String),
    #[error("lambda variable '{0}' is already in use")]
    VariableInUse(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("invalid {what} literal {text}")]
    InvalidLiteral { what: &'static str, text: String },
    #[error("'in' requires a non-empty list")]
    EmptyList,
    #[error("'in' lists cannot contain null")]
    NullInList,
    #[error("compute alias '{0}' is already in use")]
    DuplicateAlias(String),
    #[error("expression nesting exceeds {0} levels")]
    DepthExceeded(usize),
}

/// A syntax, resolution, type or authorization error with its position.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at offset {offset} near '{context}'")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Character offset into the expression
    pub offset: usize,
    /// Source text around the offset
    pub context: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, offset: usize, context: &str) -> Self {
        ParseError {
            kind,
            offset,
            context: context.to_string(),
        }
    }

    /// Whether the request referenced a property outside its allow-list.
    pub fn is_authorization(&self) -> bool {
        matches!(self.kind, ParseErrorKind::NotAllowed(_))
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError {
            kind: ParseErrorKind::Lex(e.kind),
            offset: e.offset,
            context: e.context,
        }
    }
}

/// One lambda variable in scope, linked to the enclosing ones.
struct Scope<'s> {
    variable: &'s str,
    entity: &'s EntityType,
    /// Allow-list path of the navigation the variable ranges over
    path: &'s str,
    parent: Option<&'s Scope<'s>>,
}

impl<'s> Scope<'s> {
    fn find(&self, name: &str) -> Option<&Scope<'s>> {
        let mut scope = Some(self);
        while let Some(s) = scope {
            if s.variable == name {
                return Some(s);
            }
            scope = s.parent;
        }
        None
    }
}

/// Precedence-climbing parser for `$filter` and `$compute`.
///
/// Fields are resolved against `entity` and checked against `allowed` as
/// soon as they are read, so an unauthorized reference fails the parse
/// before anything is compiled.
pub struct Parser<'a> {
    lexer: Lexer,
    current_token: Token,
    entity: &'a EntityType,
    allowed: &'a AllowList,
    options: ParserOptions,
    depth: usize,
    length: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &str, entity: &'a EntityType, allowed: &'a AllowList) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current_token,
            entity,
            allowed,
            options: ParserOptions::default(),
            depth: 0,
            length: input.chars().count(),
        })
    }

    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    /// Moves to the next token, returning the one just left.
    fn advance(&mut self) -> Result<Token, ParseError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current_token, next))
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current_token.is(kind)
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<Token, ParseError> {
        if !self.check(kind) {
            return Err(self.unexpected(expected));
        }
        self.advance()
    }

    fn error(&self, kind: ParseErrorKind, offset: usize) -> ParseError {
        ParseError::new(kind, offset, &self.lexer.context(offset))
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        let token = &self.current_token;
        let kind = if token.is(TokenKind::Eof) {
            ParseErrorKind::UnexpectedEnd { expected }
        } else {
            ParseErrorKind::UnexpectedToken {
                expected,
                found: token.describe(),
            }
        };
        self.error(kind, token.offset)
    }

    fn mismatch(&self, message: String, offset: usize) -> ParseError {
        self.error(ParseErrorKind::TypeMismatch(message), offset)
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.options.max_depth {
            return Err(self.error(
                ParseErrorKind::DepthExceeded(self.options.max_depth),
                self.current_token.offset,
            ));
        }
        Ok(())
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        match self.current_token.kind {
            TokenKind::Eof => Ok(()),
            TokenKind::RParen => Err(self.error(ParseErrorKind::UnbalancedParenthesis, self.current_token.offset)),
            _ => Err(self.unexpected("an operator or end of input")),
        }
    }

    /// Parses a complete `$filter` expression, which must be boolean.
    pub fn parse_filter(&mut self) -> Result<Expr, ParseError> {
        debug!(length = self.length, entity = %self.entity.name, "parsing filter");
        if self.check(TokenKind::Eof) {
            return Err(self.error(ParseErrorKind::Empty, 0));
        }

        let expr = self.parse_expression(0, None, None)?;
        self.expect_end()?;

        let ty = expr.ty();
        if ty != Type::BOOLEAN {
            return Err(self.mismatch(format!("a filter must be Edm.Boolean, found {ty}"), 0));
        }
        Ok(expr)
    }

    /// Parses a `$compute` option: comma-separated `expr as alias` items.
    pub fn parse_compute(&mut self) -> Result<Vec<ComputeItem>, ParseError> {
        debug!(length = self.length, entity = %self.entity.name, "parsing compute");
        if self.check(TokenKind::Eof) {
            return Err(self.error(ParseErrorKind::Empty, 0));
        }

        let mut items: Vec<ComputeItem> = Vec::new();
        loop {
            let expr = self.parse_expression(0, None, None)?;

            if !self.current_token.is_word("as") {
                return Err(self.unexpected("'as'"));
            }
            self.advance()?;

            if !self.check(TokenKind::Identifier) {
                return Err(self.unexpected("an alias"));
            }
            let alias = self.advance()?;
            if self.entity.find(&alias.text).is_some() || items.iter().any(|i| i.alias == alias.text) {
                return Err(self.error(ParseErrorKind::DuplicateAlias(alias.text), alias.offset));
            }

            items.push(ComputeItem { expr, alias: alias.text });

            if self.check(TokenKind::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }

        self.expect_end()?;
        Ok(items)
    }

    fn parse_expression(
        &mut self,
        min_precedence: u8,
        scope: Option<&Scope<'_>>,
        expected: Option<&Type>,
    ) -> Result<Expr, ParseError> {
        self.enter()?;
        let result = self.parse_climbing(min_precedence, scope, expected);
        self.depth -= 1;
        result
    }

    fn parse_climbing(
        &mut self,
        min_precedence: u8,
        scope: Option<&Scope<'_>>,
        expected: Option<&Type>,
    ) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary(scope, expected)?;

        while let Some(operator) = self.infix_operator()? {
            if operator.precedence() < min_precedence {
                break;
            }
            let op_token = self.advance()?;

            left = match operator {
                Operator::In => self.parse_in(left)?,
                Operator::Binary(op) => {
                    let left_type = left.ty();
                    let expected = if op.is_comparison() { Some(&left_type) } else { None };
                    let right = self.parse_expression(op.precedence() + 1, scope, expected)?;
                    self.make_binary(op, left, right, op_token.offset)?
                }
                Operator::Unary(_) => return Err(self.unexpected("a binary operator")),
            };
        }

        Ok(left)
    }

    /// The operator keyword at the current token, if it is one here.
    ///
    /// Keyword operators need whitespace on both sides; a following `(` or
    /// the end of input also counts as a separator.
    fn infix_operator(&mut self) -> Result<Option<Operator>, ParseError> {
        let token = &self.current_token;
        if !matches!(token.kind, TokenKind::Identifier | TokenKind::FunctionName) || !token.leading_space {
            return Ok(None);
        }

        let operator = match BinaryOp::from_keyword(&token.text) {
            Some(op) => Operator::Binary(op),
            None if token.text == "in" => Operator::In,
            None => return Ok(None),
        };

        if token.is(TokenKind::Identifier) {
            let next = self.lexer.peek()?;
            if !(next.leading_space || next.is(TokenKind::Eof)) {
                return Ok(None);
            }
        }
        Ok(Some(operator))
    }

    fn is_prefix_not(&mut self) -> Result<bool, ParseError> {
        let token = &self.current_token;
        if !token.is_word("not") {
            return Ok(false);
        }
        if token.is(TokenKind::FunctionName) {
            return Ok(true);
        }
        let next = self.lexer.peek()?;
        Ok(next.leading_space && !next.is(TokenKind::Eof))
    }

    fn parse_unary(&mut self, scope: Option<&Scope<'_>>, expected: Option<&Type>) -> Result<Expr, ParseError> {
        if self.check(TokenKind::Minus) {
            let token = self.advance()?;
            let operand = self.parse_expression(IN_PRECEDENCE, scope, None)?;
            let ty = operand.ty();
            if !ty.is_numeric() {
                return Err(self.mismatch(format!("'-' needs a number, found {ty}"), token.offset));
            }
            return Ok(Expr::unary(UnaryOp::Negate, operand));
        }

        if self.is_prefix_not()? {
            let token = self.advance()?;
            let operand = self.parse_expression(IN_PRECEDENCE, scope, None)?;
            let ty = operand.ty();
            if !ty.is_boolean() {
                return Err(self.mismatch(format!("'not' needs Edm.Boolean, found {ty}"), token.offset));
            }
            return Ok(Expr::unary(UnaryOp::Not, operand));
        }

        self.parse_primary(scope, expected)
    }

    fn parse_primary(&mut self, scope: Option<&Scope<'_>>, expected: Option<&Type>) -> Result<Expr, ParseError> {
        match self.current_token.kind {
            TokenKind::LParen => {
                let open = self.advance()?;
                let expr = self.parse_expression(0, scope, expected)?;
                if self.check(TokenKind::Eof) {
                    return Err(self.error(ParseErrorKind::UnbalancedParenthesis, open.offset));
                }
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::Literal => {
                let token = self.current_token.clone();
                let value = literal::read(&token, expected)?.ok_or_else(|| self.unexpected("a literal"))?;
                self.advance()?;
                Ok(Expr::Literal(value))
            }
            TokenKind::FunctionName => self.parse_call(scope),
            TokenKind::Identifier => self.parse_member(scope),
            _ => Err(self.unexpected("an operand")),
        }
    }

    fn parse_call(&mut self, scope: Option<&Scope<'_>>) -> Result<Expr, ParseError> {
        let name = self.advance()?;
        let function = Function::from_name(&name.text)
            .ok_or_else(|| self.error(ParseErrorKind::UnknownFunction(name.text.clone()), name.offset))?;
        self.expect(TokenKind::LParen, "'('")?;

        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression(0, scope, None)?);
                if self.check(TokenKind::Comma) {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "',' or ')'")?;

        let types: Vec<Type> = args.iter().map(Expr::ty).collect();
        match function.check(&types) {
            Ok(_) => Ok(Expr::Call { function, args }),
            Err(SignatureError::Arity { expected, found }) => Err(self.error(
                ParseErrorKind::Arity {
                    function: function.name(),
                    expected,
                    found,
                },
                name.offset,
            )),
            Err(SignatureError::Argument { index, expected, found }) => Err(self.mismatch(
                format!(
                    "argument {} of '{}' must be {expected}, found {found}",
                    index + 1,
                    function.name()
                ),
                name.offset,
            )),
        }
    }

    /// Resolves an identifier: a root property, a lambda variable path, or
    /// a `$it` path.
    fn parse_member(&mut self, scope: Option<&Scope<'_>>) -> Result<Expr, ParseError> {
        let token = self.advance()?;
        let name = token.text.as_str();
        let entity = self.entity;

        if let Some(property) = entity.find(name) {
            return self.resolve(property, "", None, &token, scope);
        }

        if let Some(frame) = scope.and_then(|s| s.find(name)) {
            let member = self.member_after_slash(name, token.offset)?;
            let property = frame.entity.find(&member.text).ok_or_else(|| {
                self.error(
                    ParseErrorKind::UnknownProperty(format!("{name}/{}", member.text)),
                    member.offset,
                )
            })?;
            let variable = frame.variable.to_string();
            return self.resolve(property, frame.path, Some(variable), &member, scope);
        }

        if name == "$it" {
            let member = self.member_after_slash(name, token.offset)?;
            let property = entity
                .find(&member.text)
                .ok_or_else(|| self.error(ParseErrorKind::UnknownProperty(member.text.clone()), member.offset))?;
            return self.resolve(property, "", None, &member, scope);
        }

        if self.check(TokenKind::Slash) {
            return Err(self.error(ParseErrorKind::UnknownVariable(name.to_string()), token.offset));
        }
        Err(self.error(ParseErrorKind::UnknownProperty(name.to_string()), token.offset))
    }

    fn member_after_slash(&mut self, name: &str, offset: usize) -> Result<Token, ParseError> {
        if !self.check(TokenKind::Slash) {
            return Err(self.mismatch(format!("'{name}' must be followed by '/' and a property"), offset));
        }
        self.advance()?;
        if !self.check(TokenKind::Identifier) {
            return Err(self.unexpected("a property name"));
        }
        self.advance()
    }

    fn resolve(
        &mut self,
        property: &Property,
        prefix: &str,
        variable: Option<String>,
        token: &Token,
        scope: Option<&Scope<'_>>,
    ) -> Result<Expr, ParseError> {
        let path = if prefix.is_empty() {
            property.name.clone()
        } else {
            format!("{prefix}/{}", property.name)
        };
        if !self.allowed.allows(&path) {
            return Err(self.error(ParseErrorKind::NotAllowed(path), token.offset));
        }

        let ty = match &property.ty {
            PropertyType::Primitive(kind) => Type::Primitive(*kind),
            PropertyType::Enum(ty) => Type::Enum(ty.clone()),
            PropertyType::Collection { target, link } => {
                if !self.check(TokenKind::Slash) {
                    return Err(self.mismatch(
                        format!("collection '{path}' can only be used with any or all"),
                        token.offset,
                    ));
                }
                self.advance()?;
                let navigation = Navigation {
                    name: property.name.clone(),
                    source: property.source.clone(),
                    variable,
                    target: target.clone(),
                    link: link.clone(),
                };
                return self.parse_lambda(navigation, &path, scope);
            }
        };

        Ok(Expr::Field(FieldRef {
            name: property.name.clone(),
            source: property.source.clone(),
            variable,
            ty,
        }))
    }

    fn parse_lambda(
        &mut self,
        navigation: Navigation,
        path: &str,
        scope: Option<&Scope<'_>>,
    ) -> Result<Expr, ParseError> {
        let quantifier = if self.current_token.is_word("any") {
            Quantifier::Any
        } else if self.current_token.is_word("all") {
            Quantifier::All
        } else {
            return Err(self.unexpected("any or all"));
        };
        self.advance()?;
        self.expect(TokenKind::LParen, "'('")?;

        if quantifier == Quantifier::Any && self.check(TokenKind::RParen) {
            self.advance()?;
            return Ok(Expr::Lambda(Lambda {
                navigation,
                quantifier,
                variable: String::new(),
                body: None,
            }));
        }

        if !self.check(TokenKind::Identifier) {
            return Err(self.unexpected("a lambda variable"));
        }
        let variable = self.advance()?;
        let taken = variable.text == "$it"
            || self.entity.find(&variable.text).is_some()
            || scope.and_then(|s| s.find(&variable.text)).is_some();
        if taken {
            return Err(self.error(ParseErrorKind::VariableInUse(variable.text), variable.offset));
        }
        self.expect(TokenKind::Colon, "':'")?;

        let target = navigation.target.clone();
        let inner = Scope {
            variable: &variable.text,
            entity: &target,
            path,
            parent: scope,
        };
        let body = self.parse_expression(0, Some(&inner), None)?;
        let ty = body.ty();
        if !ty.is_boolean() {
            return Err(self.mismatch(
                format!("a lambda body must be Edm.Boolean, found {ty}"),
                variable.offset,
            ));
        }
        self.expect(TokenKind::RParen, "')'")?;

        Ok(Expr::Lambda(Lambda {
            navigation,
            quantifier,
            variable: variable.text,
            body: Some(Box::new(body)),
        }))
    }

    fn parse_in(&mut self, operand: Expr) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LParen, "'(' after 'in'")?;
        if self.check(TokenKind::RParen) {
            return Err(self.error(ParseErrorKind::EmptyList, self.current_token.offset));
        }

        let operand_type = operand.ty();
        let mut list = Vec::new();
        loop {
            let token = self.current_token.clone();
            let value = literal::read(&token, Some(&operand_type))?.ok_or_else(|| self.unexpected("a literal"))?;
            if value.is_null() {
                return Err(self.error(ParseErrorKind::NullInList, token.offset));
            }
            let value_type = literal::type_of(&value, Some(&operand_type));
            if !operand_type.is_comparable_with(&value_type) {
                return Err(self.mismatch(
                    format!("cannot test {operand_type} for membership among {value_type} values"),
                    token.offset,
                ));
            }
            list.push(value);
            self.advance()?;

            if self.check(TokenKind::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen, "',' or ')'")?;

        Ok(Expr::In {
            operand: Box::new(operand),
            list,
        })
    }

    /// Settles a literal operand against the other side's type, turning
    /// strings into enumeration members where the other side is an enum.
    fn settle(&self, expr: Expr, other: &Type, offset: usize) -> Result<(Expr, Type), ParseError> {
        match expr {
            Expr::Literal(value) => {
                let shown = value.to_string();
                let value = literal::coerce(value, other)
                    .ok_or_else(|| self.mismatch(format!("{shown} is not a member of {other}"), offset))?;
                let ty = literal::type_of(&value, Some(other));
                Ok((Expr::Literal(value), ty))
            }
            expr => {
                let ty = expr.ty();
                Ok((expr, ty))
            }
        }
    }

    fn make_binary(&self, op: BinaryOp, left: Expr, right: Expr, offset: usize) -> Result<Expr, ParseError> {
        let (left, left_type) = self.settle(left, &right.ty(), offset)?;
        let (right, right_type) = self.settle(right, &left_type, offset)?;
        let keyword = op.keyword();

        let valid = if op.is_logical() {
            left_type.is_boolean() && right_type.is_boolean()
        } else if op.is_equality() {
            left_type.is_comparable_with(&right_type)
        } else if op.is_relational() {
            left_type.is_orderable_with(&right_type)
        } else {
            left_type.is_numeric() && right_type.is_numeric()
        };

        if !valid {
            return Err(self.mismatch(format!("'{keyword}' cannot combine {left_type} and {right_type}"), offset));
        }
        Ok(Expr::binary(op, left, right))
    }
}
