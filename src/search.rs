//! `$search` expressions.
//!
//! A separate grammar from `$filter`: bare terms and `"quoted phrases"`
//! combined with `NOT`, `AND` (also implied by juxtaposition) and `OR`, in
//! that order of precedence. A parsed search is lowered onto a filter tree
//! in which a term matches when any searchable property contains it.

use tracing::debug;

use crate::{
    ast::{BinaryOp, Expr, FieldRef, Function, Type, UnaryOp},
    model::{AllowList, EntityType, PropertyType},
    parser::{ParseError, ParseErrorKind},
    value::{Primitive, PrimitiveKind},
};

#[derive(Debug, Clone, PartialEq)]
pub enum SearchExpr {
    /// A bare word or a phrase, matched as a substring
    Term(String),
    Not(Box<SearchExpr>),
    And(Box<SearchExpr>, Box<SearchExpr>),
    Or(Box<SearchExpr>, Box<SearchExpr>),
}

#[derive(Debug, Clone, PartialEq)]
enum SearchToken {
    Word(String),
    Phrase(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
    Eof,
}

struct SearchLexer {
    input: Vec<char>,
    position: usize,
}

impl SearchLexer {
    fn new(input: &str) -> Self {
        SearchLexer {
            input: input.chars().collect(),
            position: 0,
        }
    }

    fn context(&self, offset: usize) -> String {
        let end = (offset + 12).min(self.input.len());
        self.input.get(offset.saturating_sub(12)..end).map(|s| s.iter().collect()).unwrap_or_default()
    }

    fn error(&self, kind: ParseErrorKind, offset: usize) -> ParseError {
        ParseError::new(kind, offset, &self.context(offset))
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn next_token(&mut self) -> Result<(SearchToken, usize), ParseError> {
        while self.current_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
        let start = self.position;

        let token = match self.current_char() {
            None => SearchToken::Eof,
            Some('(') => {
                self.advance();
                SearchToken::LParen
            }
            Some(')') => {
                self.advance();
                SearchToken::RParen
            }
            Some('"') => SearchToken::Phrase(self.read_phrase()?),
            Some(_) => {
                let mut word = String::new();
                while let Some(ch) = self.current_char() {
                    if ch.is_whitespace() || matches!(ch, '(' | ')' | '"') {
                        break;
                    }
                    word.push(ch);
                    self.advance();
                }
                match word.as_str() {
                    "AND" => SearchToken::And,
                    "OR" => SearchToken::Or,
                    "NOT" => SearchToken::Not,
                    _ => SearchToken::Word(word),
                }
            }
        };

        Ok((token, start))
    }

    /// Reads a double-quoted phrase; `\"` and `\\` are the only escapes.
    fn read_phrase(&mut self) -> Result<String, ParseError> {
        let start = self.position;
        self.advance(); // opening quote

        let mut phrase = String::new();
        while let Some(ch) = self.current_char() {
            self.advance();
            match ch {
                '"' => return Ok(phrase),
                '\\' => match self.current_char() {
                    Some(escaped @ ('"' | '\\')) => {
                        phrase.push(escaped);
                        self.advance();
                    }
                    _ => {
                        return Err(self.error(
                            ParseErrorKind::InvalidLiteral { what: "search phrase", text: "\\".to_string() },
                            self.position - 1,
                        ));
                    }
                },
                ch => phrase.push(ch),
            }
        }

        Err(self.error(
            ParseErrorKind::Lex(crate::lexer::LexErrorKind::UnterminatedLiteral),
            start,
        ))
    }
}

struct SearchParser {
    lexer: SearchLexer,
    current_token: SearchToken,
    offset: usize,
    depth: usize,
    max_depth: usize,
}

impl SearchParser {
    fn advance(&mut self) -> Result<(), ParseError> {
        let (token, offset) = self.lexer.next_token()?;
        self.current_token = token;
        self.offset = offset;
        Ok(())
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        let kind = match &self.current_token {
            SearchToken::Eof => ParseErrorKind::UnexpectedEnd { expected },
            other => ParseErrorKind::UnexpectedToken {
                expected,
                found: format!("{other:?}"),
            },
        };
        self.lexer.error(kind, self.offset)
    }

    fn starts_operand(&self) -> bool {
        matches!(
            self.current_token,
            SearchToken::Word(_) | SearchToken::Phrase(_) | SearchToken::Not | SearchToken::LParen
        )
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.lexer.error(ParseErrorKind::DepthExceeded(self.max_depth), self.offset));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<SearchExpr, ParseError> {
        self.enter()?;

        let mut left = self.parse_and()?;
        while self.current_token == SearchToken::Or {
            self.advance()?;
            let right = self.parse_and()?;
            left = SearchExpr::Or(Box::new(left), Box::new(right));
        }

        self.depth -= 1;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<SearchExpr, ParseError> {
        let mut left = self.parse_not()?;
        loop {
            if self.current_token == SearchToken::And {
                self.advance()?;
            } else if !self.starts_operand() {
                break;
            }
            let right = self.parse_not()?;
            left = SearchExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<SearchExpr, ParseError> {
        if self.current_token == SearchToken::Not {
            self.enter()?;
            self.advance()?;
            let operand = self.parse_not()?;
            self.depth -= 1;
            return Ok(SearchExpr::Not(Box::new(operand)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<SearchExpr, ParseError> {
        match std::mem::replace(&mut self.current_token, SearchToken::Eof) {
            SearchToken::Word(term) | SearchToken::Phrase(term) => {
                self.advance()?;
                Ok(SearchExpr::Term(term))
            }
            SearchToken::LParen => {
                let open = self.offset;
                self.advance()?;
                let expr = self.parse_or()?;
                match self.current_token {
                    SearchToken::RParen => {
                        self.advance()?;
                        Ok(expr)
                    }
                    SearchToken::Eof => Err(self.lexer.error(ParseErrorKind::UnbalancedParenthesis, open)),
                    _ => Err(self.unexpected("')'")),
                }
            }
            token => {
                self.current_token = token;
                Err(self.unexpected("a search term"))
            }
        }
    }
}

/// Parses a `$search` option.
pub fn parse_search(input: &str, max_depth: usize) -> Result<SearchExpr, ParseError> {
    debug!(length = input.chars().count(), "parsing search");
    let mut lexer = SearchLexer::new(input);
    let (current_token, offset) = lexer.next_token()?;
    let mut parser = SearchParser {
        lexer,
        current_token,
        offset,
        depth: 0,
        max_depth,
    };

    if parser.current_token == SearchToken::Eof {
        return Err(parser.lexer.error(ParseErrorKind::Empty, 0));
    }
    let expr = parser.parse_or()?;
    match parser.current_token {
        SearchToken::Eof => Ok(expr),
        SearchToken::RParen => Err(parser.lexer.error(ParseErrorKind::UnbalancedParenthesis, parser.offset)),
        _ => Err(parser.unexpected("a search term or end of input")),
    }
}

/// String properties of `entity` the allow-list lets a search read.
pub fn searchable(entity: &EntityType, allowed: &AllowList) -> Vec<FieldRef> {
    entity
        .properties
        .iter()
        .filter(|p| matches!(p.ty, PropertyType::Primitive(PrimitiveKind::String)) && allowed.allows(&p.name))
        .map(|p| FieldRef {
            name: p.name.clone(),
            source: p.source.clone(),
            variable: None,
            ty: Type::STRING,
        })
        .collect()
}

/// Lowers a search onto a filter tree over `fields`.
///
/// A term becomes `contains(f1, term) or contains(f2, term) ...`; with no
/// searchable fields every term is `false`.
pub fn lower(search: &SearchExpr, fields: &[FieldRef]) -> Expr {
    match search {
        SearchExpr::Term(term) => fields
            .iter()
            .map(|field| Expr::Call {
                function: Function::Contains,
                args: vec![
                    Expr::Field(field.clone()),
                    Expr::Literal(Primitive::String(term.clone())),
                ],
            })
            .reduce(|left, right| Expr::binary(BinaryOp::Or, left, right))
            .unwrap_or(Expr::Literal(Primitive::Boolean(false))),
        SearchExpr::Not(operand) => Expr::unary(UnaryOp::Not, lower(operand, fields)),
        SearchExpr::And(left, right) => Expr::binary(BinaryOp::And, lower(left, fields), lower(right, fields)),
        SearchExpr::Or(left, right) => Expr::binary(BinaryOp::Or, lower(left, fields), lower(right, fields)),
    }
}
