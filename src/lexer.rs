use thiserror::Error;

use crate::{
    ast::{Token, TokenKind},
    codec,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("unterminated quoted literal")]
    UnterminatedLiteral,
}

/// A character the lexer could not turn into a token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset} near '{context}'")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub offset: usize,
    pub context: String,
}

/// Number of characters shown on each side of an error position.
const CONTEXT_RADIUS: usize = 12;

pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Offset of the next unread character.
    pub fn position(&self) -> usize {
        self.position
    }

    /// A short window of the source around `offset`, for error messages.
    pub fn context(&self, offset: usize) -> String {
        let start = offset.saturating_sub(CONTEXT_RADIUS);
        let end = (offset + CONTEXT_RADIUS).min(self.input.len());
        self.input.get(start..end).map(|s| s.iter().collect()).unwrap_or_default()
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn error(&self, kind: LexErrorKind, offset: usize) -> LexError {
        LexError {
            kind,
            offset,
            context: self.context(offset),
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.position;
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
        self.position > start
    }

    fn text(&self, start: usize) -> String {
        self.input[start..self.position].iter().collect()
    }

    fn read_identifier(&mut self) -> String {
        let start = self.position;
        if self.current_char() == Some('$') {
            self.advance();
        }
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                self.advance();
            } else {
                break;
            }
        }
        self.text(start)
    }

    /// Consumes a quoted body starting at the opening quote; `''` stands for
    /// one quote. The raw text, quotes included, is kept in the token.
    fn read_quoted(&mut self) -> Result<(), LexError> {
        let start = self.position;
        self.advance(); // opening quote

        while let Some(ch) = self.current_char() {
            self.advance();
            if ch == '\'' {
                if self.current_char() == Some('\'') {
                    self.advance();
                } else {
                    return Ok(());
                }
            }
        }

        Err(self.error(LexErrorKind::UnterminatedLiteral, start))
    }

    /// Numbers, dates, times and date-time-offsets share one greedy scan;
    /// the literal reader decides what the text is.
    fn read_numeric_like(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | ':' | '+' | '-') {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn guid_ahead(&self) -> bool {
        let end = self.position + 36;
        if end > self.input.len() {
            return false;
        }
        if self.input.get(end).is_some_and(|c| c.is_alphanumeric() || *c == '_') {
            return false;
        }
        let candidate: String = self.input[self.position..end].iter().collect();
        codec::is_guid(&candidate)
    }

    fn word_ahead(&self, offset: usize, word: &str) -> bool {
        let matches = word.chars().enumerate().all(|(i, c)| self.peek_char(offset + i) == Some(c));
        let next = self.peek_char(offset + word.chars().count());
        matches && !next.is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    fn token(&self, kind: TokenKind, start: usize, leading_space: bool) -> Token {
        Token {
            kind,
            text: self.text(start),
            offset: start,
            leading_space,
        }
    }

    fn single(&mut self, kind: TokenKind, leading_space: bool) -> Token {
        let start = self.position;
        self.advance();
        self.token(kind, start, leading_space)
    }

    /// A leading `-` belongs to the literal for `-INF`, negative numbers and
    /// negative durations; otherwise it is unary negation.
    fn read_minus(&mut self, leading_space: bool) -> Token {
        let start = self.position;

        if self.word_ahead(1, "INF") {
            self.position += 4;
            return self.token(TokenKind::Literal, start, leading_space);
        }

        if self.peek_char(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            self.read_numeric_like();
            return self.token(TokenKind::Literal, start, leading_space);
        }

        if self.peek_char(1) == Some('P') {
            self.advance();
            let word = self.read_identifier();
            if codec::is_duration(&format!("-{word}")) {
                return self.token(TokenKind::Literal, start, leading_space);
            }
            self.position = start;
        }

        self.single(TokenKind::Minus, leading_space)
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        let leading_space = self.skip_whitespace();
        let start = self.position;

        let token = match self.current_char() {
            None => self.token(TokenKind::Eof, start, leading_space),
            Some('(') => self.single(TokenKind::LParen, leading_space),
            Some(')') => self.single(TokenKind::RParen, leading_space),
            Some(',') => self.single(TokenKind::Comma, leading_space),
            Some(':') => self.single(TokenKind::Colon, leading_space),
            Some('/') => self.single(TokenKind::Slash, leading_space),
            Some('-') => self.read_minus(leading_space),
            Some('\'') => {
                self.read_quoted()?;
                self.token(TokenKind::Literal, start, leading_space)
            }
            Some(_) if self.guid_ahead() => {
                self.position += 36;
                self.token(TokenKind::Literal, start, leading_space)
            }
            Some(ch) if ch.is_ascii_digit() || (ch == '+' && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())) => {
                self.advance();
                self.read_numeric_like();
                self.token(TokenKind::Literal, start, leading_space)
            }
            Some(ch) if ch.is_alphabetic() || ch == '_' || ch == '$' => {
                let ident = self.read_identifier();

                match self.current_char() {
                    Some('\'') => {
                        self.read_quoted()?;
                        self.token(TokenKind::Literal, start, leading_space)
                    }
                    Some('(') => self.token(TokenKind::FunctionName, start, leading_space),
                    _ if codec::classify(&ident).is_some() => {
                        self.token(TokenKind::Literal, start, leading_space)
                    }
                    _ => self.token(TokenKind::Identifier, start, leading_space),
                }
            }
            Some(ch) => return Err(self.error(LexErrorKind::UnexpectedCharacter(ch), start)),
        };

        Ok(token)
    }

    /// The next token without consuming it.
    pub fn peek(&mut self) -> Result<Token, LexError> {
        let saved = self.position;
        let token = self.next_token();
        self.position = saved;
        token
    }

    /// Every remaining token up to and including end of input.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.is(TokenKind::Eof);
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }
}

#[test]
fn test_keyword_operators_are_identifiers() {
    let mut lexer = Lexer::new("price eq 5");
    let first = lexer.next_token().unwrap();
    assert_eq!(first.kind, TokenKind::Identifier);
    let op = lexer.next_token().unwrap();
    assert_eq!((op.kind, op.text.as_str(), op.leading_space), (TokenKind::Identifier, "eq", true));
    let value = lexer.next_token().unwrap();
    assert_eq!((value.kind, value.text.as_str()), (TokenKind::Literal, "5"));
    assert!(lexer.next_token().unwrap().is(TokenKind::Eof));
}

#[test]
fn test_guid_starting_with_letter() {
    let mut lexer = Lexer::new("id eq deadbeef-0000-4000-8000-000000000001");
    lexer.next_token().unwrap();
    lexer.next_token().unwrap();
    let guid = lexer.next_token().unwrap();
    assert_eq!(guid.kind, TokenKind::Literal);
    assert_eq!(guid.text, "deadbeef-0000-4000-8000-000000000001");
}

#[test]
fn test_minus_forms() {
    let kinds: Vec<_> = Lexer::new("-INF -5 -PT1H -price")
        .tokenize()
        .unwrap()
        .into_iter()
        .map(|t| (t.kind, t.text))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (TokenKind::Literal, "-INF".to_string()),
            (TokenKind::Literal, "-5".to_string()),
            (TokenKind::Literal, "-PT1H".to_string()),
            (TokenKind::Minus, "-".to_string()),
            (TokenKind::Identifier, "price".to_string()),
            (TokenKind::Eof, String::new()),
        ]
    );
}
