/// The lexical category of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Property name, lambda variable, `$it`, or a keyword operator
    ///
    /// Keyword operators are not reserved: `eq` is only an operator where
    /// the parser expects one.
    ///
    /// # Examples
    /// ```text
    /// price
    /// $it
    /// and
    /// ```
    Identifier,

    /// Identifier immediately followed by `(`
    ///
    /// # Examples
    /// ```text
    /// contains(
    /// any(
    /// not(
    /// ```
    FunctionName,

    /// Any literal, kept as raw text for the literal reader
    ///
    /// # Examples
    /// ```text
    /// 'it''s'
    /// 2020-01-01T00:00:00Z
    /// duration'PT1H'
    /// Sales.Color'Red'
    /// -INF
    /// ```
    Literal,

    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
    /// `:` separating a lambda variable from its body
    Colon,
    /// `/` in member paths
    Slash,
    /// `-` not starting a literal (unary negation)
    Minus,

    /// End of input
    Eof,
}

/// A token with its raw text and position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Offset of the first character, counted in characters
    pub offset: usize,
    /// Whether whitespace preceded the token
    pub leading_space: bool,
}

impl Token {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// An identifier or function name spelled exactly `word`.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self.kind, TokenKind::Identifier | TokenKind::FunctionName) && self.text == word
    }

    /// How the token reads in an error message.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("'{}'", self.text),
        }
    }
}
