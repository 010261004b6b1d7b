//! Tokens and the cursor the parser walks them with.

use std::fmt;
use std::ops::Range;

use crate::core::CobbleError;

/// The lexical category of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Literal text between regions
    Text,
    /// `{%`
    ExecuteStart,
    /// `%}`
    ExecuteEnd,
    /// `{{`
    PrintStart,
    /// `}}`
    PrintEnd,
    /// Identifier
    Name,
    /// Integer or decimal number without suffix
    Number,
    /// Integer with an `L` suffix (the suffix is not part of the value)
    Long,
    /// String literal, already unquoted and unescaped
    String,
    /// Operator from the active operator table
    Operator,
    /// One of `()[]{}?:.,|=`
    Punctuation,
    /// `#{` inside a double-quoted string
    StringInterpolationStart,
    /// `}` closing an interpolation
    StringInterpolationEnd,
    /// End of input
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Text => "TEXT",
            TokenKind::ExecuteStart => "EXECUTE_START",
            TokenKind::ExecuteEnd => "EXECUTE_END",
            TokenKind::PrintStart => "PRINT_START",
            TokenKind::PrintEnd => "PRINT_END",
            TokenKind::Name => "NAME",
            TokenKind::Number => "NUMBER",
            TokenKind::Long => "LONG",
            TokenKind::String => "STRING",
            TokenKind::Operator => "OPERATOR",
            TokenKind::Punctuation => "PUNCTUATION",
            TokenKind::StringInterpolationStart => "STRING_INTERPOLATION_START",
            TokenKind::StringInterpolationEnd => "STRING_INTERPOLATION_END",
            TokenKind::Eof => "EOF",
        };
        f.write_str(name)
    }
}

/// A lexed token.
///
/// `span` is the byte range of source the token was produced from. For text tokens
/// the value may be shorter than the span when whitespace control trimmed it, and
/// for string tokens the value is unescaped; every other token's value is exactly
/// `source[span]` (delimiter tokens include any newline they swallowed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: usize,
    pub span: Range<usize>,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, line: usize, span: Range<usize>) -> Self {
        Self {
            kind,
            value: value.into(),
            line,
            span,
        }
    }

    /// True if the token has the given kind.
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// True if the token has the given kind and value.
    pub fn is_value(&self, kind: TokenKind, value: &str) -> bool {
        self.kind == kind && self.value == value
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.value)
    }
}

/// A cursor over lexed tokens with single-token lookahead.
///
/// The stream always ends with an [`TokenKind::Eof`] token and the cursor never
/// moves past it.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    current: usize,
    filename: String,
}

impl TokenStream {
    pub fn new(mut tokens: Vec<Token>, filename: impl Into<String>) -> Self {
        if !tokens.last().is_some_and(|t| t.is(TokenKind::Eof)) {
            let (line, end) = tokens.last().map_or((1, 0), |t| (t.line, t.span.end));
            tokens.push(Token::new(TokenKind::Eof, "", line, end..end));
        }
        Self {
            tokens,
            current: 0,
            filename: filename.into(),
        }
    }

    /// The token under the cursor.
    pub fn current(&self) -> &Token {
        &self.tokens[self.current]
    }

    /// The token `n` positions ahead, clamped to end of input.
    pub fn peek(&self, n: usize) -> &Token {
        let index = (self.current + n).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    /// Consume the current token and return it.
    pub fn advance(&mut self) -> Token {
        let token = self.tokens[self.current].clone();
        if self.current + 1 < self.tokens.len() {
            self.current += 1;
        }
        token
    }

    /// Consume the current token if it has `kind`, otherwise fail.
    pub fn expect(&mut self, kind: TokenKind) -> Result<Token, CobbleError> {
        if self.current().is(kind) {
            return Ok(self.advance());
        }
        let token = self.current();
        Err(CobbleError::parse(
            format!(
                "Unexpected token of value \"{}\" and type {}, expected token of type {}",
                token.value, token.kind, kind
            ),
            &self.filename,
            token.line,
        ))
    }

    /// Consume the current token if it has `kind` and `value`, otherwise fail.
    pub fn expect_value(&mut self, kind: TokenKind, value: &str) -> Result<Token, CobbleError> {
        if self.current().is_value(kind, value) {
            return Ok(self.advance());
        }
        let token = self.current();
        Err(CobbleError::parse(
            format!(
                "Unexpected token of value \"{}\" and type {}, expected token \"{}\" of type {}",
                token.value, token.kind, value, kind
            ),
            &self.filename,
            token.line,
        ))
    }

    pub fn is_eof(&self) -> bool {
        self.current().is(TokenKind::Eof)
    }

    /// Name of the template the tokens came from.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Index of the current token.
    pub fn position(&self) -> usize {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> TokenStream {
        TokenStream::new(
            vec![
                Token::new(TokenKind::PrintStart, "{{", 1, 0..2),
                Token::new(TokenKind::Name, "user", 1, 3..7),
                Token::new(TokenKind::PrintEnd, "}}", 1, 8..10),
            ],
            "inline",
        )
    }

    #[test]
    fn test_appends_eof() {
        let stream = stream();
        assert_eq!(stream.tokens().len(), 4);
        assert!(stream.tokens()[3].is(TokenKind::Eof));
    }

    #[test]
    fn test_cursor_stops_at_eof() {
        let mut stream = stream();
        for _ in 0..10 {
            stream.advance();
        }
        assert!(stream.is_eof());
        assert!(stream.peek(5).is(TokenKind::Eof));
    }

    #[test]
    fn test_expect_reports_line_and_kind() {
        let mut stream = stream();
        let err = stream.expect(TokenKind::Name).err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("expected token of type NAME"), "got: {err}");
        assert!(stream.expect_value(TokenKind::PrintStart, "{{").is_ok());
        assert_eq!(stream.expect(TokenKind::Name).map(|t| t.value).ok().as_deref(), Some("user"));
    }
}
