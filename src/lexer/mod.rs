//! Stateful tokenizer.
//!
//! The lexer walks the source once, keeping a stack of states and a stack of open
//! brackets:
//!
//! - **Data**: plain text up to the next start delimiter. Handles leading trim
//!   markers (`{{- `) and captures `{% verbatim %}` bodies without tokenizing them.
//! - **Execute** / **Print**: expression tokens until the close delimiter. The close
//!   delimiter only counts when no bracket is open, so `{{ {'a': 1} }}` works.
//! - **Comment**: skipped up to the comment close delimiter.
//! - **String**: the body of a double-quoted string that contains `#{`.
//! - **Interpolation**: expression tokens inside `#{ ... }`.
//!
//! Any bracket still open at end of input is a fatal [`CobbleError::Lex`].

mod syntax;
mod token;

pub use syntax::Syntax;
pub use token::{Token, TokenKind, TokenStream};

use std::sync::Arc;

use crate::core::CobbleError;

const PUNCTUATION: &str = "()[]{}?:.,|=";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    Execute,
    Print,
    Comment,
    Str,
    Interpolation,
}

/// Turns template source into a [`TokenStream`].
///
/// A lexer is cheap to share: it holds the engine's [`Syntax`] and the operator
/// symbols of the active extension registry, sorted longest first so `is not`
/// wins over `is`.
#[derive(Debug, Clone)]
pub struct Lexer {
    syntax: Arc<Syntax>,
    operators: Vec<String>,
}

impl Lexer {
    pub fn new<I, S>(syntax: Arc<Syntax>, operators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut operators: Vec<String> = operators.into_iter().map(Into::into).collect();
        operators.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        operators.dedup();
        Self {
            syntax,
            operators,
        }
    }

    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    /// Tokenize a whole template.
    ///
    /// # Errors
    ///
    /// [`CobbleError::Lex`] for an unclosed comment, string, bracket or verbatim tag,
    /// a mismatched closing bracket, or a character no rule accepts.
    pub fn tokenize(&self, source: &str, name: &str) -> Result<TokenStream, CobbleError> {
        tracing::trace!(target: "cobble::lexer", template = name, "tokenizing {} bytes", source.len());
        let mut run = LexRun {
            lexer: self,
            syntax: &self.syntax,
            source,
            name,
            pos: 0,
            line: 1,
            tokens: Vec::new(),
            states: vec![State::Data],
            brackets: Vec::new(),
            trim_next_text: false,
        };
        run.run()?;
        Ok(TokenStream::new(run.tokens, name))
    }
}

struct LexRun<'a> {
    lexer: &'a Lexer,
    syntax: &'a Syntax,
    source: &'a str,
    name: &'a str,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    states: Vec<State>,
    /// Open brackets with the line they were opened on
    brackets: Vec<(String, usize)>,
    trim_next_text: bool,
}

impl<'a> LexRun<'a> {
    fn run(&mut self) -> Result<(), CobbleError> {
        while self.pos < self.source.len() {
            match self.states.last().copied().unwrap_or(State::Data) {
                State::Data => self.data()?,
                State::Execute => self.between_delimiters(State::Execute)?,
                State::Print => self.between_delimiters(State::Print)?,
                State::Comment => self.comment()?,
                State::Str => self.string()?,
                State::Interpolation => self.interpolation()?,
            }
        }

        let end = self.source.len();
        self.tokens.push(Token::new(TokenKind::Eof, "", self.line, end..end));

        if let Some((bracket, line)) = self.brackets.pop() {
            return Err(CobbleError::lex(format!("Unclosed \"{}\"", bracket), self.name, line));
        }
        Ok(())
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn advance(&mut self, len: usize) {
        let consumed = &self.source[self.pos..self.pos + len];
        self.line += consumed.matches('\n').count();
        self.pos += len;
    }

    fn push(&mut self, kind: TokenKind, value: impl Into<String>, start: usize, line: usize) {
        let token = Token::new(kind, value, line, start..self.pos);
        tracing::trace!(target: "cobble::lexer", "pushing token {}", token);
        self.tokens.push(token);
    }

    fn data(&mut self) -> Result<(), CobbleError> {
        let start = self.pos;
        let line = self.line;
        let rest = self.rest();

        let (raw_len, delimiter) = match self.syntax.regex_start_delimiters.find(rest) {
            Some(m) => (m.start(), Some((m.as_str(), m.end()))),
            None => (rest.len(), None),
        };

        let mut text = &rest[..raw_len];
        if self.trim_next_text {
            text = text.trim_start();
            self.trim_next_text = false;
        }
        let text_index = if text.is_empty() {
            None
        } else {
            self.tokens.push(Token::new(TokenKind::Text, text, line, start..start + raw_len));
            Some(self.tokens.len() - 1)
        };

        let Some((delimiter, delimiter_end)) = delimiter else {
            self.advance(raw_len);
            return Ok(());
        };

        self.advance(raw_len);
        let delimiter_start = self.pos;
        let delimiter_line = self.line;
        self.advance(delimiter_end - raw_len);
        self.check_leading_trim(text_index);

        if delimiter == self.syntax.comment_open() {
            self.states.push(State::Comment);
        } else if delimiter == self.syntax.print_open() {
            self.push(TokenKind::PrintStart, delimiter, delimiter_start, delimiter_line);
            self.states.push(State::Print);
        } else if let Some(captures) = self.syntax.regex_verbatim_start.captures(self.rest()) {
            let trim_start = captures.get(1).is_some();
            let len = captures.get(0).map_or(0, |m| m.end());
            self.advance(len);
            self.verbatim(trim_start)?;
        } else {
            self.push(TokenKind::ExecuteStart, delimiter, delimiter_start, delimiter_line);
            self.states.push(State::Execute);
        }
        Ok(())
    }

    /// A trim marker right after an open delimiter right-trims the preceding text.
    fn check_leading_trim(&mut self, text_index: Option<usize>) {
        let Some(m) = self.syntax.regex_leading_whitespace_trim.find(self.rest()) else {
            return;
        };
        if let Some(index) = text_index {
            let trimmed = self.tokens[index].value.trim_end().to_string();
            if trimmed.is_empty() {
                self.tokens.remove(index);
            } else {
                self.tokens[index].value = trimmed;
            }
        }
        self.advance(m.end());
    }

    fn verbatim(&mut self, trim_start: bool) -> Result<(), CobbleError> {
        let start = self.pos;
        let line = self.line;
        let rest = self.rest();
        let Some(captures) = self.syntax.regex_verbatim_end.captures(rest) else {
            return Err(CobbleError::lex("Unclosed verbatim tag.", self.name, line));
        };
        let Some(whole) = captures.get(0) else {
            return Err(CobbleError::lex("Unclosed verbatim tag.", self.name, line));
        };

        let mut text = &rest[..whole.start()];
        if trim_start {
            text = text.trim_start();
        }
        if captures.get(1).is_some() {
            text = text.trim_end();
        }
        if captures.get(2).is_some() {
            self.trim_next_text = true;
        }

        let text = text.to_string();
        let body_end = start + whole.start();
        self.advance(whole.end());
        if !text.is_empty() {
            self.tokens.push(Token::new(TokenKind::Text, text, line, start..body_end));
        }
        Ok(())
    }

    fn skip_whitespace(&mut self) {
        let ws = self.rest().len() - self.rest().trim_start().len();
        self.advance(ws);
    }

    fn between_delimiters(&mut self, state: State) -> Result<(), CobbleError> {
        self.skip_whitespace();
        if self.syntax.regex_trailing_whitespace_trim.is_match(self.rest()) {
            self.trim_next_text = true;
        }

        let (close, kind, value) = if state == State::Execute {
            (&self.syntax.regex_execute_close, TokenKind::ExecuteEnd, self.syntax.execute_close())
        } else {
            (&self.syntax.regex_print_close, TokenKind::PrintEnd, self.syntax.print_close())
        };

        if self.brackets.is_empty() {
            if let Some(m) = close.find(self.rest()) {
                let start = self.pos;
                let line = self.line;
                self.advance(m.end());
                self.push(kind, value, start, line);
                self.states.pop();
                return Ok(());
            }
        }
        self.expression()
    }

    fn comment(&mut self) -> Result<(), CobbleError> {
        let rest = self.rest();
        let Some(m) = self.syntax.regex_comment_close.find(rest) else {
            return Err(CobbleError::lex("Unclosed comment.", self.name, self.line));
        };

        let body = &rest[..m.start()];
        if let Some(before_marker) = body.strip_suffix(self.syntax.whitespace_trim()) {
            if before_marker.ends_with(char::is_whitespace) {
                self.trim_next_text = true;
            }
        }

        self.advance(m.end());
        self.states.pop();
        Ok(())
    }

    fn interpolation(&mut self) -> Result<(), CobbleError> {
        self.skip_whitespace();
        let at_interpolation = self
            .brackets
            .last()
            .is_some_and(|(b, _)| b == self.syntax.interpolation_open());
        if at_interpolation {
            if let Some(m) = self.syntax.regex_interpolation_close.find(self.rest()) {
                let start = self.pos;
                let line = self.line;
                self.brackets.pop();
                self.advance(m.end());
                self.push(
                    TokenKind::StringInterpolationEnd,
                    self.syntax.interpolation_close(),
                    start,
                    line,
                );
                self.states.pop();
                return Ok(());
            }
        }
        self.expression()
    }

    /// Body of a double-quoted string that contains an interpolation.
    fn string(&mut self) -> Result<(), CobbleError> {
        let start = self.pos;
        let line = self.line;
        let rest = self.rest();
        let open = self.syntax.interpolation_open();

        if rest.starts_with(open) {
            self.brackets.push((open.to_string(), line));
            self.advance(open.len());
            self.push(TokenKind::StringInterpolationStart, open, start, line);
            self.states.push(State::Interpolation);
            return Ok(());
        }

        let mut len = 0;
        let mut escaped = false;
        for (i, c) in rest.char_indices() {
            if escaped {
                escaped = false;
                len = i + c.len_utf8();
                continue;
            }
            if c == '"' || rest[i..].starts_with(open) {
                break;
            }
            if c == '\\' {
                escaped = true;
            }
            len = i + c.len_utf8();
        }

        if len > 0 {
            let value = rest[..len].replace("\\\"", "\"");
            self.advance(len);
            self.push(TokenKind::String, value, start, line);
            return Ok(());
        }

        if rest.starts_with('"') {
            match self.brackets.pop() {
                Some((bracket, _)) if bracket == "\"" => {}
                Some((bracket, _)) => {
                    return Err(CobbleError::lex(
                        format!("Unclosed \"{}\"", bracket),
                        self.name,
                        self.line,
                    ));
                }
                None => {
                    return Err(CobbleError::lex("Unexpected \"\"\"", self.name, self.line));
                }
            }
            self.advance(1);
            self.states.pop();
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<(), CobbleError> {
        self.skip_whitespace();

        let rest = self.rest();
        if rest.is_empty() {
            return Ok(());
        }
        let start = self.pos;
        let line = self.line;

        if let Some(op) = self.match_operator(rest) {
            self.advance(op.len());
            self.push(TokenKind::Operator, op, start, line);
            return Ok(());
        }

        if let Some(m) = self.syntax.regex_identifier.find(rest) {
            self.advance(m.end());
            self.push(TokenKind::Name, m.as_str(), start, line);
            return Ok(());
        }

        if let Some(m) = self.syntax.regex_long.find(rest) {
            let digits = &m.as_str()[..m.end() - 1];
            self.advance(m.end());
            self.push(TokenKind::Long, digits, start, line);
            return Ok(());
        }

        if let Some(m) = self.syntax.regex_number.find(rest) {
            self.advance(m.end());
            self.push(TokenKind::Number, m.as_str(), start, line);
            return Ok(());
        }

        let Some(c) = rest.chars().next() else {
            return Ok(());
        };

        if PUNCTUATION.contains(c) {
            self.punctuation(c)?;
            self.advance(c.len_utf8());
            self.push(TokenKind::Punctuation, c.to_string(), start, line);
            return Ok(());
        }

        if let Some(captures) = self.syntax.regex_string_plain.captures(rest) {
            let len = captures.get(0).map_or(0, |m| m.end());
            let value = match (captures.get(1), captures.get(2)) {
                (Some(body), _) => body.as_str().replace("\\\"", "\""),
                (None, Some(body)) => body.as_str().replace("\\'", "'"),
                (None, None) => String::new(),
            };
            self.advance(len);
            self.push(TokenKind::String, value, start, line);
            return Ok(());
        }

        if c == '"' {
            self.brackets.push(("\"".to_string(), line));
            self.advance(1);
            self.states.push(State::Str);
            return Ok(());
        }

        Err(CobbleError::lex(format!("Unexpected character [{}]", c), self.name, line))
    }

    /// Longest operator at the head of `rest`; an operator ending in a letter may not
    /// be the start of a longer identifier.
    fn match_operator(&self, rest: &str) -> Option<&'a str> {
        self.lexer.operators.iter().map(String::as_str).find(|op| {
            if !rest.starts_with(op) {
                return false;
            }
            let ends_alpha = op.chars().last().is_some_and(char::is_alphabetic);
            if !ends_alpha {
                return true;
            }
            // last word of the operator, e.g. `not` in `is not`
            let word = op.rfind(char::is_whitespace).map_or(0, |i| i + 1);
            let identifier = self.syntax.regex_identifier.find(&rest[word..]).map_or(0, |m| m.end());
            identifier <= op.len() - word
        })
    }

    fn punctuation(&mut self, c: char) -> Result<(), CobbleError> {
        match c {
            '(' | '[' | '{' => {
                self.brackets.push((c.to_string(), self.line));
            }
            ')' | ']' | '}' => {
                let Some((open, _)) = self.brackets.pop() else {
                    return Err(CobbleError::lex(format!("Unexpected \"{}\"", c), self.name, self.line));
                };
                let expected = match open.as_str() {
                    "(" => ")",
                    "[" => "]",
                    "{" => "}",
                    other => other,
                };
                if !expected.starts_with(c) || expected.len() != 1 {
                    return Err(CobbleError::lex(
                        format!("Unclosed \"{}\"", expected),
                        self.name,
                        self.line,
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }
}
