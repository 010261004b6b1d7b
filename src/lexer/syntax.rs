//! Delimiter configuration and the patterns derived from it.

use regex::Regex;

use crate::config::SyntaxConfig;
use crate::core::CobbleError;

/// Newline variants swallowed after a closing delimiter when newline trimming is on.
const POSSIBLE_NEW_LINE: &str = "(?:\r\n|\n\r|\r|\n|\u{0085}|\u{2028}|\u{2029})?";

/// Immutable delimiter configuration shared by every parse of an engine.
///
/// Built once from a [`SyntaxConfig`]; the match patterns are compiled up front so
/// lexing never compiles a regex.
#[derive(Debug, Clone)]
pub struct Syntax {
    comment_open: String,
    comment_close: String,
    execute_open: String,
    execute_close: String,
    print_open: String,
    print_close: String,
    interpolation_open: String,
    interpolation_close: String,
    whitespace_trim: String,
    new_line_trimming: bool,

    pub(crate) regex_print_close: Regex,
    pub(crate) regex_execute_close: Regex,
    pub(crate) regex_comment_close: Regex,
    pub(crate) regex_start_delimiters: Regex,
    pub(crate) regex_leading_whitespace_trim: Regex,
    pub(crate) regex_trailing_whitespace_trim: Regex,
    pub(crate) regex_verbatim_start: Regex,
    pub(crate) regex_verbatim_end: Regex,
    pub(crate) regex_interpolation_close: Regex,
    pub(crate) regex_identifier: Regex,
    pub(crate) regex_long: Regex,
    pub(crate) regex_number: Regex,
    pub(crate) regex_string_plain: Regex,
}

impl Syntax {
    /// Compile the patterns for a delimiter configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CobbleError::Config`] if a delimiter is empty.
    pub fn new(config: &SyntaxConfig, new_line_trimming: bool) -> Result<Self, CobbleError> {
        let delimiters = [
            ("comment_open", &config.comment_open),
            ("comment_close", &config.comment_close),
            ("execute_open", &config.execute_open),
            ("execute_close", &config.execute_close),
            ("print_open", &config.print_open),
            ("print_close", &config.print_close),
            ("interpolation_open", &config.interpolation_open),
            ("interpolation_close", &config.interpolation_close),
            ("whitespace_trim", &config.whitespace_trim),
        ];
        if let Some((name, _)) = delimiters.iter().find(|(_, value)| value.is_empty()) {
            return Err(CobbleError::Config {
                message: format!("Delimiter '{}' must not be empty", name),
                source: None,
            });
        }

        let nl = if new_line_trimming {
            POSSIBLE_NEW_LINE
        } else {
            ""
        };
        let trim = regex::escape(&config.whitespace_trim);
        let print_close = regex::escape(&config.print_close);
        let execute_close = regex::escape(&config.execute_close);
        let comment_close = regex::escape(&config.comment_close);
        let execute_open = regex::escape(&config.execute_open);

        Ok(Self {
            regex_print_close: compile(&format!(r"^\s*(?:{trim})?{print_close}{nl}"))?,
            regex_execute_close: compile(&format!(r"^\s*(?:{trim})?{execute_close}{nl}"))?,
            regex_comment_close: compile(&format!(r"{comment_close}{nl}"))?,
            regex_start_delimiters: compile(&format!(
                "{}|{}|{}",
                regex::escape(&config.print_open),
                execute_open,
                regex::escape(&config.comment_open)
            ))?,
            regex_leading_whitespace_trim: compile(&format!(r"^{trim}\s+"))?,
            regex_trailing_whitespace_trim: compile(&format!(
                r"^\s*{trim}(?:{print_close}|{execute_close}|{comment_close})"
            ))?,
            regex_verbatim_start: compile(&format!(
                r"^\s*verbatim\s*({trim})?{execute_close}{nl}"
            ))?,
            regex_verbatim_end: compile(&format!(
                r"{execute_open}({trim})?\s*endverbatim\s*({trim})?{execute_close}{nl}"
            ))?,
            regex_interpolation_close: compile(&format!(
                r"^\s*{}",
                regex::escape(&config.interpolation_close)
            ))?,
            regex_identifier: compile(r"^[\p{L}_][\p{L}\p{Nd}_]*")?,
            regex_long: compile(r"^[0-9]+L")?,
            regex_number: compile(r"^[0-9]+(?:\.[0-9]+)?")?,
            regex_string_plain: compile(
                r#"(?s)^"([^#"\\]*(?:\\.[^#"\\]*)*)"|^'([^'\\]*(?:\\.[^'\\]*)*)'"#,
            )?,
            comment_open: config.comment_open.clone(),
            comment_close: config.comment_close.clone(),
            execute_open: config.execute_open.clone(),
            execute_close: config.execute_close.clone(),
            print_open: config.print_open.clone(),
            print_close: config.print_close.clone(),
            interpolation_open: config.interpolation_open.clone(),
            interpolation_close: config.interpolation_close.clone(),
            whitespace_trim: config.whitespace_trim.clone(),
            new_line_trimming,
        })
    }

    /// The default delimiters with newline trimming enabled.
    pub fn standard() -> Result<Self, CobbleError> {
        Self::new(&SyntaxConfig::default(), true)
    }

    pub fn comment_open(&self) -> &str {
        &self.comment_open
    }

    pub fn comment_close(&self) -> &str {
        &self.comment_close
    }

    pub fn execute_open(&self) -> &str {
        &self.execute_open
    }

    pub fn execute_close(&self) -> &str {
        &self.execute_close
    }

    pub fn print_open(&self) -> &str {
        &self.print_open
    }

    pub fn print_close(&self) -> &str {
        &self.print_close
    }

    pub fn interpolation_open(&self) -> &str {
        &self.interpolation_open
    }

    pub fn interpolation_close(&self) -> &str {
        &self.interpolation_close
    }

    pub fn whitespace_trim(&self) -> &str {
        &self.whitespace_trim
    }

    pub fn is_new_line_trimming(&self) -> bool {
        self.new_line_trimming
    }
}

fn compile(pattern: &str) -> Result<Regex, CobbleError> {
    Regex::new(pattern).map_err(|e| CobbleError::Config {
        message: format!("Invalid delimiter pattern: {}", pattern),
        source: Some(anyhow::Error::new(e)),
    })
}
