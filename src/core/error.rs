//! Error handling for cobble
//!
//! Every failure the engine can produce is a variant of [`CobbleError`]. The
//! variants follow the phase that raised them:
//!
//! - **Compilation**: [`CobbleError::Lex`], [`CobbleError::Parse`]
//! - **Evaluation**: [`CobbleError::AttributeNotFound`], [`CobbleError::AccessDenied`],
//!   [`CobbleError::Render`], [`CobbleError::OutputBudgetExceeded`]
//! - **Collaborators**: [`CobbleError::TemplateNotFound`], [`CobbleError::Config`]
//! - **Output**: [`CobbleError::WriterClosed`], [`CobbleError::Write`]
//!
//! Compilation and evaluation errors carry an [`ErrorLocation`] naming the template
//! and line. Filters, functions and other collaborators report failures through
//! `anyhow`; the evaluator wraps those into [`CobbleError::Render`] unless the
//! failure already is a `CobbleError`, in which case it is propagated untouched.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cobble::{CobbleError, Engine, MemoryLoader};
//!
//! # fn main() -> cobble::Result<()> {
//! let engine = Engine::builder()
//!     .loader(MemoryLoader::new().with_template("page", "{{ missing }}"))
//!     .strict_variables(true)
//!     .build()?;
//!
//! match engine.get_template("page").and_then(|t| t.render(Default::default())) {
//!     Err(err @ CobbleError::AttributeNotFound { .. }) => {
//!         eprintln!("{}", err.format_with_context());
//!     }
//!     other => println!("{other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;

use strsim::levenshtein;
use thiserror::Error;

use crate::constants::{MAX_SUGGESTIONS, SIMILARITY_THRESHOLD_PERCENT};

/// Where in a template an error was raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLocation {
    /// Name of the template being compiled or rendered
    pub template: Option<String>,
    /// 1-based line number if known
    pub line: Option<usize>,
}

impl ErrorLocation {
    /// Location inside a named template at a specific line.
    pub fn new(template: impl Into<String>, line: usize) -> Self {
        Self {
            template: Some(template.into()),
            line: Some(line),
        }
    }

    /// Location known only by template name.
    pub fn template(template: impl Into<String>) -> Self {
        Self {
            template: Some(template.into()),
            line: None,
        }
    }

    /// Location with no information, used by collaborators outside a template.
    pub fn unknown() -> Self {
        Self::default()
    }
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.template, self.line) {
            (Some(template), Some(line)) => write!(f, "{template}:{line}"),
            (Some(template), None) => write!(f, "{template}"),
            (None, Some(line)) => write!(f, "line {line}"),
            (None, None) => write!(f, "unknown location"),
        }
    }
}

/// The error type for every fallible cobble operation.
#[derive(Error, Debug)]
pub enum CobbleError {
    /// The lexer hit an unterminated construct or an unexpected character.
    ///
    /// Lexing errors are fatal and abort compilation of the template.
    #[error("{message} ({location})")]
    Lex {
        /// Human readable description, e.g. `Unclosed "("`
        message: String,
        /// Template and line of the offending input
        location: Box<ErrorLocation>,
    },

    /// The parser hit an unexpected token, an unknown tag, malformed arguments or a
    /// reserved word used as a variable name.
    #[error("{message} ({location})")]
    Parse {
        /// Human readable description
        message: String,
        /// Template and line of the offending token
        location: Box<ErrorLocation>,
    },

    /// A variable, attribute or index is absent and strict variables are enabled.
    ///
    /// In non-strict mode the same lookups silently evaluate to null.
    #[error("{message} ({location})")]
    AttributeNotFound {
        /// The attribute or root variable that could not be resolved
        attribute: String,
        /// Human readable description
        message: String,
        /// Similar names visible at the failure site
        suggestions: Box<Vec<String>>,
        /// Template and line of the lookup
        location: Box<ErrorLocation>,
    },

    /// The access policy forbids the resolved member.
    #[error("Access to [{member}] of [{type_name}] is forbidden ({location})")]
    AccessDenied {
        /// Method or field name
        member: String,
        /// Host type the member belongs to
        type_name: String,
        /// Template and line of the access
        location: Box<ErrorLocation>,
    },

    /// A filter, function, test, macro, or included template failed while rendering.
    #[error("{message} ({location})")]
    Render {
        /// Human readable description
        message: String,
        /// Template and line of the failing node
        location: Box<ErrorLocation>,
        /// The underlying collaborator failure, if any
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The accumulated output of one render crossed the configured maximum.
    #[error("Tried to write more than {limit} chars.")]
    OutputBudgetExceeded {
        /// The configured maximum number of characters
        limit: usize,
    },

    /// No loader in the chain could provide the named template.
    #[error("Unable to find template \"{name}\"")]
    TemplateNotFound {
        /// Template name as requested (after relative path resolution)
        name: String,
    },

    /// Engine configuration could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem
        message: String,
        /// Underlying I/O or TOML failure
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A write reached an output sink after it was closed.
    #[error("Writer is closed")]
    WriterClosed,

    /// The caller supplied sink refused a write.
    #[error("Could not write rendered output: {0}")]
    Write(#[from] fmt::Error),
}

impl CobbleError {
    /// Lexing failure in `template` at `line`.
    pub fn lex(message: impl Into<String>, template: &str, line: usize) -> Self {
        CobbleError::Lex {
            message: message.into(),
            location: Box::new(ErrorLocation::new(template, line)),
        }
    }

    /// Parsing failure in `template` at `line`.
    pub fn parse(message: impl Into<String>, template: &str, line: usize) -> Self {
        CobbleError::Parse {
            message: message.into(),
            location: Box::new(ErrorLocation::new(template, line)),
        }
    }

    /// Render failure without an underlying cause.
    pub fn render(message: impl Into<String>, template: &str, line: usize) -> Self {
        CobbleError::Render {
            message: message.into(),
            location: Box::new(ErrorLocation::new(template, line)),
            source: None,
        }
    }

    /// Render failure caused by a collaborator.
    ///
    /// If `source` already carries a `CobbleError` it is returned as-is so nested
    /// renders do not stack wrappers.
    pub fn wrap(
        source: anyhow::Error,
        message: impl Into<String>,
        template: &str,
        line: usize,
    ) -> Self {
        match source.downcast::<CobbleError>() {
            Ok(inner) => inner,
            Err(source) => CobbleError::Render {
                message: message.into(),
                location: Box::new(ErrorLocation::new(template, line)),
                source: Some(source),
            },
        }
    }

    /// Strict-mode lookup failure, with suggestions drawn from `available`.
    pub fn attribute_not_found(
        attribute: impl Into<String>,
        message: impl Into<String>,
        available: &[String],
        template: &str,
        line: usize,
    ) -> Self {
        let attribute = attribute.into();
        let suggestions = find_similar(&attribute, available);
        CobbleError::AttributeNotFound {
            attribute,
            message: message.into(),
            suggestions: Box::new(suggestions),
            location: Box::new(ErrorLocation::new(template, line)),
        }
    }

    /// The location attached to this error, if the variant carries one.
    pub fn location(&self) -> Option<&ErrorLocation> {
        match self {
            CobbleError::Lex {
                location,
                ..
            }
            | CobbleError::Parse {
                location,
                ..
            }
            | CobbleError::AttributeNotFound {
                location,
                ..
            }
            | CobbleError::AccessDenied {
                location,
                ..
            }
            | CobbleError::Render {
                location,
                ..
            } => Some(location),
            _ => None,
        }
    }

    /// Line number of the failure, if known.
    pub fn line(&self) -> Option<usize> {
        self.location().and_then(|l| l.line)
    }

    /// Whether this is a strict-mode missing attribute/variable error.
    pub fn is_attribute_not_found(&self) -> bool {
        matches!(self, CobbleError::AttributeNotFound { .. })
    }

    /// Generate a user-friendly, multi-line report with location and suggestions.
    pub fn format_with_context(&self) -> String {
        let mut msg = String::new();

        let header = match self {
            CobbleError::Lex { .. } => "Template Syntax Error",
            CobbleError::Parse { .. } => "Template Parse Error",
            CobbleError::AttributeNotFound { .. } => "Template Variable Not Found",
            CobbleError::AccessDenied { .. } => "Template Access Denied",
            CobbleError::Render { .. } => "Template Render Error",
            CobbleError::OutputBudgetExceeded { .. } => "Template Output Too Large",
            CobbleError::TemplateNotFound { .. } => "Template Not Found",
            CobbleError::Config { .. } => "Engine Configuration Error",
            CobbleError::WriterClosed | CobbleError::Write(_) => "Template Output Error",
        };
        msg.push_str(&format!("ERROR: {}\n\n", header));

        let detail = match self {
            CobbleError::Lex {
                message,
                ..
            }
            | CobbleError::Parse {
                message,
                ..
            }
            | CobbleError::AttributeNotFound {
                message,
                ..
            }
            | CobbleError::Render {
                message,
                ..
            } => message.clone(),
            other => other.to_string(),
        };
        msg.push_str(&format!("{}\n", detail));

        if let Some(location) = self.location() {
            if let Some(template) = &location.template {
                msg.push_str(&format!("Template: {}\n", template));
            }
            if let Some(line) = location.line {
                msg.push_str(&format!("Line: {}\n", line));
            }
        }

        if let CobbleError::AttributeNotFound {
            suggestions,
            ..
        } = self
        {
            if !suggestions.is_empty() {
                msg.push_str("\nDid you mean:\n");
                for suggestion in suggestions.iter() {
                    msg.push_str(&format!("  - {}\n", suggestion));
                }
            }
        }

        if let CobbleError::Render {
            source: Some(source),
            ..
        } = self
        {
            msg.push_str(&format!("\nCaused by: {:#}\n", source));
        }

        msg
    }
}

/// Find names in `available` close to `target`, closest first.
pub(crate) fn find_similar(target: &str, available: &[String]) -> Vec<String> {
    let mut scored: Vec<_> = available
        .iter()
        .filter(|candidate| candidate.as_str() != target)
        .map(|candidate| (candidate.clone(), levenshtein(target, candidate)))
        .collect();

    scored.sort_by(|(a, da), (b, db)| da.cmp(db).then_with(|| a.cmp(b)));

    scored
        .into_iter()
        .filter(|(_, dist)| *dist <= target.chars().count() * SIMILARITY_THRESHOLD_PERCENT / 100)
        .take(MAX_SUGGESTIONS)
        .map(|(name, _)| name)
        .collect()
}
