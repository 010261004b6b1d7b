//! Declarative engine configuration.
//!
//! [`EngineConfig`] mirrors the knobs of [`EngineBuilder`](crate::EngineBuilder) that
//! can be expressed as data. Every field has a default, so a config file only needs
//! to mention what it changes:
//!
//! ```toml
//! strict_variables = true
//! max_rendered_size = 65536
//! auto_escaping = false
//!
//! [syntax]
//! print_open = "[["
//! print_close = "]]"
//! ```
//!
//! Collaborators that are not data (loader, extensions, executor, caches, access
//! validator) are supplied on the builder.

mod parser;

pub use parser::parse_config;

use std::path::Path;

use serde::Deserialize;

use crate::constants::{
    DEFAULT_COMMENT_CLOSE, DEFAULT_COMMENT_OPEN, DEFAULT_ESCAPING_STRATEGY,
    DEFAULT_EXECUTE_CLOSE, DEFAULT_EXECUTE_OPEN, DEFAULT_INTERPOLATION_CLOSE,
    DEFAULT_INTERPOLATION_OPEN, DEFAULT_LOCALE, DEFAULT_PRINT_CLOSE, DEFAULT_PRINT_OPEN,
    DEFAULT_WHITESPACE_TRIM, UNLIMITED_RENDERED_SIZE,
};
use crate::core::CobbleError;

/// Engine settings loadable from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Turn absent variables and attributes into errors instead of null
    pub strict_variables: bool,
    /// Locale used when a render does not name one
    pub default_locale: String,
    /// Character budget per render; negative disables it
    pub max_rendered_size: i64,
    /// Allow any numeric argument to match any numeric parameter when calling host methods
    pub greedy_match_method: bool,
    /// Disable the default member blacklist
    pub allow_unsafe_methods: bool,
    /// Cache compiled templates and `cache` tag output
    pub cache_active: bool,
    /// Swallow the newline directly after a closing delimiter
    pub new_line_trimming: bool,
    /// Escape print output unless marked safe
    pub auto_escaping: bool,
    /// Strategy used by autoescaping and the `escape` filter
    pub default_escaping_strategy: String,
    /// Parse unsuffixed integer literals as 32-bit instead of 64-bit
    pub literal_decimals_treated_as_integers: bool,
    /// Delimiter configuration
    pub syntax: SyntaxConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_variables: false,
            default_locale: DEFAULT_LOCALE.to_string(),
            max_rendered_size: UNLIMITED_RENDERED_SIZE,
            greedy_match_method: false,
            allow_unsafe_methods: false,
            cache_active: true,
            new_line_trimming: true,
            auto_escaping: true,
            default_escaping_strategy: DEFAULT_ESCAPING_STRATEGY.to_string(),
            literal_decimals_treated_as_integers: false,
            syntax: SyntaxConfig::default(),
        }
    }
}

/// Delimiter settings, the data behind [`Syntax`](crate::lexer::Syntax).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyntaxConfig {
    pub comment_open: String,
    pub comment_close: String,
    pub execute_open: String,
    pub execute_close: String,
    pub print_open: String,
    pub print_close: String,
    pub interpolation_open: String,
    pub interpolation_close: String,
    pub whitespace_trim: String,
}

impl Default for SyntaxConfig {
    fn default() -> Self {
        Self {
            comment_open: DEFAULT_COMMENT_OPEN.to_string(),
            comment_close: DEFAULT_COMMENT_CLOSE.to_string(),
            execute_open: DEFAULT_EXECUTE_OPEN.to_string(),
            execute_close: DEFAULT_EXECUTE_CLOSE.to_string(),
            print_open: DEFAULT_PRINT_OPEN.to_string(),
            print_close: DEFAULT_PRINT_CLOSE.to_string(),
            interpolation_open: DEFAULT_INTERPOLATION_OPEN.to_string(),
            interpolation_close: DEFAULT_INTERPOLATION_CLOSE.to_string(),
            whitespace_trim: DEFAULT_WHITESPACE_TRIM.to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, CobbleError> {
        toml::from_str(content).map_err(|e| CobbleError::Config {
            message: "Failed to parse engine configuration".to_string(),
            source: Some(anyhow::Error::new(e)),
        })
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, CobbleError> {
        parse_config(path).map_err(|e| CobbleError::Config {
            message: format!("Failed to load {}", path.display()),
            source: Some(e),
        })
    }
}
