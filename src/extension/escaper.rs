//! The `escape` and `raw` filters and the named escaping strategies behind them.
//!
//! Autoescaping is decided when a template is parsed: print nodes whose output is
//! not known to be safe are wrapped in the `escape` filter with the active strategy
//! name. At render time [`Value::SafeString`] input passes through untouched.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Result, bail};

use super::{Args, CallContext, Extension, Filter};
use crate::constants::DEFAULT_ESCAPING_STRATEGY;
use crate::value::Value;

/// Escapes text for one output context.
pub trait EscapingStrategy: Send + Sync {
    fn escape(&self, input: &str) -> String;
}

impl<F> EscapingStrategy for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn escape(&self, input: &str) -> String {
        self(input)
    }
}

/// Registers `escape` and `raw` with the built-in strategies `html`, `html_attr`,
/// `js`, `css` and `url_param`.
#[derive(Clone)]
pub struct EscaperExtension {
    default_strategy: String,
    strategies: HashMap<String, Arc<dyn EscapingStrategy>>,
}

impl Default for EscaperExtension {
    fn default() -> Self {
        Self::new(DEFAULT_ESCAPING_STRATEGY)
    }
}

impl EscaperExtension {
    pub fn new(default_strategy: impl Into<String>) -> Self {
        let mut strategies: HashMap<String, Arc<dyn EscapingStrategy>> = HashMap::new();
        strategies.insert("html".to_string(), Arc::new(html_text));
        strategies.insert("html_attr".to_string(), Arc::new(html_attribute));
        strategies.insert("js".to_string(), Arc::new(js_string));
        strategies.insert("css".to_string(), Arc::new(css_string));
        strategies.insert("url_param".to_string(), Arc::new(url_param));
        Self {
            default_strategy: default_strategy.into(),
            strategies,
        }
    }

    /// Add or replace a named strategy.
    pub fn with_strategy(mut self, name: impl Into<String>, strategy: Arc<dyn EscapingStrategy>) -> Self {
        self.strategies.insert(name.into(), strategy);
        self
    }

    pub fn default_strategy(&self) -> &str {
        &self.default_strategy
    }
}

impl Extension for EscaperExtension {
    fn filters(&self) -> Vec<(String, Arc<dyn Filter>)> {
        let escape: Arc<dyn Filter> = Arc::new(EscapeFilter {
            default_strategy: self.default_strategy.clone(),
            strategies: self.strategies.clone(),
        });
        let raw: Arc<dyn Filter> = Arc::new(RawFilter);
        vec![("escape".to_string(), escape), ("raw".to_string(), raw)]
    }
}

struct EscapeFilter {
    default_strategy: String,
    strategies: HashMap<String, Arc<dyn EscapingStrategy>>,
}

impl Filter for EscapeFilter {
    fn argument_names(&self) -> Option<Vec<String>> {
        Some(vec!["strategy".to_string()])
    }

    fn apply(&self, input: &Value, args: &Args, _: &CallContext<'_>) -> Result<Value> {
        if matches!(input, Value::Null | Value::SafeString(_)) {
            return Ok(input.clone());
        }
        let strategy = match args.get("strategy") {
            None | Some(Value::Null) => self.default_strategy.clone(),
            Some(name) => name.to_string(),
        };
        let Some(escaper) = self.strategies.get(&strategy) else {
            bail!("Unknown escaping strategy [{}]", strategy);
        };
        Ok(Value::safe(escaper.escape(&input.to_string())))
    }
}

struct RawFilter;

impl Filter for RawFilter {
    fn apply(&self, input: &Value, _: &Args, _: &CallContext<'_>) -> Result<Value> {
        Ok(match input {
            Value::Null | Value::SafeString(_) => input.clone(),
            other => Value::safe(other.to_string()),
        })
    }
}

fn html_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn html_attribute(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_alphanumeric() || matches!(c, ',' | '.' | '-' | '_') {
            out.push(c);
        } else {
            let _ = write!(out, "&#x{:X};", u32::from(c));
        }
    }
    out
}

fn js_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '/' => out.push_str("\\/"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() || matches!(c, '<' | '>' | '&') => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{:04X}", unit);
                }
            }
            c => out.push(c),
        }
    }
    out
}

fn css_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii_alphanumeric() || !c.is_ascii() {
            out.push(c);
        } else {
            let _ = write!(out, "\\{:X} ", u32::from(c));
        }
    }
    out
}

fn url_param(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{:02X}", byte);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTX: CallContext<'static> = CallContext {
        template: "test",
        line: 1,
        locale: "en",
        strict_variables: false,
    };

    fn escape(input: Value, strategy: Option<&str>) -> Result<Value> {
        let names = vec!["strategy".to_string()];
        let args = Args::bind(Some(&names), strategy.map(Value::from).into_iter().collect(), Vec::new())
            .map_err(anyhow::Error::msg)?;
        let filters = EscaperExtension::default().filters();
        let Some((_, filter)) = filters.iter().find(|(name, _)| name == "escape") else {
            bail!("escape filter missing");
        };
        filter.apply(&input, &args, &CTX)
    }

    #[test]
    fn test_html_escaping() -> Result<()> {
        assert_eq!(escape(Value::from("<a href='x'>&</a>"), None)?, Value::safe("&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;"));
        Ok(())
    }

    #[test]
    fn test_safe_and_null_pass_through() -> Result<()> {
        assert_eq!(escape(Value::safe("<b>"), None)?, Value::safe("<b>"));
        assert_eq!(escape(Value::Null, None)?, Value::Null);
        Ok(())
    }

    #[test]
    fn test_named_strategies() -> Result<()> {
        assert_eq!(escape(Value::from("a b&c"), Some("url_param"))?, Value::safe("a%20b%26c"));
        assert_eq!(escape(Value::from("it's"), Some("js"))?, Value::safe("it\\'s"));
        Ok(())
    }

    #[test]
    fn test_unknown_strategy() {
        let err = escape(Value::from("x"), Some("xml")).err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("Unknown escaping strategy [xml]"));
    }

    #[test]
    fn test_custom_strategy() -> Result<()> {
        let extension = EscaperExtension::new("shout")
            .with_strategy("shout", Arc::new(|s: &str| s.to_uppercase()));
        let filters = extension.filters();
        let Some((_, filter)) = filters.iter().find(|(name, _)| name == "escape") else {
            bail!("escape filter missing");
        };
        assert_eq!(filter.apply(&Value::from("hi"), &Args::default(), &CTX)?, Value::safe("HI"));
        Ok(())
    }
}
