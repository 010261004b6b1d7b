//! cobble - a Pebble-style text templating engine
//!
//! Templates are plain text with three kinds of embedded regions: `{{ expression }}`
//! prints a value, `{% tag %}` runs a statement and `{# ... #}` is a comment. A
//! template is compiled once (lexer, then parser) into an immutable node tree,
//! cached, and evaluated any number of times, concurrently, against caller-supplied
//! variables.
//!
//! # Architecture Overview
//!
//! ```text
//! Loader ──source──▶ Lexer ──tokens──▶ Parser ──tree──▶ Template ──render──▶ OrderedWriter
//!                      ▲                 ▲                  │
//!                   Syntax        ExtensionRegistry   EvaluationContext
//!                                (filters, tests,      (scopes, hierarchy,
//!                                 functions, ops)       imports, budget)
//! ```
//!
//! ## Key Features
//!
//! - **Inheritance**: `extends` / `block` / `parent()`, resolved most-derived first
//! - **Reuse**: `include`, `embed`, `macro`, `import`, `from ... import`
//! - **Extensibility**: filters, tests, functions and operators through [`extension`]
//! - **Host objects**: member access through registered accessor tables ([`value`])
//! - **Safety**: autoescaping decided at compile time, member access policy, output budget
//! - **Concurrency**: at-most-once template and `cache` tag computation, `parallel`
//!   regions rendered on an [`Executor`] while output keeps document order
//!
//! # Core Modules
//!
//! - [`engine`] - [`Engine`] and [`EngineBuilder`], the compile pipeline
//! - [`lexer`] - delimiter-driven tokenizer
//! - [`parser`] - tag dispatch and precedence-climbing expressions
//! - [`node`] - the compiled tree
//! - [`render`] - evaluation, scopes, inheritance hierarchy, `for` iteration
//! - [`attributes`] - `a.b` / `a[b]` / `a.b()` resolver chain
//! - [`cache`] - compute-once caches
//! - [`writer`] - ordered output with the render budget
//! - [`loader`] - template sources
//! - [`config`] - TOML engine configuration
//! - [`core`] - the error model
//!
//! # Example
//!
//! ```rust,no_run
//! use cobble::{Engine, MemoryLoader, Variables};
//!
//! # fn main() -> cobble::Result<()> {
//! let engine = Engine::builder()
//!     .loader(
//!         MemoryLoader::new()
//!             .with_template("base", "<h1>{% block title %}Default{% endblock %}</h1>")
//!             .with_template(
//!                 "list",
//!                 "{% extends \"base\" %}{% block title %}{% for i in items %}{{ i | upper }}{% endfor %}{% endblock %}",
//!             ),
//!     )
//!     .build()?;
//!
//! let output = engine.get_template("list")?.render(Variables::new().with("items", vec!["a", "b"]))?;
//! assert_eq!(output, "<h1>AB</h1>");
//! # Ok(())
//! # }
//! ```

pub mod attributes;
pub mod cache;
pub mod config;
pub mod constants;
pub mod core;
pub mod engine;
pub mod executor;
pub mod extension;
pub mod lexer;
pub mod loader;
pub mod node;
pub mod parser;
pub mod render;
pub mod template;
pub mod value;
pub mod writer;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::config::EngineConfig;
pub use crate::core::{CobbleError, ErrorLocation};
pub use crate::engine::{Engine, EngineBuilder};
pub use crate::executor::{Executor, ThreadExecutor};
pub use crate::loader::{DelegatingLoader, Loader, MemoryLoader, StringLoader};
pub use crate::template::{Template, Variables};
pub use crate::value::Value;

/// Result type of every fallible engine operation.
pub type Result<T> = std::result::Result<T, CobbleError>;
