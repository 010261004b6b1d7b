//! Integration test suite for cobble
//!
//! End-to-end tests that compile and render templates through the public API only.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! RUST_LOG=cobble=debug cargo test --test integration -- --nocapture
//! ```
//!
//! # Test Organization
//!
//! - **rendering**: printing, control flow, loops, escaping, whitespace control
//! - **inheritance**: extends, blocks, `parent()`, include, embed, evaluate_block
//! - **macros**: macro definitions, import, from-import, scoping
//! - **strictness**: strict vs lenient lookups, host object members, access policy
//! - **caching**: compute-once template and tag caches under concurrency
//! - **parallel**: `parallel` regions on a tokio runtime, output ordering
//! - **config**: TOML configuration and custom delimiters
//! - **errors**: error taxonomy, locations and reports

mod caching;
mod config;
mod errors;
mod inheritance;
mod macros;
mod parallel;
mod rendering;
mod strictness;
