//! Core types shared by every phase of the engine.
//!
//! Currently this is the error model: [`CobbleError`] and the [`ErrorLocation`]
//! it carries. See [`error`] for how collaborator failures are wrapped.

pub mod error;

pub use error::{CobbleError, ErrorLocation};
