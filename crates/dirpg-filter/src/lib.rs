//! Search filters for dirpg.
//!
//! A filter arrives either as an RFC 4515 string or as an already-built
//! [`Filter`] tree. The [`FilterCompiler`] resolves every attribute through
//! the schema, normalizes assertion values with the attribute's matching
//! rule, and emits a predicate whose leaves reference positional JSON-path
//! parameters.
//!
//! # Key Types
//!
//! - [`Filter`] — Boolean filter expression tree
//! - [`FilterCompiler`] — Turns a filter into a [`CompiledFilter`]
//! - [`CompiledFilter`] — Predicate text plus ordered parameters
//! - [`FilterError`] — Parse failures, surfaced as protocol errors

pub mod ast;
pub mod compiler;
pub mod error;
pub mod parser;

pub use ast::Filter;
pub use compiler::{CompiledFilter, FilterCompiler, DEFAULT_COLUMN};
pub use error::{FilterError, FilterResult};
pub use parser::MAX_DEPTH;
