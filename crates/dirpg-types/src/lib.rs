//! Foundation types for dirpg.
//!
//! Every other dirpg crate depends on `dirpg-types`. It carries the pieces of
//! vocabulary that are shared between the schema model, the entry models, the
//! filter compiler and the request handlers.
//!
//! # Key Types
//!
//! - [`LdapError`] — Discriminated error returned by every core operation
//! - [`ResultCode`] — Abstract result code surfaced to the protocol layer
//! - [`AttributeDescription`] — Attribute name with an optional language tag
//! - [`LanguageTags`] — Registry of accepted `lang-xx` codes
//! - [`Operation`] — Operation kinds consulted by the authorization checker
//! - [`SearchScope`] — Base, one-level, or subtree search scope

pub mod attribute;
pub mod error;
pub mod operation;

pub use attribute::{AttributeDescription, LanguageTags, DEFAULT_LANGUAGE_CODES};
pub use error::{LdapError, LdapResult, ResultCode};
pub use operation::{Operation, SearchScope};
