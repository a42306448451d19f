//! Schema model for dirpg.
//!
//! The schema is loaded once from RFC 4512 definitions and then shared
//! read-only by every request. It decides how attribute values are
//! normalized, which attributes an entry must carry, and how distinguished
//! names compare.
//!
//! # Key Types
//!
//! - [`Schema`] — Resolved attribute types and object classes
//! - [`SchemaBuilder`] — Loads built-in and custom definitions
//! - [`SchemaValue`] — One attribute's values on one entry, original and normalized
//! - [`AttrKey`] — Attribute name plus optional language tag
//! - [`Dn`] / [`Rdn`] — Distinguished names with canonical comparison

pub mod attribute;
pub mod builtin;
pub mod dn;
pub mod error;
pub mod object_class;
pub mod parser;
pub mod schema;
pub mod syntax;
pub mod value;

pub use attribute::{AttributeType, AttributeUsage};
pub use dn::{Dn, Rdn, RdnComponent};
pub use error::{SchemaError, SchemaResult};
pub use object_class::{ObjectClass, ObjectClassKind};
pub use schema::{Schema, SchemaBuilder};
pub use syntax::MatchingRule;
pub use value::{AttrKey, SchemaValue, OBJECT_CLASS};
