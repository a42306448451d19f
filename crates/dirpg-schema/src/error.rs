//! Error types for schema loading.

use thiserror::Error;

/// Errors raised while parsing or assembling schema definitions.
///
/// Value and DN failures during request handling are reported as
/// [`dirpg_types::LdapError`]; this type only covers the load path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// An RFC 4512 definition string could not be parsed.
    #[error("invalid schema definition: {reason}: {definition}")]
    Parse { definition: String, reason: String },

    /// An attribute type names a superior that is not defined.
    #[error("attribute type {name}: unknown superior {sup}")]
    UnknownSuperiorType { name: String, sup: String },

    /// An object class names a superclass that is not defined.
    #[error("object class {name}: unknown superclass {sup}")]
    UnknownSuperclass { name: String, sup: String },

    /// An object class lists an attribute that is not defined.
    #[error("object class {class}: unknown attribute {attr}")]
    UnknownAttribute { class: String, attr: String },

    /// The superior chain loops back on itself.
    #[error("inheritance cycle at {name}")]
    InheritanceCycle { name: String },

    /// An association attribute is not a DN-valued attribute type.
    #[error("association attribute {name} must have DN syntax")]
    InvalidAssociation { name: String },
}

/// Convenience type alias for schema loading.
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;
