use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result codes exposed upward through the protocol layer.
///
/// The numeric values follow RFC 4511; mapping them onto the wire is the
/// protocol layer's job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCode {
    Success,
    OperationsError,
    ProtocolError,
    ConstraintViolation,
    NoSuchAttribute,
    UndefinedAttributeType,
    AttributeOrValueExists,
    InvalidAttributeSyntax,
    NoSuchObject,
    InvalidDnSyntax,
    InvalidCredentials,
    InsufficientAccessRights,
    UnwillingToPerform,
    ObjectClassViolation,
    NotAllowedOnNonLeaf,
    NotAllowedOnRdn,
    EntryAlreadyExists,
    ObjectClassModsProhibited,
    Other,
}

impl ResultCode {
    /// The RFC 4511 numeric code.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Success => 0,
            Self::OperationsError => 1,
            Self::ProtocolError => 2,
            Self::NoSuchAttribute => 16,
            Self::UndefinedAttributeType => 17,
            Self::ConstraintViolation => 19,
            Self::AttributeOrValueExists => 20,
            Self::InvalidAttributeSyntax => 21,
            Self::NoSuchObject => 32,
            Self::InvalidDnSyntax => 34,
            Self::InvalidCredentials => 49,
            Self::InsufficientAccessRights => 50,
            Self::UnwillingToPerform => 53,
            Self::ObjectClassViolation => 65,
            Self::NotAllowedOnNonLeaf => 66,
            Self::NotAllowedOnRdn => 67,
            Self::EntryAlreadyExists => 68,
            Self::ObjectClassModsProhibited => 69,
            Self::Other => 80,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::OperationsError => "operationsError",
            Self::ProtocolError => "protocolError",
            Self::ConstraintViolation => "constraintViolation",
            Self::NoSuchAttribute => "noSuchAttribute",
            Self::UndefinedAttributeType => "undefinedAttributeType",
            Self::AttributeOrValueExists => "attributeOrValueExists",
            Self::InvalidAttributeSyntax => "invalidAttributeSyntax",
            Self::NoSuchObject => "noSuchObject",
            Self::InvalidDnSyntax => "invalidDNSyntax",
            Self::InvalidCredentials => "invalidCredentials",
            Self::InsufficientAccessRights => "insufficientAccessRights",
            Self::UnwillingToPerform => "unwillingToPerform",
            Self::ObjectClassViolation => "objectClassViolation",
            Self::NotAllowedOnNonLeaf => "notAllowedOnNonLeaf",
            Self::NotAllowedOnRdn => "notAllowedOnRDN",
            Self::EntryAlreadyExists => "entryAlreadyExists",
            Self::ObjectClassModsProhibited => "objectClassModsProhibited",
            Self::Other => "other",
        };
        write!(f, "{name} ({})", self.as_u16())
    }
}

/// Errors produced by the directory core.
///
/// Every variant is inspectable: callers decide how to respond by matching on
/// the variant or on [`LdapError::code`], never on the message text.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LdapError {
    /// The attribute name does not resolve in the schema.
    #[error("{name}: attribute type undefined")]
    UndefinedAttributeType { name: String },

    /// The attribute description (name plus options) is malformed.
    #[error("{name}: invalid attribute description: {reason}")]
    InvalidAttributeDescription { name: String, reason: String },

    /// A value failed normalization for the attribute's syntax.
    #[error("{attr}: value #{index} invalid per syntax")]
    InvalidAttributeSyntax { attr: String, index: usize },

    /// More than one value was supplied for a single-valued attribute.
    #[error("{attr}: multiple values provided")]
    MultipleValues { attr: String },

    /// The value is already present on the attribute.
    #[error("{attr}: value #{index} already exists")]
    AttributeOrValueExists { attr: String, index: usize },

    /// A client tried to write a no-user-modification attribute.
    #[error("{attr}: no user modification allowed")]
    NoUserModification { attr: String },

    /// The attribute to modify does not exist on the entry.
    #[error("{operation}: {attr}: no such attribute")]
    NoSuchAttribute { operation: String, attr: String },

    /// The entry violates its object class definitions.
    #[error("object class violation: {reason}")]
    ObjectClassViolation { reason: String },

    /// A structural object class change was attempted.
    #[error("structural object class modification from '{from}' to '{to}' not allowed")]
    ObjectClassModsProhibited { from: String, to: String },

    /// The modification would remove a naming (RDN) value.
    #[error("{attr}: cannot remove a value of the relative distinguished name")]
    NotAllowedOnRdn { attr: String },

    /// The DN or RDN text is malformed.
    #[error("invalid DN syntax: {dn}: {reason}")]
    InvalidDnSyntax { dn: String, reason: String },

    /// The target entry does not exist.
    #[error("no such object: {dn}")]
    NoSuchObject { dn: String },

    /// An entry with this DN already exists.
    #[error("entry already exists: {dn}")]
    EntryAlreadyExists { dn: String },

    /// The entry has children.
    #[error("operation not allowed on non-leaf: {dn}")]
    NotAllowedOnNonLeaf { dn: String },

    /// The authorization checker refused the operation.
    #[error("insufficient access: {operation} on {dn}")]
    InsufficientAccess { operation: String, dn: String },

    /// Bind credentials were rejected.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The server refuses to perform the request.
    #[error("unwilling to perform: {reason}")]
    UnwillingToPerform { reason: String },

    /// An internal invariant is broken (corrupted state).
    #[error("operations error: {reason}")]
    Operations { reason: String },

    /// Fallback for errors that fit no other class.
    #[error("protocol error: {reason}")]
    Protocol { reason: String },
}

impl LdapError {
    /// The result code surfaced for this error.
    pub fn code(&self) -> ResultCode {
        match self {
            Self::UndefinedAttributeType { .. } | Self::InvalidAttributeDescription { .. } => {
                ResultCode::UndefinedAttributeType
            }
            Self::InvalidAttributeSyntax { .. } => ResultCode::InvalidAttributeSyntax,
            Self::MultipleValues { .. } | Self::NoUserModification { .. } => {
                ResultCode::ConstraintViolation
            }
            Self::AttributeOrValueExists { .. } => ResultCode::AttributeOrValueExists,
            Self::NoSuchAttribute { .. } => ResultCode::NoSuchAttribute,
            Self::ObjectClassViolation { .. } => ResultCode::ObjectClassViolation,
            Self::ObjectClassModsProhibited { .. } => ResultCode::ObjectClassModsProhibited,
            Self::NotAllowedOnRdn { .. } => ResultCode::NotAllowedOnRdn,
            Self::InvalidDnSyntax { .. } => ResultCode::InvalidDnSyntax,
            Self::NoSuchObject { .. } => ResultCode::NoSuchObject,
            Self::EntryAlreadyExists { .. } => ResultCode::EntryAlreadyExists,
            Self::NotAllowedOnNonLeaf { .. } => ResultCode::NotAllowedOnNonLeaf,
            Self::InsufficientAccess { .. } => ResultCode::InsufficientAccessRights,
            Self::InvalidCredentials => ResultCode::InvalidCredentials,
            Self::UnwillingToPerform { .. } => ResultCode::UnwillingToPerform,
            Self::Operations { .. } => ResultCode::OperationsError,
            Self::Protocol { .. } => ResultCode::ProtocolError,
        }
    }

    /// Shorthand for an object class violation.
    pub fn object_class_violation(reason: impl Into<String>) -> Self {
        Self::ObjectClassViolation {
            reason: reason.into(),
        }
    }

    /// Shorthand for a DN syntax error.
    pub fn invalid_dn(dn: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDnSyntax {
            dn: dn.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an operations error.
    pub fn operations(reason: impl Into<String>) -> Self {
        Self::Operations {
            reason: reason.into(),
        }
    }
}

/// Convenience alias for directory operations.
pub type LdapResult<T> = Result<T, LdapError>;
