//! Error types for filter parsing.

use dirpg_types::LdapError;
use thiserror::Error;

/// Errors raised while parsing an RFC 4515 filter string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Malformed filter text at a byte offset.
    #[error("invalid filter at {position}: {reason}")]
    Syntax { position: usize, reason: String },

    /// The input ended inside a filter.
    #[error("unexpected end of filter")]
    UnexpectedEnd,

    /// Text remained after a complete filter.
    #[error("trailing input after filter at {position}")]
    TrailingInput { position: usize },

    /// Nesting goes past [`MAX_DEPTH`](crate::parser::MAX_DEPTH).
    #[error("filter nested deeper than {limit} levels")]
    TooDeep { limit: usize },

    /// A valid but unsupported construct, such as extensible match.
    #[error("unsupported filter: {what}")]
    Unsupported { what: String },
}

impl From<FilterError> for LdapError {
    fn from(err: FilterError) -> Self {
        LdapError::Protocol {
            reason: err.to_string(),
        }
    }
}

/// Convenience type alias for filter parsing.
pub type FilterResult<T> = std::result::Result<T, FilterError>;
