use dirpg_types::LdapError;

/// Errors from repository operations.
///
/// Only [`StoreError::Conflict`] is transient; callers may replay the same
/// request after it. Every other variant is final for the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A concurrent writer touched the same rows.
    #[error("concurrent update conflict: {reason}")]
    Conflict { reason: String },

    /// The target entry (or a required parent) does not exist.
    #[error("no such entry: {dn}")]
    NoSuchObject { dn: String },

    /// An entry with this DN already exists.
    #[error("entry already exists: {dn}")]
    AlreadyExists { dn: String },

    /// The entry still has children.
    #[error("entry has children: {dn}")]
    NotAllowedOnNonLeaf { dn: String },

    /// A stored row cannot be decoded.
    #[error("corrupted row {dn}: {reason}")]
    Corrupted { dn: String, reason: String },

    /// The backend failed for a reason unrelated to the request.
    #[error("backend error: {0}")]
    Backend(String),

    /// A directory rule rejected the write.
    #[error(transparent)]
    Ldap(#[from] LdapError),
}

impl StoreError {
    /// Returns `true` if replaying the request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<StoreError> for LdapError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoSuchObject { dn } => LdapError::NoSuchObject { dn },
            StoreError::AlreadyExists { dn } => LdapError::EntryAlreadyExists { dn },
            StoreError::NotAllowedOnNonLeaf { dn } => LdapError::NotAllowedOnNonLeaf { dn },
            StoreError::Ldap(inner) => inner,
            StoreError::Corrupted { .. } | StoreError::Conflict { .. } => {
                LdapError::operations(err.to_string())
            }
            StoreError::Backend(reason) => LdapError::Protocol { reason },
        }
    }
}

/// Result alias for repository operations.
pub type StoreResult<T> = Result<T, StoreError>;
