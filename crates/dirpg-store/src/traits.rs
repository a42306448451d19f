use async_trait::async_trait;
use dirpg_entry::{AddEntry, ModifyEntry};
use dirpg_schema::{Dn, Rdn};

use crate::entry::{SearchQuery, StoredEntry};
use crate::error::StoreResult;

/// Persistence contract for directory entries.
///
/// All implementations must satisfy these invariants:
/// - Each call is atomic: it either applies completely or not at all.
/// - Entries are keyed by normalized DN.
/// - Back-references (`memberOf`) follow association attributes.
/// - Transient failures surface as [`StoreError::Conflict`](crate::StoreError::Conflict)
///   so callers can replay the request unchanged.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert a validated new entry.
    async fn insert(&self, entry: &AddEntry) -> StoreResult<StoredEntry>;

    /// Load an entry by DN. Returns `Ok(None)` if it does not exist.
    async fn find(&self, dn: &Dn) -> StoreResult<Option<StoredEntry>>;

    /// Persist a validated modification, including association changes.
    async fn update(&self, entry: &ModifyEntry) -> StoreResult<()>;

    /// Rename or move the entry at `old` (and its subtree) to `new`.
    ///
    /// When `old_rdn` is `Some`, the values of the old RDN stay on the entry
    /// as ordinary attributes; when `None`, they are removed.
    async fn update_dn(&self, old: &Dn, new: &Dn, old_rdn: Option<&Rdn>) -> StoreResult<()>;

    /// Delete a leaf entry.
    async fn delete(&self, dn: &Dn) -> StoreResult<()>;

    /// Entries in scope that match the compiled filter.
    async fn search(&self, query: &SearchQuery) -> StoreResult<Vec<StoredEntry>>;
}
