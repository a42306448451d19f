//! Entry storage for dirpg.
//!
//! The directory core talks to storage only through the [`Repository`]
//! trait. Entries are persisted as two documents keyed by attribute key: the
//! original values returned to clients and the normalized values that
//! compiled search predicates run against.
//!
//! # Backends
//!
//! - [`InMemoryRepository`] -- table-per-process store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Every repository call is atomic.
//! 2. Only [`StoreError::Conflict`] is transient; callers may replay on it.
//! 3. The store maintains `entryUUID`, timestamps, `hasSubordinates` and
//!    `memberOf`; clients never write them.
//! 4. Renaming an entry moves its whole subtree and rewrites references.

pub mod entry;
pub mod error;
pub mod memory;
pub mod predicate;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use entry::{SearchQuery, StoredEntry};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryRepository;
pub use predicate::Predicate;
pub use traits::Repository;
