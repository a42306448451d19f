//! Rows returned by the repository and search requests sent to it.

use std::sync::Arc;

use dirpg_entry::{OrigAttrs, SearchEntry};
use dirpg_filter::CompiledFilter;
use dirpg_schema::{Dn, Schema};
use dirpg_types::SearchScope;
use serde_json::Value;
use uuid::Uuid;

/// One persisted entry.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredEntry {
    pub id: Uuid,
    pub dn: Dn,
    /// Normalized values keyed by attribute key; the predicate column.
    pub attrs_norm: Value,
    /// Original values keyed by attribute key.
    pub attrs_orig: OrigAttrs,
}

impl StoredEntry {
    pub fn dn_orig(&self) -> String {
        self.dn.to_string()
    }

    pub fn dn_norm(&self) -> String {
        self.dn.norm_string()
    }

    /// Read-only projection for search responses.
    pub fn to_search_entry(&self, schema: Arc<Schema>) -> SearchEntry {
        SearchEntry::new(schema, self.dn_orig(), self.attrs_orig.clone())
    }
}

/// A scoped, filtered search.
#[derive(Clone, Debug)]
pub struct SearchQuery {
    pub base: Dn,
    pub scope: SearchScope,
    pub filter: CompiledFilter,
    /// Maximum number of rows; `None` is unlimited.
    pub size_limit: Option<usize>,
}

impl SearchQuery {
    pub fn new(base: Dn, scope: SearchScope, filter: CompiledFilter) -> Self {
        Self {
            base,
            scope,
            filter,
            size_limit: None,
        }
    }

    pub fn with_size_limit(mut self, limit: usize) -> Self {
        self.size_limit = Some(limit);
        self
    }

    /// Returns `true` if `dn` falls inside the query's scope.
    pub fn in_scope(&self, dn: &Dn) -> bool {
        match self.scope {
            SearchScope::Base => *dn == self.base,
            SearchScope::OneLevel => dn.is_child_of(&self.base),
            SearchScope::Subtree => dn.is_within(&self.base),
        }
    }
}
