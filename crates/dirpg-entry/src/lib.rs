//! Entry models for dirpg.
//!
//! Each directory operation works on its own view of an entry:
//!
//! - [`AddEntry`] — a fresh entry seeded from its DN, validated before insert
//! - [`ModifyEntry`] — a stored entry rebuilt for add/replace/delete edits,
//!   tracking association pre-images for the store
//! - [`SearchEntry`] — a read-only projection of a stored row
//!
//! Entries never validate themselves between edits; callers call
//! `validate()` before handing an entry to the repository.

pub mod add;
pub mod modify;
pub mod search;

pub use add::AddEntry;
pub use modify::{Association, ModifyEntry};
pub use search::SearchEntry;

use std::collections::BTreeMap;

use dirpg_schema::{AttrKey, SchemaValue};
use serde_json::{Map, Value};

/// Original values keyed by attribute key display form (`cn`, `cn;lang-ja`).
pub type OrigAttrs = BTreeMap<String, Vec<String>>;

/// Split an attribute map into its normalized JSON document and its original
/// values, both keyed by [`AttrKey`] display form.
pub(crate) fn document(attrs: &BTreeMap<AttrKey, SchemaValue>) -> (Value, OrigAttrs) {
    let mut norm = Map::with_capacity(attrs.len());
    let mut orig = OrigAttrs::new();
    for (key, value) in attrs {
        norm.insert(key.to_string(), value.norm_json());
        orig.insert(key.to_string(), value.orig_strings());
    }
    (Value::Object(norm), orig)
}
