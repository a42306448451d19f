//! Read-only projection of a stored entry.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dirpg_schema::{AttrKey, AttributeType, Schema};

use crate::OrigAttrs;

/// Requesting no attributes at all.
pub const NO_ATTRIBUTES: &str = "1.1";
/// Requesting all user attributes.
pub const ALL_USER_ATTRIBUTES: &str = "*";
/// Requesting all operational attributes.
pub const ALL_OPERATIONAL_ATTRIBUTES: &str = "+";

/// One search result row.
///
/// Attribute names in the views returned here use the schema's canonical
/// spelling, e.g. `givenName;lang-ja`.
#[derive(Clone, Debug)]
pub struct SearchEntry {
    schema: Arc<Schema>,
    dn_orig: String,
    attrs: OrigAttrs,
}

impl SearchEntry {
    pub fn new(schema: Arc<Schema>, dn_orig: impl Into<String>, attrs: OrigAttrs) -> Self {
        Self {
            schema,
            dn_orig: dn_orig.into(),
            attrs,
        }
    }

    pub fn dn_orig(&self) -> &str {
        &self.dn_orig
    }

    /// The stored values keyed by attribute key.
    pub fn attrs_orig(&self) -> &OrigAttrs {
        &self.attrs
    }

    /// Look up an attribute by any spelling, with or without a language tag.
    /// Returns the canonical name and the values.
    pub fn get(&self, description: &str) -> Option<(String, &[String])> {
        let (at, lang) = self.schema.resolve(description).ok()?;
        let key = AttrKey::new(&at.name, lang.as_deref());
        let values = self.attrs.get(&key.to_string())?;
        Some((display_name(&at, &key), values.as_slice()))
    }

    /// Attributes whose type is not operational.
    pub fn user_attrs(&self) -> BTreeMap<String, Vec<String>> {
        self.partition(false)
    }

    /// Attributes whose type is operational.
    pub fn operational_attrs(&self) -> BTreeMap<String, Vec<String>> {
        self.partition(true)
    }

    /// Apply the attribute selection of a search request.
    ///
    /// - No names, or `*`: every user attribute
    /// - `+`: every operational attribute
    /// - An explicit name selects that attribute (and its tagged forms when
    ///   the name has no tag), operational or not
    /// - `1.1` on its own: nothing
    ///
    /// Attributes named in `hidden` are always dropped.
    pub fn project<S: AsRef<str>>(&self, requested: &[S], hidden: &[S]) -> BTreeMap<String, Vec<String>> {
        let requested: Vec<&str> = requested.iter().map(AsRef::as_ref).collect();
        let hidden: BTreeSet<String> = hidden
            .iter()
            .filter_map(|h| self.schema.attribute_type(h.as_ref()))
            .map(|at| at.name.to_lowercase())
            .collect();

        if requested == [NO_ATTRIBUTES] {
            return BTreeMap::new();
        }
        let all_user = requested.is_empty() || requested.contains(&ALL_USER_ATTRIBUTES);
        let all_operational = requested.contains(&ALL_OPERATIONAL_ATTRIBUTES);

        let mut explicit: BTreeSet<AttrKey> = BTreeSet::new();
        for name in &requested {
            if let Ok((at, lang)) = self.schema.resolve(name) {
                explicit.insert(AttrKey::new(&at.name, lang.as_deref()));
            }
        }

        let mut out = BTreeMap::new();
        for (raw_key, values) in &self.attrs {
            let Some((at, key)) = self.lookup(raw_key) else {
                continue;
            };
            if hidden.contains(key.name()) {
                continue;
            }
            let by_kind = if at.is_operational() {
                all_operational
            } else {
                all_user
            };
            if by_kind || explicit.contains(&key) || explicit.contains(&key.untagged()) {
                out.insert(display_name(&at, &key), values.clone());
            }
        }
        out
    }

    fn partition(&self, operational: bool) -> BTreeMap<String, Vec<String>> {
        self.attrs
            .iter()
            .filter_map(|(raw_key, values)| {
                let (at, key) = self.lookup(raw_key)?;
                (at.is_operational() == operational).then(|| (display_name(&at, &key), values.clone()))
            })
            .collect()
    }

    fn lookup(&self, raw_key: &str) -> Option<(Arc<AttributeType>, AttrKey)> {
        let key: AttrKey = raw_key.parse().ok()?;
        let at = self.schema.attribute_type(key.name())?;
        Some((Arc::clone(at), key))
    }
}

fn display_name(at: &AttributeType, key: &AttrKey) -> String {
    match key.lang() {
        Some(lang) => format!("{};{lang}", at.name),
        None => at.name.clone(),
    }
}
