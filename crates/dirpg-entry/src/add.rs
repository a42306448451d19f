//! The entry built by an add request.

use std::collections::BTreeMap;
use std::sync::Arc;

use dirpg_schema::{AttrKey, Dn, Schema, SchemaValue, OBJECT_CLASS};
use dirpg_types::{LdapError, LdapResult};
use serde_json::Value;

use crate::{document, OrigAttrs};

/// A new entry on its way to the repository.
///
/// Created from a DN, which seeds the RDN attributes; filled with `add`;
/// checked with `validate`; then consumed by `Repository::insert`.
#[derive(Clone, Debug)]
pub struct AddEntry {
    schema: Arc<Schema>,
    dn: Dn,
    attrs: BTreeMap<AttrKey, SchemaValue>,
}

impl AddEntry {
    /// Create an entry and seed its RDN attributes as ordinary values.
    pub fn new(schema: Arc<Schema>, dn: Dn) -> LdapResult<Self> {
        let mut entry = Self {
            schema,
            dn,
            attrs: BTreeMap::new(),
        };
        let components = entry
            .dn
            .rdn()
            .map(|rdn| rdn.components().to_vec())
            .unwrap_or_default();
        for c in components {
            let value = SchemaValue::new(&entry.schema, c.attr(), &[c.orig()])?;
            entry.merge(value)?;
        }
        Ok(entry)
    }

    /// Append values to an attribute.
    ///
    /// An empty list is a no-op. Values equal to ones already present (such
    /// as those seeded from the RDN) are merged silently. A tagged attribute
    /// is stored under both its tagged and untagged key.
    pub fn add<S: AsRef<str>>(&mut self, description: &str, values: &[S]) -> LdapResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        let (attr, _) = self.schema.resolve(description)?;
        self.schema.ensure_writable(&attr)?;
        let value = SchemaValue::new(&self.schema, description, values)?;
        self.merge(value)
    }

    fn merge(&mut self, value: SchemaValue) -> LdapResult<()> {
        let mut staged = Vec::with_capacity(2);
        if value.lang().is_some() {
            staged.push(value.with_lang(None));
        }
        staged.push(value);

        let mut updates = Vec::with_capacity(staged.len());
        for v in staged {
            let key = v.key();
            let merged = match self.attrs.get(&key) {
                Some(current) => {
                    let mut current = current.clone();
                    current.merge(&v)?;
                    current
                }
                None => v,
            };
            updates.push((key, merged));
        }
        self.attrs.extend(updates);
        Ok(())
    }

    /// Check that the entry carries `objectClass` and satisfies its classes.
    pub fn validate(&self) -> LdapResult<()> {
        let oc = self
            .attrs
            .get(&AttrKey::plain(OBJECT_CLASS))
            .filter(|v| !v.is_empty())
            .ok_or_else(|| LdapError::object_class_violation("objectClass is required"))?;
        self.schema.validate_object_class(oc, &self.attrs)
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn parent_dn(&self) -> Option<Dn> {
        self.dn.parent()
    }

    pub fn is_root(&self) -> bool {
        self.dn.is_root()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns `true` if the attribute is present, resolving aliases and tags.
    pub fn has_attr(&self, description: &str) -> bool {
        self.schema
            .attr_key(description)
            .is_ok_and(|key| self.attrs.contains_key(&key))
    }

    pub fn get(&self, key: &AttrKey) -> Option<&SchemaValue> {
        self.attrs.get(key)
    }

    pub fn values(&self) -> impl Iterator<Item = &SchemaValue> {
        self.attrs.values()
    }

    /// Values of association attributes, for the store's back-references.
    pub fn associations(&self) -> impl Iterator<Item = &SchemaValue> {
        self.attrs
            .values()
            .filter(|v| v.attribute_type().association && v.lang().is_none())
    }

    /// The normalized document and the original values.
    pub fn attrs(&self) -> (Value, OrigAttrs) {
        document(&self.attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirpg_schema::SchemaBuilder;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::builtin())
    }

    fn entry(dn: &str) -> AddEntry {
        let schema = schema();
        let dn = Dn::parse(&schema, dn).unwrap();
        AddEntry::new(schema, dn).unwrap()
    }

    // ---- Test 1: RDN seeding ----

    #[test]
    fn seeds_rdn_attributes() {
        let e = entry("cn=foo,dc=example,dc=com");
        let cn = e.get(&AttrKey::plain("cn")).unwrap();
        assert_eq!(cn.orig_strings(), vec!["foo"]);
        assert_eq!(cn.norm_str(0).as_deref(), Some("foo"));
        assert!(e.has_attr("commonName"));
        assert!(!e.has_attr("sn"));
    }

    #[test]
    fn seeds_multi_valued_rdn() {
        let e = entry("cn=foo+uid=bar,dc=example,dc=com");
        assert!(e.has_attr("cn"));
        assert!(e.has_attr("uid"));
    }

    // ---- Test 2: adding values ----

    #[test]
    fn add_merges_rdn_value() {
        let mut e = entry("cn=foo,dc=example,dc=com");
        e.add("cn", &["FOO", "bar"]).unwrap();
        let cn = e.get(&AttrKey::plain("cn")).unwrap();
        assert_eq!(cn.orig_strings(), vec!["foo", "bar"]);
    }

    #[test]
    fn add_single_valued_rdn_collision_is_tolerated() {
        let mut e = entry("dc=example,dc=com");
        e.add("dc", &["Example"]).unwrap();
        assert_eq!(e.get(&AttrKey::plain("dc")).unwrap().len(), 1);
        assert!(matches!(
            e.add("dc", &["other"]).unwrap_err(),
            LdapError::MultipleValues { .. }
        ));
    }

    #[test]
    fn add_empty_is_noop() {
        let mut e = entry("cn=foo,dc=example,dc=com");
        e.add::<&str>("sn", &[]).unwrap();
        assert!(!e.has_attr("sn"));
    }

    #[test]
    fn add_tagged_populates_both_keys() {
        let mut e = entry("cn=foo,dc=example,dc=com");
        e.add("cn;lang-ja", &["フー"]).unwrap();
        let tagged = e.get(&AttrKey::new("cn", Some("lang-ja"))).unwrap();
        assert_eq!(tagged.orig_strings(), vec!["フー"]);
        let plain = e.get(&AttrKey::plain("cn")).unwrap();
        assert_eq!(plain.orig_strings(), vec!["foo", "フー"]);
    }

    #[test]
    fn add_rejects_no_user_modification() {
        let mut e = entry("cn=foo,dc=example,dc=com");
        let err = e
            .add("entryUUID", &["67e55044-10b1-426f-9247-bb680e5fe0c8"])
            .unwrap_err();
        assert!(matches!(err, LdapError::NoUserModification { .. }));
    }

    #[test]
    fn migration_mode_allows_no_user_modification() {
        let schema = Arc::new(
            SchemaBuilder::new()
                .with_builtin()
                .migration_enabled(true)
                .build()
                .unwrap(),
        );
        let dn = Dn::parse(&schema, "cn=foo,dc=example,dc=com").unwrap();
        let mut e = AddEntry::new(schema, dn).unwrap();
        e.add("entryUUID", &["67e55044-10b1-426f-9247-bb680e5fe0c8"])
            .unwrap();
        assert!(e.has_attr("entryUUID"));
    }

    // ---- Test 3: validation ----

    #[test]
    fn validate_requires_object_class() {
        let e = entry("cn=foo,dc=example,dc=com");
        assert!(matches!(
            e.validate().unwrap_err(),
            LdapError::ObjectClassViolation { .. }
        ));
    }

    #[test]
    fn validate_checks_must_attributes() {
        let mut e = entry("cn=foo,dc=example,dc=com");
        e.add("objectClass", &["inetOrgPerson"]).unwrap();
        assert!(e.validate().is_err());
        e.add("sn", &["bar"]).unwrap();
        e.validate().unwrap();
    }

    // ---- Test 4: document ----

    #[test]
    fn attrs_builds_document() {
        let mut e = entry("uid=u1,dc=example,dc=com");
        e.add("uidNumber", &["1000"]).unwrap();
        let (norm, orig) = e.attrs();
        assert_eq!(norm["uidnumber"], serde_json::json!([1000]));
        assert_eq!(norm["uid"], serde_json::json!(["u1"]));
        assert_eq!(orig["uidnumber"], vec!["1000"]);
    }

    #[test]
    fn associations_lists_member_values() {
        let mut e = entry("cn=g,dc=example,dc=com");
        e.add("member", &["uid=u1,dc=example,dc=com"]).unwrap();
        let names: Vec<_> = e.associations().map(|v| v.name().to_string()).collect();
        assert_eq!(names, vec!["member"]);
        assert_eq!(e.parent_dn().unwrap().norm_string(), "dc=example,dc=com");
        assert!(!e.is_root());
    }
}
