//! The entry edited by a modify request.

use std::collections::BTreeMap;
use std::sync::Arc;

use dirpg_schema::{AttrKey, Dn, ObjectClass, Rdn, Schema, SchemaValue, OBJECT_CLASS};
use dirpg_types::{LdapError, LdapResult};
use serde_json::Value;
use tracing::{error, warn};

use crate::{document, OrigAttrs};

/// Pre-image and current value of one association attribute.
#[derive(Clone, Debug)]
pub struct Association<'a> {
    pub key: &'a AttrKey,
    /// Value before the first edit in this transaction.
    pub old: &'a SchemaValue,
    /// Value now; `None` when the attribute was removed.
    pub new: Option<&'a SchemaValue>,
}

/// A stored entry rebuilt for editing.
///
/// Edits apply in order and are not validated until `validate` is called.
/// Association attributes keep the value they had before their first edit so
/// that the repository can update back-references.
#[derive(Clone, Debug)]
pub struct ModifyEntry {
    schema: Arc<Schema>,
    dn: Dn,
    attrs: BTreeMap<AttrKey, SchemaValue>,
    old: BTreeMap<AttrKey, SchemaValue>,
}

impl ModifyEntry {
    /// Rebuild from a persisted snapshot of original values.
    ///
    /// No policy checks run here; stored values are trusted.
    pub fn from_stored(schema: Arc<Schema>, dn: Dn, attrs_orig: &OrigAttrs) -> LdapResult<Self> {
        let mut attrs = BTreeMap::new();
        for (key, values) in attrs_orig {
            let key: AttrKey = key
                .parse()
                .map_err(|e: String| LdapError::operations(format!("corrupted attribute key: {e}")))?;
            let value = SchemaValue::from_stored(&schema, &key, values)?;
            attrs.insert(value.key(), value);
        }
        Ok(Self {
            schema,
            dn,
            attrs,
            old: BTreeMap::new(),
        })
    }

    /// Add values to an attribute. Values already present are an error.
    pub fn add<S: AsRef<str>>(&mut self, description: &str, values: &[S]) -> LdapResult<()> {
        let value = self.prepare(description, values)?;
        if value.is_empty() {
            return Ok(());
        }
        self.snapshot(&value);

        let key = value.key();
        let mut updates = Vec::with_capacity(2);
        let mut current = self.current_or_empty(&key, &value);
        current.add(&value)?;
        updates.push((key.clone(), current));

        if value.lang().is_some() {
            let plain = key.untagged();
            let mut untagged = self.current_or_empty(&plain, &value);
            untagged.merge(&value.with_lang(None))?;
            updates.push((plain, untagged));
        }
        self.attrs.extend(updates);
        Ok(())
    }

    /// Replace all values of an attribute. An empty list removes it.
    pub fn replace<S: AsRef<str>>(&mut self, description: &str, values: &[S]) -> LdapResult<()> {
        let value = self.prepare(description, values)?;

        if value.is_object_class() {
            let primary = self.primary_structural_class()?;
            let classes = values
                .iter()
                .enumerate()
                .map(|(index, name)| self.lookup_class(name.as_ref(), index))
                .collect::<LdapResult<Vec<_>>>()?;
            // The structural class is fixed for the life of the entry.
            if let Some(oc) = classes
                .iter()
                .find(|oc| oc.is_structural() && !oc.name.eq_ignore_ascii_case(&primary.name))
            {
                return Err(LdapError::ObjectClassModsProhibited {
                    from: primary.name.clone(),
                    to: oc.name.clone(),
                });
            }
        }

        self.snapshot(&value);
        let key = value.key();
        if value.is_empty() {
            self.attrs.remove(&key);
        } else {
            self.attrs.insert(key, value);
        }
        Ok(())
    }

    /// Delete values from an attribute.
    ///
    /// An empty list removes the whole attribute. A single-valued attribute
    /// is removed whatever value is named. Otherwise only matching values are
    /// removed and an emptied attribute is dropped.
    pub fn delete<S: AsRef<str>>(&mut self, description: &str, values: &[S]) -> LdapResult<()> {
        let value = self.prepare(description, values)?;

        if value.is_object_class() && !value.is_empty() {
            let primary = self.primary_structural_class()?;
            for (index, name) in values.iter().map(AsRef::as_ref).enumerate() {
                let oc = self.lookup_class(name, index)?;
                if oc.is_structural() && oc.name == primary.name {
                    return Err(LdapError::object_class_violation(format!(
                        "cannot delete structural object class '{}'",
                        oc.name
                    )));
                }
            }
        }

        self.snapshot(&value);
        let key = value.key();
        let Some(current) = self.attrs.get(&key) else {
            warn!(dn = %self.dn, attr = %key, "delete of absent attribute");
            return Err(LdapError::NoSuchAttribute {
                operation: "modify/delete".into(),
                attr: value.description(),
            });
        };

        if value.is_empty() || current.attribute_type().single_value {
            self.attrs.remove(&key);
            return Ok(());
        }
        let mut remaining = current.clone();
        remaining.delete(&value);
        if remaining.is_empty() {
            self.attrs.remove(&key);
        } else {
            self.attrs.insert(key, remaining);
        }
        Ok(())
    }

    /// Check `objectClass`, the object class rules, and that the RDN values
    /// are still present.
    pub fn validate(&self) -> LdapResult<()> {
        let oc = self
            .attrs
            .get(&AttrKey::plain(OBJECT_CLASS))
            .filter(|v| !v.is_empty())
            .ok_or_else(|| LdapError::object_class_violation("objectClass is required"))?;
        self.schema.validate_object_class(oc, &self.attrs)?;

        if let Some(rdn) = self.dn.rdn() {
            for c in rdn.components() {
                let present = self
                    .attrs
                    .get(&AttrKey::plain(c.attr()))
                    .is_some_and(|v| v.contains_text(c.norm()));
                if !present {
                    return Err(LdapError::NotAllowedOnRdn {
                        attr: c.attr().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// A copy moved to `new_dn` with the new RDN values seeded. The copy
    /// starts a fresh edit transaction; `self` is untouched.
    pub fn modify_rdn(&self, new_dn: Dn) -> LdapResult<ModifyEntry> {
        let mut clone = Self {
            schema: Arc::clone(&self.schema),
            dn: new_dn,
            attrs: self.attrs.clone(),
            old: BTreeMap::new(),
        };
        let components = clone
            .dn
            .rdn()
            .map(|rdn| rdn.components().to_vec())
            .unwrap_or_default();
        for c in components {
            let value = SchemaValue::new(&clone.schema, c.attr(), &[c.orig()])?;
            let key = value.key();
            if !value.attribute_type().single_value {
                if let Some(current) = clone.attrs.get_mut(&key) {
                    current.merge(&value)?;
                    continue;
                }
            }
            clone.attrs.insert(key, value);
        }
        Ok(clone)
    }

    /// Remove the values named by `rdn` unless the current DN still uses them.
    pub fn remove_rdn_values(&mut self, rdn: &Rdn) -> LdapResult<()> {
        let keep = self.dn.rdn().cloned();
        for c in rdn.components() {
            let still_named = keep
                .as_ref()
                .is_some_and(|k| k.components().iter().any(|n| n == c));
            if still_named {
                continue;
            }
            let key = AttrKey::plain(c.attr());
            let doomed = SchemaValue::new(&self.schema, c.attr(), &[c.orig()])?;
            if let Some(current) = self.attrs.get_mut(&key) {
                current.delete(&doomed);
            }
            if self.attrs.get(&key).is_some_and(SchemaValue::is_empty) {
                self.attrs.remove(&key);
            }
        }
        Ok(())
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn has_attr(&self, description: &str) -> bool {
        self.schema
            .attr_key(description)
            .is_ok_and(|key| self.attrs.contains_key(&key))
    }

    pub fn get(&self, key: &AttrKey) -> Option<&SchemaValue> {
        self.attrs.get(key)
    }

    /// Association attributes touched in this transaction.
    /// All attributes in their current state.
    pub fn values(&self) -> impl Iterator<Item = &SchemaValue> {
        self.attrs.values()
    }

    pub fn associations(&self) -> Vec<Association<'_>> {
        self.old
            .iter()
            .map(|(key, old)| Association {
                key,
                old,
                new: self.attrs.get(key),
            })
            .collect()
    }

    /// The normalized document and the original values.
    pub fn attrs(&self) -> (Value, OrigAttrs) {
        document(&self.attrs)
    }

    /// Resolve, check the write policy, and build the request value.
    fn prepare<S: AsRef<str>>(&self, description: &str, values: &[S]) -> LdapResult<SchemaValue> {
        let (attr, _) = self.schema.resolve(description)?;
        self.schema.ensure_writable(&attr)?;
        SchemaValue::new(&self.schema, description, values)
    }

    /// Record the pre-image of an association attribute on first touch.
    fn snapshot(&mut self, value: &SchemaValue) {
        if !value.attribute_type().association {
            return;
        }
        let key = value.key();
        if self.old.contains_key(&key) {
            return;
        }
        let pre = self.current_or_empty(&key, value);
        self.old.insert(key, pre);
    }

    fn current_or_empty(&self, key: &AttrKey, value: &SchemaValue) -> SchemaValue {
        self.attrs.get(key).cloned().unwrap_or_else(|| {
            SchemaValue::empty(
                Arc::clone(value.attribute_type()),
                key.lang().map(str::to_string),
            )
        })
    }

    fn primary_structural_class(&self) -> LdapResult<Arc<ObjectClass>> {
        self.attrs
            .get(&AttrKey::plain(OBJECT_CLASS))
            .and_then(|oc| self.schema.primary_structural_class(oc))
            .ok_or_else(|| {
                error!(dn = %self.dn, "stored entry has no objectClass");
                LdapError::operations(format!("entry {} has no objectClass", self.dn))
            })
    }

    fn lookup_class(&self, name: &str, index: usize) -> LdapResult<Arc<ObjectClass>> {
        self.schema
            .object_class(name.trim())
            .cloned()
            .ok_or_else(|| LdapError::InvalidAttributeSyntax {
                attr: OBJECT_CLASS.to_string(),
                index,
            })
    }
}
