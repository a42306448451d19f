//! The resolved, read-only schema.
//!
//! A [`Schema`] is assembled once by [`SchemaBuilder`] and then shared as
//! `Arc<Schema>` by every request. Lookups are case-insensitive and accept
//! canonical names, aliases and OIDs.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use dirpg_types::{AttributeDescription, LanguageTags, LdapError, LdapResult};
use serde_json::Value;
use tracing::debug;

use crate::attribute::AttributeType;
use crate::builtin;
use crate::error::{SchemaError, SchemaResult};
use crate::object_class::ObjectClass;
use crate::parser::{self, AttributeTypeDefinition, Definition, ObjectClassDefinition};
use crate::value::{AttrKey, SchemaValue, OBJECT_CLASS};

/// Attribute types and object classes, resolved and indexed.
#[derive(Debug)]
pub struct Schema {
    attribute_types: BTreeMap<String, Arc<AttributeType>>,
    attr_index: HashMap<String, Arc<AttributeType>>,
    object_classes: BTreeMap<String, Arc<ObjectClass>>,
    class_index: HashMap<String, Arc<ObjectClass>>,
    language_tags: LanguageTags,
    migration_enabled: bool,
}

impl Schema {
    /// The built-in schema with default language tags and associations.
    ///
    /// # Panics
    ///
    /// Only if the compiled-in definitions fail to parse, which the
    /// `builtin_schema_loads` test rules out.
    pub fn builtin() -> Self {
        SchemaBuilder::new()
            .with_builtin()
            .build()
            .expect("built-in schema definitions are valid")
    }

    /// Look up an attribute type by name, alias or OID.
    pub fn attribute_type(&self, name: &str) -> Option<&Arc<AttributeType>> {
        self.attr_index.get(&name.to_lowercase())
    }

    /// Look up an object class by name, alias or OID.
    pub fn object_class(&self, name: &str) -> Option<&Arc<ObjectClass>> {
        self.class_index.get(&name.to_lowercase())
    }

    /// Resolve an attribute description (`cn`, `cn;lang-ja`) to its type and
    /// language tag.
    pub fn resolve(&self, description: &str) -> LdapResult<(Arc<AttributeType>, Option<String>)> {
        let desc = AttributeDescription::parse(description, &self.language_tags)?;
        let (name, lang) = desc.into_parts();
        let at = self
            .attribute_type(&name)
            .cloned()
            .ok_or(LdapError::UndefinedAttributeType { name })?;
        Ok((at, lang))
    }

    /// Resolve an attribute description to its entry key.
    pub fn attr_key(&self, description: &str) -> LdapResult<AttrKey> {
        let (at, lang) = self.resolve(description)?;
        Ok(AttrKey::new(&at.name, lang.as_deref()))
    }

    /// Normalize one raw value of `attr`.
    pub fn normalize(&self, attr: &AttributeType, raw: &str) -> Option<Value> {
        attr.matching_rule().normalize(self, raw)
    }

    pub fn attribute_types(&self) -> impl Iterator<Item = &Arc<AttributeType>> {
        self.attribute_types.values()
    }

    pub fn object_classes(&self) -> impl Iterator<Item = &Arc<ObjectClass>> {
        self.object_classes.values()
    }

    /// Attribute types flagged as associations.
    pub fn association_attributes(&self) -> impl Iterator<Item = &Arc<AttributeType>> {
        self.attribute_types.values().filter(|at| at.association)
    }

    pub fn language_tags(&self) -> &LanguageTags {
        &self.language_tags
    }

    pub fn migration_enabled(&self) -> bool {
        self.migration_enabled
    }

    /// Enforce the no-user-modification policy for a client write.
    pub fn ensure_writable(&self, attr: &AttributeType) -> LdapResult<()> {
        if attr.no_user_modification && !self.migration_enabled {
            return Err(LdapError::NoUserModification {
                attr: attr.name.clone(),
            });
        }
        Ok(())
    }

    /// `class` followed by all of its superclasses, nearest first.
    pub fn superclasses(&self, class: &ObjectClass) -> Vec<Arc<ObjectClass>> {
        let mut out: Vec<Arc<ObjectClass>> = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: Vec<String> = vec![class.name.clone()];
        while let Some(name) = queue.pop() {
            if !seen.insert(name.to_lowercase()) {
                continue;
            }
            if let Some(oc) = self.object_class(&name) {
                queue.extend(oc.sup.iter().rev().cloned());
                out.push(Arc::clone(oc));
            }
        }
        out
    }

    /// MUST attributes of `class` including inherited ones, as canonical names.
    pub fn required_attributes(&self, class: &ObjectClass) -> BTreeSet<String> {
        self.superclasses(class)
            .iter()
            .flat_map(|oc| oc.must.iter().cloned())
            .collect()
    }

    /// The primary structural class: the first structural class in sorted
    /// normalized order, or the first class when none is structural.
    pub fn primary_structural_class(&self, object_class: &SchemaValue) -> Option<Arc<ObjectClass>> {
        let classes: Vec<Arc<ObjectClass>> = object_class
            .norm()
            .filter_map(|v| v.as_str().and_then(|s| self.object_class(s)).cloned())
            .collect();
        classes
            .iter()
            .find(|oc| oc.is_structural())
            .or_else(|| classes.first())
            .cloned()
    }

    /// Check an entry against its object classes and report the first
    /// violation: an unknown class, no structural class, or a missing MUST
    /// attribute.
    pub fn validate_object_class(
        &self,
        object_class: &SchemaValue,
        attrs: &BTreeMap<AttrKey, SchemaValue>,
    ) -> LdapResult<()> {
        let mut classes = Vec::with_capacity(object_class.len());
        for (index, norm) in object_class.norm().enumerate() {
            let oc = norm
                .as_str()
                .and_then(|s| self.object_class(s))
                .ok_or_else(|| LdapError::InvalidAttributeSyntax {
                    attr: OBJECT_CLASS.to_string(),
                    index,
                })?;
            classes.push(Arc::clone(oc));
        }

        if !classes.iter().any(|oc| oc.is_structural()) {
            return Err(LdapError::object_class_violation(
                "no structural object class provided",
            ));
        }

        for oc in &classes {
            for must in self.required_attributes(oc) {
                let present = attrs
                    .get(&AttrKey::plain(&must))
                    .is_some_and(|v| !v.is_empty());
                if !present {
                    return Err(LdapError::object_class_violation(format!(
                        "object class '{}' requires attribute '{must}'",
                        oc.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Assembles a [`Schema`] from RFC 4512 definitions.
///
/// Later definitions with the same canonical name replace earlier ones, so
/// custom definitions can override built-in ones.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    definitions: Vec<String>,
    associations: Option<Vec<String>>,
    language_tags: LanguageTags,
    migration_enabled: bool,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include the built-in definitions.
    pub fn with_builtin(mut self) -> Self {
        self.definitions
            .extend(builtin::ATTRIBUTE_TYPES.iter().map(|d| d.to_string()));
        self.definitions
            .extend(builtin::OBJECT_CLASSES.iter().map(|d| d.to_string()));
        self
    }

    pub fn definition(mut self, text: impl Into<String>) -> Self {
        self.definitions.push(text.into());
        self
    }

    pub fn definitions<I, S>(mut self, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.definitions.extend(texts.into_iter().map(Into::into));
        self
    }

    /// Set the association attributes, replacing the defaults.
    pub fn associations<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.associations = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn language_tags(mut self, tags: LanguageTags) -> Self {
        self.language_tags = tags;
        self
    }

    pub fn migration_enabled(mut self, enabled: bool) -> Self {
        self.migration_enabled = enabled;
        self
    }

    pub fn build(self) -> SchemaResult<Schema> {
        let mut attr_defs: BTreeMap<String, AttributeTypeDefinition> = BTreeMap::new();
        let mut class_defs: BTreeMap<String, ObjectClassDefinition> = BTreeMap::new();
        for text in &self.definitions {
            match parser::parse_definition(text)? {
                Definition::AttributeType(def) => {
                    attr_defs.insert(def.names[0].to_lowercase(), def);
                }
                Definition::ObjectClass(def) => {
                    class_defs.insert(def.names[0].to_lowercase(), def);
                }
            }
        }

        let alias_to_key = alias_map(attr_defs.iter().map(|(k, d)| (k, &d.oid, &d.names)));
        let associations: Vec<String> = match self.associations {
            Some(names) => names,
            None => builtin::DEFAULT_ASSOCIATIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        let mut attribute_types = BTreeMap::new();
        for key in attr_defs.keys() {
            let at = resolve_attribute(key, &attr_defs, &alias_to_key)?;
            attribute_types.insert(key.clone(), at);
        }
        for name in &associations {
            let key = alias_to_key
                .get(&name.to_lowercase())
                .ok_or_else(|| SchemaError::InvalidAssociation { name: name.clone() })?;
            let at = attribute_types
                .get_mut(key)
                .ok_or_else(|| SchemaError::InvalidAssociation { name: name.clone() })?;
            if !at.is_dn_valued() {
                return Err(SchemaError::InvalidAssociation { name: name.clone() });
            }
            at.association = true;
        }
        let attribute_types: BTreeMap<String, Arc<AttributeType>> = attribute_types
            .into_iter()
            .map(|(k, v)| (k, Arc::new(v)))
            .collect();

        let mut attr_index = HashMap::new();
        for (alias, key) in &alias_to_key {
            if let Some(at) = attribute_types.get(key) {
                attr_index.insert(alias.clone(), Arc::clone(at));
            }
        }

        let class_alias = alias_map(class_defs.iter().map(|(k, d)| (k, &d.oid, &d.names)));
        let mut object_classes = BTreeMap::new();
        for (key, def) in &class_defs {
            let name = def.names[0].clone();
            let canonical_attr = |attr: &String| -> SchemaResult<String> {
                alias_to_key
                    .get(&attr.to_lowercase())
                    .and_then(|k| attribute_types.get(k))
                    .map(|at| at.name.clone())
                    .ok_or_else(|| SchemaError::UnknownAttribute {
                        class: name.clone(),
                        attr: attr.clone(),
                    })
            };
            let must = def.must.iter().map(&canonical_attr).collect::<SchemaResult<_>>()?;
            let may = def.may.iter().map(&canonical_attr).collect::<SchemaResult<_>>()?;
            let mut sup = Vec::with_capacity(def.sup.len());
            for s in &def.sup {
                let sup_key = class_alias.get(&s.to_lowercase()).ok_or_else(|| {
                    SchemaError::UnknownSuperclass {
                        name: name.clone(),
                        sup: s.clone(),
                    }
                })?;
                sup.push(class_defs[sup_key].names[0].clone());
            }
            object_classes.insert(
                key.clone(),
                Arc::new(ObjectClass {
                    name: name.clone(),
                    aliases: def.names[1..].to_vec(),
                    oid: def.oid.clone(),
                    kind: def.kind,
                    sup,
                    must,
                    may,
                }),
            );
        }
        check_class_cycles(&object_classes)?;

        let mut class_index = HashMap::new();
        for (alias, key) in &class_alias {
            if let Some(oc) = object_classes.get(key) {
                class_index.insert(alias.clone(), Arc::clone(oc));
            }
        }

        debug!(
            attribute_types = attribute_types.len(),
            object_classes = object_classes.len(),
            migration = self.migration_enabled,
            "schema loaded"
        );

        Ok(Schema {
            attribute_types,
            attr_index,
            object_classes,
            class_index,
            language_tags: self.language_tags,
            migration_enabled: self.migration_enabled,
        })
    }
}

/// Map every lower-cased name, alias and OID to the definition key.
fn alias_map<'a>(
    defs: impl Iterator<Item = (&'a String, &'a String, &'a Vec<String>)>,
) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (key, oid, names) in defs {
        map.insert(oid.to_lowercase(), key.clone());
        for name in names {
            map.insert(name.to_lowercase(), key.clone());
        }
    }
    map
}

fn resolve_attribute(
    key: &str,
    defs: &BTreeMap<String, AttributeTypeDefinition>,
    aliases: &HashMap<String, String>,
) -> SchemaResult<AttributeType> {
    let def = &defs[key];
    let mut equality = def.equality.clone();
    let mut syntax = def.syntax.clone();
    let mut single_value = def.single_value;

    let mut seen = HashSet::from([key.to_string()]);
    let mut current = def;
    while let Some(sup) = &current.sup {
        let sup_key = aliases
            .get(&sup.to_lowercase())
            .ok_or_else(|| SchemaError::UnknownSuperiorType {
                name: def.names[0].clone(),
                sup: sup.clone(),
            })?;
        if !seen.insert(sup_key.clone()) {
            return Err(SchemaError::InheritanceCycle {
                name: def.names[0].clone(),
            });
        }
        current = &defs[sup_key];
        equality = equality.or_else(|| current.equality.clone());
        syntax = syntax.or_else(|| current.syntax.clone());
        single_value = single_value || current.single_value;
    }

    Ok(AttributeType {
        name: def.names[0].clone(),
        aliases: def.names[1..].to_vec(),
        oid: def.oid.clone(),
        sup: def.sup.clone(),
        equality,
        syntax,
        single_value,
        no_user_modification: def.no_user_modification,
        usage: def.usage,
        association: false,
    })
}

fn check_class_cycles(classes: &BTreeMap<String, Arc<ObjectClass>>) -> SchemaResult<()> {
    for (key, oc) in classes {
        let mut stack: Vec<String> = oc.sup.iter().map(|s| s.to_lowercase()).collect();
        let mut seen = HashSet::new();
        while let Some(next) = stack.pop() {
            if next == *key {
                return Err(SchemaError::InheritanceCycle {
                    name: oc.name.clone(),
                });
            }
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(parent) = classes.get(&next) {
                stack.extend(parent.sup.iter().map(|s| s.to_lowercase()));
            }
        }
    }
    Ok(())
}
