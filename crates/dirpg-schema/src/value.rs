//! Attribute values bound to their schema type.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dirpg_types::{LdapError, LdapResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attribute::AttributeType;
use crate::schema::Schema;

/// Canonical name of the object class attribute.
pub const OBJECT_CLASS: &str = "objectClass";

/// Key of one attribute on an entry: lower-cased canonical name plus an
/// optional language tag.
///
/// Tagged and untagged forms of the same attribute are distinct keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttrKey {
    name: String,
    lang: Option<String>,
}

impl AttrKey {
    pub fn new(name: &str, lang: Option<&str>) -> Self {
        Self {
            name: name.to_lowercase(),
            lang: lang.map(str::to_lowercase),
        }
    }

    /// The untagged key for an attribute name.
    pub fn plain(name: &str) -> Self {
        Self::new(name, None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    /// The same attribute without its language tag.
    pub fn untagged(&self) -> Self {
        Self {
            name: self.name.clone(),
            lang: None,
        }
    }
}

impl fmt::Display for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lang {
            Some(lang) => write!(f, "{};{lang}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for AttrKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, ';');
        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(format!("empty attribute key: {s:?}"));
        }
        Ok(Self::new(name, parts.next()))
    }
}

impl TryFrom<String> for AttrKey {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AttrKey> for String {
    fn from(key: AttrKey) -> Self {
        key.to_string()
    }
}

/// All values of one attribute on one entry.
///
/// Each value keeps its original text next to its normalized form. Values are
/// unique by normalized form; `objectClass` values are kept sorted by their
/// normalized form so that index 0 is stable.
#[derive(Clone, Debug)]
pub struct SchemaValue {
    attr: Arc<AttributeType>,
    lang: Option<String>,
    values: Vec<(String, Value)>,
}

impl PartialEq for SchemaValue {
    fn eq(&self, other: &Self) -> bool {
        self.attr.name == other.attr.name && self.lang == other.lang && self.values == other.values
    }
}

impl SchemaValue {
    /// Build a value from raw strings.
    ///
    /// `description` may carry a `;lang-xx` option. Fails on an unknown
    /// attribute, a value that does not normalize, more than one value for a
    /// single-valued attribute, or a repeated value.
    pub fn new<S: AsRef<str>>(schema: &Schema, description: &str, raw: &[S]) -> LdapResult<Self> {
        let (attr, lang) = schema.resolve(description)?;
        let mut value = Self::empty(attr, lang);

        let mut normalized = Vec::with_capacity(raw.len());
        for (index, r) in raw.iter().enumerate() {
            let r = r.as_ref();
            let norm = schema
                .normalize(&value.attr, r)
                .ok_or_else(|| LdapError::InvalidAttributeSyntax {
                    attr: description.to_string(),
                    index,
                })?;
            normalized.push((r.to_string(), norm));
        }

        if value.attr.single_value && normalized.len() > 1 {
            return Err(LdapError::MultipleValues {
                attr: description.to_string(),
            });
        }

        for (index, pair) in normalized.into_iter().enumerate() {
            if value.contains_norm(&pair.1) {
                return Err(LdapError::AttributeOrValueExists {
                    attr: description.to_string(),
                    index,
                });
            }
            value.values.push(pair);
        }
        value.sort_if_object_class();
        Ok(value)
    }

    /// A value with no entries, used as a pre-image for absent attributes.
    pub fn empty(attr: Arc<AttributeType>, lang: Option<String>) -> Self {
        Self {
            attr,
            lang,
            values: Vec::new(),
        }
    }

    /// Rebuild from stored original strings, re-deriving normalized forms.
    ///
    /// Values that no longer normalize are kept verbatim as JSON strings.
    pub fn from_stored(schema: &Schema, key: &AttrKey, orig: &[String]) -> LdapResult<Self> {
        let attr = schema
            .attribute_type(key.name())
            .cloned()
            .ok_or_else(|| LdapError::UndefinedAttributeType {
                name: key.name().to_string(),
            })?;
        let mut value = Self::empty(attr, key.lang().map(str::to_string));
        for o in orig {
            let norm = schema
                .normalize(&value.attr, o)
                .unwrap_or_else(|| Value::String(o.clone()));
            if !value.contains_norm(&norm) {
                value.values.push((o.clone(), norm));
            }
        }
        value.sort_if_object_class();
        Ok(value)
    }

    /// A copy of this value stored under another language tag.
    pub fn with_lang(&self, lang: Option<String>) -> Self {
        Self {
            attr: Arc::clone(&self.attr),
            lang,
            values: self.values.clone(),
        }
    }

    pub fn key(&self) -> AttrKey {
        AttrKey::new(&self.attr.name, self.lang.as_deref())
    }

    pub fn attribute_type(&self) -> &Arc<AttributeType> {
        &self.attr
    }

    /// Canonical attribute name.
    pub fn name(&self) -> &str {
        &self.attr.name
    }

    pub fn lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    /// Canonical name with language tag, e.g. `cn;lang-ja`.
    pub fn description(&self) -> String {
        match &self.lang {
            Some(lang) => format!("{};{lang}", self.attr.name),
            None => self.attr.name.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_object_class(&self) -> bool {
        self.attr.name.eq_ignore_ascii_case(OBJECT_CLASS)
    }

    /// Original strings in stored order.
    pub fn orig(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(o, _)| o.as_str())
    }

    /// Normalized values in stored order.
    pub fn norm(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().map(|(_, n)| n)
    }

    pub fn orig_strings(&self) -> Vec<String> {
        self.orig().map(str::to_string).collect()
    }

    /// Normalized values as a JSON array.
    pub fn norm_json(&self) -> Value {
        Value::Array(self.norm().cloned().collect())
    }

    pub fn contains_norm(&self, norm: &Value) -> bool {
        self.values.iter().any(|(_, n)| n == norm)
    }

    /// Returns `true` if a normalized value renders as `text`.
    pub fn contains_text(&self, text: &str) -> bool {
        self.values.iter().any(|(_, n)| match n {
            Value::String(s) => s == text,
            other => other.to_string() == text,
        })
    }

    /// Normalized value at `index`, rendered as text.
    pub fn norm_str(&self, index: usize) -> Option<String> {
        self.values.get(index).map(|(_, n)| match n {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Strict merge: a repeated value or single-valued overflow is an error.
    pub fn add(&mut self, other: &SchemaValue) -> LdapResult<()> {
        for (index, (_, norm)) in other.values.iter().enumerate() {
            if self.contains_norm(norm) {
                return Err(LdapError::AttributeOrValueExists {
                    attr: other.description(),
                    index,
                });
            }
        }
        self.append(other.values.iter().cloned().collect())
    }

    /// Tolerant merge: values already present are skipped.
    pub fn merge(&mut self, other: &SchemaValue) -> LdapResult<()> {
        let fresh = other
            .values
            .iter()
            .filter(|(_, norm)| !self.contains_norm(norm))
            .cloned()
            .collect();
        self.append(fresh)
    }

    /// Remove the values of `other` present here; returns how many were
    /// removed. The value may become empty.
    pub fn delete(&mut self, other: &SchemaValue) -> usize {
        let before = self.values.len();
        self.values.retain(|(_, norm)| !other.contains_norm(norm));
        before - self.values.len()
    }

    fn append(&mut self, fresh: Vec<(String, Value)>) -> LdapResult<()> {
        if self.attr.single_value && self.values.len() + fresh.len() > 1 {
            return Err(LdapError::MultipleValues {
                attr: self.description(),
            });
        }
        self.values.extend(fresh);
        self.sort_if_object_class();
        Ok(())
    }

    fn sort_if_object_class(&mut self) {
        if self.is_object_class() {
            self.values
                .sort_by(|a, b| a.1.as_str().unwrap_or("").cmp(b.1.as_str().unwrap_or("")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::builtin()
    }

    #[test]
    fn new_normalizes_values() {
        let s = schema();
        let v = SchemaValue::new(&s, "CN", &["  Foo  Bar "]).unwrap();
        assert_eq!(v.name(), "cn");
        assert_eq!(v.orig().collect::<Vec<_>>(), vec!["  Foo  Bar "]);
        assert_eq!(v.norm_str(0).as_deref(), Some("foo bar"));
        assert_eq!(v.key().to_string(), "cn");
    }

    #[test]
    fn new_with_language_tag() {
        let s = schema();
        let v = SchemaValue::new(&s, "cn;lang-ja", &["Foo"]).unwrap();
        assert_eq!(v.lang(), Some("lang-ja"));
        assert_eq!(v.key().to_string(), "cn;lang-ja");
        assert_eq!(v.description(), "cn;lang-ja");
    }

    #[test]
    fn new_rejects_unknown_attribute() {
        let err = SchemaValue::new(&schema(), "nosuchattr", &["x"]).unwrap_err();
        assert!(matches!(err, LdapError::UndefinedAttributeType { .. }));
    }

    #[test]
    fn new_rejects_bad_syntax_with_index() {
        let err = SchemaValue::new(&schema(), "uidNumber", &["abc"]).unwrap_err();
        assert_eq!(
            err,
            LdapError::InvalidAttributeSyntax {
                attr: "uidNumber".into(),
                index: 0
            }
        );
    }

    #[test]
    fn new_rejects_multiple_on_single_valued() {
        let err = SchemaValue::new(&schema(), "displayName", &["a", "b"]).unwrap_err();
        assert!(matches!(err, LdapError::MultipleValues { .. }));
    }

    #[test]
    fn new_rejects_duplicates() {
        let err = SchemaValue::new(&schema(), "cn", &["foo", "FOO"]).unwrap_err();
        assert_eq!(
            err,
            LdapError::AttributeOrValueExists {
                attr: "cn".into(),
                index: 1
            }
        );
    }

    #[test]
    fn object_class_values_are_sorted() {
        let v = SchemaValue::new(&schema(), "objectClass", &["top", "inetOrgPerson", "person"])
            .unwrap();
        assert_eq!(v.norm_str(0).as_deref(), Some("inetorgperson"));
        assert_eq!(v.norm_str(2).as_deref(), Some("top"));
    }

    #[test]
    fn add_detects_existing_value() {
        let s = schema();
        let mut v = SchemaValue::new(&s, "cn", &["foo"]).unwrap();
        let other = SchemaValue::new(&s, "cn", &["bar", "Foo"]).unwrap();
        let err = v.add(&other).unwrap_err();
        assert!(matches!(err, LdapError::AttributeOrValueExists { index: 1, .. }));
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn add_rejects_single_valued_overflow() {
        let s = schema();
        let mut v = SchemaValue::new(&s, "uidNumber", &["1"]).unwrap();
        let other = SchemaValue::new(&s, "uidNumber", &["2"]).unwrap();
        assert!(matches!(
            v.add(&other).unwrap_err(),
            LdapError::MultipleValues { .. }
        ));
    }

    #[test]
    fn merge_skips_equal_values() {
        let s = schema();
        let mut v = SchemaValue::new(&s, "dc", &["example"]).unwrap();
        let same = SchemaValue::new(&s, "dc", &["Example"]).unwrap();
        v.merge(&same).unwrap();
        assert_eq!(v.len(), 1);

        let different = SchemaValue::new(&s, "dc", &["other"]).unwrap();
        assert!(v.merge(&different).is_err());
    }

    #[test]
    fn delete_keeps_empty_value() {
        let s = schema();
        let mut v = SchemaValue::new(&s, "cn", &["a", "b"]).unwrap();
        let del = SchemaValue::new(&s, "cn", &["A", "zzz"]).unwrap();
        assert_eq!(v.delete(&del), 1);
        assert_eq!(v.orig_strings(), vec!["b"]);
        let rest = SchemaValue::new(&s, "cn", &["b"]).unwrap();
        v.delete(&rest);
        assert!(v.is_empty());
    }

    #[test]
    fn norm_json_uses_numbers_for_integers() {
        let v = SchemaValue::new(&schema(), "uidNumber", &["1000"]).unwrap();
        assert_eq!(v.norm_json(), serde_json::json!([1000]));
    }

    #[test]
    fn attr_key_parse_and_display() {
        let k: AttrKey = "CN;Lang-JA".parse().unwrap();
        assert_eq!(k.name(), "cn");
        assert_eq!(k.lang(), Some("lang-ja"));
        assert_eq!(k.to_string(), "cn;lang-ja");
        assert_eq!(k.untagged(), AttrKey::plain("cn"));
        assert!("".parse::<AttrKey>().is_err());
    }
}
