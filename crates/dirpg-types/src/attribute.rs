//! Attribute descriptions with language-tag options.
//!
//! An attribute description is an attribute name optionally followed by a
//! single `;lang-xx` option:
//! - `cn` is the plain attribute
//! - `cn;lang-ja` is the Japanese form of `cn`
//! - Any other option, an unregistered language code, or more than one option
//!   is rejected

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LdapError, LdapResult};

/// Language codes accepted when no registry is configured.
pub const DEFAULT_LANGUAGE_CODES: &[&str] = &["ja", "en", "de", "fr", "es", "zh", "ko"];

const LANG_PREFIX: &str = "lang-";

/// Registry of language codes accepted in `;lang-xx` options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageTags {
    codes: BTreeSet<String>,
}

impl LanguageTags {
    /// Build a registry from a list of codes (case-insensitive).
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            codes: codes
                .into_iter()
                .map(|c| c.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Returns `true` if the code is registered.
    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(&code.to_ascii_lowercase())
    }

    /// Iterate over the registered codes in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }
}

impl Default for LanguageTags {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE_CODES)
    }
}

/// An attribute name plus an optional language tag.
///
/// The tag is kept in its full `lang-xx` form, lower-cased.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeDescription {
    name: String,
    lang: Option<String>,
}

impl AttributeDescription {
    /// Parse an attribute description against a language registry.
    ///
    /// # Examples
    ///
    /// ```
    /// use dirpg_types::{AttributeDescription, LanguageTags};
    ///
    /// let tags = LanguageTags::default();
    /// let desc = AttributeDescription::parse("cn;lang-ja", &tags).unwrap();
    /// assert_eq!(desc.name(), "cn");
    /// assert_eq!(desc.lang(), Some("lang-ja"));
    /// assert!(AttributeDescription::parse("cn;badformat", &tags).is_err());
    /// ```
    pub fn parse(description: &str, tags: &LanguageTags) -> LdapResult<Self> {
        let mut parts = description.split(';');
        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(invalid(description, "attribute name must not be empty"));
        }

        let option = parts.next();
        if parts.next().is_some() {
            return Err(invalid(description, "at most one option is supported"));
        }

        let lang = match option {
            None => None,
            Some(opt) => {
                let lower = opt.to_ascii_lowercase();
                let code = lower
                    .strip_prefix(LANG_PREFIX)
                    .ok_or_else(|| invalid(description, format!("unsupported option: {opt}")))?;
                if !tags.contains(code) {
                    return Err(invalid(
                        description,
                        format!("unregistered language tag: {opt}"),
                    ));
                }
                Some(lower)
            }
        };

        Ok(Self {
            name: name.to_string(),
            lang,
        })
    }

    /// Build a description without a language tag.
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: None,
        }
    }

    /// The attribute name, as written by the caller.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The language tag (e.g. `lang-ja`), if any.
    pub fn lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    /// Split into name and tag.
    pub fn into_parts(self) -> (String, Option<String>) {
        (self.name, self.lang)
    }
}

impl fmt::Display for AttributeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lang {
            Some(lang) => write!(f, "{};{lang}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> LdapError {
    LdapError::InvalidAttributeDescription {
        name: name.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> LdapResult<AttributeDescription> {
        AttributeDescription::parse(s, &LanguageTags::default())
    }

    #[test]
    fn plain_name() {
        let d = parse("cn").unwrap();
        assert_eq!(d.name(), "cn");
        assert_eq!(d.lang(), None);
    }

    #[test]
    fn tagged_name() {
        let d = parse("cn;lang-ja").unwrap();
        assert_eq!(d.name(), "cn");
        assert_eq!(d.lang(), Some("lang-ja"));
        assert_eq!(d.to_string(), "cn;lang-ja");
    }

    #[test]
    fn tag_is_case_insensitive() {
        let d = parse("cn;Lang-JA").unwrap();
        assert_eq!(d.lang(), Some("lang-ja"));
    }

    #[test]
    fn reject_unregistered_tag() {
        assert!(parse("cn;lang-xx").is_err());
    }

    #[test]
    fn reject_non_lang_option() {
        assert!(parse("cn;badformat").is_err());
        assert!(parse("cn;xxxx-ja").is_err());
    }

    #[test]
    fn reject_multiple_options() {
        let err = parse("a;b;c").unwrap_err();
        assert!(matches!(err, LdapError::InvalidAttributeDescription { .. }));
    }

    #[test]
    fn reject_empty_name() {
        assert!(parse("").is_err());
        assert!(parse(";lang-ja").is_err());
    }

    #[test]
    fn custom_registry() {
        let tags = LanguageTags::new(["xx"]);
        assert!(AttributeDescription::parse("cn;lang-xx", &tags).is_ok());
        assert!(AttributeDescription::parse("cn;lang-ja", &tags).is_err());
    }
}
