//! Attribute type definitions.

use serde::{Deserialize, Serialize};

use crate::syntax::MatchingRule;

/// How an attribute type is used (RFC 4512 `USAGE`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeUsage {
    #[default]
    UserApplications,
    DirectoryOperation,
    DistributedOperation,
    DsaOperation,
}

impl AttributeUsage {
    /// Parse the keyword form used in definitions.
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "userapplications" => Some(Self::UserApplications),
            "directoryoperation" => Some(Self::DirectoryOperation),
            "distributedoperation" => Some(Self::DistributedOperation),
            "dsaoperation" => Some(Self::DsaOperation),
            _ => None,
        }
    }
}

/// A resolved attribute type.
///
/// Built by [`crate::SchemaBuilder`]; superior inheritance has already been
/// applied, so `equality` and `syntax` are final.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeType {
    /// Canonical (first) name.
    pub name: String,
    /// Further names the type answers to.
    pub aliases: Vec<String>,
    pub oid: String,
    /// Superior type, if any.
    pub sup: Option<String>,
    /// `EQUALITY` rule name as written in the definition.
    pub equality: Option<String>,
    /// Syntax OID without the `{len}` suffix.
    pub syntax: Option<String>,
    pub single_value: bool,
    pub no_user_modification: bool,
    pub usage: AttributeUsage,
    /// Values are DNs of other entries whose back-references the store
    /// maintains (e.g. `member` feeding `memberOf`).
    pub association: bool,
}

impl AttributeType {
    /// Returns `true` for any usage other than `userApplications`.
    pub fn is_operational(&self) -> bool {
        self.usage != AttributeUsage::UserApplications
    }

    /// The matching rule that normalizes this type's values.
    pub fn matching_rule(&self) -> MatchingRule {
        self.equality
            .as_deref()
            .and_then(MatchingRule::from_equality)
            .unwrap_or_else(|| MatchingRule::from_syntax(self.syntax.as_deref().unwrap_or("")))
    }

    /// The lower-cased canonical name used as a JSON key.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    /// Returns `true` if `name` is the canonical name, an alias, or the OID.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.oid == name
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    /// Returns `true` if values are DNs.
    pub fn is_dn_valued(&self) -> bool {
        self.matching_rule() == MatchingRule::DistinguishedName
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::oids;

    fn at(equality: Option<&str>, syntax: Option<&str>) -> AttributeType {
        AttributeType {
            name: "sample".into(),
            aliases: vec!["smp".into()],
            oid: "1.2.3".into(),
            sup: None,
            equality: equality.map(Into::into),
            syntax: syntax.map(Into::into),
            single_value: false,
            no_user_modification: false,
            usage: AttributeUsage::UserApplications,
            association: false,
        }
    }

    #[test]
    fn equality_wins_over_syntax() {
        let a = at(Some("caseExactMatch"), Some(oids::INTEGER));
        assert_eq!(a.matching_rule(), MatchingRule::CaseExact);
    }

    #[test]
    fn syntax_is_fallback() {
        let a = at(None, Some(oids::INTEGER));
        assert_eq!(a.matching_rule(), MatchingRule::Integer);
        let a = at(Some("unknownMatch"), Some(oids::BOOLEAN));
        assert_eq!(a.matching_rule(), MatchingRule::Boolean);
    }

    #[test]
    fn answers_to_names_and_oid() {
        let a = at(None, None);
        assert!(a.answers_to("SAMPLE"));
        assert!(a.answers_to("smp"));
        assert!(a.answers_to("1.2.3"));
        assert!(!a.answers_to("other"));
    }

    #[test]
    fn operational_usage() {
        let mut a = at(None, None);
        assert!(!a.is_operational());
        a.usage = AttributeUsage::DirectoryOperation;
        assert!(a.is_operational());
        assert_eq!(
            AttributeUsage::from_keyword("dSAOperation"),
            Some(AttributeUsage::DsaOperation)
        );
    }
}
