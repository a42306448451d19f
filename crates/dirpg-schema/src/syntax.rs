//! Matching rules and value normalization.
//!
//! Each attribute type normalizes its values through one [`MatchingRule`].
//! The rule comes from the attribute's `EQUALITY` clause; when that is absent
//! it is derived from the `SYNTAX` OID. Normalized values are JSON scalars so
//! they can be stored in the entry's normalized document as-is.

use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dn::Dn;
use crate::schema::Schema;

/// Syntax OIDs understood by the rule fallback.
pub mod oids {
    pub const BOOLEAN: &str = "1.3.6.1.4.1.1466.115.121.1.7";
    pub const DN: &str = "1.3.6.1.4.1.1466.115.121.1.12";
    pub const DIRECTORY_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.15";
    pub const GENERALIZED_TIME: &str = "1.3.6.1.4.1.1466.115.121.1.24";
    pub const IA5_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.26";
    pub const INTEGER: &str = "1.3.6.1.4.1.1466.115.121.1.27";
    pub const NAME_AND_OPTIONAL_UID: &str = "1.3.6.1.4.1.1466.115.121.1.34";
    pub const OID: &str = "1.3.6.1.4.1.1466.115.121.1.38";
    pub const OCTET_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.40";
    pub const TELEPHONE_NUMBER: &str = "1.3.6.1.4.1.1466.115.121.1.50";
    pub const UUID: &str = "1.3.6.1.1.16.1";
}

/// Equality matching rule governing normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchingRule {
    CaseIgnore,
    CaseExact,
    Integer,
    Boolean,
    GeneralizedTime,
    DistinguishedName,
    ObjectIdentifier,
    TelephoneNumber,
    Uuid,
    OctetString,
}

impl MatchingRule {
    /// Resolve an `EQUALITY` rule name. Returns `None` for unknown rules.
    pub fn from_equality(name: &str) -> Option<Self> {
        let rule = match name.to_ascii_lowercase().as_str() {
            "caseignorematch" | "caseignoreia5match" | "caseignorelistmatch" => Self::CaseIgnore,
            "caseexactmatch" | "caseexactia5match" => Self::CaseExact,
            "integermatch" => Self::Integer,
            "booleanmatch" => Self::Boolean,
            "generalizedtimematch" => Self::GeneralizedTime,
            "distinguishednamematch" | "uniquemembermatch" => Self::DistinguishedName,
            "objectidentifiermatch" => Self::ObjectIdentifier,
            "telephonenumbermatch" => Self::TelephoneNumber,
            "uuidmatch" => Self::Uuid,
            "octetstringmatch" => Self::OctetString,
            _ => return None,
        };
        Some(rule)
    }

    /// Derive a rule from a syntax OID (length suffix already stripped).
    pub fn from_syntax(oid: &str) -> Self {
        match oid {
            oids::BOOLEAN => Self::Boolean,
            oids::DN | oids::NAME_AND_OPTIONAL_UID => Self::DistinguishedName,
            oids::DIRECTORY_STRING => Self::CaseIgnore,
            oids::GENERALIZED_TIME => Self::GeneralizedTime,
            oids::IA5_STRING => Self::CaseExact,
            oids::INTEGER => Self::Integer,
            oids::OID => Self::ObjectIdentifier,
            oids::TELEPHONE_NUMBER => Self::TelephoneNumber,
            oids::UUID => Self::Uuid,
            _ => Self::OctetString,
        }
    }

    /// Normalize one raw value. Returns `None` when the value is not valid
    /// for this rule.
    pub fn normalize(self, schema: &Schema, raw: &str) -> Option<Value> {
        match self {
            Self::CaseIgnore => collapse(raw).map(|s| Value::String(s.to_lowercase())),
            Self::CaseExact => collapse(raw).map(Value::String),
            Self::Integer => raw.trim().parse::<i64>().ok().map(Value::from),
            Self::Boolean => match raw.trim().to_ascii_uppercase().as_str() {
                b @ ("TRUE" | "FALSE") => Some(Value::String(b.to_string())),
                _ => None,
            },
            Self::GeneralizedTime => parse_generalized_time(raw.trim()).map(Value::from),
            Self::DistinguishedName => Dn::parse(schema, raw)
                .ok()
                .map(|dn| Value::String(dn.norm_string())),
            Self::ObjectIdentifier => normalize_oid(schema, raw).map(Value::String),
            Self::TelephoneNumber => {
                let s: String = raw
                    .chars()
                    .filter(|c| !c.is_whitespace() && *c != '-')
                    .collect();
                (!s.is_empty()).then(|| Value::String(s.to_lowercase()))
            }
            Self::Uuid => uuid::Uuid::parse_str(raw.trim())
                .ok()
                .map(|u| Value::String(u.hyphenated().to_string())),
            Self::OctetString => (!raw.is_empty()).then(|| Value::String(raw.to_string())),
        }
    }

    /// Normalize a substring assertion fragment. Fragments are never
    /// trimmed, only case-folded where the rule ignores case.
    pub fn normalize_fragment(self, raw: &str) -> String {
        match self {
            Self::CaseIgnore | Self::ObjectIdentifier | Self::TelephoneNumber => {
                raw.to_lowercase()
            }
            _ => raw.to_string(),
        }
    }

    /// Returns `true` if normalized values are JSON numbers.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::GeneralizedTime)
    }
}

fn collapse(raw: &str) -> Option<String> {
    let joined = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!joined.is_empty()).then_some(joined)
}

fn normalize_oid(schema: &Schema, raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() || s.contains(char::is_whitespace) {
        return None;
    }
    if let Some(oc) = schema.object_class(s) {
        return Some(oc.name.to_lowercase());
    }
    if let Some(at) = schema.attribute_type(s) {
        return Some(at.name.to_lowercase());
    }
    Some(s.to_lowercase())
}

/// Parse an RFC 4517 generalized time into Unix milliseconds.
///
/// Accepts `YYYYMMDDHH[MM[SS]][(.|,)fraction](Z|+hhmm|-hhmm)`.
pub fn parse_generalized_time(s: &str) -> Option<i64> {
    let (body, offset_secs) = if let Some(body) = s.strip_suffix(['Z', 'z']) {
        (body, 0)
    } else {
        let pos = s.rfind(['+', '-'])?;
        let (body, zone) = s.split_at(pos);
        let sign = if zone.starts_with('-') { -1 } else { 1 };
        let digits = &zone[1..];
        if !(digits.len() == 2 || digits.len() == 4) || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let hours: i32 = digits[..2].parse().ok()?;
        let minutes: i32 = if digits.len() == 4 { digits[2..].parse().ok()? } else { 0 };
        (body, sign * (hours * 3600 + minutes * 60))
    };

    let (digits, fraction) = match body.find(['.', ',']) {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };
    if !matches!(digits.len(), 10 | 12 | 14) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut padded = digits.to_string();
    while padded.len() < 14 {
        padded.push_str("00");
    }

    let millis = match fraction {
        Some(f) if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) => return None,
        Some(f) => {
            let mut ms: String = f.chars().take(3).collect();
            while ms.len() < 3 {
                ms.push('0');
            }
            ms.parse::<i64>().ok()?
        }
        None => 0,
    };

    let naive = NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M%S").ok()?;
    let zone = FixedOffset::east_opt(offset_secs)?;
    let at = zone.from_local_datetime(&naive).single()?;
    Some(at.timestamp_millis() + millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_names_resolve() {
        assert_eq!(
            MatchingRule::from_equality("caseIgnoreMatch"),
            Some(MatchingRule::CaseIgnore)
        );
        assert_eq!(
            MatchingRule::from_equality("caseExactIA5Match"),
            Some(MatchingRule::CaseExact)
        );
        assert_eq!(MatchingRule::from_equality("fancyMatch"), None);
    }

    #[test]
    fn syntax_fallback() {
        assert_eq!(MatchingRule::from_syntax(oids::INTEGER), MatchingRule::Integer);
        assert_eq!(MatchingRule::from_syntax(oids::DN), MatchingRule::DistinguishedName);
        assert_eq!(MatchingRule::from_syntax("9.9.9"), MatchingRule::OctetString);
    }

    #[test]
    fn case_ignore_collapses_and_folds() {
        let schema = Schema::builtin();
        let v = MatchingRule::CaseIgnore.normalize(&schema, "  Foo   BAR ").unwrap();
        assert_eq!(v, Value::String("foo bar".into()));
        assert!(MatchingRule::CaseIgnore.normalize(&schema, "   ").is_none());
    }

    #[test]
    fn integer_normalizes_to_number() {
        let schema = Schema::builtin();
        assert_eq!(
            MatchingRule::Integer.normalize(&schema, " 1000 "),
            Some(Value::from(1000))
        );
        assert!(MatchingRule::Integer.normalize(&schema, "abc").is_none());
    }

    #[test]
    fn boolean_accepts_true_false_only() {
        let schema = Schema::builtin();
        assert_eq!(
            MatchingRule::Boolean.normalize(&schema, "true"),
            Some(Value::String("TRUE".into()))
        );
        assert!(MatchingRule::Boolean.normalize(&schema, "yes").is_none());
    }

    #[test]
    fn telephone_strips_separators() {
        let schema = Schema::builtin();
        assert_eq!(
            MatchingRule::TelephoneNumber.normalize(&schema, "+1 555-0100"),
            Some(Value::String("+15550100".into()))
        );
    }

    #[test]
    fn uuid_is_lowercased() {
        let schema = Schema::builtin();
        let v = MatchingRule::Uuid
            .normalize(&schema, "67E55044-10B1-426F-9247-BB680E5FE0C8")
            .unwrap();
        assert_eq!(v, Value::String("67e55044-10b1-426f-9247-bb680e5fe0c8".into()));
        assert!(MatchingRule::Uuid.normalize(&schema, "not-a-uuid").is_none());
    }

    #[test]
    fn generalized_time_variants() {
        assert_eq!(parse_generalized_time("19700101000000Z"), Some(0));
        assert_eq!(parse_generalized_time("197001010000Z"), Some(0));
        assert_eq!(parse_generalized_time("19700101000001.5Z"), Some(1500));
        assert_eq!(parse_generalized_time("19700101010000+0100"), Some(0));
        assert!(parse_generalized_time("1970-01-01").is_none());
        assert!(parse_generalized_time("19700101000000").is_none());
    }

    #[test]
    fn object_identifier_uses_canonical_class_name() {
        let schema = Schema::builtin();
        assert_eq!(
            MatchingRule::ObjectIdentifier.normalize(&schema, "INETORGPERSON"),
            Some(Value::String("inetorgperson".into()))
        );
    }

    #[test]
    fn fragments_fold_case_only() {
        assert_eq!(MatchingRule::CaseIgnore.normalize_fragment(" Fo "), " fo ");
        assert_eq!(MatchingRule::CaseExact.normalize_fragment("Fo"), "Fo");
    }
}
