//! Distinguished names.
//!
//! A [`Dn`] is a sequence of RDNs stored root first and rendered leaf first.
//! Every RDN component keeps the value as written next to its normalized
//! form; equality, hashing and ordering use the normalized form only.
//!
//! Parsing follows RFC 4514:
//! - `,` separates RDNs, `+` separates components of a multi-valued RDN
//! - `\,` `\+` `\"` `\\` `\<` `\>` `\;` `\=` `\ ` `\#` escape special characters
//! - `\XX` escapes a UTF-8 byte in hex
//! - Unescaped leading and trailing spaces around values are ignored

use std::fmt;
use std::hash::{Hash, Hasher};

use dirpg_types::{LdapError, LdapResult};
use serde_json::Value;

use crate::schema::Schema;

/// One `attr=value` pair of an RDN.
#[derive(Clone, Debug)]
pub struct RdnComponent {
    attr: String,
    orig: String,
    norm: String,
}

impl RdnComponent {
    /// Canonical attribute name.
    pub fn attr(&self) -> &str {
        &self.attr
    }

    /// Value as written, unescaped.
    pub fn orig(&self) -> &str {
        &self.orig
    }

    /// Normalized value, unescaped.
    pub fn norm(&self) -> &str {
        &self.norm
    }

    fn key(&self) -> String {
        self.attr.to_lowercase()
    }
}

impl PartialEq for RdnComponent {
    fn eq(&self, other: &Self) -> bool {
        self.attr.eq_ignore_ascii_case(&other.attr) && self.norm == other.norm
    }
}

impl Eq for RdnComponent {}

/// A relative distinguished name: one or more components sorted by
/// attribute name, then by normalized value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rdn {
    components: Vec<RdnComponent>,
}

impl Rdn {
    /// Parse a single RDN such as `cn=foo` or `cn=foo+sn=bar`.
    pub fn parse(schema: &Schema, text: &str) -> LdapResult<Self> {
        let mut components = Vec::new();
        for part in split_unescaped(text, '+').map_err(|r| LdapError::invalid_dn(text, r))? {
            components.push(parse_component(schema, text, part)?);
        }
        components.sort_by(|a, b| a.key().cmp(&b.key()).then_with(|| a.norm.cmp(&b.norm)));
        for pair in components.windows(2) {
            if pair[0].key() == pair[1].key() && pair[0].norm == pair[1].norm {
                return Err(LdapError::invalid_dn(text, "repeated RDN component"));
            }
        }
        Ok(Self { components })
    }

    pub fn components(&self) -> &[RdnComponent] {
        &self.components
    }

    /// Canonical text form, e.g. `cn=foo+sn=bar`.
    pub fn norm_string(&self) -> String {
        self.components
            .iter()
            .map(|c| format!("{}={}", c.key(), escape_value(&c.norm)))
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{}={}", c.attr, escape_value(&c.orig))?;
        }
        Ok(())
    }
}

/// A distinguished name, root first.
#[derive(Clone, Debug, Default)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The empty (root) DN.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a DN. Blank input yields the root DN.
    pub fn parse(schema: &Schema, text: &str) -> LdapResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::root());
        }
        let parts = split_unescaped(text, ',').map_err(|r| LdapError::invalid_dn(text, r))?;
        let mut rdns = Vec::with_capacity(parts.len());
        for part in parts.into_iter().rev() {
            if part.trim().is_empty() {
                return Err(LdapError::invalid_dn(text, "empty RDN"));
            }
            rdns.push(Rdn::parse(schema, part).map_err(|e| match e {
                LdapError::InvalidDnSyntax { reason, .. } => LdapError::invalid_dn(text, reason),
                other => other,
            })?);
        }
        Ok(Self { rdns })
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Number of RDNs.
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// RDNs, root first.
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// The leaf RDN.
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.last()
    }

    pub fn parent(&self) -> Option<Dn> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            rdns: self.rdns[..self.rdns.len() - 1].to_vec(),
        })
    }

    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = self.rdns.clone();
        rdns.push(rdn);
        Self { rdns }
    }

    /// Replace the leaf RDN. The root DN cannot be renamed.
    pub fn with_rdn(&self, rdn: Rdn) -> LdapResult<Dn> {
        let parent = self.parent().ok_or_else(|| LdapError::UnwillingToPerform {
            reason: "cannot rename the root DN".into(),
        })?;
        Ok(parent.child(rdn))
    }

    /// Re-parent the leaf RDN under `superior`.
    pub fn move_to(&self, superior: &Dn) -> LdapResult<Dn> {
        let rdn = self.rdn().cloned().ok_or_else(|| LdapError::UnwillingToPerform {
            reason: "cannot move the root DN".into(),
        })?;
        Ok(superior.child(rdn))
    }

    /// Returns `true` if `self` equals `base` or sits below it.
    pub fn is_within(&self, base: &Dn) -> bool {
        self.rdns.len() >= base.rdns.len() && self.rdns[..base.rdns.len()] == base.rdns[..]
    }

    /// Returns `true` if `self` sits strictly below `base`.
    pub fn is_descendant_of(&self, base: &Dn) -> bool {
        self.rdns.len() > base.rdns.len() && self.is_within(base)
    }

    /// Returns `true` if `self` is an immediate child of `base`.
    pub fn is_child_of(&self, base: &Dn) -> bool {
        self.rdns.len() == base.rdns.len() + 1 && self.is_within(base)
    }

    /// Swap the `old_base` prefix for `new_base`. Returns `None` when `self`
    /// is not within `old_base`.
    pub fn rebase(&self, old_base: &Dn, new_base: &Dn) -> Option<Dn> {
        if !self.is_within(old_base) {
            return None;
        }
        let mut rdns = new_base.rdns.clone();
        rdns.extend_from_slice(&self.rdns[old_base.rdns.len()..]);
        Some(Self { rdns })
    }

    /// Canonical text form, leaf first.
    pub fn norm_string(&self) -> String {
        self.rdns
            .iter()
            .rev()
            .map(Rdn::norm_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.rdns == other.rdns
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.norm_string().hash(state);
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().rev().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}

fn parse_component(schema: &Schema, rdn: &str, text: &str) -> LdapResult<RdnComponent> {
    let (attr, raw) = text
        .split_once('=')
        .ok_or_else(|| LdapError::invalid_dn(rdn, "missing '=' in RDN"))?;
    let attr = attr.trim();
    if attr.is_empty() {
        return Err(LdapError::invalid_dn(rdn, "empty attribute type"));
    }
    let at = schema
        .attribute_type(attr)
        .ok_or_else(|| LdapError::invalid_dn(rdn, format!("unknown attribute type {attr}")))?;

    let raw = trim_unescaped(raw);
    if raw.starts_with('#') {
        return Err(LdapError::invalid_dn(rdn, "BER-encoded values are not supported"));
    }
    let orig = unescape_value(raw).map_err(|r| LdapError::invalid_dn(rdn, r))?;
    if orig.is_empty() {
        return Err(LdapError::invalid_dn(rdn, format!("empty value for {attr}")));
    }
    let norm = match schema.normalize(at, &orig) {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => {
            return Err(LdapError::invalid_dn(
                rdn,
                format!("invalid value for {attr}"),
            ))
        }
    };
    Ok(RdnComponent {
        attr: at.name.clone(),
        orig,
        norm,
    })
}

/// Split on `sep` where it is not escaped by a backslash.
fn split_unescaped(text: &str, sep: char) -> Result<Vec<&str>, String> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    if escaped {
        return Err("trailing backslash".into());
    }
    parts.push(&text[start..]);
    Ok(parts)
}

/// Trim surrounding spaces, keeping a trailing space that is escaped.
fn trim_unescaped(raw: &str) -> &str {
    let raw = raw.trim_start();
    let mut end = raw.len();
    while end > 0 && raw.as_bytes()[end - 1] == b' ' {
        let backslashes = raw.as_bytes()[..end - 1]
            .iter()
            .rev()
            .take_while(|b| **b == b'\\')
            .count();
        if backslashes % 2 == 1 {
            break;
        }
        end -= 1;
    }
    &raw[..end]
}

fn unescape_value(raw: &str) -> Result<String, String> {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let next = chars.next().ok_or("trailing backslash")?;
        if next.is_ascii_hexdigit() {
            let low = chars
                .next()
                .filter(char::is_ascii_hexdigit)
                .ok_or("malformed hex escape")?;
            let byte = u8::from_str_radix(&format!("{next}{low}"), 16)
                .map_err(|_| "malformed hex escape".to_string())?;
            bytes.push(byte);
        } else if matches!(next, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' | ' ' | '#') {
            bytes.push(next as u8);
        } else {
            return Err(format!("invalid escape \\{next}"));
        }
    }
    String::from_utf8(bytes).map_err(|_| "escaped bytes are not UTF-8".to_string())
}

/// Escape a value for use in a DN string (RFC 4514 section 2.4).
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 2);
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                out.push('\\');
                out.push(c);
            }
            '#' if i == 0 => out.push_str("\\#"),
            ' ' if i == 0 || i == last => out.push_str("\\ "),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}
