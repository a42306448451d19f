use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dirpg_schema::{Dn, Schema};
use dirpg_types::{LdapResult, Operation};

use crate::error::{ServerError, ServerResult};

/// Who a session is bound as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    /// The configured root DN.
    Root(Dn),
    /// A directory entry.
    User(Dn),
    /// A `user@domain` principal verified by a pass-through bridge.
    PassThrough { user: String, domain: String },
}

impl Identity {
    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root(_))
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// The DN of the bound entry, if the identity has one.
    pub fn dn(&self) -> Option<&Dn> {
        match self {
            Self::Root(dn) | Self::User(dn) => Some(dn),
            Self::Anonymous | Self::PassThrough { .. } => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Root(dn) | Self::User(dn) => write!(f, "{dn}"),
            Self::PassThrough { user, domain } => write!(f, "{user}@{domain}"),
        }
    }
}

/// Per-connection state. Starts anonymous; a successful bind replaces the
/// identity.
#[derive(Clone, Debug)]
pub struct Session {
    identity: Identity,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            identity: Identity::Anonymous,
        }
    }

    pub fn bound(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = identity;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Decides which operations an identity may perform.
pub trait Authorizer: Send + Sync {
    fn allowed(&self, identity: &Identity, operation: Operation, target: &Dn) -> bool;

    /// Attributes removed from search results returned to `identity`.
    fn hidden_attributes(&self, identity: &Identity) -> Vec<String>;
}

/// Allows everything and hides nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn allowed(&self, _identity: &Identity, _operation: Operation, _target: &Dn) -> bool {
        true
    }

    fn hidden_attributes(&self, _identity: &Identity) -> Vec<String> {
        Vec::new()
    }
}

/// One simple ACL rule: `<subject DN or empty>:<R|W|RW>:<hidden attributes>`.
///
/// An empty subject matches every bound identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AclRule {
    pub subject: Option<Dn>,
    pub read: bool,
    pub write: bool,
    pub hidden: Vec<String>,
}

impl AclRule {
    /// Parse a rule. The subject may itself contain colons, so the rule is
    /// split from the right.
    ///
    /// # Examples
    ///
    /// ```
    /// use dirpg_schema::Schema;
    /// use dirpg_server::AclRule;
    ///
    /// let schema = Schema::builtin();
    /// let rule = AclRule::parse(&schema, "cn=reader,dc=example,dc=com:R:userPassword").unwrap();
    /// assert!(rule.read && !rule.write);
    /// assert_eq!(rule.hidden, vec!["userPassword"]);
    /// ```
    pub fn parse(schema: &Schema, text: &str) -> ServerResult<Self> {
        let mut parts = text.rsplitn(3, ':');
        let hidden = parts.next().unwrap_or_default();
        let (scope, subject) = match (parts.next(), parts.next()) {
            (Some(scope), Some(subject)) => (scope, subject),
            _ => {
                return Err(ServerError::Config(format!(
                    "ACL rule must have three ':'-separated fields: {text}"
                )))
            }
        };
        let (read, write) = match scope.trim().to_ascii_uppercase().as_str() {
            "R" => (true, false),
            "W" => (false, true),
            "RW" | "WR" => (true, true),
            other => {
                return Err(ServerError::Config(format!(
                    "ACL scope must be R, W or RW, got '{other}'"
                )))
            }
        };
        let subject = if subject.trim().is_empty() {
            None
        } else {
            Some(Dn::parse(schema, subject)?)
        };
        let hidden = hidden
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self {
            subject,
            read,
            write,
            hidden,
        })
    }

    fn grants(&self, operation: Operation) -> bool {
        if operation.is_write() {
            self.write
        } else {
            self.read
        }
    }
}

/// Authorizer built from simple ACL rules.
///
/// A rule naming the identity's DN takes precedence over the everyone rule.
/// Anonymous sessions are granted nothing. The root DN is never consulted
/// here; the service always lets it through.
#[derive(Clone, Debug, Default)]
pub struct SimpleAcl {
    rules: Vec<AclRule>,
}

impl SimpleAcl {
    pub fn new(rules: Vec<AclRule>) -> Self {
        Self { rules }
    }

    pub fn parse<S: AsRef<str>>(schema: &Schema, rules: &[S]) -> ServerResult<Self> {
        let rules = rules
            .iter()
            .map(|r| AclRule::parse(schema, r.as_ref()))
            .collect::<ServerResult<Vec<_>>>()?;
        Ok(Self::new(rules))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn rule_for(&self, identity: &Identity) -> Option<&AclRule> {
        if identity.is_anonymous() {
            return None;
        }
        let specific = identity
            .dn()
            .and_then(|dn| self.rules.iter().find(|r| r.subject.as_ref() == Some(dn)));
        specific.or_else(|| self.rules.iter().find(|r| r.subject.is_none()))
    }
}

impl Authorizer for SimpleAcl {
    fn allowed(&self, identity: &Identity, operation: Operation, _target: &Dn) -> bool {
        self.rule_for(identity)
            .is_some_and(|rule| rule.grants(operation))
    }

    fn hidden_attributes(&self, identity: &Identity) -> Vec<String> {
        self.rule_for(identity)
            .map(|rule| rule.hidden.clone())
            .unwrap_or_default()
    }
}

/// Verifies `user@domain` credentials against an upstream directory.
#[async_trait]
pub trait PassThroughAuth: Send + Sync {
    /// Returns `Ok(false)` when the upstream rejects the password.
    async fn authenticate(&self, user: &str, password: &str) -> LdapResult<bool>;
}

/// Pass-through bridges keyed by lower-cased domain.
#[derive(Clone, Default)]
pub struct PassThroughRegistry {
    bridges: HashMap<String, Arc<dyn PassThroughAuth>>,
}

impl PassThroughRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, domain: &str, bridge: Arc<dyn PassThroughAuth>) {
        self.bridges.insert(domain.to_lowercase(), bridge);
    }

    pub fn get(&self, domain: &str) -> Option<&Arc<dyn PassThroughAuth>> {
        self.bridges.get(&domain.to_lowercase())
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.bridges.keys().map(String::as_str)
    }
}

impl fmt::Debug for PassThroughRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassThroughRegistry")
            .field("domains", &self.bridges.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Split a `user@domain` bind name at its last `@`. Names containing `=`
/// are DNs and never split.
pub fn split_principal(name: &str) -> Option<(&str, &str)> {
    if name.contains('=') {
        return None;
    }
    let (user, domain) = name.rsplit_once('@')?;
    (!user.is_empty() && !domain.is_empty()).then_some((user, domain))
}
