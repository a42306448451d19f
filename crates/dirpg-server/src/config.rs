use std::collections::BTreeSet;
use std::path::Path;

use dirpg_filter::DEFAULT_COLUMN;
use dirpg_schema::builtin::DEFAULT_ASSOCIATIONS;
use dirpg_schema::{Dn, Schema, SchemaBuilder};
use dirpg_types::{LanguageTags, SearchScope, DEFAULT_LANGUAGE_CODES};
use serde::{Deserialize, Serialize};

use crate::auth::AclRule;
use crate::error::{ServerError, ServerResult};

/// Default number of replays after a transient rename conflict.
pub const DEFAULT_MAX_RETRY: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Naming context served by this directory, e.g. `dc=example,dc=com`.
    pub suffix: String,
    pub root_dn: String,
    pub root_password: String,
    /// Accept writes to no-user-modification attributes.
    pub migration_enabled: bool,
    pub max_retry: usize,
    pub language_tags: Vec<String>,
    pub association_attributes: Vec<String>,
    /// Extra RFC 4512 definitions; they override built-ins of the same name.
    pub custom_schema: Vec<String>,
    /// Simple ACL rules, `<subject DN or empty>:<R|W|RW>:<hidden attributes>`.
    pub acl: Vec<String>,
    pub pass_through: Vec<PassThroughConfig>,
    pub predicate_column: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            suffix: String::new(),
            root_dn: String::new(),
            root_password: String::new(),
            migration_enabled: false,
            max_retry: DEFAULT_MAX_RETRY,
            language_tags: DEFAULT_LANGUAGE_CODES.iter().map(|c| c.to_string()).collect(),
            association_attributes: DEFAULT_ASSOCIATIONS.iter().map(|a| a.to_string()).collect(),
            custom_schema: Vec::new(),
            acl: Vec::new(),
            pass_through: Vec::new(),
            predicate_column: DEFAULT_COLUMN.to_string(),
        }
    }
}

/// Upstream directory used to verify `user@domain` binds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PassThroughConfig {
    pub domain: String,
    /// Upstream address, e.g. `myldap:389`.
    pub server: String,
    pub search_base: String,
    /// User lookup filter; `%u` stands for the user part of the bind name.
    pub filter: String,
    pub bind_dn: String,
    pub password: String,
    #[serde(default)]
    pub scope: SearchScope,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// `name` or `table.name`, each part an SQL identifier. The column is spliced
/// into generated predicates verbatim.
fn is_column_reference(column: &str) -> bool {
    column.split('.').count() <= 2
        && column.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

fn default_timeout_secs() -> u64 {
    10
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Build the schema described by this configuration.
    pub fn build_schema(&self) -> ServerResult<Schema> {
        let schema = SchemaBuilder::new()
            .with_builtin()
            .definitions(self.custom_schema.iter().cloned())
            .associations(self.association_attributes.iter().cloned())
            .language_tags(LanguageTags::new(&self.language_tags))
            .migration_enabled(self.migration_enabled)
            .build()?;
        Ok(schema)
    }

    /// Check that the configuration is usable. Returns the schema it builds.
    pub fn validate(&self) -> ServerResult<Schema> {
        let schema = self.build_schema()?;

        if self.suffix.trim().is_empty() {
            return Err(ServerError::Config("suffix must be set".into()));
        }
        Dn::parse(&schema, &self.suffix)?;
        if !self.root_dn.trim().is_empty() {
            Dn::parse(&schema, &self.root_dn)?;
            if self.root_password.is_empty() {
                return Err(ServerError::Config(
                    "root_password must be set together with root_dn".into(),
                ));
            }
        }
        for rule in &self.acl {
            AclRule::parse(&schema, rule)?;
        }

        let mut domains = BTreeSet::new();
        for pt in &self.pass_through {
            if pt.domain.trim().is_empty() {
                return Err(ServerError::Config("pass-through domain must be set".into()));
            }
            if !domains.insert(pt.domain.to_lowercase()) {
                return Err(ServerError::Config(format!(
                    "duplicate pass-through domain: {}",
                    pt.domain
                )));
            }
        }
        if self.predicate_column.trim().is_empty() {
            return Err(ServerError::Config("predicate_column must not be empty".into()));
        }
        if !is_column_reference(&self.predicate_column) {
            return Err(ServerError::Config(format!(
                "predicate_column is not a column reference: {}",
                self.predicate_column
            )));
        }
        Ok(schema)
    }
}
