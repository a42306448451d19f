//! Request handlers.
//!
//! Every handler follows the same path: normalize the DN, consult the
//! authorizer, build the entry model for the operation against the schema,
//! then hand it to the repository. Rejections are logged at warn level and
//! returned as [`LdapError`] so the protocol layer can pick a result code.

use std::sync::Arc;

use dirpg_entry::{AddEntry, ModifyEntry};
use dirpg_filter::{Filter, FilterCompiler};
use dirpg_schema::{AttrKey, Dn, Schema, SchemaValue};
use dirpg_store::{Repository, SearchQuery};
use dirpg_types::{LdapError, LdapResult, Operation};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{
    split_principal, AllowAll, Authorizer, Identity, PassThroughAuth, PassThroughRegistry,
    Session, SimpleAcl,
};
use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::namespace::{apply_rename, plan_move, plan_rename};
use crate::request::{
    AddRequest, ModifyDnRequest, ModifyOp, ModifyRequest, SearchRequest, SearchResultEntry,
};

/// Bind password value that delegates to a pass-through domain, e.g.
/// `{SASL}alice@corp.example`.
const SASL_PREFIX: &str = "{SASL}";

/// Directory operations over one repository, scoped to a single suffix.
pub struct DirectoryService<R> {
    schema: Arc<Schema>,
    repo: R,
    authorizer: Box<dyn Authorizer>,
    pass_through: PassThroughRegistry,
    config: ServerConfig,
    suffix: Dn,
    root_dn: Option<Dn>,
}

impl<R: Repository> DirectoryService<R> {
    /// Build a service. The ACL comes from the configuration; without rules
    /// every operation is allowed.
    pub fn new(config: ServerConfig, schema: Arc<Schema>, repo: R) -> ServerResult<Self> {
        let suffix = Dn::parse(&schema, &config.suffix)?;
        let root_dn = if config.root_dn.trim().is_empty() {
            None
        } else {
            Some(Dn::parse(&schema, &config.root_dn)?)
        };
        let acl = SimpleAcl::parse(&schema, config.acl.as_slice())?;
        let authorizer: Box<dyn Authorizer> = if acl.is_empty() {
            Box::new(AllowAll)
        } else {
            Box::new(acl)
        };
        Ok(Self {
            schema,
            repo,
            authorizer,
            pass_through: PassThroughRegistry::new(),
            config,
            suffix,
            root_dn,
        })
    }

    pub fn with_authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Box::new(authorizer);
        self
    }

    /// Register the bridge for a pass-through domain.
    pub fn with_pass_through(mut self, domain: &str, bridge: Arc<dyn PassThroughAuth>) -> Self {
        self.pass_through.register(domain, bridge);
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Parse a request DN and check that it sits inside the served suffix.
    pub fn normalize_dn(&self, text: &str) -> LdapResult<Dn> {
        let dn = Dn::parse(&self.schema, text)
            .inspect_err(|err| warn!(dn = text, error = %err, "invalid DN"))?;
        if !dn.is_within(&self.suffix) {
            warn!(dn = %dn, suffix = %self.suffix, "DN outside the suffix");
            return Err(LdapError::NoSuchObject { dn: dn.to_string() });
        }
        Ok(dn)
    }

    pub async fn bind(&self, session: &mut Session, name: &str, password: &str) -> LdapResult<()> {
        if name.trim().is_empty() {
            session.set_identity(Identity::Anonymous);
            return Ok(());
        }
        let identity = self.authenticate(name, password).await.inspect_err(|err| {
            warn!(name, error = %err, "bind rejected");
        })?;
        info!(identity = %identity, "bind");
        session.set_identity(identity);
        Ok(())
    }

    async fn authenticate(&self, name: &str, password: &str) -> LdapResult<Identity> {
        if password.is_empty() {
            return Err(LdapError::InvalidCredentials);
        }
        if let Some((user, domain)) = split_principal(name) {
            if self.pass_through_ok(user, domain, password).await? {
                return Ok(Identity::PassThrough {
                    user: user.to_string(),
                    domain: domain.to_lowercase(),
                });
            }
            return Err(LdapError::InvalidCredentials);
        }

        let dn = Dn::parse(&self.schema, name).map_err(|_| LdapError::InvalidCredentials)?;
        if self.root_dn.as_ref() == Some(&dn) {
            if password == self.config.root_password {
                return Ok(Identity::Root(dn));
            }
            return Err(LdapError::InvalidCredentials);
        }

        // An entry may delegate its password to a pass-through domain.
        let Some(row) = self.repo.find(&dn).await? else {
            return Err(LdapError::InvalidCredentials);
        };
        let delegated = row
            .attrs_orig
            .get(&AttrKey::plain("userPassword").to_string())
            .into_iter()
            .flatten()
            .filter_map(|v| v.strip_prefix(SASL_PREFIX))
            .filter_map(split_principal);
        for (user, domain) in delegated {
            if self.pass_through_ok(user, domain, password).await? {
                return Ok(Identity::User(dn));
            }
        }
        Err(LdapError::InvalidCredentials)
    }

    async fn pass_through_ok(&self, user: &str, domain: &str, password: &str) -> LdapResult<bool> {
        match self.pass_through.get(domain) {
            Some(bridge) => bridge.authenticate(user, password).await,
            None => {
                debug!(domain, "no pass-through bridge for domain");
                Ok(false)
            }
        }
    }

    fn authorize(&self, session: &Session, operation: Operation, dn: &Dn) -> LdapResult<()> {
        let identity = session.identity();
        if identity.is_root() || self.authorizer.allowed(identity, operation, dn) {
            return Ok(());
        }
        warn!(identity = %identity, operation = %operation, dn = %dn, "access denied");
        Err(LdapError::InsufficientAccess {
            operation: operation.to_string(),
            dn: dn.to_string(),
        })
    }

    pub async fn add(&self, session: &Session, request: &AddRequest) -> LdapResult<()> {
        let dn = self.normalize_dn(&request.dn)?;
        self.authorize(session, Operation::Add, &dn)?;

        let result = async {
            let mut entry = AddEntry::new(Arc::clone(&self.schema), dn.clone())?;
            for (attr, values) in &request.attributes {
                entry.add(attr, values.as_slice())?;
            }
            entry.validate()?;
            self.repo.insert(&entry).await?;
            Ok::<(), LdapError>(())
        }
        .await;
        self.finish(Operation::Add, &dn, result)
    }

    pub async fn modify(&self, session: &Session, request: &ModifyRequest) -> LdapResult<()> {
        let dn = self.normalize_dn(&request.dn)?;
        self.authorize(session, Operation::Modify, &dn)?;

        let result = async {
            let row = self
                .repo
                .find(&dn)
                .await?
                .ok_or_else(|| LdapError::NoSuchObject { dn: dn.to_string() })?;
            let mut entry =
                ModifyEntry::from_stored(Arc::clone(&self.schema), row.dn, &row.attrs_orig)?;
            for change in &request.changes {
                match change.op {
                    ModifyOp::Add => entry.add(&change.attr, change.values.as_slice())?,
                    ModifyOp::Replace => entry.replace(&change.attr, change.values.as_slice())?,
                    ModifyOp::Delete => entry.delete(&change.attr, change.values.as_slice())?,
                }
            }
            entry.validate()?;
            self.repo.update(&entry).await?;
            Ok::<(), LdapError>(())
        }
        .await;
        self.finish(Operation::Modify, &dn, result)
    }

    pub async fn modify_dn(&self, session: &Session, request: &ModifyDnRequest) -> LdapResult<()> {
        let dn = self.normalize_dn(&request.dn)?;
        self.authorize(session, Operation::ModifyDn, &dn)?;

        let result = async {
            let plan = plan_rename(&self.schema, &dn, &request.new_rdn, request.delete_old_rdn)
                .inspect_err(|err| {
                    info!(dn = %dn, new_rdn = %request.new_rdn, error = %err, "invalid new RDN");
                })?;
            let new_dn = match &request.new_superior {
                Some(superior) => plan_move(&self.schema, &plan.new_dn, superior)?,
                None => plan.new_dn,
            };
            if !new_dn.is_within(&self.suffix) {
                return Err(LdapError::NoSuchObject {
                    dn: new_dn.to_string(),
                });
            }
            info!(dn = %dn, new_dn = %new_dn, "modify DN");
            apply_rename(
                &self.repo,
                &dn,
                &new_dn,
                plan.old_rdn.as_ref(),
                self.config.max_retry,
            )
            .await?;
            Ok::<(), LdapError>(())
        }
        .await;
        self.finish(Operation::ModifyDn, &dn, result)
    }

    pub async fn delete(&self, session: &Session, dn: &str) -> LdapResult<()> {
        let dn = self.normalize_dn(dn)?;
        self.authorize(session, Operation::Delete, &dn)?;
        let result = self.repo.delete(&dn).await.map_err(LdapError::from);
        self.finish(Operation::Delete, &dn, result)
    }

    pub async fn search(
        &self,
        session: &Session,
        request: &SearchRequest,
    ) -> LdapResult<Vec<SearchResultEntry>> {
        let base = self.normalize_dn(&request.base)?;
        self.authorize(session, Operation::Search, &base)?;

        let filter = Filter::parse(&request.filter)
            .inspect_err(|err| warn!(filter = %request.filter, error = %err, "invalid filter"))?;
        let compiled = FilterCompiler::new(&self.schema)
            .with_column(self.config.predicate_column.clone())
            .compile(&filter)?;
        let mut query = SearchQuery::new(base, request.scope, compiled);
        query.size_limit = request.size_limit;

        let rows = self.repo.search(&query).await?;
        let identity = session.identity();
        let hidden = if identity.is_root() {
            Vec::new()
        } else {
            self.authorizer.hidden_attributes(identity)
        };
        let entries = rows
            .iter()
            .map(|row| {
                let entry = row.to_search_entry(Arc::clone(&self.schema));
                SearchResultEntry {
                    dn: entry.dn_orig().to_string(),
                    attributes: entry.project(request.attributes.as_slice(), hidden.as_slice()),
                }
            })
            .collect::<Vec<_>>();
        debug!(base = %query.base, scope = %query.scope, entries = entries.len(), "search done");
        Ok(entries)
    }

    /// Returns whether the entry holds `value` under `attr`.
    pub async fn compare(
        &self,
        session: &Session,
        dn: &str,
        attr: &str,
        value: &str,
    ) -> LdapResult<bool> {
        let dn = self.normalize_dn(dn)?;
        self.authorize(session, Operation::Compare, &dn)?;

        let row = self
            .repo
            .find(&dn)
            .await?
            .ok_or_else(|| LdapError::NoSuchObject { dn: dn.to_string() })?;
        let (attr_type, lang) = self.schema.resolve(attr)?;
        let key = AttrKey::new(&attr_type.name, lang.as_deref());
        let stored = row.attrs_orig.get(&key.to_string()).cloned().unwrap_or_default();
        let current = SchemaValue::from_stored(&self.schema, &key, &stored)?;
        if current.is_empty() {
            return Err(LdapError::NoSuchAttribute {
                operation: Operation::Compare.to_string(),
                attr: attr.to_string(),
            });
        }
        let asserted = self
            .schema
            .normalize(&attr_type, value)
            .unwrap_or_else(|| Value::String(value.to_string()));
        Ok(current.contains_norm(&asserted))
    }

    fn finish(&self, operation: Operation, dn: &Dn, result: LdapResult<()>) -> LdapResult<()> {
        match &result {
            Ok(()) => info!(operation = %operation, dn = %dn, "accepted"),
            Err(err) => warn!(operation = %operation, dn = %dn, code = %err.code(), error = %err, "rejected"),
        }
        result
    }
}
