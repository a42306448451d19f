//! Directory service for dirpg.
//!
//! Ties the schema, entry models, filter compiler and a [`Repository`]
//! together behind one request handler per directory operation.
//!
//! # Design Rules
//!
//! 1. Every request DN is normalized and checked against the suffix first
//! 2. Authorization happens before any entry model is built
//! 3. The root identity bypasses the authorizer
//! 4. Renames retry transient store conflicts up to the configured bound
//!
//! [`Repository`]: dirpg_store::Repository

pub mod auth;
pub mod config;
pub mod error;
pub mod namespace;
pub mod request;
pub mod service;

// Re-export primary types at crate root for ergonomic imports.
pub use auth::{
    split_principal, AclRule, AllowAll, Authorizer, Identity, PassThroughAuth,
    PassThroughRegistry, Session, SimpleAcl,
};
pub use config::{PassThroughConfig, ServerConfig, DEFAULT_MAX_RETRY};
pub use error::{ServerError, ServerResult};
pub use namespace::{apply_rename, plan_move, plan_rename, RenamePlan};
pub use request::{
    AddRequest, Change, ModifyDnRequest, ModifyOp, ModifyRequest, SearchRequest,
    SearchResultEntry,
};
pub use service::DirectoryService;
