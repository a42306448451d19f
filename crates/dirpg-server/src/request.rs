//! Decoded requests handed to the directory service.
//!
//! Values arrive as raw strings; the service normalizes them against the
//! schema.

use std::collections::BTreeMap;

use dirpg_types::SearchScope;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRequest {
    pub dn: String,
    pub attributes: Vec<(String, Vec<String>)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifyOp {
    Add,
    Replace,
    Delete,
}

/// One modification within a modify request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub op: ModifyOp,
    pub attr: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Change {
    pub fn new<S: Into<String>>(op: ModifyOp, attr: &str, values: impl IntoIterator<Item = S>) -> Self {
        Self {
            op,
            attr: attr.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyRequest {
    pub dn: String,
    pub changes: Vec<Change>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyDnRequest {
    pub dn: String,
    pub new_rdn: String,
    pub delete_old_rdn: bool,
    #[serde(default)]
    pub new_superior: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub base: String,
    #[serde(default)]
    pub scope: SearchScope,
    pub filter: String,
    /// Requested attributes; empty means all user attributes.
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub size_limit: Option<usize>,
}

/// One entry of a search response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultEntry {
    pub dn: String,
    pub attributes: BTreeMap<String, Vec<String>>,
}
