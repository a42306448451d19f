use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kinds of directory operations checked by the authorization layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Add,
    Modify,
    ModifyDn,
    Delete,
    Search,
    Compare,
}

impl Operation {
    /// Returns `true` if the operation changes the directory.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Modify | Self::ModifyDn | Self::Delete
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "add",
            Self::Modify => "modify",
            Self::ModifyDn => "modifyDN",
            Self::Delete => "delete",
            Self::Search => "search",
            Self::Compare => "compare",
        };
        f.write_str(s)
    }
}

/// Search scope relative to the base DN.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// Only the base entry.
    Base,
    /// Immediate children of the base entry.
    #[serde(rename = "one")]
    OneLevel,
    /// The base entry and all of its descendants.
    #[default]
    #[serde(rename = "sub")]
    Subtree,
}

impl FromStr for SearchScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(Self::Base),
            "one" | "onelevel" => Ok(Self::OneLevel),
            "sub" | "subtree" => Ok(Self::Subtree),
            other => Err(format!("unknown search scope: {other}")),
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Base => "base",
            Self::OneLevel => "one",
            Self::Subtree => "sub",
        };
        f.write_str(s)
    }
}
