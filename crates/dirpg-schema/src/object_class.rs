//! Object class definitions.

use serde::{Deserialize, Serialize};

/// Object class kind (RFC 4512).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectClassKind {
    Abstract,
    #[default]
    Structural,
    Auxiliary,
}

/// A resolved object class.
///
/// `must` and `may` hold the canonical names declared directly on this class;
/// inherited requirements are computed by [`crate::Schema::required_attributes`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectClass {
    pub name: String,
    pub aliases: Vec<String>,
    pub oid: String,
    pub kind: ObjectClassKind,
    /// Direct superclasses (canonical names).
    pub sup: Vec<String>,
    pub must: Vec<String>,
    pub may: Vec<String>,
}

impl ObjectClass {
    pub fn is_structural(&self) -> bool {
        self.kind == ObjectClassKind::Structural
    }

    /// Returns `true` if `name` is the canonical name, an alias, or the OID.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.oid == name
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}
