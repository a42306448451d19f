//! Search filter expression tree.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A search filter.
///
/// Leaves carry the attribute description as written by the client
/// (`cn`, `cn;lang-ja`) and the raw assertion value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    Equality { attr: String, value: String },
    Substrings {
        attr: String,
        initial: Option<String>,
        any: Vec<String>,
        final_: Option<String>,
    },
    Present { attr: String },
    GreaterOrEqual { attr: String, value: String },
    LessOrEqual { attr: String, value: String },
    Approx { attr: String, value: String },
    And { filters: Vec<Filter> },
    Or { filters: Vec<Filter> },
    Not { filter: Box<Filter> },
}

impl Filter {
    pub fn eq(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equality {
            attr: attr.into(),
            value: value.into(),
        }
    }

    pub fn present(attr: impl Into<String>) -> Self {
        Self::Present { attr: attr.into() }
    }

    pub fn ge(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self::GreaterOrEqual {
            attr: attr.into(),
            value: value.into(),
        }
    }

    pub fn le(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self::LessOrEqual {
            attr: attr.into(),
            value: value.into(),
        }
    }

    pub fn approx(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Approx {
            attr: attr.into(),
            value: value.into(),
        }
    }

    pub fn substrings(
        attr: impl Into<String>,
        initial: Option<&str>,
        any: &[&str],
        final_: Option<&str>,
    ) -> Self {
        Self::Substrings {
            attr: attr.into(),
            initial: initial.map(str::to_string),
            any: any.iter().map(|s| s.to_string()).collect(),
            final_: final_.map(str::to_string),
        }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Self::And { filters }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Or { filters }
    }

    pub fn negate(filter: Filter) -> Self {
        Self::Not {
            filter: Box::new(filter),
        }
    }

    /// Returns `true` for every variant except `And`, `Or` and `Not`.
    pub fn is_leaf(&self) -> bool {
        !matches!(self, Self::And { .. } | Self::Or { .. } | Self::Not { .. })
    }

    /// Number of leaves in the tree. Negation never changes this count.
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::And { filters } | Self::Or { filters } => {
                filters.iter().map(Filter::leaf_count).sum()
            }
            Self::Not { filter } => filter.leaf_count(),
            _ => 1,
        }
    }
}

/// Escape an assertion value for RFC 4515 text.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\5c"),
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equality { attr, value } => write!(f, "({attr}={})", escape_value(value)),
            Self::Approx { attr, value } => write!(f, "({attr}~={})", escape_value(value)),
            Self::GreaterOrEqual { attr, value } => write!(f, "({attr}>={})", escape_value(value)),
            Self::LessOrEqual { attr, value } => write!(f, "({attr}<={})", escape_value(value)),
            Self::Present { attr } => write!(f, "({attr}=*)"),
            Self::Substrings {
                attr,
                initial,
                any,
                final_,
            } => {
                write!(f, "({attr}=")?;
                if let Some(i) = initial {
                    f.write_str(&escape_value(i))?;
                }
                f.write_str("*")?;
                for a in any {
                    write!(f, "{}*", escape_value(a))?;
                }
                if let Some(fin) = final_ {
                    f.write_str(&escape_value(fin))?;
                }
                f.write_str(")")
            }
            Self::And { filters } => {
                f.write_str("(&")?;
                for child in filters {
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
            Self::Or { filters } => {
                f.write_str("(|")?;
                for child in filters {
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
            Self::Not { filter } => write!(f, "(!{filter})"),
        }
    }
}
