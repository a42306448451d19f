//! Compilation of filter trees into parameterized store predicates.
//!
//! Every leaf becomes `<column> @@ :<n>`, where parameter `n` carries a
//! JSON-path expression over the normalized attribute document:
//!
//! | Leaf | Parameter |
//! |---|---|
//! | equality, approx | `$."cn" == "foo"` |
//! | greater-or-equal | `$."uidnumber" >= 1000` |
//! | less-or-equal | `$."uidnumber" <= 1000` |
//! | presence | `exists($."mail")` |
//! | substrings | `$."cn" like_regex "^foo.*bar$"` |
//!
//! Negation is pushed down to the leaves (De Morgan, double negation
//! eliminated) so a negated leaf is emitted as `!(<expr>)`. Parameters are
//! numbered in emission order and are never interpolated into the predicate.

use std::collections::BTreeMap;

use dirpg_schema::{AttrKey, MatchingRule, Schema};
use dirpg_types::{LdapError, LdapResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::ast::Filter;

/// Column holding the normalized attribute document.
pub const DEFAULT_COLUMN: &str = "e.attrs_norm";

/// A compiled predicate and its positional parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledFilter {
    pub predicate: String,
    pub params: Vec<String>,
}

impl CompiledFilter {
    /// Look up a parameter by its decimal key.
    pub fn param(&self, key: &str) -> Option<&str> {
        key.parse::<usize>()
            .ok()
            .and_then(|i| self.params.get(i))
            .map(String::as_str)
    }

    /// Parameters keyed by their decimal index.
    pub fn params_map(&self) -> BTreeMap<String, String> {
        self.params
            .iter()
            .enumerate()
            .map(|(i, p)| (i.to_string(), p.clone()))
            .collect()
    }
}

/// Compiles [`Filter`] trees against a schema.
pub struct FilterCompiler<'a> {
    schema: &'a Schema,
    column: String,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            column: DEFAULT_COLUMN.to_string(),
        }
    }

    /// Use a different predicate column.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Compile a filter. An unresolvable attribute anywhere in the tree
    /// fails the whole compilation.
    pub fn compile(&self, filter: &Filter) -> LdapResult<CompiledFilter> {
        let mut predicate = String::new();
        let mut params = Vec::new();
        self.emit(filter, false, &mut predicate, &mut params)?;
        debug!(filter = %filter, predicate = %predicate, params = params.len(), "compiled filter");
        Ok(CompiledFilter { predicate, params })
    }

    fn emit(
        &self,
        filter: &Filter,
        negated: bool,
        out: &mut String,
        params: &mut Vec<String>,
    ) -> LdapResult<()> {
        let (children, conjunction) = match filter {
            Filter::Not { filter } => return self.emit(filter, !negated, out, params),
            Filter::And { filters } => (filters, !negated),
            Filter::Or { filters } => (filters, negated),
            leaf => {
                let expr = self.leaf(leaf)?;
                let expr = if negated { format!("!({expr})") } else { expr };
                out.push_str(&format!("{} @@ :{}", self.column, params.len()));
                params.push(expr);
                return Ok(());
            }
        };

        match children.as_slice() {
            [] => out.push_str(if conjunction { "TRUE" } else { "FALSE" }),
            [only] => self.emit(only, negated, out, params)?,
            many => {
                let joiner = if conjunction { " AND " } else { " OR " };
                out.push('(');
                for (i, child) in many.iter().enumerate() {
                    if i > 0 {
                        out.push_str(joiner);
                    }
                    self.emit(child, negated, out, params)?;
                }
                out.push(')');
            }
        }
        Ok(())
    }

    fn leaf(&self, filter: &Filter) -> LdapResult<String> {
        match filter {
            Filter::Equality { attr, value } | Filter::Approx { attr, value } => {
                self.comparison(attr, "==", value)
            }
            Filter::GreaterOrEqual { attr, value } => self.comparison(attr, ">=", value),
            Filter::LessOrEqual { attr, value } => self.comparison(attr, "<=", value),
            Filter::Present { attr } => {
                let (path, _) = self.path(attr)?;
                Ok(format!("exists({path})"))
            }
            Filter::Substrings {
                attr,
                initial,
                any,
                final_,
            } => {
                let (path, rule) = self.path(attr)?;
                let mut pattern = String::from("^");
                if let Some(initial) = initial {
                    pattern.push_str(&escape_regex(&rule.normalize_fragment(initial)));
                }
                pattern.push_str(".*");
                for part in any {
                    pattern.push_str(&escape_regex(&rule.normalize_fragment(part)));
                    pattern.push_str(".*");
                }
                if let Some(last) = final_ {
                    pattern.push_str(&escape_regex(&rule.normalize_fragment(last)));
                }
                pattern.push('$');
                Ok(format!("{path} like_regex {}", quote(&Value::String(pattern))))
            }
            Filter::And { .. } | Filter::Or { .. } | Filter::Not { .. } => Err(
                LdapError::operations("composite filter compiled as a leaf"),
            ),
        }
    }

    fn comparison(&self, attr: &str, op: &str, value: &str) -> LdapResult<String> {
        let (path, rule) = self.path(attr)?;
        let literal = rule
            .normalize(self.schema, value)
            .unwrap_or_else(|| Value::String(value.to_string()));
        Ok(format!("{path} {op} {}", quote(&literal)))
    }

    /// The JSON path of an attribute description and its matching rule.
    fn path(&self, attr: &str) -> LdapResult<(String, MatchingRule)> {
        let (at, lang) = self.schema.resolve(attr)?;
        let key = AttrKey::new(&at.name, lang.as_deref());
        let path = format!("$.{}", quote(&Value::String(key.to_string())));
        Ok((path, at.matching_rule()))
    }
}

/// Render a JSON scalar as a JSON-path literal.
fn quote(value: &Value) -> String {
    value.to_string()
}

/// Escape regular expression metacharacters.
pub fn escape_regex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '\\' | '.' | '^' | '$' | '|' | '?' | '*' | '+' | '(' | ')' | '[' | ']' | '{' | '}'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirpg_types::ResultCode;
    use proptest::prelude::*;

    fn compile(filter: &Filter) -> CompiledFilter {
        let schema = Schema::builtin();
        FilterCompiler::new(&schema).compile(filter).unwrap()
    }

    // ---- Test 1: leaves ----

    #[test]
    fn equality_leaf() {
        let c = compile(&Filter::eq("cn", "foo"));
        assert_eq!(c.predicate, "e.attrs_norm @@ :0");
        assert_eq!(c.param("0"), Some(r#"$."cn" == "foo""#));
    }

    #[test]
    fn equality_value_is_normalized() {
        let c = compile(&Filter::eq("CN", "  Foo  Bar "));
        assert_eq!(c.params, vec![r#"$."cn" == "foo bar""#]);
    }

    #[test]
    fn integer_values_are_unquoted() {
        let c = compile(&Filter::ge("uidNumber", "1000"));
        assert_eq!(c.params, vec![r#"$."uidnumber" >= 1000"#]);
        let c = compile(&Filter::le("uidNumber", "5"));
        assert_eq!(c.params, vec![r#"$."uidnumber" <= 5"#]);
    }

    #[test]
    fn invalid_value_is_used_verbatim() {
        let c = compile(&Filter::eq("uidNumber", "abc"));
        assert_eq!(c.params, vec![r#"$."uidnumber" == "abc""#]);
    }

    #[test]
    fn presence_and_approx() {
        let c = compile(&Filter::present("mail"));
        assert_eq!(c.params, vec![r#"exists($."mail")"#]);
        let c = compile(&Filter::approx("sn", "Smith"));
        assert_eq!(c.params, vec![r#"$."sn" == "smith""#]);
    }

    #[test]
    fn tagged_attribute_uses_tagged_key() {
        let c = compile(&Filter::eq("cn;lang-JA", "foo"));
        assert_eq!(c.params, vec![r#"$."cn;lang-ja" == "foo""#]);
    }

    #[test]
    fn alias_resolves_to_canonical_name() {
        let c = compile(&Filter::eq("commonName", "foo"));
        assert_eq!(c.params, vec![r#"$."cn" == "foo""#]);
    }

    // ---- Test 2: substrings ----

    #[test]
    fn substrings_become_anchored_regex() {
        let c = compile(&Filter::substrings("cn", Some("Foo"), &[], Some("BAR")));
        assert_eq!(c.params, vec![r#"$."cn" like_regex "^foo.*bar$""#]);

        let c = compile(&Filter::substrings("cn", None, &["a", "b"], None));
        assert_eq!(c.params, vec![r#"$."cn" like_regex "^.*a.*b.*$""#]);
    }

    #[test]
    fn substring_metacharacters_escaped() {
        let c = compile(&Filter::substrings("cn", Some("a.b"), &[], None));
        assert_eq!(c.params, vec![r#"$."cn" like_regex "^a\\.b.*$""#]);
    }

    // ---- Test 3: composites ----

    #[test]
    fn and_of_two() {
        let c = compile(&Filter::and(vec![Filter::eq("cn", "foo"), Filter::eq("uid", "bar")]));
        assert_eq!(c.predicate, "(e.attrs_norm @@ :0 AND e.attrs_norm @@ :1)");
        assert_eq!(
            c.params_map(),
            BTreeMap::from([
                ("0".to_string(), r#"$."cn" == "foo""#.to_string()),
                ("1".to_string(), r#"$."uid" == "bar""#.to_string()),
            ])
        );
    }

    #[test]
    fn or_of_three() {
        let c = compile(&Filter::or(vec![
            Filter::eq("cn", "a"),
            Filter::eq("cn", "b"),
            Filter::eq("cn", "c"),
        ]));
        assert_eq!(
            c.predicate,
            "(e.attrs_norm @@ :0 OR e.attrs_norm @@ :1 OR e.attrs_norm @@ :2)"
        );
    }

    #[test]
    fn nested_or_and() {
        let c = compile(&Filter::or(vec![
            Filter::eq("cn", "foo"),
            Filter::and(vec![Filter::eq("uid", "a"), Filter::eq("sn", "b")]),
        ]));
        assert_eq!(
            c.predicate,
            "(e.attrs_norm @@ :0 OR (e.attrs_norm @@ :1 AND e.attrs_norm @@ :2))"
        );
        assert_eq!(c.params.len(), 3);
    }

    #[test]
    fn single_child_is_not_parenthesized() {
        let c = compile(&Filter::and(vec![Filter::eq("cn", "foo")]));
        assert_eq!(c.predicate, "e.attrs_norm @@ :0");
    }

    #[test]
    fn empty_composites() {
        assert_eq!(compile(&Filter::and(vec![])).predicate, "TRUE");
        assert_eq!(compile(&Filter::or(vec![])).predicate, "FALSE");
        assert_eq!(compile(&Filter::negate(Filter::and(vec![]))).predicate, "FALSE");
        assert_eq!(compile(&Filter::negate(Filter::or(vec![]))).predicate, "TRUE");
    }

    // ---- Test 4: negation ----

    #[test]
    fn negated_leaf() {
        let c = compile(&Filter::negate(Filter::eq("cn", "foo")));
        assert_eq!(c.predicate, "e.attrs_norm @@ :0");
        assert_eq!(c.params, vec![r#"!($."cn" == "foo")"#]);
    }

    #[test]
    fn negated_and_becomes_or() {
        let c = compile(&Filter::negate(Filter::and(vec![
            Filter::eq("cn", "foo"),
            Filter::present("mail"),
        ])));
        assert_eq!(c.predicate, "(e.attrs_norm @@ :0 OR e.attrs_norm @@ :1)");
        assert_eq!(
            c.params,
            vec![r#"!($."cn" == "foo")"#, r#"!(exists($."mail"))"#]
        );
    }

    #[test]
    fn double_negation_cancels() {
        let f = Filter::eq("cn", "foo");
        assert_eq!(compile(&Filter::negate(Filter::negate(f.clone()))), compile(&f));
    }

    // ---- Test 5: errors and options ----

    #[test]
    fn unknown_attribute_fails_whole_compilation() {
        let schema = Schema::builtin();
        let err = FilterCompiler::new(&schema)
            .compile(&Filter::and(vec![
                Filter::eq("cn", "foo"),
                Filter::eq("noSuchAttr", "x"),
            ]))
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::UndefinedAttributeType);
    }

    #[test]
    fn custom_column() {
        let schema = Schema::builtin();
        let c = FilterCompiler::new(&schema)
            .with_column("t.doc")
            .compile(&Filter::eq("cn", "foo"))
            .unwrap();
        assert_eq!(c.predicate, "t.doc @@ :0");
    }

    #[test]
    fn param_lookup() {
        let c = compile(&Filter::eq("cn", "foo"));
        assert!(c.param("1").is_none());
        assert!(c.param("x").is_none());
    }

    // ---- Test 6: properties ----

    fn arb_leaf() -> impl Strategy<Value = Filter> {
        let attr = prop::sample::select(vec!["cn", "uid", "sn", "mail", "uidNumber"]);
        let value = "[a-z0-9]{1,6}";
        prop_oneof![
            (attr.clone(), value).prop_map(|(a, v)| Filter::eq(a, v)),
            attr.clone().prop_map(Filter::present),
            (attr.clone(), value).prop_map(|(a, v)| Filter::ge(a, v)),
            (attr, value).prop_map(|(a, v)| Filter::substrings(a, Some(v.as_str()), &[], None)),
        ]
    }

    fn arb_filter() -> impl Strategy<Value = Filter> {
        arb_leaf().prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Filter::and),
                prop::collection::vec(inner.clone(), 0..4).prop_map(Filter::or),
                inner.prop_map(Filter::negate),
            ]
        })
    }

    proptest! {
        #[test]
        fn one_param_per_leaf(f in arb_filter()) {
            let c = compile(&f);
            prop_assert_eq!(c.params.len(), f.leaf_count());
            prop_assert_eq!(c.predicate.matches("@@").count(), f.leaf_count());
        }

        #[test]
        fn double_negation_is_identity(f in arb_filter()) {
            let twice = Filter::negate(Filter::negate(f.clone()));
            prop_assert_eq!(compile(&twice), compile(&f));
        }

        #[test]
        fn de_morgan(fs in prop::collection::vec(arb_filter(), 0..4)) {
            let not_and = Filter::negate(Filter::and(fs.clone()));
            let or_not = Filter::or(fs.into_iter().map(Filter::negate).collect());
            prop_assert_eq!(compile(&not_and), compile(&or_not));
        }

        #[test]
        fn display_parse_compile_agree(f in arb_filter()) {
            let reparsed = Filter::parse(&f.to_string()).unwrap();
            prop_assert_eq!(compile(&reparsed), compile(&f));
        }
    }
}
