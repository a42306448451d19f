//! Evaluation of compiled filter predicates against normalized documents.
//!
//! Understands exactly what the filter compiler emits: `TRUE`, `FALSE`,
//! parenthesized ` AND ` / ` OR ` groups and `<column> @@ :<n>` leaves. Each
//! parameter is a JSON-path subset expression:
//!
//! - `$."key" == <literal>`, `>=`, `<=`
//! - `$."key" like_regex "<pattern>"`
//! - `exists($."key")`
//! - `!(<expression>)`
//!
//! Paths use lax semantics: when the document holds an array under `key`,
//! a comparison holds if any element satisfies it.

use std::cmp::Ordering;

use dirpg_filter::CompiledFilter;
use regex_lite::Regex;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// A parsed predicate, ready to test documents.
#[derive(Debug)]
pub struct Predicate {
    root: Node,
}

#[derive(Debug)]
enum Node {
    Const(bool),
    All(Vec<Node>),
    Any(Vec<Node>),
    Leaf(PathExpr),
}

#[derive(Debug)]
enum PathExpr {
    Compare { key: String, op: CmpOp, literal: Value },
    Regex { key: String, regex: Regex },
    Exists { key: String },
    Not(Box<PathExpr>),
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Eq,
    Ge,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Open,
    Close,
    And,
    Or,
    True,
    False,
    Param(usize),
}

impl Predicate {
    /// Parse a compiled filter and its parameters.
    pub fn compile(filter: &CompiledFilter) -> StoreResult<Self> {
        let tokens = tokenize(&filter.predicate)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            params: &filter.params,
        };
        let root = parser.expr()?;
        if parser.pos != tokens.len() {
            return Err(malformed("trailing tokens in predicate"));
        }
        Ok(Self { root })
    }

    /// Returns `true` if the normalized document satisfies the predicate.
    pub fn matches(&self, doc: &Value) -> bool {
        self.root.eval(doc)
    }
}

impl Node {
    fn eval(&self, doc: &Value) -> bool {
        match self {
            Self::Const(b) => *b,
            Self::All(children) => children.iter().all(|c| c.eval(doc)),
            Self::Any(children) => children.iter().any(|c| c.eval(doc)),
            Self::Leaf(expr) => expr.eval(doc),
        }
    }
}

impl PathExpr {
    fn eval(&self, doc: &Value) -> bool {
        match self {
            Self::Compare { key, op, literal } => {
                elements(doc, key).any(|v| compare(v, literal).is_some_and(|o| op.holds(o)))
            }
            Self::Regex { key, regex } => {
                elements(doc, key).any(|v| v.as_str().is_some_and(|s| regex.is_match(s)))
            }
            Self::Exists { key } => doc.get(key).is_some(),
            Self::Not(inner) => !inner.eval(doc),
        }
    }
}

impl CmpOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ge => ordering != Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
        }
    }
}

fn elements<'a>(doc: &'a Value, key: &str) -> Box<dyn Iterator<Item = &'a Value> + 'a> {
    match doc.get(key) {
        Some(Value::Array(items)) => Box::new(items.iter()),
        Some(single) => Box::new(std::iter::once(single)),
        None => Box::new(std::iter::empty()),
    }
}

/// Compare two JSON scalars of the same kind. Mixed kinds never compare.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn malformed(reason: impl Into<String>) -> StoreError {
    StoreError::Backend(format!("malformed predicate: {}", reason.into()))
}

fn tokenize(text: &str) -> StoreResult<Vec<Token>> {
    let spaced = text.replace('(', " ( ").replace(')', " ) ");
    let words: Vec<&str> = spaced.split_whitespace().collect();
    let mut tokens = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        if words.get(i + 1) == Some(&"@@") {
            let index = words
                .get(i + 2)
                .and_then(|w| w.strip_prefix(':'))
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| malformed(format!("bad parameter reference after '{}'", words[i])))?;
            tokens.push(Token::Param(index));
            i += 3;
            continue;
        }
        tokens.push(match words[i] {
            "(" => Token::Open,
            ")" => Token::Close,
            "AND" => Token::And,
            "OR" => Token::Or,
            "TRUE" => Token::True,
            "FALSE" => Token::False,
            other => return Err(malformed(format!("unexpected '{other}'"))),
        });
        i += 1;
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    params: &'a [String],
}

impl Parser<'_> {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).copied();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> StoreResult<Node> {
        let first = self.term()?;
        let joiner = match self.tokens.get(self.pos) {
            Some(t @ (Token::And | Token::Or)) => *t,
            _ => return Ok(first),
        };
        let mut children = vec![first];
        while self.tokens.get(self.pos) == Some(&joiner) {
            self.pos += 1;
            children.push(self.term()?);
        }
        if matches!(self.tokens.get(self.pos), Some(Token::And | Token::Or)) {
            return Err(malformed("mixed AND/OR without parentheses"));
        }
        Ok(if joiner == Token::And {
            Node::All(children)
        } else {
            Node::Any(children)
        })
    }

    fn term(&mut self) -> StoreResult<Node> {
        match self.next() {
            Some(Token::Open) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(malformed("missing ')'")),
                }
            }
            Some(Token::True) => Ok(Node::Const(true)),
            Some(Token::False) => Ok(Node::Const(false)),
            Some(Token::Param(index)) => {
                let text = self
                    .params
                    .get(index)
                    .ok_or_else(|| malformed(format!("parameter :{index} not bound")))?;
                Ok(Node::Leaf(parse_path_expr(text)?))
            }
            _ => Err(malformed("expected a term")),
        }
    }
}

fn parse_path_expr(text: &str) -> StoreResult<PathExpr> {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix("!(").and_then(|r| r.strip_suffix(')')) {
        return Ok(PathExpr::Not(Box::new(parse_path_expr(inner)?)));
    }
    if let Some(inner) = text.strip_prefix("exists(").and_then(|r| r.strip_suffix(')')) {
        let (key, rest) = parse_path(inner)?;
        if !rest.trim().is_empty() {
            return Err(malformed(format!("unexpected text in exists: {rest}")));
        }
        return Ok(PathExpr::Exists { key });
    }

    let (key, rest) = parse_path(text)?;
    let rest = rest.trim_start();
    if let Some(pattern) = rest.strip_prefix("like_regex") {
        let pattern: String = serde_json::from_str(pattern.trim())
            .map_err(|e| malformed(format!("bad regex literal: {e}")))?;
        let regex = Regex::new(&pattern).map_err(|e| malformed(format!("bad regex: {e}")))?;
        return Ok(PathExpr::Regex { key, regex });
    }

    let (op, literal) = if let Some(l) = rest.strip_prefix("==") {
        (CmpOp::Eq, l)
    } else if let Some(l) = rest.strip_prefix(">=") {
        (CmpOp::Ge, l)
    } else if let Some(l) = rest.strip_prefix("<=") {
        (CmpOp::Le, l)
    } else {
        return Err(malformed(format!("unknown operator in '{text}'")));
    };
    let literal: Value = serde_json::from_str(literal.trim())
        .map_err(|e| malformed(format!("bad literal: {e}")))?;
    Ok(PathExpr::Compare { key, op, literal })
}

/// Split `$."key" rest` into the decoded key and the remaining text.
fn parse_path(text: &str) -> StoreResult<(String, &str)> {
    let quoted = text
        .trim_start()
        .strip_prefix("$.")
        .ok_or_else(|| malformed(format!("expected a path in '{text}'")))?;
    if !quoted.starts_with('"') {
        return Err(malformed("path key must be quoted"));
    }
    let mut escaped = false;
    let mut end = None;
    for (i, c) in quoted.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => {
                end = Some(i);
                break;
            }
            _ => {}
        }
    }
    let end = end.ok_or_else(|| malformed("unterminated path key"))?;
    let key: String = serde_json::from_str(&quoted[..=end])
        .map_err(|e| malformed(format!("bad path key: {e}")))?;
    Ok((key, &quoted[end + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirpg_filter::{Filter, FilterCompiler};
    use dirpg_schema::Schema;
    use serde_json::json;

    fn predicate(filter: &str) -> Predicate {
        let schema = Schema::builtin();
        let compiled = FilterCompiler::new(&schema)
            .compile(&Filter::parse(filter).unwrap())
            .unwrap();
        Predicate::compile(&compiled).unwrap()
    }

    fn doc() -> Value {
        json!({
            "cn": ["alice", "al"],
            "sn": ["smith"],
            "uidnumber": [1000],
            "objectclass": ["inetorgperson", "top"],
        })
    }

    // ---- Test 1: leaves ----

    #[test]
    fn equality_matches_any_element() {
        assert!(predicate("(cn=al)").matches(&doc()));
        assert!(predicate("(cn=ALICE)").matches(&doc()));
        assert!(!predicate("(cn=bob)").matches(&doc()));
    }

    #[test]
    fn numeric_ordering() {
        assert!(predicate("(uidNumber>=1000)").matches(&doc()));
        assert!(predicate("(uidNumber<=1000)").matches(&doc()));
        assert!(!predicate("(uidNumber>=1001)").matches(&doc()));
        // A non-numeric assertion never compares with numbers.
        assert!(!predicate("(uidNumber>=abc)").matches(&doc()));
    }

    #[test]
    fn presence_and_substrings() {
        assert!(predicate("(sn=*)").matches(&doc()));
        assert!(!predicate("(mail=*)").matches(&doc()));
        assert!(predicate("(cn=al*e)").matches(&doc()));
        assert!(predicate("(cn=*lic*)").matches(&doc()));
        assert!(!predicate("(cn=x*)").matches(&doc()));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let d = json!({"cn": ["a.b"]});
        assert!(predicate("(cn=a.*)").matches(&d));
        assert!(!predicate("(cn=a.*)").matches(&json!({"cn": ["ab"]})));
    }

    // ---- Test 2: negation and composites ----

    #[test]
    fn negation_of_missing_attribute_holds() {
        assert!(predicate("(!(mail=x))").matches(&doc()));
        assert!(!predicate("(!(cn=al))").matches(&doc()));
    }

    #[test]
    fn composites() {
        assert!(predicate("(&(cn=al)(sn=smith))").matches(&doc()));
        assert!(!predicate("(&(cn=al)(sn=jones))").matches(&doc()));
        assert!(predicate("(|(cn=bob)(&(sn=smith)(!(mail=*))))").matches(&doc()));
        assert!(predicate("(!(&(cn=bob)(sn=smith)))").matches(&doc()));
    }

    #[test]
    fn constants() {
        assert!(predicate("(&)").matches(&doc()));
        assert!(!predicate("(|)").matches(&doc()));
        assert!(!predicate("(!(&))").matches(&doc()));
    }

    #[test]
    fn tagged_keys() {
        let d = json!({"cn;lang-ja": ["foo"]});
        assert!(predicate("(cn;lang-ja=foo)").matches(&d));
        assert!(!predicate("(cn=foo)").matches(&d));
    }

    // ---- Test 3: malformed input ----

    #[test]
    fn malformed_predicates_are_backend_errors() {
        let bad = |predicate: &str, params: &[&str]| {
            Predicate::compile(&CompiledFilter {
                predicate: predicate.to_string(),
                params: params.iter().map(|s| s.to_string()).collect(),
            })
            .unwrap_err()
        };
        assert!(matches!(bad("e.doc @@ :1", &["exists($.\"cn\")"]), StoreError::Backend(_)));
        assert!(matches!(bad("e.doc @@ :0", &["$.cn == 1"]), StoreError::Backend(_)));
        assert!(matches!(bad("e.doc @@ :0", &["$.\"cn\" != 1"]), StoreError::Backend(_)));
        assert!(matches!(bad("(TRUE AND FALSE", &[]), StoreError::Backend(_)));
        assert!(matches!(bad("TRUE AND FALSE OR TRUE", &[]), StoreError::Backend(_)));
    }
}
