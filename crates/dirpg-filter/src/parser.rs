//! RFC 4515 string filter parser.
//!
//! Accepts the usual forms: `(cn=foo)`, `(&(a=1)(|(b=2)(!(c=*))))`,
//! substrings such as `(cn=fo*b*ar)`, and the `>=`, `<=`, `~=` operators.
//! Values use `\XX` hex escapes. A bare `cn=foo` without the outer
//! parentheses is accepted as a convenience. Extensible matching is rejected.

use crate::ast::Filter;
use crate::error::{FilterError, FilterResult};

/// Deepest accepted nesting of `&`, `|` and `!` filters.
pub const MAX_DEPTH: usize = 256;

impl Filter {
    /// Parse an RFC 4515 filter string.
    ///
    /// # Examples
    ///
    /// ```
    /// use dirpg_filter::Filter;
    ///
    /// let f = Filter::parse("(&(cn=foo)(!(uid=bar)))").unwrap();
    /// assert_eq!(f.to_string(), "(&(cn=foo)(!(uid=bar)))");
    /// ```
    pub fn parse(text: &str) -> FilterResult<Filter> {
        let trimmed = text.trim();
        let wrapped;
        let source = if trimmed.starts_with('(') {
            trimmed
        } else {
            wrapped = format!("({trimmed})");
            wrapped.as_str()
        };

        let mut parser = Parser {
            bytes: source.as_bytes(),
            pos: 0,
            depth: 0,
        };
        let filter = parser.filter()?;
        if parser.pos != parser.bytes.len() {
            return Err(FilterError::TrailingInput { position: parser.pos });
        }
        Ok(filter)
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, want: u8) -> FilterResult<()> {
        match self.peek() {
            Some(b) if b == want => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(self.syntax(format!(
                "expected '{}', found '{}'",
                want as char, b as char
            ))),
            None => Err(FilterError::UnexpectedEnd),
        }
    }

    fn syntax(&self, reason: impl Into<String>) -> FilterError {
        FilterError::Syntax {
            position: self.pos,
            reason: reason.into(),
        }
    }

    fn filter(&mut self) -> FilterResult<Filter> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FilterError::TooDeep { limit: MAX_DEPTH });
        }
        let filter = self.nested();
        self.depth -= 1;
        filter
    }

    fn nested(&mut self) -> FilterResult<Filter> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And {
                    filters: self.list()?,
                }
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or {
                    filters: self.list()?,
                }
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not {
                    filter: Box::new(self.filter()?),
                }
            }
            Some(_) => self.item()?,
            None => return Err(FilterError::UnexpectedEnd),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn list(&mut self) -> FilterResult<Vec<Filter>> {
        let mut filters = Vec::new();
        while self.peek() == Some(b'(') {
            filters.push(self.filter()?);
        }
        Ok(filters)
    }

    fn item(&mut self) -> FilterResult<Filter> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b';' | b'.') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let attr = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| self.syntax("attribute description is not UTF-8"))?
            .to_string();

        let op = match self.peek() {
            Some(b'=') => {
                self.pos += 1;
                Op::Equal
            }
            Some(b @ (b'~' | b'>' | b'<')) => {
                self.pos += 1;
                self.expect(b'=')?;
                match b {
                    b'~' => Op::Approx,
                    b'>' => Op::GreaterOrEqual,
                    _ => Op::LessOrEqual,
                }
            }
            Some(b':') => {
                return Err(FilterError::Unsupported {
                    what: "extensible match".into(),
                })
            }
            Some(b) => return Err(self.syntax(format!("unexpected '{}'", b as char))),
            None => return Err(FilterError::UnexpectedEnd),
        };
        if attr.is_empty() {
            return Err(FilterError::Syntax {
                position: start,
                reason: "missing attribute description".into(),
            });
        }

        let value_start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b')' => break,
                b'(' => return Err(self.syntax("unescaped '(' in assertion value")),
                _ => self.pos += 1,
            }
        }
        let raw = &self.bytes[value_start..self.pos];

        match op {
            Op::Equal if raw == b"*" => Ok(Filter::Present { attr }),
            Op::Equal if raw.contains(&b'*') => self.substrings(attr, raw, value_start),
            Op::Equal => Ok(Filter::Equality {
                attr,
                value: unescape(raw, value_start)?,
            }),
            _ if raw.contains(&b'*') => Err(FilterError::Syntax {
                position: value_start,
                reason: "wildcard not allowed with this operator".into(),
            }),
            Op::Approx => Ok(Filter::Approx {
                attr,
                value: unescape(raw, value_start)?,
            }),
            Op::GreaterOrEqual => Ok(Filter::GreaterOrEqual {
                attr,
                value: unescape(raw, value_start)?,
            }),
            Op::LessOrEqual => Ok(Filter::LessOrEqual {
                attr,
                value: unescape(raw, value_start)?,
            }),
        }
    }

    fn substrings(&self, attr: String, raw: &[u8], offset: usize) -> FilterResult<Filter> {
        let parts: Vec<&[u8]> = raw.split(|b| *b == b'*').collect();
        let last = parts.len() - 1;

        let mut initial = None;
        let mut any = Vec::new();
        let mut final_ = None;
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                if i != 0 && i != last {
                    return Err(FilterError::Syntax {
                        position: offset,
                        reason: "empty substring between wildcards".into(),
                    });
                }
                continue;
            }
            let text = unescape(part, offset)?;
            if i == 0 {
                initial = Some(text);
            } else if i == last {
                final_ = Some(text);
            } else {
                any.push(text);
            }
        }
        Ok(Filter::Substrings {
            attr,
            initial,
            any,
            final_,
        })
    }
}

enum Op {
    Equal,
    Approx,
    GreaterOrEqual,
    LessOrEqual,
}

fn unescape(raw: &[u8], offset: usize) -> FilterResult<String> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' {
            let hex = raw
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| FilterError::Syntax {
                    position: offset + i,
                    reason: "invalid escape sequence".into(),
                })?;
            out.push(hex);
            i += 3;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| FilterError::Syntax {
        position: offset,
        reason: "assertion value is not UTF-8".into(),
    })
}
