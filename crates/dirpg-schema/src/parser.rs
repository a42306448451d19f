//! RFC 4512 schema definition parser.
//!
//! Accepts definitions in the form published by `cn=schema`:
//!
//! ```text
//! ( 2.5.4.3 NAME ( 'cn' 'commonName' ) SUP name )
//! ( 2.5.6.6 NAME 'person' SUP top STRUCTURAL MUST ( sn $ cn ) MAY description )
//! ```
//!
//! An optional `attributeTypes:` or `objectClasses:` prefix selects the kind
//! explicitly. Without a prefix the kind is inferred from the keywords used.
//! Unknown extension keywords (`X-ORIGIN` and friends) are skipped.

use crate::error::{SchemaError, SchemaResult};
use crate::object_class::ObjectClassKind;
use crate::attribute::AttributeUsage;

/// An attribute type as written, before superior resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeTypeDefinition {
    pub oid: String,
    pub names: Vec<String>,
    pub desc: Option<String>,
    pub sup: Option<String>,
    pub equality: Option<String>,
    pub syntax: Option<String>,
    pub single_value: bool,
    pub no_user_modification: bool,
    pub usage: AttributeUsage,
}

/// An object class as written, before superclass resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectClassDefinition {
    pub oid: String,
    pub names: Vec<String>,
    pub desc: Option<String>,
    pub sup: Vec<String>,
    pub kind: ObjectClassKind,
    pub must: Vec<String>,
    pub may: Vec<String>,
}

/// One parsed definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Definition {
    AttributeType(AttributeTypeDefinition),
    ObjectClass(ObjectClassDefinition),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Dollar,
    Quoted(String),
    Word(String),
}

const OBJECT_CLASS_KEYWORDS: &[&str] = &["STRUCTURAL", "AUXILIARY", "ABSTRACT", "MUST", "MAY"];

/// Parse a definition, detecting its kind.
pub fn parse_definition(text: &str) -> SchemaResult<Definition> {
    let trimmed = text.trim();
    if let Some((prefix, rest)) = trimmed.split_once(':') {
        match prefix.trim().to_ascii_lowercase().as_str() {
            "attributetypes" => return parse_attribute_type(rest).map(Definition::AttributeType),
            "objectclasses" => return parse_object_class(rest).map(Definition::ObjectClass),
            _ => {}
        }
    }

    let tokens = tokenize(trimmed)?;
    let is_class = tokens.iter().any(|t| {
        matches!(t, Token::Word(w) if OBJECT_CLASS_KEYWORDS.contains(&w.to_ascii_uppercase().as_str()))
    });
    if is_class {
        parse_object_class(trimmed).map(Definition::ObjectClass)
    } else {
        parse_attribute_type(trimmed).map(Definition::AttributeType)
    }
}

/// Parse an attribute type definition.
pub fn parse_attribute_type(text: &str) -> SchemaResult<AttributeTypeDefinition> {
    let mut cursor = Cursor::open(text)?;
    let mut def = AttributeTypeDefinition {
        oid: cursor.oid()?,
        ..Default::default()
    };

    while let Some(keyword) = cursor.keyword()? {
        match keyword.as_str() {
            "NAME" => def.names = cursor.qdescrs()?,
            "DESC" => def.desc = Some(cursor.quoted()?),
            "OBSOLETE" | "COLLECTIVE" => {}
            "SUP" => def.sup = Some(cursor.word()?),
            "EQUALITY" => def.equality = Some(cursor.word()?),
            "ORDERING" | "SUBSTR" => {
                cursor.word()?;
            }
            "SYNTAX" => {
                let raw = cursor.word()?;
                let oid = raw.split('{').next().unwrap_or(&raw).to_string();
                def.syntax = Some(oid);
            }
            "SINGLE-VALUE" => def.single_value = true,
            "NO-USER-MODIFICATION" => def.no_user_modification = true,
            "USAGE" => {
                let raw = cursor.word()?;
                def.usage = AttributeUsage::from_keyword(&raw)
                    .ok_or_else(|| cursor.error(format!("unknown usage {raw}")))?;
            }
            k if k.starts_with("X-") => cursor.skip_extension()?,
            other => return Err(cursor.error(format!("unexpected keyword {other}"))),
        }
    }

    if def.names.is_empty() {
        return Err(cursor.error("missing NAME"));
    }
    Ok(def)
}

/// Parse an object class definition.
pub fn parse_object_class(text: &str) -> SchemaResult<ObjectClassDefinition> {
    let mut cursor = Cursor::open(text)?;
    let mut def = ObjectClassDefinition {
        oid: cursor.oid()?,
        ..Default::default()
    };

    while let Some(keyword) = cursor.keyword()? {
        match keyword.as_str() {
            "NAME" => def.names = cursor.qdescrs()?,
            "DESC" => def.desc = Some(cursor.quoted()?),
            "OBSOLETE" => {}
            "SUP" => def.sup = cursor.oids()?,
            "STRUCTURAL" => def.kind = ObjectClassKind::Structural,
            "AUXILIARY" => def.kind = ObjectClassKind::Auxiliary,
            "ABSTRACT" => def.kind = ObjectClassKind::Abstract,
            "MUST" => def.must = cursor.oids()?,
            "MAY" => def.may = cursor.oids()?,
            k if k.starts_with("X-") => cursor.skip_extension()?,
            other => return Err(cursor.error(format!("unexpected keyword {other}"))),
        }
    }

    if def.names.is_empty() {
        return Err(cursor.error("missing NAME"));
    }
    Ok(def)
}

fn tokenize(text: &str) -> SchemaResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '$' => {
                chars.next();
                tokens.push(Token::Dollar);
            }
            '\'' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => s.push(ch),
                        None => {
                            return Err(SchemaError::Parse {
                                definition: text.to_string(),
                                reason: "unterminated quoted string".into(),
                            })
                        }
                    }
                }
                tokens.push(Token::Quoted(s));
            }
            _ => {
                let mut s = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, '(' | ')' | '$' | '\'') {
                        break;
                    }
                    s.push(ch);
                    chars.next();
                }
                tokens.push(Token::Word(s));
            }
        }
    }
    Ok(tokens)
}

struct Cursor<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn open(text: &'a str) -> SchemaResult<Self> {
        let text = text.trim();
        let tokens = tokenize(text)?;
        let mut cursor = Self { text, tokens, pos: 0 };
        if cursor.next() != Some(Token::Open) {
            return Err(cursor.error("definition must start with '('"));
        }
        if cursor.tokens.last() != Some(&Token::Close) {
            return Err(cursor.error("definition must end with ')'"));
        }
        // Drop the outer close so keyword() stops at the end.
        cursor.tokens.pop();
        Ok(cursor)
    }

    fn error(&self, reason: impl Into<String>) -> SchemaError {
        SchemaError::Parse {
            definition: self.text.to_string(),
            reason: reason.into(),
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn oid(&mut self) -> SchemaResult<String> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            _ => Err(self.error("missing numeric OID")),
        }
    }

    fn keyword(&mut self) -> SchemaResult<Option<String>> {
        match self.next() {
            None => Ok(None),
            Some(Token::Word(w)) => Ok(Some(w.to_ascii_uppercase())),
            Some(other) => Err(self.error(format!("expected keyword, found {other:?}"))),
        }
    }

    fn word(&mut self) -> SchemaResult<String> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            // Some producers quote single OIDs.
            Some(Token::Quoted(q)) => Ok(q),
            _ => Err(self.error("expected a word")),
        }
    }

    fn quoted(&mut self) -> SchemaResult<String> {
        match self.next() {
            Some(Token::Quoted(q)) => Ok(q),
            _ => Err(self.error("expected a quoted string")),
        }
    }

    /// `'name'` or `( 'a' 'b' )`.
    fn qdescrs(&mut self) -> SchemaResult<Vec<String>> {
        if self.peek() == Some(&Token::Open) {
            self.next();
            let mut out = Vec::new();
            loop {
                match self.next() {
                    Some(Token::Quoted(q)) => out.push(q),
                    Some(Token::Close) => break,
                    _ => return Err(self.error("malformed NAME list")),
                }
            }
            Ok(out)
        } else {
            Ok(vec![self.quoted()?])
        }
    }

    /// `oid` or `( oid $ oid ... )`.
    fn oids(&mut self) -> SchemaResult<Vec<String>> {
        if self.peek() != Some(&Token::Open) {
            return Ok(vec![self.word()?]);
        }
        self.next();
        let mut out = Vec::new();
        loop {
            match self.next() {
                Some(Token::Word(w)) | Some(Token::Quoted(w)) => out.push(w),
                Some(Token::Dollar) => {}
                Some(Token::Close) => break,
                _ => return Err(self.error("malformed attribute list")),
            }
        }
        Ok(out)
    }

    fn skip_extension(&mut self) -> SchemaResult<()> {
        match self.next() {
            Some(Token::Quoted(_)) => Ok(()),
            Some(Token::Open) => loop {
                match self.next() {
                    Some(Token::Close) => return Ok(()),
                    Some(_) => {}
                    None => return Err(self.error("unterminated extension")),
                }
            },
            _ => Err(self.error("malformed extension")),
        }
    }
}
