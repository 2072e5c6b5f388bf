/*
 * lexer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tokenizer for template source.
//!
//! The lexer splits source into text, namespaced tags, `{...}` expressions and
//! CDATA sections. It knows nothing about which prefixes are bound to
//! ViewHelpers: every `<prefix:name ...>` that matches the prefix pattern is
//! reported as a tag, and the parser turns unknown ones back into text.
//!
//! Expressions are emitted as three tokens: [`TokenKind::ExpressionStart`]
//! (`{`), an optional [`TokenKind::Text`] carrying the body, and
//! [`TokenKind::ExpressionEnd`] (`}`).

use crate::error::LexError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::VecDeque;

/// Default pattern for namespace prefixes.
pub const DEFAULT_PREFIX_PATTERN: &str = "[A-Za-z][A-Za-z0-9_-]*";

static DEFAULT_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| tag_pattern(DEFAULT_PREFIX_PATTERN).expect("default tag pattern is valid"));

fn tag_pattern(prefix: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"^</?(?:{prefix}):[A-Za-z][A-Za-z0-9_.-]*(?:[\s/>]|$)"
    ))
}

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    TagOpen,
    TagClose,
    TagSelfClose,
    ExpressionStart,
    ExpressionEnd,
    Cdata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset of `text` in the source.
    pub offset: usize,
}

/// Lexer settings shared by every parse of one parser configuration.
#[derive(Debug, Clone)]
pub struct LexerOptions {
    tag_pattern: Regex,
}

impl Default for LexerOptions {
    fn default() -> Self {
        Self {
            tag_pattern: DEFAULT_TAG_PATTERN.clone(),
        }
    }
}

impl LexerOptions {
    /// Use a custom namespace prefix pattern (a regex fragment without anchors).
    pub fn with_prefix_pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            tag_pattern: tag_pattern(pattern)?,
        })
    }

    pub fn tag_pattern(&self) -> &str {
        self.tag_pattern.as_str()
    }
}

#[derive(Debug, Clone, Copy)]
enum Boundary {
    Tag,
    Expression,
    Cdata,
}

/// Lazy token stream over one source text.
#[derive(Debug)]
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    base_offset: usize,
    tags: bool,
    options: LexerOptions,
    pending: VecDeque<Token<'a>>,
    failed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_options(source, LexerOptions::default())
    }

    pub fn with_options(source: &'a str, options: LexerOptions) -> Self {
        Self {
            source,
            pos: 0,
            base_offset: 0,
            tags: true,
            options,
            pending: VecDeque::new(),
            failed: false,
        }
    }

    /// A lexer that only recognizes expressions. Used for attribute values
    /// and for the markup of tags that turned out to be literal text.
    /// Token offsets are shifted by `base_offset`.
    pub fn text_only(source: &'a str, base_offset: usize) -> Self {
        Self {
            base_offset,
            tags: false,
            ..Self::new(source)
        }
    }

    fn token(&self, kind: TokenKind, start: usize, end: usize) -> Token<'a> {
        Token {
            kind,
            text: &self.source[start..end],
            offset: self.base_offset + start,
        }
    }

    fn find_boundary(&self) -> Option<(usize, Boundary)> {
        let source = self.source;
        let rest = &source[self.pos..];
        let bytes = rest.as_bytes();
        for (i, b) in bytes.iter().enumerate() {
            match b {
                b'{' => {
                    if bytes.get(i + 1).is_some_and(|next| !next.is_ascii_whitespace()) {
                        return Some((i, Boundary::Expression));
                    }
                }
                b'<' if self.tags => {
                    let candidate = &rest[i..];
                    if candidate.starts_with(CDATA_OPEN) {
                        return Some((i, Boundary::Cdata));
                    }
                    if self.options.tag_pattern.is_match(candidate) {
                        return Some((i, Boundary::Tag));
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn lex_boundary(&mut self, boundary: Boundary) -> Result<Token<'a>, LexError> {
        let start = self.pos;
        let source = self.source;
        let rest = &source[start..];
        let offset = self.base_offset + start;
        match boundary {
            Boundary::Expression => {
                let close = matching_brace(rest, 0)
                    .ok_or(LexError::UnterminatedExpression { offset })?;
                if close > 1 {
                    let body = self.token(TokenKind::Text, start + 1, start + close);
                    self.pending.push_back(body);
                }
                let end = self.token(TokenKind::ExpressionEnd, start + close, start + close + 1);
                self.pending.push_back(end);
                self.pos = start + close + 1;
                Ok(self.token(TokenKind::ExpressionStart, start, start + 1))
            }
            Boundary::Cdata => {
                let close = rest[CDATA_OPEN.len()..]
                    .find(CDATA_CLOSE)
                    .ok_or(LexError::UnterminatedCdata { offset })?;
                let end = start + CDATA_OPEN.len() + close + CDATA_CLOSE.len();
                self.pos = end;
                Ok(self.token(TokenKind::Cdata, start, end))
            }
            Boundary::Tag => {
                let close = tag_end(rest).ok_or(LexError::UnterminatedTag { offset })?;
                let text = &rest[..=close];
                let kind = if text.starts_with("</") {
                    TokenKind::TagClose
                } else if text.ends_with("/>") {
                    TokenKind::TagSelfClose
                } else {
                    TokenKind::TagOpen
                };
                self.pos = start + close + 1;
                Ok(self.token(kind, start, start + close + 1))
            }
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(token) = self.pending.pop_front() {
            return Some(Ok(token));
        }
        if self.failed || self.pos >= self.source.len() {
            return None;
        }
        match self.find_boundary() {
            None => {
                let token = self.token(TokenKind::Text, self.pos, self.source.len());
                self.pos = self.source.len();
                Some(Ok(token))
            }
            Some((0, boundary)) => match self.lex_boundary(boundary) {
                Ok(token) => Some(Ok(token)),
                Err(error) => {
                    self.failed = true;
                    Some(Err(error))
                }
            },
            Some((len, _)) => {
                let token = self.token(TokenKind::Text, self.pos, self.pos + len);
                self.pos += len;
                Some(Ok(token))
            }
        }
    }
}

/// Index of the `}` matching the `{` at `open`, skipping quoted strings.
pub(crate) fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Index of the `>` closing a tag, ignoring `>` inside quoted attributes.
fn tag_end(text: &str) -> Option<usize> {
    let mut quote: Option<u8> = None;
    let mut escaped = false;
    for (i, b) in text.bytes().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            Some(_) if b == b'\\' => escaped = true,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

/// The content of a CDATA token without its markers.
pub fn cdata_content(text: &str) -> &str {
    text.strip_prefix(CDATA_OPEN)
        .and_then(|t| t.strip_suffix(CDATA_CLOSE))
        .unwrap_or(text)
}

/// A tag token split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag<'a> {
    pub prefix: &'a str,
    pub name: &'a str,
    pub attributes: Vec<Attribute<'a>>,
    pub kind: TokenKind,
    pub offset: usize,
}

impl Tag<'_> {
    /// `prefix:name`
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.prefix, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute<'a> {
    pub name: &'a str,
    pub value: Cow<'a, str>,
    /// Offset of the value's first character in the source.
    pub offset: usize,
}

/// Split a tag token into prefix, local name and attributes.
pub fn parse_tag<'a>(token: &Token<'a>) -> Result<Tag<'a>, LexError> {
    let malformed = |message: &str| LexError::MalformedTag {
        offset: token.offset,
        message: message.to_string(),
    };
    let text = token.text;
    let inner = text
        .strip_prefix("</")
        .or_else(|| text.strip_prefix('<'))
        .ok_or_else(|| malformed("missing '<'"))?;
    let inner_start = text.len() - inner.len();
    let inner = inner.strip_suffix('>').ok_or_else(|| malformed("missing '>'"))?;
    let inner = inner.strip_suffix('/').unwrap_or(inner);

    let name_end = inner
        .find(|c: char| c.is_whitespace())
        .unwrap_or(inner.len());
    let (prefix, name) = inner[..name_end]
        .split_once(':')
        .ok_or_else(|| malformed("missing namespace prefix"))?;

    let mut attributes = Vec::new();
    let bytes = inner.as_bytes();
    let mut i = name_end;
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        if token.kind == TokenKind::TagClose {
            return Err(malformed("closing tags cannot carry attributes"));
        }
        let name_start = i;
        while i < bytes.len() && bytes[i] != b'=' && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let attribute_name = &inner[name_start..i];
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            return Err(malformed(&format!(
                "attribute \"{attribute_name}\" has no value"
            )));
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let quote = match bytes.get(i) {
            Some(q @ (b'"' | b'\'')) => *q,
            _ => {
                return Err(malformed(&format!(
                    "value of attribute \"{attribute_name}\" must be quoted"
                )));
            }
        };
        i += 1;
        let value_start = i;
        let mut has_escapes = false;
        while i < bytes.len() && bytes[i] != quote {
            if bytes[i] == b'\\' && bytes.get(i + 1) == Some(&quote) {
                has_escapes = true;
                i += 1;
            }
            i += 1;
        }
        if i >= bytes.len() {
            return Err(malformed(&format!(
                "unterminated value of attribute \"{attribute_name}\""
            )));
        }
        let raw = &inner[value_start..i];
        let value = if has_escapes {
            let escaped = format!("\\{}", quote as char);
            Cow::Owned(raw.replace(&escaped, &(quote as char).to_string()))
        } else {
            Cow::Borrowed(raw)
        };
        attributes.push(Attribute {
            name: attribute_name,
            value,
            offset: token.offset + inner_start + value_start,
        });
        i += 1;
    }

    Ok(Tag {
        prefix,
        name,
        attributes,
        kind: token.kind,
        offset: token.offset,
    })
}
