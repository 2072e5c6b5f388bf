/*
 * parser/inline.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The inline syntax inside `{...}`.
//!
//! ```text
//! {user.name}
//! {f:format.raw(value: title)}
//! {title -> f:format.htmlspecialchars() -> f:format.raw()}
//! {key: 'value', other: items.0}
//! ```

use crate::expression::{is_valid_path, scan};
use crate::value::Scalar;
use once_cell::sync::Lazy;
use regex::Regex;

static CALL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^([A-Za-z][A-Za-z0-9_-]*):([A-Za-z][A-Za-z0-9_.]*)\((.*)\)$")
        .expect("inline call pattern is valid")
});

static KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_-]*$").expect("key pattern is valid"));

/// `prefix:name(arg: value, ...)`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InlineCall<'s> {
    pub prefix: &'s str,
    pub name: &'s str,
    /// Argument names with their unparsed values.
    pub arguments: Vec<(String, &'s str)>,
}

/// The head of an inline chain.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InlineValue<'s> {
    Call(InlineCall<'s>),
    Path(&'s str),
    Literal(Scalar),
    /// Keys with their unparsed values.
    Array(Vec<(String, &'s str)>),
}

/// `head -> call -> call`. Calls are listed innermost first.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InlineChain<'s> {
    pub head: InlineValue<'s>,
    pub calls: Vec<InlineCall<'s>>,
}

impl InlineChain<'_> {
    /// Every call in the chain, the head included.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        let head = match &self.head {
            InlineValue::Call(call) => Some(call.prefix),
            _ => None,
        };
        head.into_iter().chain(self.calls.iter().map(|call| call.prefix))
    }
}

pub(crate) fn parse_chain(text: &str) -> Option<InlineChain<'_>> {
    let mut parts = scan::split_arrows(text).into_iter();
    let head = parse_value(parts.next()?)?;
    let calls = parts.map(parse_call).collect::<Option<Vec<_>>>()?;
    Some(InlineChain { head, calls })
}

pub(crate) fn parse_value(text: &str) -> Option<InlineValue<'_>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(call) = parse_call(text) {
        return Some(InlineValue::Call(call));
    }
    if let Some(content) = scan::unquote(text) {
        return Some(InlineValue::Literal(Scalar::String(content)));
    }
    if let Some(scalar) = Scalar::parse_keyword_or_number(text) {
        return Some(InlineValue::Literal(scalar));
    }
    if is_valid_path(text) {
        return Some(InlineValue::Path(text));
    }
    parse_pairs(text).map(InlineValue::Array)
}

pub(crate) fn parse_call(text: &str) -> Option<InlineCall<'_>> {
    let text = text.trim();
    let captures = CALL_PATTERN.captures(text)?;
    let prefix = captures.get(1)?.as_str();
    let name = captures.get(2)?.as_str();
    let body = captures.get(3)?.as_str();
    // `f:a() -> f:b()` also matches the pattern; the parentheses must pair up.
    let open = prefix.len() + 1 + name.len();
    if matching_paren(text, open) != Some(text.len() - 1) {
        return None;
    }
    let arguments = if body.trim().is_empty() {
        Vec::new()
    } else {
        parse_pairs(body)?
    };
    Some(InlineCall {
        prefix,
        name,
        arguments,
    })
}

/// `key: value, key: value`. `None` unless every entry is well formed.
fn parse_pairs(text: &str) -> Option<Vec<(String, &str)>> {
    let mut pairs = Vec::new();
    for entry in scan::split_top_level(text, ',') {
        let (colon, _) = scan::top_level(entry)
            .into_iter()
            .find(|(_, c)| *c == ':')?;
        let key = entry[..colon].trim();
        let value = entry[colon + 1..].trim();
        if value.is_empty() {
            return None;
        }
        let key = match scan::unquote(key) {
            Some(unquoted) => unquoted,
            None if KEY_PATTERN.is_match(key) => key.to_string(),
            None => return None,
        };
        if pairs.iter().any(|(existing, _)| *existing == key) {
            return None;
        }
        pairs.push((key, value));
    }
    Some(pairs)
}

/// Index of the `)` matching the `(` at `open`, skipping quoted strings.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }
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
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
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
