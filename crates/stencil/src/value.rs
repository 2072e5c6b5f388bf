/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template values.
//!
//! [`Value`] is what variables hold and what every node evaluates to. Host
//! application objects implement [`TemplateObject`] so that paths such as
//! `user.name` can reach into them.
//!
//! [`Scalar`] is the serializable subset of values that can appear as a
//! literal in template source; compiled templates store literals as scalars.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Ordered map of variable names (or array keys) to values.
pub type ValueMap = IndexMap<String, Value>;

/// An object supplied by the host application.
///
/// Every method has a default that reports "not available", so an
/// implementation only overrides the access styles it supports. The variable
/// extractor tries them in a fixed order: [`field`](Self::field),
/// [`index`](Self::index), [`call_getter`](Self::call_getter), custom
/// accessors, then [`magic_get`](Self::magic_get).
pub trait TemplateObject: fmt::Debug + Send + Sync {
    /// Name used in diagnostics.
    fn type_name(&self) -> &str;

    /// A public field.
    fn field(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Array-style access (`object[key]`).
    fn index(&self, _key: &str) -> Option<Value> {
        None
    }

    /// A zero-argument method such as `getName` or `isActive`.
    fn call_getter(&self, _method: &str) -> Option<Value> {
        None
    }

    /// Catch-all dynamic property lookup.
    fn magic_get(&self, _name: &str) -> Option<Value> {
        None
    }

    /// String conversion used when the object itself is output.
    fn to_template_string(&self) -> Option<String> {
        None
    }
}

/// A value that can be used in template evaluation.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(ValueMap),
    Object(Arc<dyn TemplateObject>),
}

/// A numeric view of a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Number::Int(i) => i,
            Number::Float(f) => f as i64,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::Int(i),
            Number::Float(f) => Value::Float(f),
        }
    }

    fn cmp_loose(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

/// Parse a string that looks like a number (`"12"`, `"-3.5"`, `"1e3"`).
///
/// Unlike `str::parse::<f64>`, words such as `"inf"` or `"NaN"` are not
/// numeric.
pub fn parse_numeric(text: &str) -> Option<Number> {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    if digits.is_empty()
        || !digits.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        || !digits
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
    {
        return None;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::Int(i));
    }
    text.parse::<f64>().ok().map(Number::Float)
}

impl Value {
    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "array",
            Value::Map(_) => "map",
            Value::Object(object) => object.type_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Boolean coercion.
    ///
    /// - `null`, `false`, `0`, `0.0` are false
    /// - `""`, `"0"` and `"false"` (any case) are false
    /// - empty lists and maps are false
    /// - everything else, objects included, is true
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Numeric value of integers, floats and numeric strings.
    pub fn to_number(&self) -> Option<Number> {
        match self {
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            Value::String(s) => parse_numeric(s),
            _ => None,
        }
    }

    /// Numeric value for arithmetic: anything non-numeric counts as zero.
    pub fn to_number_or_zero(&self) -> Number {
        match self {
            Value::Bool(b) => Number::Int(i64::from(*b)),
            other => other.to_number().unwrap_or(Number::Int(0)),
        }
    }

    /// Numeric value for ordering comparisons, where null and booleans count
    /// as 0/1.
    fn comparable_number(&self) -> Option<Number> {
        match self {
            Value::Null => Some(Number::Int(0)),
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            other => other.to_number(),
        }
    }

    /// Render this value as output text.
    ///
    /// - Null: ""
    /// - Bool: "true" or "" (empty for false)
    /// - Int / Float: decimal representation
    /// - List: concatenation of rendered elements
    /// - Map: ""
    /// - Object: its string conversion, or ""
    pub fn to_output_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(true) => "true".to_string(),
            Value::Bool(false) => String::new(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::List(items) => items.iter().map(Value::to_output_string).collect(),
            Value::Map(_) => String::new(),
            Value::Object(object) => object.to_template_string().unwrap_or_default(),
        }
    }

    /// Loose equality (`==`).
    ///
    /// Null equals any falsy value, booleans compare by truthiness, numbers
    /// and numeric strings compare numerically, other strings compare
    /// exactly. A non-numeric string never equals a number.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, v) | (v, Value::Null) => !v.is_truthy(),
            (Value::Bool(a), v) | (v, Value::Bool(a)) => *a == v.is_truthy(),
            (Value::String(a), Value::String(b)) => match (parse_numeric(a), parse_numeric(b)) {
                (Some(x), Some(y)) => x.cmp_loose(y) == Some(Ordering::Equal),
                _ => a == b,
            },
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.loose_eq(w)))
            }
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (a, b) => match (a.to_number(), b.to_number()) {
                (Some(x), Some(y)) => x.cmp_loose(y) == Some(Ordering::Equal),
                _ => false,
            },
        }
    }

    /// Strict equality (`===`): same type and same value.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.strict_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.strict_eq(vb))
            }
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`.
    ///
    /// Numeric when both sides are numeric-like (null and booleans count as
    /// 0/1), lexical when both are strings, otherwise unordered.
    pub fn loose_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self.comparable_number(), other.comparable_number()) {
            (Some(a), Some(b)) => a.cmp_loose(b),
            _ => match (self, other) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// A literal that can be written in template source and stored in a
/// compiled template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    pub fn to_value(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::Int(*i),
            Scalar::Float(f) => Value::Float(*f),
            Scalar::String(s) => Value::String(s.clone()),
        }
    }

    /// Parse a bare literal word: a number or `true`/`false`/`null` in any
    /// case.
    pub fn parse_keyword_or_number(word: &str) -> Option<Scalar> {
        if word.eq_ignore_ascii_case("true") {
            return Some(Scalar::Bool(true));
        }
        if word.eq_ignore_ascii_case("false") {
            return Some(Scalar::Bool(false));
        }
        if word.eq_ignore_ascii_case("null") {
            return Some(Scalar::Null);
        }
        parse_numeric(word).map(|n| match n {
            Number::Int(i) => Scalar::Int(i),
            Number::Float(f) => Scalar::Float(f),
        })
    }
}

/// Combine the values of a sequence of sibling nodes.
///
/// No values yield null, a single value passes through unchanged (so a lone
/// `{items}` stays a list), several values are concatenated as text.
pub fn concat_values(mut values: Vec<Value>) -> Value {
    match values.len() {
        0 => Value::Null,
        1 => values.pop().unwrap_or_default(),
        _ => Value::String(values.iter().map(Value::to_output_string).collect()),
    }
}

/// HTML-escape `&`, `<`, `>`, `"` and `'`.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::String(text.to_string())
    }

    // ===== Boolean coercion =====

    #[test]
    fn test_truthiness_table() {
        assert!(Value::Int(1).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(s("1").is_truthy());
        assert!(!s("0").is_truthy());
        assert!(s("true").is_truthy());
        assert!(s("TRUE").is_truthy());
        assert!(!s("false").is_truthy());
        assert!(!s("FALSE").is_truthy());
        assert!(!s("").is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(s("anything").is_truthy());
    }

    #[test]
    fn test_truthiness_of_containers() {
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::List(vec![Value::Null]).is_truthy());
        assert!(!Value::Map(ValueMap::new()).is_truthy());
    }

    // ===== Output =====

    #[test]
    fn test_output_strings() {
        assert_eq!(Value::Null.to_output_string(), "");
        assert_eq!(Value::Bool(true).to_output_string(), "true");
        assert_eq!(Value::Bool(false).to_output_string(), "");
        assert_eq!(Value::Float(2.0).to_output_string(), "2");
        assert_eq!(Value::Float(2.5).to_output_string(), "2.5");
        assert_eq!(
            Value::from(vec!["a", "b"]).to_output_string(),
            "ab"
        );
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_concat_values() {
        assert!(concat_values(vec![]).is_null());
        assert_eq!(concat_values(vec![Value::Int(3)]), Value::Int(3));
        assert_eq!(concat_values(vec![s("a"), Value::Int(3)]), s("a3"));
    }

    // ===== Comparison =====

    #[test]
    fn test_loose_equality() {
        assert!(Value::Int(1).loose_eq(&s("1")));
        assert!(s("1.0").loose_eq(&s("1")));
        assert!(!s("foo").loose_eq(&Value::Int(0)));
        assert!(Value::Null.loose_eq(&s("")));
        assert!(Value::Null.loose_eq(&Value::Int(0)));
        assert!(Value::Bool(true).loose_eq(&s("yes")));
        assert!(!Value::Bool(true).loose_eq(&Value::Int(0)));
        assert!(s("abc").loose_eq(&s("abc")));
    }

    #[test]
    fn test_strict_equality() {
        assert!(Value::Int(1).strict_eq(&Value::Int(1)));
        assert!(!Value::Int(1).strict_eq(&Value::Bool(true)));
        assert!(!Value::Int(1).strict_eq(&s("1")));
        assert!(!Value::Int(1).strict_eq(&Value::Float(1.0)));
    }

    #[test]
    fn test_ordering() {
        assert_eq!(s("10").loose_cmp(&s("9")), Some(Ordering::Greater));
        assert_eq!(s("a").loose_cmp(&s("b")), Some(Ordering::Less));
        assert_eq!(Value::Int(2).loose_cmp(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(s("a").loose_cmp(&Value::Int(1)), None);
    }

    #[test]
    fn test_parse_numeric_rejects_words() {
        assert_eq!(parse_numeric("42"), Some(Number::Int(42)));
        assert_eq!(parse_numeric("-1.5"), Some(Number::Float(-1.5)));
        assert_eq!(parse_numeric("inf"), None);
        assert_eq!(parse_numeric("NaN"), None);
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("12abc"), None);
    }

    #[test]
    fn test_from_json() {
        let value = Value::from(serde_json::json!({"a": [1, 2.5, "x", null]}));
        let Value::Map(map) = value else {
            panic!("expected map");
        };
        assert_eq!(
            map["a"],
            Value::List(vec![Value::Int(1), Value::Float(2.5), s("x"), Value::Null])
        );
    }

    #[test]
    fn test_scalar_keywords() {
        assert_eq!(Scalar::parse_keyword_or_number("TRUE"), Some(Scalar::Bool(true)));
        assert_eq!(Scalar::parse_keyword_or_number("null"), Some(Scalar::Null));
        assert_eq!(Scalar::parse_keyword_or_number("7"), Some(Scalar::Int(7)));
        assert_eq!(Scalar::parse_keyword_or_number("seven"), None);
    }
}
