/*
 * variables/accessor.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Property access strategies for walking variable paths.

use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// One way of reading `segment` out of a subject value.
pub trait PropertyAccessor: Send + Sync {
    fn name(&self) -> &str;

    fn access(&self, subject: &Value, segment: &str) -> Option<Value>;
}

/// Public fields of host objects.
#[derive(Debug, Default)]
pub struct FieldAccessor;

impl PropertyAccessor for FieldAccessor {
    fn name(&self) -> &str {
        "field"
    }

    fn access(&self, subject: &Value, segment: &str) -> Option<Value> {
        match subject {
            Value::Object(object) => object.field(segment),
            _ => None,
        }
    }
}

/// Map keys, list indices and object index access.
#[derive(Debug, Default)]
pub struct IndexAccessor;

impl PropertyAccessor for IndexAccessor {
    fn name(&self) -> &str {
        "index"
    }

    fn access(&self, subject: &Value, segment: &str) -> Option<Value> {
        match subject {
            Value::Object(object) => object.index(segment),
            other => container_child(other, segment).cloned(),
        }
    }
}

/// Borrowing lookup into maps and lists.
pub(crate) fn container_child<'v>(subject: &'v Value, segment: &str) -> Option<&'v Value> {
    match subject {
        Value::Map(map) => map.get(segment),
        Value::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Getter methods: `getName`, `getNAME`, `isName`, `hasName`, then `name`.
#[derive(Debug, Default)]
pub struct GetterAccessor;

impl GetterAccessor {
    fn candidates(segment: &str) -> [String; 5] {
        let mut chars = segment.chars();
        let upper_first = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        [
            format!("get{upper_first}"),
            format!("get{}", segment.to_uppercase()),
            format!("is{upper_first}"),
            format!("has{upper_first}"),
            segment.to_string(),
        ]
    }
}

impl PropertyAccessor for GetterAccessor {
    fn name(&self) -> &str {
        "getter"
    }

    fn access(&self, subject: &Value, segment: &str) -> Option<Value> {
        let Value::Object(object) = subject else {
            return None;
        };
        Self::candidates(segment)
            .iter()
            .find_map(|method| object.call_getter(method))
    }
}

/// Dynamic catch-all property lookup.
#[derive(Debug, Default)]
pub struct MagicAccessor;

impl PropertyAccessor for MagicAccessor {
    fn name(&self) -> &str {
        "magic"
    }

    fn access(&self, subject: &Value, segment: &str) -> Option<Value> {
        match subject {
            Value::Object(object) => object.magic_get(segment),
            _ => None,
        }
    }
}

/// Walks path segments through the accessor chain.
///
/// Order: field, index, getter, custom accessors (in registration order),
/// magic. The first accessor that yields a value wins.
#[derive(Clone)]
pub struct VariableExtractor {
    custom: Vec<Arc<dyn PropertyAccessor>>,
}

impl fmt::Debug for VariableExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableExtractor")
            .field(
                "custom",
                &self.custom.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for VariableExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableExtractor {
    pub fn new() -> Self {
        Self { custom: Vec::new() }
    }

    /// Add an accessor that runs after the built-in getter strategy and before
    /// the magic accessor.
    pub fn with_accessor(mut self, accessor: Arc<dyn PropertyAccessor>) -> Self {
        self.custom.push(accessor);
        self
    }

    /// Read one segment out of `subject`.
    pub fn extract(&self, subject: &Value, segment: &str) -> Option<Value> {
        let builtin: [&dyn PropertyAccessor; 3] = [&FieldAccessor, &IndexAccessor, &GetterAccessor];
        builtin
            .into_iter()
            .chain(self.custom.iter().map(|a| a.as_ref()))
            .chain(std::iter::once(&MagicAccessor as &dyn PropertyAccessor))
            .find_map(|accessor| accessor.access(subject, segment))
    }

    /// Walk `segments` starting at `root`. Plain maps and lists are walked by
    /// reference; values are only cloned once an object is reached.
    pub fn extract_path(&self, root: &Value, segments: &[&str]) -> Option<Value> {
        let mut borrowed = root;
        let mut consumed = 0;
        for segment in segments {
            match container_child(borrowed, segment) {
                Some(child) => {
                    borrowed = child;
                    consumed += 1;
                }
                None => break,
            }
        }
        let mut current = borrowed.clone();
        for segment in &segments[consumed..] {
            current = self.extract(&current, segment)?;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{TemplateObject, ValueMap};

    #[derive(Debug)]
    struct User;

    impl TemplateObject for User {
        fn type_name(&self) -> &str {
            "User"
        }

        fn field(&self, name: &str) -> Option<Value> {
            (name == "id").then(|| Value::Int(7))
        }

        fn call_getter(&self, method: &str) -> Option<Value> {
            match method {
                "getName" => Some(Value::from("Ada")),
                "isAdmin" => Some(Value::Bool(true)),
                "getURL" => Some(Value::from("https://example.org")),
                _ => None,
            }
        }

        fn magic_get(&self, name: &str) -> Option<Value> {
            Some(Value::from(format!("magic:{name}")))
        }
    }

    struct Shout;

    impl PropertyAccessor for Shout {
        fn name(&self) -> &str {
            "shout"
        }

        fn access(&self, subject: &Value, segment: &str) -> Option<Value> {
            match subject {
                Value::String(s) if segment == "loud" => Some(Value::from(s.to_uppercase())),
                _ => None,
            }
        }
    }

    #[test]
    fn test_getter_candidates() {
        assert_eq!(
            GetterAccessor::candidates("name"),
            [
                "getName".to_string(),
                "getNAME".to_string(),
                "isName".to_string(),
                "hasName".to_string(),
                "name".to_string()
            ]
        );
    }

    #[test]
    fn test_accessor_order() {
        let extractor = VariableExtractor::new();
        let user = Value::Object(Arc::new(User));
        assert_eq!(extractor.extract(&user, "id"), Some(Value::Int(7)));
        assert_eq!(extractor.extract(&user, "name"), Some(Value::from("Ada")));
        assert_eq!(extractor.extract(&user, "admin"), Some(Value::Bool(true)));
        assert_eq!(
            extractor.extract(&user, "url"),
            Some(Value::from("https://example.org"))
        );
        assert_eq!(
            extractor.extract(&user, "other"),
            Some(Value::from("magic:other"))
        );
    }

    #[test]
    fn test_custom_accessor_runs_after_builtins() {
        let extractor = VariableExtractor::new().with_accessor(Arc::new(Shout));
        assert_eq!(
            extractor.extract(&Value::from("hey"), "loud"),
            Some(Value::from("HEY"))
        );
    }

    #[test]
    fn test_extract_path_through_containers() {
        let mut inner = ValueMap::new();
        inner.insert("items".to_string(), Value::from(vec!["a", "b"]));
        let root = Value::Map(inner);
        let extractor = VariableExtractor::new();
        assert_eq!(
            extractor.extract_path(&root, &["items", "1"]),
            Some(Value::from("b"))
        );
        assert_eq!(extractor.extract_path(&root, &["items", "5"]), None);
    }
}
