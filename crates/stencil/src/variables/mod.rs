/*
 * variables/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Variable storage and path resolution.
//!
//! A path is a dot-separated list of segments (`user.address.city`). Segments
//! may be dynamic: `{...}` inside a path is resolved first and its output
//! replaces it, so `user.{field}` reads whatever segment `field` names.
//! The special first segment `_all` yields every variable as a map.
//!
//! Missing paths resolve to [`Value::Null`]; path resolution never fails.

mod accessor;

pub use accessor::{
    FieldAccessor, GetterAccessor, IndexAccessor, MagicAccessor, PropertyAccessor,
    VariableExtractor,
};

use crate::value::{Value, ValueMap};
use std::borrow::Cow;

/// Storage for template variables.
pub trait VariableProvider: Send + Sync {
    /// A top-level variable.
    fn get(&self, name: &str) -> Option<&Value>;

    fn add(&mut self, name: &str, value: Value);

    /// Remove a top-level variable and return its previous value.
    fn remove(&mut self, name: &str) -> Option<Value>;

    fn names(&self) -> Vec<String>;

    /// Resolve a full path. Missing paths are [`Value::Null`].
    fn get_by_path(&self, path: &str) -> Value;

    /// Whether a path resolves to a value (possibly null).
    fn exists(&self, path: &str) -> bool;
}

/// The default [`VariableProvider`], backed by an ordered map.
#[derive(Debug, Clone, Default)]
pub struct StandardVariableProvider {
    variables: ValueMap,
    extractor: VariableExtractor,
}

/// Path prefix that addresses every variable at once.
pub const ALL_VARIABLES: &str = "_all";

/// Values may themselves contain braces; this bounds the expansion.
const MAX_DYNAMIC_SEGMENTS: usize = 32;

impl StandardVariableProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variables(variables: ValueMap) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }

    pub fn with_extractor(mut self, extractor: VariableExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn variables(&self) -> &ValueMap {
        &self.variables
    }

    /// Replace innermost `{...}` groups by their resolved output until none
    /// are left. Unbalanced braces make the path unresolvable.
    fn expand_dynamic_segments<'p>(&self, path: &'p str) -> Option<Cow<'p, str>> {
        if !path.contains('{') {
            return if path.contains('}') {
                None
            } else {
                Some(Cow::Borrowed(path))
            };
        }
        let mut expanded = path.to_string();
        let mut remaining = MAX_DYNAMIC_SEGMENTS;
        while let Some(open) = expanded.rfind('{') {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            let close = open + expanded[open..].find('}')?;
            let inner = &expanded[open + 1..close];
            let replacement = self.get_by_path(inner.trim()).to_output_string();
            expanded.replace_range(open..=close, &replacement);
        }
        if expanded.contains('}') {
            return None;
        }
        Some(Cow::Owned(expanded))
    }

    fn resolve(&self, path: &str) -> Option<Value> {
        let path = self.expand_dynamic_segments(path)?;
        let segments: Vec<&str> = path.split('.').collect();
        let (first, rest) = segments.split_first()?;
        if *first == ALL_VARIABLES {
            let all = Value::Map(self.variables.clone());
            return self.extractor.extract_path(&all, rest);
        }
        let root = self.variables.get(*first)?;
        self.extractor.extract_path(root, rest)
    }
}

impl VariableProvider for StandardVariableProvider {
    fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    fn add(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    fn remove(&mut self, name: &str) -> Option<Value> {
        self.variables.shift_remove(name)
    }

    fn names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    fn get_by_path(&self, path: &str) -> Value {
        self.resolve(path).unwrap_or_default()
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }
}
