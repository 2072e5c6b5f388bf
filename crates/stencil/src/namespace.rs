/*
 * namespace.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Namespace prefix bindings.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Target of the built-in ViewHelpers.
pub const CORE_NAMESPACE: &str = "stencil::core";

/// Prefix bound to [`CORE_NAMESPACE`] by default.
pub const DEFAULT_PREFIX: &str = "f";

/// URI prefix that turns `xmlns:x="..."` attributes into namespace bindings.
pub const DEFAULT_NAMESPACE_URI_PREFIX: &str = "https://stencil.dev/ns/";

/// Maps prefixes to the targets that provide their ViewHelpers, and records
/// prefixes whose tags must be left as plain text.
///
/// One prefix may be bound to several targets; resolution tries them
/// last-registered first so that later bindings override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceTable {
    bindings: BTreeMap<String, Vec<String>>,
    ignored: BTreeSet<String>,
}

impl NamespaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with only the default `f` binding.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.bind(DEFAULT_PREFIX, CORE_NAMESPACE);
        table
    }

    /// Add `target` to `prefix`. Binding a prefix un-ignores it.
    pub fn bind(&mut self, prefix: impl Into<String>, target: impl Into<String>) {
        let prefix = prefix.into();
        let target = target.into();
        self.ignored.remove(&prefix);
        let targets = self.bindings.entry(prefix).or_default();
        targets.retain(|t| *t != target);
        targets.push(target);
    }

    /// Mark a prefix as ignored. A trailing `*` matches every prefix that
    /// starts with the rest of the pattern.
    pub fn ignore(&mut self, pattern: impl Into<String>) {
        self.ignored.insert(pattern.into());
    }

    /// Targets for `prefix` in resolution order (last-registered first).
    pub fn targets(&self, prefix: &str) -> impl Iterator<Item = &str> {
        self.bindings
            .get(prefix)
            .into_iter()
            .flat_map(|targets| targets.iter().rev().map(String::as_str))
    }

    pub fn is_bound(&self, prefix: &str) -> bool {
        self.bindings.contains_key(prefix)
    }

    /// Whether tags with this prefix are plain text. Bound prefixes are never
    /// ignored.
    pub fn is_ignored(&self, prefix: &str) -> bool {
        if self.is_bound(prefix) {
            return false;
        }
        self.ignored.iter().any(|pattern| match pattern.strip_suffix('*') {
            Some(stem) => prefix.starts_with(stem),
            None => pattern == prefix,
        })
    }

    /// Copy every binding and ignore rule of `other` into this table.
    pub fn merge(&mut self, other: &NamespaceTable) {
        for (prefix, targets) in &other.bindings {
            for target in targets {
                self.bind(prefix.clone(), target.clone());
            }
        }
        for pattern in &other.ignored {
            if !self.is_bound(pattern) {
                self.ignore(pattern.clone());
            }
        }
    }

    /// Canonical text form, stable for equal tables. Used in cache
    /// identifiers.
    pub fn fingerprint(&self) -> String {
        let bindings = self
            .bindings
            .iter()
            .map(|(prefix, targets)| format!("{prefix}={}", targets.join(",")))
            .collect::<Vec<_>>()
            .join(";");
        let ignored = self.ignored.iter().cloned().collect::<Vec<_>>().join(",");
        format!("{bindings}|{ignored}")
    }
}

/// Convert an `xmlns` URI into a namespace target.
///
/// `https://stencil.dev/ns/stencil/core` becomes `stencil::core`. URIs
/// outside `uri_prefix` are foreign and yield `None`.
pub fn target_from_uri(uri: &str, uri_prefix: &str) -> Option<String> {
    let rest = uri.strip_prefix(uri_prefix)?.trim_matches('/');
    if rest.is_empty() {
        return None;
    }
    Some(rest.replace('/', "::"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_registered_target_first() {
        let mut table = NamespaceTable::with_defaults();
        table.bind("f", "app::helpers");
        let targets: Vec<_> = table.targets("f").collect();
        assert_eq!(targets, vec!["app::helpers", CORE_NAMESPACE]);
    }

    #[test]
    fn test_rebinding_moves_target_to_front() {
        let mut table = NamespaceTable::new();
        table.bind("x", "a");
        table.bind("x", "b");
        table.bind("x", "a");
        assert_eq!(table.targets("x").collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_ignore_wildcard() {
        let mut table = NamespaceTable::new();
        table.ignore("xs*");
        table.ignore("svg");
        assert!(table.is_ignored("xsd"));
        assert!(table.is_ignored("svg"));
        assert!(!table.is_ignored("html"));
        table.bind("xsd", "schema::helpers");
        assert!(!table.is_ignored("xsd"));
    }

    #[test]
    fn test_fingerprint_is_canonical() {
        let mut a = NamespaceTable::new();
        a.bind("b", "two");
        a.bind("a", "one");
        let mut b = NamespaceTable::new();
        b.bind("a", "one");
        b.bind("b", "two");
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.ignore("z");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_target_from_uri() {
        assert_eq!(
            target_from_uri("https://stencil.dev/ns/stencil/core", DEFAULT_NAMESPACE_URI_PREFIX),
            Some("stencil::core".to_string())
        );
        assert_eq!(
            target_from_uri("http://www.w3.org/2000/svg", DEFAULT_NAMESPACE_URI_PREFIX),
            None
        );
    }
}
