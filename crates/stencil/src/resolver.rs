/*
 * resolver.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! ViewHelper resolution.
//!
//! A resolver owns the global namespace bindings and turns a
//! `(target, name)` pair into a helper instance.

use crate::helper::{HelperKey, ViewHelper};
use crate::helpers;
use crate::namespace::NamespaceTable;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Trait for looking up ViewHelpers.
pub trait ViewHelperResolver: Send + Sync {
    /// Namespace bindings every template starts with.
    fn namespaces(&self) -> NamespaceTable;

    /// A helper instance for `name` in namespace `target`, or `None` if the
    /// target does not provide it.
    fn resolve(&self, target: &str, name: &str) -> Option<Arc<dyn ViewHelper>>;
}

type Factory = Arc<dyn Fn() -> Arc<dyn ViewHelper> + Send + Sync>;

#[derive(Clone)]
enum Registration {
    Instance(Arc<dyn ViewHelper>),
    Factory(Factory),
}

/// Resolver backed by an explicit registry.
///
/// `new()` binds `f` to the core namespace and registers the built-in
/// helpers; `empty()` starts with nothing.
#[derive(Clone)]
pub struct StandardViewHelperResolver {
    namespaces: NamespaceTable,
    helpers: HashMap<HelperKey, Registration>,
}

impl fmt::Debug for StandardViewHelperResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.helpers.keys().map(HelperKey::to_string).collect();
        keys.sort();
        f.debug_struct("StandardViewHelperResolver")
            .field("namespaces", &self.namespaces)
            .field("helpers", &keys)
            .finish()
    }
}

impl Default for StandardViewHelperResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardViewHelperResolver {
    pub fn new() -> Self {
        let mut resolver = Self {
            namespaces: NamespaceTable::with_defaults(),
            helpers: HashMap::new(),
        };
        helpers::register_core(&mut resolver);
        resolver
    }

    pub fn empty() -> Self {
        Self {
            namespaces: NamespaceTable::new(),
            helpers: HashMap::new(),
        }
    }

    /// Register a helper type. A fresh instance is created per resolution.
    pub fn register<H>(&mut self, target: &str, name: &str) -> &mut Self
    where
        H: ViewHelper + Default + 'static,
    {
        self.register_factory(target, name, || Arc::new(H::default()))
    }

    pub fn register_factory(
        &mut self,
        target: &str,
        name: &str,
        factory: impl Fn() -> Arc<dyn ViewHelper> + Send + Sync + 'static,
    ) -> &mut Self {
        self.helpers.insert(
            HelperKey::new(target, name),
            Registration::Factory(Arc::new(factory)),
        );
        self
    }

    /// Register one shared instance.
    pub fn register_instance(
        &mut self,
        target: &str,
        name: &str,
        helper: Arc<dyn ViewHelper>,
    ) -> &mut Self {
        self.helpers
            .insert(HelperKey::new(target, name), Registration::Instance(helper));
        self
    }

    pub fn bind_namespace(&mut self, prefix: &str, target: &str) -> &mut Self {
        self.namespaces.bind(prefix, target);
        self
    }

    pub fn ignore_namespace(&mut self, pattern: &str) -> &mut Self {
        self.namespaces.ignore(pattern);
        self
    }

    pub fn is_registered(&self, target: &str, name: &str) -> bool {
        self.helpers.contains_key(&HelperKey::new(target, name))
    }
}

impl ViewHelperResolver for StandardViewHelperResolver {
    fn namespaces(&self) -> NamespaceTable {
        self.namespaces.clone()
    }

    fn resolve(&self, target: &str, name: &str) -> Option<Arc<dyn ViewHelper>> {
        match self.helpers.get(&HelperKey::new(target, name))? {
            Registration::Instance(helper) => Some(Arc::clone(helper)),
            Registration::Factory(factory) => Some(factory()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::{CORE_NAMESPACE, DEFAULT_PREFIX};

    #[test]
    fn test_core_helpers_registered() {
        let resolver = StandardViewHelperResolver::new();
        for name in ["if", "then", "else", "for", "format.raw", "layout", "comment"] {
            assert!(
                resolver.resolve(CORE_NAMESPACE, name).is_some(),
                "missing core helper {name}"
            );
        }
        assert!(resolver.resolve(CORE_NAMESPACE, "nope").is_none());
        assert!(resolver.namespaces().is_bound(DEFAULT_PREFIX));
    }

    #[test]
    fn test_empty_resolver() {
        let resolver = StandardViewHelperResolver::empty();
        assert!(resolver.resolve(CORE_NAMESPACE, "if").is_none());
        assert!(!resolver.namespaces().is_bound(DEFAULT_PREFIX));
    }

    #[test]
    fn test_instance_is_shared() {
        let mut resolver = StandardViewHelperResolver::empty();
        let helper: Arc<dyn ViewHelper> = Arc::new(helpers::RawViewHelper);
        resolver.register_instance("app", "raw", Arc::clone(&helper));
        let resolved = resolver.resolve("app", "raw").unwrap();
        assert!(Arc::ptr_eq(&helper, &resolved));
        assert!(resolver.is_registered("app", "raw"));
    }

    #[test]
    fn test_bind_and_ignore() {
        let mut resolver = StandardViewHelperResolver::empty();
        resolver.bind_namespace("x", "app").ignore_namespace("svg*");
        let table = resolver.namespaces();
        assert_eq!(table.targets("x").collect::<Vec<_>>(), vec!["app"]);
        assert!(table.is_ignored("svgx"));
    }
}
