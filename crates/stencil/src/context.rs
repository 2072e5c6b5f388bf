/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Per-render state.

use crate::cache::{NullCache, TemplateCache};
use crate::error::ViewHelperError;
use crate::error_handler::{ErrorHandler, StandardErrorHandler};
use crate::helper::{HelperKey, ViewHelper};
use crate::parser::ParserConfiguration;
use crate::resolver::{StandardViewHelperResolver, ViewHelperResolver};
use crate::variables::{StandardVariableProvider, VariableProvider};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Everything one render needs. Created by the caller, used by one render at a
/// time.
pub struct RenderingContext {
    variables: Box<dyn VariableProvider>,
    resolver: Arc<dyn ViewHelperResolver>,
    cache: Arc<dyn TemplateCache>,
    error_handler: Arc<dyn ErrorHandler>,
    parser_configuration: Arc<ParserConfiguration>,
    /// Helper instances of compiled templates, by unit identifier and call
    /// site.
    helper_instances: HashMap<(String, u32), Arc<dyn ViewHelper>>,
}

impl fmt::Debug for RenderingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderingContext")
            .field("variables", &self.variables.names())
            .field("parser_configuration", &self.parser_configuration)
            .field("helper_instances", &self.helper_instances.len())
            .finish_non_exhaustive()
    }
}

impl Default for RenderingContext {
    fn default() -> Self {
        Self::new(StandardVariableProvider::new())
    }
}

impl RenderingContext {
    /// A context with the core helpers, no cache and strict error handling.
    pub fn new(variables: impl VariableProvider + 'static) -> Self {
        Self {
            variables: Box::new(variables),
            resolver: Arc::new(StandardViewHelperResolver::new()),
            cache: Arc::new(NullCache),
            error_handler: Arc::new(StandardErrorHandler),
            parser_configuration: Arc::new(ParserConfiguration::default()),
            helper_instances: HashMap::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ViewHelperResolver>) -> Self {
        self.resolver = resolver;
        self.helper_instances.clear();
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn TemplateCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_error_handler(mut self, error_handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = error_handler;
        self
    }

    pub fn with_parser_configuration(mut self, configuration: Arc<ParserConfiguration>) -> Self {
        self.parser_configuration = configuration;
        self
    }

    pub fn variables(&self) -> &dyn VariableProvider {
        self.variables.as_ref()
    }

    pub fn variables_mut(&mut self) -> &mut dyn VariableProvider {
        self.variables.as_mut()
    }

    pub fn resolver(&self) -> &Arc<dyn ViewHelperResolver> {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<dyn TemplateCache> {
        &self.cache
    }

    pub fn error_handler(&self) -> &Arc<dyn ErrorHandler> {
        &self.error_handler
    }

    pub fn parser_configuration(&self) -> &Arc<ParserConfiguration> {
        &self.parser_configuration
    }

    /// The helper behind call site `call_site` of compiled unit `unit`,
    /// resolved on first use.
    pub fn helper_instance(
        &mut self,
        unit: &str,
        call_site: u32,
        key: &HelperKey,
    ) -> Result<Arc<dyn ViewHelper>, ViewHelperError> {
        let slot = (unit.to_string(), call_site);
        if let Some(helper) = self.helper_instances.get(&slot) {
            return Ok(Arc::clone(helper));
        }
        let helper = self
            .resolver
            .resolve(&key.target, &key.name)
            .ok_or_else(|| ViewHelperError::Unresolved {
                tag: key.to_string(),
            })?;
        self.helper_instances.insert(slot, Arc::clone(&helper));
        Ok(helper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::CORE_NAMESPACE;
    use crate::value::Value;

    #[test]
    fn test_helper_instances_are_cached_per_call_site() {
        let mut ctx = RenderingContext::default();
        let key = HelperKey::new(CORE_NAMESPACE, "format.raw");
        let first = ctx.helper_instance("unit", 0, &key).unwrap();
        let again = ctx.helper_instance("unit", 0, &key).unwrap();
        let other = ctx.helper_instance("unit", 1, &key).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn test_unresolved_helper() {
        let mut ctx = RenderingContext::default();
        let result = ctx.helper_instance("unit", 0, &HelperKey::new("app", "missing"));
        assert!(matches!(result, Err(ViewHelperError::Unresolved { ref tag }) if tag == "app::missing"));
    }

    #[test]
    fn test_variables_are_mutable() {
        let mut ctx = RenderingContext::default();
        ctx.variables_mut().add("name", Value::from("Ada"));
        assert_eq!(ctx.variables().get_by_path("name"), Value::from("Ada"));
    }
}
