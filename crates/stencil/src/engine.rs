/*
 * engine.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Rendering entry point.
//!
//! The engine decides per template whether to run a compiled unit or the
//! interpreter: a cached unit is executed directly, otherwise the template is
//! parsed, compiled and stored when possible, and interpreted when not.

use crate::cache::{FileSystemCache, MemoryCache, TemplateCache};
use crate::compiler::{TemplateCompiler, TemplateLocator, WarmupResult};
use crate::config::EngineConfig;
use crate::context::RenderingContext;
use crate::error::{CompileError, TemplateError, TemplateResult};
use crate::error_handler::{ErrorHandler, StandardErrorHandler, TolerantErrorHandler};
use crate::parser::{ParserConfiguration, TemplateParser};
use crate::resolver::{StandardViewHelperResolver, ViewHelperResolver};
use crate::variables::VariableProvider;
use std::fmt;
use std::sync::Arc;

pub struct TemplateEngine {
    compiler: TemplateCompiler,
    compile: bool,
    resolver: Arc<dyn ViewHelperResolver>,
    cache: Arc<dyn TemplateCache>,
    error_handler: Arc<dyn ErrorHandler>,
    parser_configuration: Arc<ParserConfiguration>,
}

impl fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("compiler", &self.compiler)
            .field("compile", &self.compile)
            .field("parser_configuration", &self.parser_configuration)
            .finish_non_exhaustive()
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Core helpers, an in-memory cache and strict error handling.
    pub fn new() -> Self {
        Self {
            compiler: TemplateCompiler::new(),
            compile: true,
            resolver: Arc::new(StandardViewHelperResolver::new()),
            cache: Arc::new(MemoryCache::new()),
            error_handler: Arc::new(StandardErrorHandler),
            parser_configuration: Arc::new(ParserConfiguration::default()),
        }
    }

    pub fn from_config(config: &EngineConfig) -> TemplateResult<Self> {
        let mut resolver = StandardViewHelperResolver::new();
        for (prefix, target) in &config.namespaces {
            resolver.bind_namespace(prefix, target);
        }
        for pattern in &config.ignored_namespaces {
            resolver.ignore_namespace(pattern);
        }
        let cache: Arc<dyn TemplateCache> = match &config.cache_directory {
            Some(directory) => Arc::new(FileSystemCache::new(directory.clone())?),
            None => Arc::new(MemoryCache::new()),
        };
        let error_handler: Arc<dyn ErrorHandler> = if config.tolerant {
            Arc::new(TolerantErrorHandler::new())
        } else {
            Arc::new(StandardErrorHandler)
        };
        let parser_configuration = ParserConfiguration::default()
            .with_escaping(config.escaping)
            .with_namespace_uri_prefix(config.namespace_uri_prefix.clone());

        tracing::debug!(
            compile = config.compile,
            tolerant = config.tolerant,
            cache_directory = ?config.cache_directory,
            "Configured template engine"
        );
        Ok(Self {
            compiler: TemplateCompiler::new(),
            compile: config.compile,
            resolver: Arc::new(resolver),
            cache,
            error_handler,
            parser_configuration: Arc::new(parser_configuration),
        })
    }

    pub fn with_compile(mut self, compile: bool) -> Self {
        self.compile = compile;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ViewHelperResolver>) -> Self {
        self.resolver = resolver;
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

    pub fn with_parser_configuration(mut self, configuration: ParserConfiguration) -> Self {
        self.parser_configuration = Arc::new(configuration);
        self
    }

    pub fn compiler(&self) -> &TemplateCompiler {
        &self.compiler
    }

    pub fn cache(&self) -> &Arc<dyn TemplateCache> {
        &self.cache
    }

    /// A rendering context sharing this engine's resolver, cache, error
    /// handler and parser configuration.
    pub fn context(&self, variables: impl VariableProvider + 'static) -> RenderingContext {
        RenderingContext::new(variables)
            .with_resolver(Arc::clone(&self.resolver))
            .with_cache(Arc::clone(&self.cache))
            .with_error_handler(Arc::clone(&self.error_handler))
            .with_parser_configuration(Arc::clone(&self.parser_configuration))
    }

    /// The cache identifier `source` at `path` is stored under when rendered
    /// with `ctx`.
    pub fn identifier(&self, path: &str, source: &str, ctx: &RenderingContext) -> String {
        let parser = TemplateParser::from_context(ctx);
        TemplateCompiler::identifier(path, source, &parser.namespaces(), parser.configuration())
    }

    /// Render `source`, known as `path`, with everything `ctx` provides.
    pub fn render(&self, path: &str, source: &str, ctx: &mut RenderingContext) -> TemplateResult<String> {
        let parser = TemplateParser::from_context(ctx);
        let identifier =
            TemplateCompiler::identifier(path, source, &parser.namespaces(), parser.configuration());
        let cache = Arc::clone(ctx.cache());

        if self.compile
            && let Some(unit) = self.compiler.load(&identifier, cache.as_ref())?
        {
            return unit.render(ctx);
        }

        let mut template = match parser.parse(source, &identifier) {
            Ok(template) => template,
            Err(TemplateError::Parse(error)) => {
                let handler = Arc::clone(ctx.error_handler());
                return handler.handle_parser_error(error);
            }
            Err(other) => return Err(other),
        };

        if self.compile {
            match self.compiler.compile_and_store(&mut template, cache.as_ref()) {
                Ok(unit) => return unit.render(ctx),
                Err(CompileError::Cache(error)) => return Err(error.into()),
                Err(error) => self.compile_failed(error, ctx)?,
            }
        }
        template.render(ctx)
    }

    /// Compile every template `locator` lists into this engine's cache.
    /// Failures are collected in the result rather than sent to the error
    /// handler.
    pub fn warmup(&self, locator: &dyn TemplateLocator) -> TemplateResult<WarmupResult> {
        let parser = TemplateParser::new(
            Arc::clone(&self.parser_configuration),
            Arc::clone(&self.resolver),
            Arc::new(StandardErrorHandler),
        );
        Ok(self.compiler.warmup(locator, &parser, self.cache.as_ref())?)
    }

    fn compile_failed(&self, error: CompileError, ctx: &RenderingContext) -> TemplateResult<()> {
        let handler = Arc::clone(ctx.error_handler());
        handler.handle_compiler_error(error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::CacheError;
    use crate::value::Value;
    use crate::variables::StandardVariableProvider;
    use pretty_assertions::assert_eq;

    fn variables() -> StandardVariableProvider {
        let mut provider = StandardVariableProvider::new();
        provider.add("name", Value::from("<World>"));
        provider
    }

    #[test]
    fn test_render_compiles_then_hits_cache() {
        let cache = Arc::new(MemoryCache::new());
        let engine = TemplateEngine::new().with_cache(cache.clone());
        let source = "Hello {name}!";

        let mut ctx = engine.context(variables());
        assert_eq!(engine.render("hello.html", source, &mut ctx).unwrap(), "Hello &lt;World&gt;!");
        let identifier = engine.identifier("hello.html", source, &ctx);
        assert!(cache.contains(&identifier));
        assert!(engine.compiler().has(&identifier));

        let mut ctx = engine.context(variables());
        assert_eq!(engine.render("hello.html", source, &mut ctx).unwrap(), "Hello &lt;World&gt;!");
    }

    #[test]
    fn test_uncompilable_template_is_interpreted() {
        let cache = Arc::new(MemoryCache::new());
        let engine = TemplateEngine::new().with_cache(cache.clone());
        let mut ctx = engine.context(variables());
        let output = engine
            .render("page.html", "<f:cache.disable/>{name}", &mut ctx)
            .unwrap();
        assert_eq!(output, "&lt;World&gt;");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_compile_disabled() {
        let cache = Arc::new(MemoryCache::new());
        let engine = TemplateEngine::new()
            .with_cache(cache.clone())
            .with_compile(false);
        let mut ctx = engine.context(variables());
        assert_eq!(engine.render("a.html", "{name}", &mut ctx).unwrap(), "&lt;World&gt;");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        let engine = TemplateEngine::new();
        let mut ctx = engine.context(variables());
        let result = engine.render("bad.html", "<f:if condition=\"1\">", &mut ctx);
        assert!(matches!(result, Err(TemplateError::Parse(_))));

        let tolerant = TemplateEngine::new().with_error_handler(Arc::new(TolerantErrorHandler::new()));
        let mut ctx = tolerant.context(variables());
        let output = tolerant
            .render("bad.html", "<f:if condition=\"1\">", &mut ctx)
            .unwrap();
        assert!(output.starts_with("Parser error"), "{output}");
    }

    /// Reads miss and writes fail.
    struct UnwritableCache;

    impl TemplateCache for UnwritableCache {
        fn get(&self, _identifier: &str) -> Result<Option<String>, CacheError> {
            Ok(None)
        }

        fn set(&self, _identifier: &str, _content: &str) -> Result<(), CacheError> {
            Err(CacheError::MissingDirectory {
                path: std::path::PathBuf::from("/nope"),
            })
        }

        fn flush(&self, _identifier: Option<&str>) -> Result<(), CacheError> {
            Ok(())
        }
    }

    /// Accepts every error, including the ones it should never see.
    struct SwallowingHandler;

    impl ErrorHandler for SwallowingHandler {
        fn handle_parser_error(&self, _error: crate::error::ParseError) -> TemplateResult<String> {
            Ok(String::new())
        }

        fn handle_expression_error(
            &self,
            _error: crate::error::ExpressionError,
        ) -> TemplateResult<String> {
            Ok(String::new())
        }

        fn handle_view_helper_error(
            &self,
            _error: crate::error::ViewHelperError,
        ) -> TemplateResult<String> {
            Ok(String::new())
        }

        fn handle_compiler_error(&self, _error: CompileError) -> TemplateResult<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_cache_write_failure_is_fatal() {
        for handler in [
            Arc::new(SwallowingHandler) as Arc<dyn ErrorHandler>,
            Arc::new(TolerantErrorHandler::new()),
        ] {
            let engine = TemplateEngine::new()
                .with_cache(Arc::new(UnwritableCache))
                .with_error_handler(handler);
            let mut ctx = engine.context(variables());
            let result = engine.render("a.html", "{name}", &mut ctx);
            assert!(
                matches!(result, Err(TemplateError::Cache(CacheError::MissingDirectory { .. }))),
                "{result:?}"
            );
        }
    }

    #[test]
    fn test_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            cache_directory: Some(dir.path().to_path_buf()),
            escaping: false,
            ..EngineConfig::default()
        };
        let engine = TemplateEngine::from_config(&config).unwrap();
        let mut ctx = engine.context(variables());
        assert_eq!(engine.render("a.html", "{name}", &mut ctx).unwrap(), "<World>");
        let identifier = engine.identifier("a.html", "{name}", &ctx);
        assert!(dir.path().join(format!("{identifier}.json")).is_file());

        let missing = EngineConfig {
            cache_directory: Some(dir.path().join("missing")),
            ..EngineConfig::default()
        };
        assert!(matches!(
            TemplateEngine::from_config(&missing),
            Err(TemplateError::Cache(_))
        ));
    }
}
