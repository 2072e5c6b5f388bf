/*
 * tests/compilation.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compiled templates, the file system cache and warm-up.

use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use stencil::{
    CompiledTemplate, EngineConfig, FileSystemCache, FileSystemTemplateLocator, NamespaceTable,
    ParsedTemplate, ParserConfiguration, StandardVariableProvider, TemplateCache, TemplateCompiler,
    TemplateEngine, TemplateLocator, Value, VariableProvider,
};

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn variables() -> StandardVariableProvider {
    let json = serde_json::json!({
        "title": "Menu & more",
        "items": [{"name": "Tea", "price": 2}, {"name": "<Cake>", "price": 3}],
        "footer": "<em>fin</em>",
        "links": {"Home": "/", "About": "/about"},
        "content": "<main>body</main>",
    });
    let mut provider = StandardVariableProvider::new();
    if let serde_json::Value::Object(map) = json {
        for (name, value) in map {
            provider.add(&name, Value::from(value));
        }
    }
    provider
}

/// Route compiler and cache logs to the test output; `RUST_LOG=stencil=debug`
/// shows them.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn engine_with_cache(directory: &std::path::Path) -> TemplateEngine {
    init_logging();
    let config = EngineConfig {
        cache_directory: Some(directory.to_path_buf()),
        ..EngineConfig::default()
    };
    TemplateEngine::from_config(&config).unwrap()
}

#[test]
fn test_every_fixture_renders_the_same_compiled_and_interpreted() {
    let locator = FileSystemTemplateLocator::new(fixtures());
    let entries = locator.list();
    assert_eq!(entries.len(), 5);

    let compiled_engine = TemplateEngine::new();
    let interpreted_engine = TemplateEngine::new().with_compile(false);
    for entry in entries {
        let source = locator.load(&entry.path).unwrap();
        let mut ctx = compiled_engine.context(variables());
        let compiled = compiled_engine.render(&entry.path, &source, &mut ctx).unwrap();
        // Second render runs the unit from the in-process table.
        let mut ctx = compiled_engine.context(variables());
        let cached = compiled_engine.render(&entry.path, &source, &mut ctx).unwrap();
        let mut ctx = interpreted_engine.context(variables());
        let interpreted = interpreted_engine
            .render(&entry.path, &source, &mut ctx)
            .unwrap();
        assert_eq!(compiled, interpreted, "{}", entry.path);
        assert_eq!(cached, interpreted, "{}", entry.path);
    }
}

#[test]
fn test_identifier_stability() {
    let namespaces = NamespaceTable::with_defaults();
    let config = ParserConfiguration::default();
    let source = "<p>{title}</p>";
    let first = TemplateCompiler::identifier("Templates/Index.html", source, &namespaces, &config);
    let second = TemplateCompiler::identifier("Templates/Index.html", source, &namespaces, &config);
    assert_eq!(first, second);
    assert_ne!(
        first,
        TemplateCompiler::identifier("Templates/Index.html", "<p>{title}!</p>", &namespaces, &config)
    );
    assert_ne!(
        first,
        TemplateCompiler::identifier("Templates/Other.html", source, &namespaces, &config)
    );
    let unescaped = ParserConfiguration::default().with_escaping(false);
    assert_ne!(
        first,
        TemplateCompiler::identifier("Templates/Index.html", source, &namespaces, &unescaped)
    );
    assert!(
        first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    );

    let engine = TemplateEngine::new();
    let ctx = engine.context(StandardVariableProvider::new());
    assert_eq!(engine.identifier("Templates/Index.html", source, &ctx), first);
}

#[test]
fn test_engines_with_different_escaping_do_not_share_units() {
    let dir = tempfile::tempdir().unwrap();
    let source = "<p>{footer}</p>";

    let escaping = engine_with_cache(dir.path());
    let mut ctx = escaping.context(variables());
    let escaped = escaping.render("page.html", source, &mut ctx).unwrap();
    assert_eq!(escaped, "<p>&lt;em&gt;fin&lt;/em&gt;</p>");

    let raw = engine_with_cache(dir.path())
        .with_parser_configuration(ParserConfiguration::default().with_escaping(false));
    let mut ctx = raw.context(variables());
    assert_eq!(raw.render("page.html", source, &mut ctx).unwrap(), "<p><em>fin</em></p>");
    assert_eq!(cache_entries(dir.path()), 2);
}

fn cache_entries(directory: &std::path::Path) -> usize {
    std::fs::read_dir(directory)
        .unwrap()
        .filter(|entry| {
            entry
                .as_ref()
                .unwrap()
                .path()
                .extension()
                .is_some_and(|ext| ext == "json")
        })
        .count()
}

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_shared_types_are_send_and_sync() {
    assert_send_sync::<ParsedTemplate>();
    assert_send_sync::<CompiledTemplate>();
    assert_send_sync::<ParserConfiguration>();
    assert_send_sync::<TemplateCompiler>();
    assert_send_sync::<TemplateEngine>();
    assert_send_sync::<FileSystemCache>();
}

#[test]
fn test_concurrent_renders_share_one_unit() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(engine_with_cache(dir.path()));
    let source = "<h1>{title}</h1><f:for each=\"{items}\" as=\"item\"><li>{item.name}</li></f:for>";

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut ctx = engine.context(variables());
                engine.render("same.html", source, &mut ctx).unwrap()
            })
        })
        .collect();
    let outputs: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for output in &outputs {
        assert_eq!(
            output,
            "<h1>Menu &amp; more</h1><li>Tea</li><li>&lt;Cake&gt;</li>"
        );
    }
    assert_eq!(cache_entries(dir.path()), 1);
    let ctx = engine.context(variables());
    assert!(engine.compiler().has(&engine.identifier("same.html", source, &ctx)));
}

#[test]
fn test_file_system_cache_survives_engines() {
    let dir = tempfile::tempdir().unwrap();
    let source = std::fs::read_to_string(fixtures().join("Templates/Index.html")).unwrap();

    let engine = engine_with_cache(dir.path());
    let mut ctx = engine.context(variables());
    let first = engine.render("Templates/Index.html", &source, &mut ctx).unwrap();
    let identifier = engine.identifier("Templates/Index.html", &source, &ctx);
    assert!(dir.path().join(format!("{identifier}.json")).is_file());

    let fresh = engine_with_cache(dir.path());
    assert!(!fresh.compiler().has(&identifier));
    let mut ctx = fresh.context(variables());
    let second = fresh.render("Templates/Index.html", &source, &mut ctx).unwrap();
    assert!(fresh.compiler().has(&identifier));
    assert_eq!(first, second);
}

#[test]
fn test_corrupt_cache_entry_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with_cache(dir.path());
    let ctx = engine.context(variables());
    let identifier = engine.identifier("page.html", "<p>{title}</p>", &ctx);

    let cache = FileSystemCache::new(dir.path()).unwrap();
    cache.set(&identifier, "{\"version\": 0}").unwrap();

    let mut ctx = engine.context(variables());
    let output = engine.render("page.html", "<p>{title}</p>", &mut ctx).unwrap();
    assert_eq!(output, "<p>Menu &amp; more</p>");
    let stored = cache.get(&identifier).unwrap().unwrap();
    assert!(stored.contains("\"identifier\""), "{stored}");
}

#[test]
fn test_warmup_fixtures() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with_cache(dir.path());
    let locator = FileSystemTemplateLocator::new(fixtures());
    let result = engine.warmup(&locator).unwrap();

    assert_eq!(result.len(), 5);
    let index = result.get("Templates/Index.html").unwrap();
    assert!(index.compilable);
    assert!(index.has_layout);
    assert!(!index.compiled);
    let identifier = index.compiled_identifier.clone().unwrap();
    assert!(engine.compiler().has(&identifier));
    assert!(dir.path().join(format!("{identifier}.json")).is_file());

    assert!(result.get("Layouts/Default.html").unwrap().compilable);
    assert!(result.get("Partials/Nav.html").unwrap().compilable);

    let uncompilable = result.get("Templates/Uncompilable.html").unwrap();
    assert!(!uncompilable.compilable);
    assert!(
        uncompilable
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("f:cache.disable")
    );
    assert!(!uncompilable.mitigations.is_empty());
    assert_eq!(result.failures(), vec!["Templates/Uncompilable.html"]);

    // Units written by the first warm-up are found by the next engine.
    let again = engine_with_cache(dir.path()).warmup(&locator).unwrap();
    assert!(again.get("Templates/Index.html").unwrap().compiled);
    assert!(!again.get("Templates/Uncompilable.html").unwrap().compiled);
}
