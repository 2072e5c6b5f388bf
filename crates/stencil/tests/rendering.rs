/*
 * tests/rendering.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! End-to-end rendering through the engine, in both compile modes.

use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use stencil::{
    ParseError, StandardVariableProvider, TemplateEngine, TemplateError, TolerantErrorHandler,
    Value, VariableProvider,
};

fn fixture(path: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(path);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

fn variables(json: serde_json::Value) -> StandardVariableProvider {
    let mut provider = StandardVariableProvider::new();
    if let serde_json::Value::Object(map) = json {
        for (name, value) in map {
            provider.add(&name, Value::from(value));
        }
    }
    provider
}

/// Render with compilation on and off and check both agree.
fn try_render(source: &str, json: serde_json::Value) -> Result<String, TemplateError> {
    let compiled_engine = TemplateEngine::new();
    let mut ctx = compiled_engine.context(variables(json.clone()));
    let compiled = compiled_engine.render("inline.html", source, &mut ctx);

    let interpreted_engine = TemplateEngine::new().with_compile(false);
    let mut ctx = interpreted_engine.context(variables(json));
    let interpreted = interpreted_engine.render("inline.html", source, &mut ctx);

    match (compiled, interpreted) {
        (Ok(compiled), Ok(interpreted)) => {
            assert_eq!(compiled, interpreted, "compiled and interpreted output differ");
            Ok(compiled)
        }
        (Err(compiled), Err(_)) => Err(compiled),
        (compiled, interpreted) => panic!("modes disagree: {compiled:?} vs {interpreted:?}"),
    }
}

fn render(source: &str, json: serde_json::Value) -> String {
    try_render(source, json).unwrap()
}

fn parse_error(source: &str) -> ParseError {
    match try_render(source, serde_json::json!({})) {
        Err(TemplateError::Parse(error)) => error,
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn test_literal_template_renders_verbatim() {
    let source = fixture("Templates/Literal.html");
    assert_eq!(render(&source, serde_json::json!({"title": "ignored"})), source);
}

#[test]
fn test_variable_output_is_escaped() {
    let vars = serde_json::json!({"title": "<script>alert('x')</script>"});
    assert_eq!(
        render("<h1>{title}</h1>", vars.clone()),
        "<h1>&lt;script&gt;alert(&#039;x&#039;)&lt;/script&gt;</h1>"
    );
    assert_eq!(
        render("<f:format.raw>{title}</f:format.raw>", vars.clone()),
        "<script>alert('x')</script>"
    );
    assert_eq!(
        render("{escaping off}<h1>{title}</h1>", vars),
        "<h1><script>alert('x')</script></h1>"
    );
}

#[test]
fn test_if_branch_arguments_are_escaped() {
    let vars = serde_json::json!({"x": "<b>"});
    assert_eq!(render("{f:if(condition: 1, then: x)}", vars.clone()), "&lt;b&gt;");
    assert_eq!(
        render("{f:if(condition: 0, then: 'yes', else: '[{x}]')}", vars.clone()),
        "[&lt;b&gt;]"
    );
    assert_eq!(
        render("<f:if condition=\"{x}\" then=\"({x})\" else=\"no\"/>", vars.clone()),
        "(&lt;b&gt;)"
    );
    // Literal argument text is written as given.
    assert_eq!(
        render("<f:if condition=\"1\" then=\"<br/>\"/>", vars.clone()),
        "<br/>"
    );
    assert_eq!(render("{escaping off}{f:if(condition: 1, then: x)}", vars.clone()), "<b>");
    assert_eq!(
        render("<f:format.raw>{f:if(condition: 1, then: x)}</f:format.raw>", vars),
        "<b>"
    );
}

#[test]
fn test_unclosed_tag_names_the_innermost_tag() {
    match parse_error("<f:if condition=\"1\"><f:for each=\"{a}\" as=\"b\">") {
        ParseError::UnclosedTag { tag, .. } => assert_eq!(tag, "f:for"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_boolean_coercion_table() {
    let cases = [
        (serde_json::json!(1), "yes"),
        (serde_json::json!("0"), "no"),
        (serde_json::json!("FALSE"), "no"),
        (serde_json::json!(""), "no"),
        (serde_json::json!(null), "no"),
        (serde_json::json!("yes"), "yes"),
    ];
    for (value, expected) in cases {
        let vars = serde_json::json!({ "v": value.clone() });
        assert_eq!(
            render("<f:if condition=\"{v}\" then=\"yes\" else=\"no\"/>", vars),
            expected,
            "value: {value}"
        );
    }
    assert_eq!(
        render("<f:if condition=\"{missing}\" then=\"yes\" else=\"no\"/>", serde_json::json!({})),
        "no"
    );
}

#[test]
fn test_ternary_and_boolean_scenarios() {
    let vars = serde_json::json!({});
    assert_eq!(render("{true ? 'yes' : 'no'}", vars.clone()), "yes");
    assert_eq!(render("{false || false ? 'yes' : 'no'}", vars.clone()), "no");
    let guarded = |condition: &str| {
        format!("<f:if condition=\"{condition}\"><f:then>then</f:then><f:else>else</f:else></f:if>")
    };
    assert_eq!(render(&guarded("{1 === 1}"), vars.clone()), "then");
    assert_eq!(render(&guarded("{1 == '1'}"), vars.clone()), "then");
    assert_eq!(render(&guarded("{1 === true}"), vars), "else");
}

#[test]
fn test_argument_validation() {
    assert!(matches!(
        parse_error("<f:for each=\"{items}\"/>"),
        ParseError::MissingRequiredArgument { ref argument, .. } if argument == "as"
    ));
    assert!(matches!(
        parse_error("<f:if condition=\"1\" colour=\"red\"/>"),
        ParseError::UnknownArgument { ref argument, .. } if argument == "colour"
    ));
}

#[test]
fn test_namespaces() {
    let source = "<foo:bar a=\"1\">x</foo:bar>";
    assert_eq!(render(source, serde_json::json!({})), source);

    assert!(matches!(
        parse_error("<x:comment/>{namespace x=stencil::core}"),
        ParseError::UnknownNamespace { ref prefix, .. } if prefix == "x"
    ));
    assert_eq!(
        render(
            "{namespace x=stencil::core}a<x:comment>b</x:comment>c",
            serde_json::json!({})
        ),
        "ac"
    );
}

#[test]
fn test_page_fixture() {
    let vars = serde_json::json!({
        "title": "Menu & more",
        "items": [{"name": "Tea", "price": 2}, {"name": "<Cake>", "price": 3}],
        "footer": "<em>fin</em>",
    });
    let output = render(&fixture("Templates/Index.html"), vars);
    assert!(output.contains("<h1>Menu &amp; more</h1>"), "{output}");
    assert!(output.contains("<li class=\"odd\">Tea: 4</li>"), "{output}");
    assert!(output.contains("<li class=\"even\">&lt;Cake&gt;: 6</li>"), "{output}");
    assert!(output.contains("<footer><em>fin</em></footer>"), "{output}");
    assert!(!output.contains("Nothing here"), "{output}");

    let empty = render(
        &fixture("Templates/Index.html"),
        serde_json::json!({"title": "Menu", "items": []}),
    );
    assert!(empty.contains("<p>Nothing here</p>"), "{empty}");
}

#[test]
fn test_partial_fixture() {
    let vars = serde_json::json!({"links": {"Home": "/", "About": "/about?a=1&b=2"}});
    let output = render(&fixture("Partials/Nav.html"), vars);
    assert!(output.contains("<a href=\"/\">Home</a>"), "{output}");
    assert!(output.contains("<a href=\"/about?a=1&amp;b=2\">About</a>"), "{output}");
}

#[test]
fn test_tolerant_mode_renders_placeholders() {
    let handler = Arc::new(TolerantErrorHandler::new());
    let engine = TemplateEngine::new().with_error_handler(handler.clone());
    let mut ctx = engine.context(variables(serde_json::json!({})));
    let output = engine.render("broken.html", "a{1 / 0}b", &mut ctx).unwrap();
    assert_eq!(output, "aExpression error: division by zero in {1 / 0}b");
    assert_eq!(handler.diagnostics().len(), 1);

    let output = engine.render("unclosed.html", "<f:if condition=\"1\">", &mut ctx).unwrap();
    assert!(output.starts_with("Parser error: "), "{output}");
}
