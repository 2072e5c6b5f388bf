/*
 * helpers/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Built-in ViewHelpers, registered under the core namespace.

mod condition;
mod format;
mod iteration;
mod layout;

pub use condition::{ElseViewHelper, IfViewHelper, ThenViewHelper};
pub use format::{HtmlspecialcharsViewHelper, RawViewHelper};
pub use iteration::ForViewHelper;
pub use layout::{CacheDisableViewHelper, CommentViewHelper, LayoutViewHelper};

use crate::namespace::CORE_NAMESPACE;
use crate::resolver::StandardViewHelperResolver;

/// Register every built-in helper with `resolver`.
pub fn register_core(resolver: &mut StandardViewHelperResolver) {
    resolver
        .register::<IfViewHelper>(CORE_NAMESPACE, "if")
        .register::<ThenViewHelper>(CORE_NAMESPACE, "then")
        .register::<ElseViewHelper>(CORE_NAMESPACE, "else")
        .register::<ForViewHelper>(CORE_NAMESPACE, "for")
        .register::<RawViewHelper>(CORE_NAMESPACE, "format.raw")
        .register::<HtmlspecialcharsViewHelper>(CORE_NAMESPACE, "format.htmlspecialchars")
        .register::<LayoutViewHelper>(CORE_NAMESPACE, "layout")
        .register::<CommentViewHelper>(CORE_NAMESPACE, "comment")
        .register::<CacheDisableViewHelper>(CORE_NAMESPACE, "cache.disable");
}

#[cfg(test)]
mod tests {
    use crate::context::RenderingContext;
    use crate::error::{ParseError, TemplateError};
    use crate::parser::TemplateParser;
    use crate::value::Value;
    use crate::variables::{StandardVariableProvider, VariableProvider};
    use pretty_assertions::assert_eq;

    fn context(variables: serde_json::Value) -> RenderingContext {
        let mut provider = StandardVariableProvider::new();
        if let serde_json::Value::Object(map) = variables {
            for (name, value) in map {
                provider.add(&name, Value::from(value));
            }
        }
        RenderingContext::new(provider)
    }

    fn render(source: &str, variables: serde_json::Value) -> String {
        let mut ctx = context(variables);
        let template = TemplateParser::from_context(&ctx).parse(source, "test").unwrap();
        template.render(&mut ctx).unwrap()
    }

    #[test]
    fn test_if_without_branches_renders_children() {
        let source = "<f:if condition=\"{show}\">shown</f:if>";
        assert_eq!(render(source, serde_json::json!({"show": true})), "shown");
        assert_eq!(render(source, serde_json::json!({"show": 0})), "");
    }

    #[test]
    fn test_if_with_else_only() {
        let source = "<f:if condition=\"{show}\">ignored<f:else>no</f:else></f:if>";
        assert_eq!(render(source, serde_json::json!({"show": true})), "");
        assert_eq!(render(source, serde_json::json!({"show": false})), "no");
    }

    #[test]
    fn test_inline_if() {
        let source = "{f:if(condition: count > 1, then: 'many', else: 'one')}";
        assert_eq!(render(source, serde_json::json!({"count": 3})), "many");
        assert_eq!(render(source, serde_json::json!({"count": 1})), "one");
    }

    #[test]
    fn test_if_rejects_two_then_branches() {
        let ctx = context(serde_json::json!({}));
        let result = TemplateParser::from_context(&ctx).parse(
            "<f:if condition=\"1\"><f:then>a</f:then><f:then>b</f:then></f:if>",
            "test",
        );
        assert!(matches!(
            result,
            Err(TemplateError::Parse(ParseError::InvalidChildren { .. }))
        ));
    }

    #[test]
    fn test_for_over_list_and_map() {
        let vars = serde_json::json!({
            "items": ["a", "<b>"],
            "prices": {"cake": 3, "tea": 2},
        });
        assert_eq!(
            render("<f:for each=\"{items}\" as=\"item\">[{item}]</f:for>", vars.clone()),
            "[a][&lt;b&gt;]"
        );
        assert_eq!(
            render(
                "<f:for each=\"{prices}\" as=\"price\" key=\"name\">{name}={price};</f:for>",
                vars.clone()
            ),
            "cake=3;tea=2;"
        );
        assert_eq!(
            render(
                "<f:for each=\"{items}\" as=\"item\" reverse=\"1\" iteration=\"i\">{i.cycle}/{i.total}{f:if(condition: i.isLast, then: '.')}</f:for>",
                vars
            ),
            "1/22/2."
        );
    }

    #[test]
    fn test_for_restores_variables() {
        let source = "<f:for each=\"{items}\" as=\"item\">{item}</f:for>|{item}";
        let vars = serde_json::json!({"items": [1, 2], "item": "outer"});
        assert_eq!(render(source, vars), "12|outer");
    }

    #[test]
    fn test_htmlspecialchars_escapes_once() {
        let vars = serde_json::json!({"text": "<a href=\"x\">"});
        assert_eq!(
            render("<f:format.htmlspecialchars>{text}</f:format.htmlspecialchars>", vars.clone()),
            "&lt;a href=&quot;x&quot;&gt;"
        );
        assert_eq!(
            render("{text -> f:format.htmlspecialchars(keepQuotes: 1)}", vars),
            "&lt;a href=\"x\"&gt;"
        );
    }

    #[test]
    fn test_comment_and_layout_render_nothing() {
        let vars = serde_json::json!({});
        assert_eq!(
            render("a<f:comment>{ignored}</f:comment><f:layout name=\"Page\"/>b", vars),
            "ab"
        );
    }
}
