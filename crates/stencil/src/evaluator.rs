/*
 * evaluator.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Interpreted rendering: walking the syntax tree.

use crate::arguments::{ArgumentCollection, ArgumentValue};
use crate::ast::{Node, NodeId, ParsedTemplate, ViewHelperNode};
use crate::context::RenderingContext;
use crate::error::{TemplateError, TemplateResult};
use crate::expression::{Expression, Operand};
use crate::invocation::{Arguments, Children, Invocation, Thunk, invoke};
use crate::value::{Value, ValueMap, concat_values, escape_html};
use std::sync::Arc;

/// HTML-escape the output of a value. Scalars other than strings cannot
/// contain markup and pass through.
pub fn escape_value(value: Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) => value,
        other => Value::String(escape_html(&other.to_output_string())),
    }
}

/// Send expression errors to the error handler; the placeholder it returns
/// becomes the value.
pub(crate) fn route_expression_error(
    result: TemplateResult<Value>,
    ctx: &RenderingContext,
) -> TemplateResult<Value> {
    match result {
        Err(TemplateError::Expression(error)) => {
            let handler = Arc::clone(ctx.error_handler());
            handler.handle_expression_error(error).map(Value::String)
        }
        other => other,
    }
}

impl ParsedTemplate {
    /// Render the whole template.
    pub fn render(&self, ctx: &mut RenderingContext) -> TemplateResult<String> {
        Ok(self.evaluate(self.root, ctx)?.to_output_string())
    }

    pub fn evaluate(&self, id: NodeId, ctx: &mut RenderingContext) -> TemplateResult<Value> {
        match self.tree.get(id) {
            Node::Root { children } => self.evaluate_sequence(children, ctx),
            Node::Text { text } => Ok(Value::String(text.clone())),
            Node::ObjectAccessor { path, .. } => Ok(ctx.variables().get_by_path(path)),
            Node::Array { entries } => {
                let mut map = ValueMap::new();
                for (key, operand) in entries {
                    map.insert(key.clone(), self.operand(operand, ctx)?);
                }
                Ok(Value::Map(map))
            }
            Node::Boolean { expression } => {
                let result = expression
                    .evaluate(&mut |operand: &Operand<NodeId>| self.operand(operand, ctx))
                    .map(Value::Bool);
                route_expression_error(result, ctx)
            }
            Node::ViewHelper(helper) => self.evaluate_view_helper(helper, ctx),
            Node::Escaping { child } => Ok(escape_value(self.evaluate(*child, ctx)?)),
            Node::Expression { expression, .. } => {
                let result = self.evaluate_expression(expression, ctx);
                route_expression_error(result, ctx)
            }
        }
    }

    fn evaluate_sequence(
        &self,
        children: &[NodeId],
        ctx: &mut RenderingContext,
    ) -> TemplateResult<Value> {
        let mut values = Vec::with_capacity(children.len());
        for child in children {
            values.push(self.evaluate(*child, ctx)?);
        }
        Ok(concat_values(values))
    }

    fn operand(&self, operand: &Operand<NodeId>, ctx: &mut RenderingContext) -> TemplateResult<Value> {
        match operand {
            Operand::Literal(scalar) => Ok(scalar.to_value()),
            Operand::Ref(id) => self.evaluate(*id, ctx),
        }
    }

    fn evaluate_expression(
        &self,
        expression: &Expression,
        ctx: &mut RenderingContext,
    ) -> TemplateResult<Value> {
        if let Expression::Custom(custom) = expression {
            return custom.evaluate(ctx);
        }
        let mut resolve = |operand: &Operand<NodeId>| self.operand(operand, ctx);
        match expression {
            Expression::Ternary(ternary) => ternary.evaluate(&mut resolve),
            Expression::Math(math) => math.evaluate(&mut resolve),
            Expression::Cast(cast) => cast.evaluate(&mut resolve),
            Expression::Custom(_) => Ok(Value::Null),
        }
    }

    fn evaluate_view_helper(
        &self,
        node: &ViewHelperNode,
        ctx: &mut RenderingContext,
    ) -> TemplateResult<Value> {
        let mut children = Children::new();
        for child in &node.children {
            let child = *child;
            let thunk: Thunk<'_> = Box::new(move |ctx: &mut RenderingContext| self.evaluate(child, ctx));
            children.push(self.tree.child_kind(child), thunk);
        }
        let mut invocation = Invocation::new(
            node.key.clone(),
            node.tag.clone(),
            self.bind_arguments(&node.arguments),
            children,
        );
        invoke(node.helper.as_ref(), &mut invocation, ctx)
    }

    /// Deferred arguments backed by this template's argument sub-trees.
    pub fn bind_arguments<'a>(&'a self, arguments: &'a ArgumentCollection) -> Arguments<'a> {
        let mut bound = Arguments::new(arguments.definitions());
        for (name, value) in arguments.iter() {
            let thunk: Thunk<'a> = match value {
                ArgumentValue::Literal(scalar) => {
                    let value = scalar.to_value();
                    Box::new(move |_ctx: &mut RenderingContext| Ok(value.clone()))
                }
                ArgumentValue::Tree(root) => {
                    let root = *root;
                    Box::new(move |ctx: &mut RenderingContext| self.evaluate(root, ctx))
                }
            };
            bound.push(name, thunk);
        }
        bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handler::TolerantErrorHandler;
    use crate::parser::TemplateParser;
    use crate::variables::{StandardVariableProvider, VariableProvider};
    use pretty_assertions::assert_eq;

    fn render_with(source: &str, ctx: &mut RenderingContext) -> String {
        let template = TemplateParser::from_context(ctx).parse(source, "test").unwrap();
        template.render(ctx).unwrap()
    }

    fn render(source: &str, variables: serde_json::Value) -> String {
        let mut provider = StandardVariableProvider::new();
        if let serde_json::Value::Object(map) = variables {
            for (name, value) in map {
                provider.add(&name, Value::from(value));
            }
        }
        render_with(source, &mut RenderingContext::new(provider))
    }

    #[test]
    fn test_literal_template_is_verbatim() {
        let source = "<html><body class=\"a\">a { color: red }</body></html>";
        assert_eq!(render(source, serde_json::json!({})), source);
    }

    #[test]
    fn test_variables_are_escaped() {
        let output = render("<p>{name}</p>", serde_json::json!({"name": "<b>&'\""}));
        assert_eq!(output, "<p>&lt;b&gt;&amp;&#039;&quot;</p>");
    }

    #[test]
    fn test_raw_scope_is_not_escaped() {
        let vars = serde_json::json!({"name": "<b>"});
        assert_eq!(render("<f:format.raw>{name}</f:format.raw>", vars.clone()), "<b>");
        assert_eq!(render("{name -> f:format.raw()}", vars.clone()), "<b>");
        assert_eq!(render("{escaping off}{name}", vars), "<b>");
    }

    #[test]
    fn test_missing_variable_is_empty() {
        assert_eq!(render("[{missing.path}]", serde_json::json!({})), "[]");
    }

    #[test]
    fn test_ternary_and_boolean_scenarios() {
        let vars = serde_json::json!({});
        assert_eq!(render("{true ? 'yes' : 'no'}", vars.clone()), "yes");
        assert_eq!(render("{false || false ? 'yes' : 'no'}", vars.clone()), "no");
        let guarded = |condition: &str| {
            format!(
                "<f:if condition=\"{condition}\"><f:then>then</f:then><f:else>else</f:else></f:if>"
            )
        };
        assert_eq!(render(&guarded("{1 === 1}"), vars.clone()), "then");
        assert_eq!(render(&guarded("{1 == '1'}"), vars.clone()), "then");
        assert_eq!(render(&guarded("{1 === true}"), vars), "else");
    }

    #[test]
    fn test_math_and_cast() {
        let vars = serde_json::json!({"a": 4, "price": "2.5"});
        assert_eq!(render("{a + 1}", vars.clone()), "5");
        assert_eq!(render("{a * price}", vars.clone()), "10");
        assert_eq!(render("{price as integer}", vars), "2");
    }

    #[test]
    fn test_argument_text_is_not_escaped() {
        let vars = serde_json::json!({"x": "<i>"});
        assert_eq!(render("{f:format.raw(value: '{x}!')}", vars), "<i>!");
    }

    #[test]
    fn test_expression_error_at_render_time_is_routed() {
        let handler = Arc::new(TolerantErrorHandler::new());
        let mut ctx = RenderingContext::default().with_error_handler(handler.clone());
        assert_eq!(render_with("a{1 / 0}b", &mut ctx), "aExpression error: division by zero in {1 / 0}b");
        assert_eq!(handler.diagnostics().len(), 1);
    }

    #[test]
    fn test_escape_value_keeps_scalars() {
        assert_eq!(escape_value(Value::Int(3)), Value::Int(3));
        assert_eq!(escape_value(Value::from("<")), Value::from("&lt;"));
    }
}
