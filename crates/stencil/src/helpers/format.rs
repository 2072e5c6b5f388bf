/*
 * helpers/format.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Output formatting helpers.

use crate::context::RenderingContext;
use crate::error::ViewHelperError;
use crate::helper::{ArgumentDefinition, ArgumentType, ViewHelper};
use crate::invocation::Invocation;
use crate::value::{Value, escape_html};

/// `value` if given, the children otherwise.
fn value_or_children(
    invocation: &mut Invocation<'_>,
    ctx: &mut RenderingContext,
) -> Result<Value, ViewHelperError> {
    if invocation.arguments.is_set("value") {
        Ok(invocation.argument("value", ctx)?)
    } else {
        Ok(invocation.render_children(ctx)?)
    }
}

/// `f:format.raw`: outputs its value without escaping.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawViewHelper;

impl ViewHelper for RawViewHelper {
    fn argument_definitions(&self) -> Vec<ArgumentDefinition> {
        vec![ArgumentDefinition::new(
            "value",
            ArgumentType::Mixed,
            "Value to output; defaults to the children",
        )]
    }

    fn escape_output(&self) -> bool {
        false
    }

    fn escape_children(&self) -> bool {
        false
    }

    fn render(
        &self,
        invocation: &mut Invocation<'_>,
        ctx: &mut RenderingContext,
    ) -> Result<Value, ViewHelperError> {
        value_or_children(invocation, ctx)
    }
}

/// `f:format.htmlspecialchars`: escapes its value exactly once.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlspecialcharsViewHelper;

impl ViewHelper for HtmlspecialcharsViewHelper {
    fn argument_definitions(&self) -> Vec<ArgumentDefinition> {
        vec![
            ArgumentDefinition::new(
                "value",
                ArgumentType::String,
                "Value to escape; defaults to the children",
            ),
            ArgumentDefinition::new("keepQuotes", ArgumentType::Boolean, "Leave quotes as they are")
                .with_default(false),
        ]
    }

    fn escape_output(&self) -> bool {
        false
    }

    fn escape_children(&self) -> bool {
        false
    }

    fn render(
        &self,
        invocation: &mut Invocation<'_>,
        ctx: &mut RenderingContext,
    ) -> Result<Value, ViewHelperError> {
        let text = value_or_children(invocation, ctx)?.to_output_string();
        let escaped = if invocation.argument("keepQuotes", ctx)?.is_truthy() {
            text.replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;")
        } else {
            escape_html(&text)
        };
        Ok(Value::String(escaped))
    }
}
