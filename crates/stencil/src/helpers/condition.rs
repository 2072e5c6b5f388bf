/*
 * helpers/condition.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `f:if`, `f:then`, `f:else`.

use crate::context::RenderingContext;
use crate::error::ViewHelperError;
use crate::helper::{
    ArgumentDefinition, ArgumentType, ChildKind, ChildNodeAccess, ChildNodeInfo, ViewHelper,
};
use crate::invocation::Invocation;
use crate::parser::ParsingState;
use crate::value::Value;

/// Renders its `f:then` child (or `then` argument) when `condition` holds,
/// its `f:else` child (or `else` argument) otherwise. Without either child,
/// all children form the then branch.
#[derive(Debug, Default, Clone, Copy)]
pub struct IfViewHelper;

impl IfViewHelper {
    fn render_then(
        invocation: &mut Invocation<'_>,
        ctx: &mut RenderingContext,
    ) -> Result<Value, ViewHelperError> {
        let then_key = invocation.key.sibling("then");
        let else_key = invocation.key.sibling("else");
        if let Some(index) = invocation.children.find_helper(&then_key) {
            return Ok(invocation.children.render_child(index, ctx)?);
        }
        if invocation.arguments.is_set("then") {
            return Ok(invocation.argument("then", ctx)?);
        }
        if invocation.children.find_helper(&else_key).is_some() {
            return Ok(Value::Null);
        }
        Ok(invocation.render_children(ctx)?)
    }

    fn render_else(
        invocation: &mut Invocation<'_>,
        ctx: &mut RenderingContext,
    ) -> Result<Value, ViewHelperError> {
        let else_key = invocation.key.sibling("else");
        if let Some(index) = invocation.children.find_helper(&else_key) {
            return Ok(invocation.children.render_child(index, ctx)?);
        }
        if invocation.arguments.is_set("else") {
            return Ok(invocation.argument("else", ctx)?);
        }
        Ok(Value::Null)
    }
}

impl ViewHelper for IfViewHelper {
    fn argument_definitions(&self) -> Vec<ArgumentDefinition> {
        vec![
            ArgumentDefinition::new("condition", ArgumentType::Boolean, "Condition to evaluate")
                .with_default(false),
            ArgumentDefinition::new("then", ArgumentType::Mixed, "Value if the condition holds")
                .as_output(),
            ArgumentDefinition::new("else", ArgumentType::Mixed, "Value otherwise").as_output(),
        ]
    }

    fn escape_output(&self) -> bool {
        false
    }

    fn as_child_node_access(&self) -> Option<&dyn ChildNodeAccess> {
        Some(self)
    }

    fn render(
        &self,
        invocation: &mut Invocation<'_>,
        ctx: &mut RenderingContext,
    ) -> Result<Value, ViewHelperError> {
        if invocation.argument("condition", ctx)?.is_truthy() {
            Self::render_then(invocation, ctx)
        } else {
            Self::render_else(invocation, ctx)
        }
    }
}

impl ChildNodeAccess for IfViewHelper {
    fn set_child_nodes(
        &self,
        children: &[ChildNodeInfo],
        _state: &mut ParsingState,
    ) -> Result<(), String> {
        for branch in ["then", "else"] {
            let count = children
                .iter()
                .filter(|child| matches!(&child.kind, ChildKind::ViewHelper(key) if key.name == branch))
                .count();
            if count > 1 {
                return Err(format!("only one \"{branch}\" branch is allowed, found {count}"));
            }
        }
        Ok(())
    }
}

/// Then branch of `f:if`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThenViewHelper;

impl ViewHelper for ThenViewHelper {
    fn escape_output(&self) -> bool {
        false
    }

    fn render(
        &self,
        invocation: &mut Invocation<'_>,
        ctx: &mut RenderingContext,
    ) -> Result<Value, ViewHelperError> {
        Ok(invocation.render_children(ctx)?)
    }
}

/// Else branch of `f:if`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ElseViewHelper;

impl ViewHelper for ElseViewHelper {
    fn escape_output(&self) -> bool {
        false
    }

    fn render(
        &self,
        invocation: &mut Invocation<'_>,
        ctx: &mut RenderingContext,
    ) -> Result<Value, ViewHelperError> {
        Ok(invocation.render_children(ctx)?)
    }
}
