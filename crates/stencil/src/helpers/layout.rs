/*
 * helpers/layout.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Structural helpers that produce no output of their own.

use crate::arguments::ArgumentCollection;
use crate::context::RenderingContext;
use crate::error::ViewHelperError;
use crate::helper::{ArgumentDefinition, ArgumentType, CompileMode, ViewHelper};
use crate::invocation::Invocation;
use crate::parser::ParsingState;
use crate::value::{Scalar, Value};

const DEFAULT_LAYOUT: &str = "Default";

/// `f:layout`: records the layout the template renders into.
#[derive(Debug, Default, Clone, Copy)]
pub struct LayoutViewHelper;

impl ViewHelper for LayoutViewHelper {
    fn argument_definitions(&self) -> Vec<ArgumentDefinition> {
        vec![
            ArgumentDefinition::new("name", ArgumentType::String, "Name of the layout")
                .with_default(DEFAULT_LAYOUT),
        ]
    }

    fn escape_output(&self) -> bool {
        false
    }

    fn post_parse(&self, arguments: &ArgumentCollection, state: &mut ParsingState) {
        match arguments.literal("name") {
            Some(Scalar::String(name)) => state.set_layout_name(name.clone()),
            // Dynamic layout names are only known at render time.
            Some(_) => {}
            None if arguments.get("name").is_none() => state.set_layout_name(DEFAULT_LAYOUT),
            None => {}
        }
    }

    fn render(
        &self,
        _invocation: &mut Invocation<'_>,
        _ctx: &mut RenderingContext,
    ) -> Result<Value, ViewHelperError> {
        Ok(Value::Null)
    }
}

/// `f:comment`: its body is never rendered, so it is never compiled either.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommentViewHelper;

impl ViewHelper for CommentViewHelper {
    fn escape_output(&self) -> bool {
        false
    }

    fn compile_mode(&self) -> CompileMode {
        CompileMode::InterpretChildren
    }

    fn render(
        &self,
        _invocation: &mut Invocation<'_>,
        _ctx: &mut RenderingContext,
    ) -> Result<Value, ViewHelperError> {
        Ok(Value::Null)
    }
}

/// `f:cache.disable`: keeps the template from being compiled.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheDisableViewHelper;

impl ViewHelper for CacheDisableViewHelper {
    fn escape_output(&self) -> bool {
        false
    }

    fn compile_mode(&self) -> CompileMode {
        CompileMode::Uncompilable("disables template compilation".to_string())
    }

    fn render(
        &self,
        _invocation: &mut Invocation<'_>,
        _ctx: &mut RenderingContext,
    ) -> Result<Value, ViewHelperError> {
        Ok(Value::Null)
    }
}
