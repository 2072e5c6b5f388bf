/*
 * helpers/iteration.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `f:for`.

use crate::context::RenderingContext;
use crate::error::ViewHelperError;
use crate::helper::{ArgumentDefinition, ArgumentType, ViewHelper};
use crate::invocation::Invocation;
use crate::value::{Value, ValueMap};

/// Renders its children once per element of `each`, with the element bound
/// to `as`. Variables it binds are restored afterwards.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForViewHelper;

fn int(n: usize) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

fn iteration_info(index: usize, total: usize) -> Value {
    let mut info = ValueMap::new();
    info.insert("index".to_string(), int(index));
    info.insert("cycle".to_string(), int(index + 1));
    info.insert("total".to_string(), int(total));
    info.insert("isFirst".to_string(), Value::Bool(index == 0));
    info.insert("isLast".to_string(), Value::Bool(index + 1 == total));
    info.insert("isEven".to_string(), Value::Bool((index + 1) % 2 == 0));
    info.insert("isOdd".to_string(), Value::Bool((index + 1) % 2 == 1));
    Value::Map(info)
}

impl ViewHelper for ForViewHelper {
    fn argument_definitions(&self) -> Vec<ArgumentDefinition> {
        vec![
            ArgumentDefinition::new("each", ArgumentType::Array, "List or map to iterate").required(),
            ArgumentDefinition::new("as", ArgumentType::String, "Name of the element variable")
                .required(),
            ArgumentDefinition::new("key", ArgumentType::String, "Name of the key variable"),
            ArgumentDefinition::new("reverse", ArgumentType::Boolean, "Iterate backwards")
                .with_default(false),
            ArgumentDefinition::new("iteration", ArgumentType::String, "Name of the iteration info variable"),
        ]
    }

    fn escape_output(&self) -> bool {
        false
    }

    fn render(
        &self,
        invocation: &mut Invocation<'_>,
        ctx: &mut RenderingContext,
    ) -> Result<Value, ViewHelperError> {
        let mut entries: Vec<(Value, Value)> = match invocation.argument("each", ctx)? {
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| (int(index), item))
                .collect(),
            Value::Map(map) => map
                .into_iter()
                .map(|(key, item)| (Value::String(key), item))
                .collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(invocation.failure(format!(
                    "cannot iterate over a value of type {}",
                    other.type_name()
                )));
            }
        };
        if invocation.argument("reverse", ctx)?.is_truthy() {
            entries.reverse();
        }

        let as_name = invocation.argument("as", ctx)?.to_output_string();
        let key_name = if invocation.arguments.is_set("key") {
            Some(invocation.argument("key", ctx)?.to_output_string())
        } else {
            None
        };
        let iteration_name = if invocation.arguments.is_set("iteration") {
            Some(invocation.argument("iteration", ctx)?.to_output_string())
        } else {
            None
        };
        let saved: Vec<(String, Option<Value>)> = std::iter::once(&as_name)
            .chain(key_name.iter())
            .chain(iteration_name.iter())
            .map(|name| (name.clone(), ctx.variables().get(name).cloned()))
            .collect();

        let total = entries.len();
        let mut output = String::new();
        let mut result = Ok(());
        for (index, (key, item)) in entries.into_iter().enumerate() {
            ctx.variables_mut().add(&as_name, item);
            if let Some(name) = &key_name {
                ctx.variables_mut().add(name, key);
            }
            if let Some(name) = &iteration_name {
                ctx.variables_mut().add(name, iteration_info(index, total));
            }
            match invocation.render_children(ctx) {
                Ok(value) => output.push_str(&value.to_output_string()),
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }

        for (name, previous) in saved {
            match previous {
                Some(value) => ctx.variables_mut().add(&name, value),
                None => {
                    ctx.variables_mut().remove(&name);
                }
            }
        }
        result?;
        Ok(Value::String(output))
    }
}
