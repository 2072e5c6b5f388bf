/*
 * invocation.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! What a ViewHelper sees when it renders.
//!
//! Arguments and children are handed over as thunks so that both rendering
//! modes look the same to a helper: the interpreter wraps syntax-tree nodes,
//! compiled templates wrap sections. Nothing is evaluated until the helper
//! asks, and an argument is evaluated at most once.

use crate::context::RenderingContext;
use crate::error::{TemplateResult, ViewHelperError};
use crate::helper::{ArgumentDefinition, ChildKind, HelperKey, ViewHelper};
use crate::value::{Value, ValueMap, concat_values};
use std::borrow::Cow;

/// A deferred value.
pub type Thunk<'t> = Box<dyn Fn(&mut RenderingContext) -> TemplateResult<Value> + 't>;

struct Slot<'t> {
    name: String,
    thunk: Thunk<'t>,
    value: Option<Value>,
}

/// Arguments of one helper call.
pub struct Arguments<'t> {
    definitions: Cow<'t, [ArgumentDefinition]>,
    slots: Vec<Slot<'t>>,
}

impl<'t> Arguments<'t> {
    pub fn new(definitions: impl Into<Cow<'t, [ArgumentDefinition]>>) -> Self {
        Self {
            definitions: definitions.into(),
            slots: Vec::new(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, thunk: Thunk<'t>) {
        self.slots.push(Slot {
            name: name.into(),
            thunk,
            value: None,
        });
    }

    /// Whether a value was given for `name` (defaults do not count).
    pub fn is_set(&self, name: &str) -> bool {
        self.slots.iter().any(|slot| slot.name == name)
    }

    /// The value of `name`, coerced to its declared type. Unset arguments
    /// yield their default, or null.
    pub fn get(&mut self, name: &str, ctx: &mut RenderingContext) -> TemplateResult<Value> {
        let definition = self.definitions.iter().find(|d| d.name() == name);
        let Some(slot) = self.slots.iter_mut().find(|slot| slot.name == name) else {
            return Ok(definition
                .and_then(|d| d.default_value().cloned())
                .unwrap_or_default());
        };
        if let Some(value) = &slot.value {
            return Ok(value.clone());
        }
        let raw = (slot.thunk)(ctx)?;
        let value = match definition {
            Some(definition) => definition.argument_type().coerce(raw),
            None => raw,
        };
        slot.value = Some(value.clone());
        Ok(value)
    }

    /// Every declared argument in declaration order, then undeclared ones in
    /// the order they were given.
    pub fn evaluate_all(&mut self, ctx: &mut RenderingContext) -> TemplateResult<ValueMap> {
        let mut names: Vec<String> = self
            .definitions
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        for slot in &self.slots {
            if !names.contains(&slot.name) {
                names.push(slot.name.clone());
            }
        }
        let mut values = ValueMap::new();
        for name in names {
            let value = self.get(&name, ctx)?;
            values.insert(name, value);
        }
        Ok(values)
    }

    /// Names of the arguments that were given.
    pub fn names(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.name.as_str()).collect()
    }
}

struct Child<'t> {
    kind: ChildKind,
    thunk: Thunk<'t>,
}

/// Children of one helper call.
#[derive(Default)]
pub struct Children<'t> {
    children: Vec<Child<'t>>,
}

impl<'t> Children<'t> {
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, kind: ChildKind, thunk: Thunk<'t>) {
        self.children.push(Child { kind, thunk });
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn kind(&self, index: usize) -> Option<&ChildKind> {
        self.children.get(index).map(|child| &child.kind)
    }

    /// Index of the first child that is a call to `key`.
    pub fn find_helper(&self, key: &HelperKey) -> Option<usize> {
        self.children
            .iter()
            .position(|child| matches!(&child.kind, ChildKind::ViewHelper(k) if k == key))
    }

    pub fn render_child(&self, index: usize, ctx: &mut RenderingContext) -> TemplateResult<Value> {
        match self.children.get(index) {
            Some(child) => (child.thunk)(ctx),
            None => Ok(Value::Null),
        }
    }

    /// Render every child and combine the results.
    pub fn render(&self, ctx: &mut RenderingContext) -> TemplateResult<Value> {
        let mut values = Vec::with_capacity(self.children.len());
        for child in &self.children {
            values.push((child.thunk)(ctx)?);
        }
        Ok(concat_values(values))
    }
}

/// One call of a helper.
pub struct Invocation<'t> {
    pub key: HelperKey,
    /// Tag as written in the template (`f:if`).
    pub tag: String,
    pub arguments: Arguments<'t>,
    pub children: Children<'t>,
}

impl<'t> Invocation<'t> {
    pub fn new(
        key: HelperKey,
        tag: impl Into<String>,
        arguments: Arguments<'t>,
        children: Children<'t>,
    ) -> Self {
        Self {
            key,
            tag: tag.into(),
            arguments,
            children,
        }
    }

    pub fn argument(&mut self, name: &str, ctx: &mut RenderingContext) -> TemplateResult<Value> {
        self.arguments.get(name, ctx)
    }

    pub fn render_children(&self, ctx: &mut RenderingContext) -> TemplateResult<Value> {
        self.children.render(ctx)
    }

    /// A [`ViewHelperError::Failed`] for this call.
    pub fn failure(&self, message: impl Into<String>) -> ViewHelperError {
        ViewHelperError::Failed {
            tag: self.tag.clone(),
            message: message.into(),
        }
    }
}

/// Run a helper, routing its failures through the error handler. Errors that
/// merely passed through the helper are returned unchanged.
pub fn invoke(
    helper: &dyn ViewHelper,
    invocation: &mut Invocation<'_>,
    ctx: &mut RenderingContext,
) -> TemplateResult<Value> {
    match helper.render(invocation, ctx) {
        Ok(value) => Ok(value),
        Err(ViewHelperError::Propagated(inner)) => Err(*inner),
        Err(error) => {
            let handler = std::sync::Arc::clone(ctx.error_handler());
            handler.handle_view_helper_error(error).map(Value::String)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::ArgumentType;
    use crate::variables::StandardVariableProvider;
    use std::cell::Cell;

    fn ctx() -> RenderingContext {
        RenderingContext::new(StandardVariableProvider::new())
    }

    #[test]
    fn test_argument_is_evaluated_once_and_coerced() {
        let calls = Cell::new(0);
        let definitions = vec![ArgumentDefinition::new("count", ArgumentType::Integer, "")];
        let mut arguments = Arguments::new(definitions);
        arguments.push(
            "count",
            Box::new(|_ctx: &mut RenderingContext| {
                calls.set(calls.get() + 1);
                Ok(Value::from("12"))
            }),
        );
        let mut ctx = ctx();
        assert_eq!(arguments.get("count", &mut ctx).unwrap(), Value::Int(12));
        assert_eq!(arguments.get("count", &mut ctx).unwrap(), Value::Int(12));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_unset_argument_uses_default() {
        let definitions = vec![
            ArgumentDefinition::new("as", ArgumentType::String, "").with_default("item"),
            ArgumentDefinition::new("key", ArgumentType::String, ""),
        ];
        let mut arguments = Arguments::new(definitions);
        arguments.push("extra", Box::new(|_ctx: &mut RenderingContext| Ok(Value::Int(1))));
        let mut ctx = ctx();
        assert!(!arguments.is_set("as"));
        let all = arguments.evaluate_all(&mut ctx).unwrap();
        let keys: Vec<&str> = all.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["as", "key", "extra"]);
        assert_eq!(all["as"], Value::from("item"));
        assert_eq!(all["key"], Value::Null);
    }

    #[test]
    fn test_children_render_and_lookup() {
        let key = HelperKey::new("app", "then");
        let mut children = Children::new();
        children.push(ChildKind::Text, Box::new(|_ctx: &mut RenderingContext| Ok(Value::from("a"))));
        children.push(
            ChildKind::ViewHelper(key.clone()),
            Box::new(|_ctx: &mut RenderingContext| Ok(Value::from("b"))),
        );
        let mut ctx = ctx();
        assert_eq!(children.render(&mut ctx).unwrap(), Value::from("ab"));
        assert_eq!(children.find_helper(&key), Some(1));
        assert_eq!(children.render_child(5, &mut ctx).unwrap(), Value::Null);
    }
}
