/*
 * arguments.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Parse-time argument binding.

use crate::ast::{NodeId, ParsedTemplate};
use crate::context::RenderingContext;
use crate::error::TemplateResult;
use crate::helper::ArgumentDefinition;
use crate::value::{Scalar, ValueMap};
use indexmap::IndexMap;
use thiserror::Error;

/// The value given for one argument: either a literal or the root of a
/// sub-tree evaluated on demand.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    Literal(Scalar),
    /// A parentless `Root` node in the template's arena.
    Tree(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("unknown argument \"{0}\"")]
    Unknown(String),

    #[error("argument \"{0}\" given more than once")]
    Duplicate(String),
}

/// Arguments of one ViewHelper occurrence, bound against the helper's
/// definitions.
#[derive(Debug, Clone, Default)]
pub struct ArgumentCollection {
    definitions: Vec<ArgumentDefinition>,
    values: IndexMap<String, ArgumentValue>,
    additional_allowed: bool,
}

impl ArgumentCollection {
    pub fn new(definitions: Vec<ArgumentDefinition>, additional_allowed: bool) -> Self {
        Self {
            definitions,
            values: IndexMap::new(),
            additional_allowed,
        }
    }

    pub fn definitions(&self) -> &[ArgumentDefinition] {
        &self.definitions
    }

    pub fn definition(&self, name: &str) -> Option<&ArgumentDefinition> {
        self.definitions.iter().find(|d| d.name() == name)
    }

    /// Whether `name` may be assigned.
    pub fn accepts(&self, name: &str) -> bool {
        self.additional_allowed || self.definition(name).is_some()
    }

    pub fn assign(&mut self, name: impl Into<String>, value: ArgumentValue) -> Result<(), BindError> {
        let name = name.into();
        if !self.accepts(&name) {
            return Err(BindError::Unknown(name));
        }
        if self.values.contains_key(&name) {
            return Err(BindError::Duplicate(name));
        }
        self.values.insert(name, value);
        Ok(())
    }

    pub fn assign_all(
        &mut self,
        values: impl IntoIterator<Item = (String, ArgumentValue)>,
    ) -> Result<(), BindError> {
        values
            .into_iter()
            .try_for_each(|(name, value)| self.assign(name, value))
    }

    pub fn get(&self, name: &str) -> Option<&ArgumentValue> {
        self.values.get(name)
    }

    /// The literal given for `name`, if it was given as a literal.
    pub fn literal(&self, name: &str) -> Option<&Scalar> {
        match self.values.get(name) {
            Some(ArgumentValue::Literal(scalar)) => Some(scalar),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgumentValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The first required argument that has not been assigned.
    pub fn validate_required(&self) -> Result<(), &str> {
        match self
            .definitions
            .iter()
            .find(|d| d.is_required() && !self.values.contains_key(d.name()))
        {
            Some(missing) => Err(missing.name()),
            None => Ok(()),
        }
    }

    /// Evaluate every declared and every assigned argument, coercing each to
    /// its declared type and filling in defaults.
    pub fn evaluate_all(
        &self,
        template: &ParsedTemplate,
        ctx: &mut RenderingContext,
    ) -> TemplateResult<ValueMap> {
        template.bind_arguments(self).evaluate_all(ctx)
    }
}
