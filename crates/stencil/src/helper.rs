/*
 * helper.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The ViewHelper contract.
//!
//! A ViewHelper is the behaviour behind a namespaced tag such as
//! `<f:if condition="...">` or an inline call such as `{f:format.raw()}`.
//! Helpers declare their arguments up front so the parser can validate tags,
//! tell the escaping interceptor how to treat their output and children, and
//! render through an [`Invocation`] whose arguments and children are lazy.

use crate::arguments::ArgumentCollection;
use crate::ast::NodeId;
use crate::context::RenderingContext;
use crate::error::ViewHelperError;
use crate::invocation::Invocation;
use crate::parser::ParsingState;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fully qualified identity of a helper: namespace target plus local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HelperKey {
    pub target: String,
    pub name: String,
}

impl HelperKey {
    pub fn new(target: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            name: name.into(),
        }
    }

    /// Another helper in the same namespace target.
    pub fn sibling(&self, name: &str) -> HelperKey {
        HelperKey::new(self.target.clone(), name)
    }
}

impl fmt::Display for HelperKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.target, self.name)
    }
}

/// Declared type of an argument. Values are coerced to it when read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgumentType {
    #[default]
    Mixed,
    String,
    Integer,
    Float,
    Boolean,
    Array,
}

impl ArgumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ArgumentType::Mixed => "mixed",
            ArgumentType::String => "string",
            ArgumentType::Integer => "integer",
            ArgumentType::Float => "float",
            ArgumentType::Boolean => "boolean",
            ArgumentType::Array => "array",
        }
    }

    /// Coerce an evaluated value. Values that cannot be converted are passed
    /// through unchanged.
    pub fn coerce(self, value: Value) -> Value {
        match self {
            ArgumentType::Mixed | ArgumentType::Array => value,
            ArgumentType::Boolean => Value::Bool(value.is_truthy()),
            ArgumentType::String => match value {
                Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Object(_) => {
                    Value::String(value.to_output_string())
                }
                other => other,
            },
            ArgumentType::Integer => match value.to_number() {
                Some(number) => Value::Int(number.as_i64()),
                None => value,
            },
            ArgumentType::Float => match value.to_number() {
                Some(number) => Value::Float(number.as_f64()),
                None => value,
            },
        }
    }
}

/// Declaration of one argument a helper accepts.
#[derive(Debug, Clone)]
pub struct ArgumentDefinition {
    name: String,
    argument_type: ArgumentType,
    description: String,
    required: bool,
    default: Option<Value>,
    output: bool,
}

impl ArgumentDefinition {
    pub fn new(
        name: impl Into<String>,
        argument_type: ArgumentType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            argument_type,
            description: description.into(),
            required: false,
            default: None,
            output: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// The helper writes this value to its output, so variables and
    /// expressions in it are escaped like any other expression output.
    pub fn as_output(mut self) -> Self {
        self.output = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn argument_type(&self) -> ArgumentType {
        self.argument_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_output(&self) -> bool {
        self.output
    }
}

/// How a helper takes part in template compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileMode {
    /// The call and its children are compiled.
    Compile,
    /// The call is compiled; its children are kept as source and interpreted
    /// when the helper renders them.
    InterpretChildren,
    /// The helper prevents compilation of the whole template.
    Uncompilable(String),
}

/// Coarse classification of a child node, visible to helpers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildKind {
    Text,
    Expression,
    ViewHelper(HelperKey),
    /// Children kept as source and interpreted on demand.
    Fragment,
}

/// A realized child handed to [`ChildNodeAccess`] at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildNodeInfo {
    pub id: NodeId,
    pub kind: ChildKind,
}

/// Optional capability: inspect (and reject) the child list when the tag
/// closes.
pub trait ChildNodeAccess: Send + Sync {
    fn set_child_nodes(
        &self,
        children: &[ChildNodeInfo],
        state: &mut ParsingState,
    ) -> Result<(), String>;
}

/// Behaviour behind a namespaced tag or inline call.
pub trait ViewHelper: Send + Sync {
    fn argument_definitions(&self) -> Vec<ArgumentDefinition> {
        Vec::new()
    }

    /// Accept arguments that are not declared.
    fn additional_arguments_allowed(&self) -> bool {
        false
    }

    /// Whether the helper's output is HTML-escaped.
    fn escape_output(&self) -> bool {
        true
    }

    /// Whether output of expressions among the children is HTML-escaped.
    fn escape_children(&self) -> bool {
        true
    }

    fn compile_mode(&self) -> CompileMode {
        CompileMode::Compile
    }

    /// Called once after the tag has been fully parsed.
    fn post_parse(&self, _arguments: &ArgumentCollection, _state: &mut ParsingState) {}

    fn as_child_node_access(&self) -> Option<&dyn ChildNodeAccess> {
        None
    }

    fn render(
        &self,
        invocation: &mut Invocation<'_>,
        ctx: &mut RenderingContext,
    ) -> Result<Value, ViewHelperError>;
}
