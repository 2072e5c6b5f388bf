/*
 * compiler/program.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The compiled template format and its executor.
//!
//! A compiled template is a flat table of sections. Each section is a list of
//! instructions whose values are combined the same way sibling nodes are in
//! the syntax tree. Nested constructs (argument values, children, expression
//! operands) refer to other sections by [`SectionId`], so the whole program
//! serializes to JSON without any reference to the tree it came from.

use crate::context::RenderingContext;
use crate::error::{CacheError, TemplateResult};
use crate::evaluator::{escape_value, route_expression_error};
use crate::expression::{BooleanExpression, CastExpression, MathExpression, Operand, Ternary};
use crate::helper::{ChildKind, HelperKey};
use crate::invocation::{Arguments, Children, Invocation, Thunk, invoke};
use crate::namespace::NamespaceTable;
use crate::parser::TemplateParser;
use crate::value::{Scalar, Value, ValueMap, concat_values};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Bumped whenever the serialized layout changes. Cached units with another
/// version are discarded.
pub const FORMAT_VERSION: u32 = 1;

/// Index of a section in a [`CompiledTemplate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectionId(u32);

impl SectionId {
    pub(crate) fn from_index(index: usize) -> Self {
        SectionId(u32::try_from(index).unwrap_or(u32::MAX))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    Text(String),
    /// Variable lookup by path.
    Lookup(String),
    /// HTML-escape the value of a section.
    Escape(SectionId),
    Array(Vec<(String, Operand<SectionId>)>),
    Boolean(BooleanExpression<SectionId>),
    Ternary(Ternary<SectionId>),
    Math(MathExpression<SectionId>),
    Cast(CastExpression<SectionId>),
    Helper(HelperCall),
}

/// A ViewHelper call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperCall {
    pub key: HelperKey,
    pub tag: String,
    /// Position of the call in the unit; helper instances are cached per call
    /// site.
    pub call_site: u32,
    pub arguments: Vec<(String, CompiledArgument)>,
    pub children: CompiledChildren,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompiledArgument {
    Literal(Scalar),
    Section(SectionId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompiledChildren {
    Sections(Vec<CompiledChild>),
    /// Children kept as source, parsed and interpreted when rendered.
    Interpreted(InterpretedFragment),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledChild {
    pub kind: ChildKind,
    pub section: SectionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretedFragment {
    pub source: String,
    pub namespaces: NamespaceTable,
    pub escaping: bool,
}

/// An executable, serializable template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTemplate {
    pub(crate) version: u32,
    pub(crate) identifier: String,
    pub(crate) layout_name: Option<String>,
    pub(crate) entry: SectionId,
    pub(crate) sections: Vec<Vec<Instr>>,
}

impl CompiledTemplate {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn layout_name(&self) -> Option<&str> {
        self.layout_name.as_deref()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn sections(&self) -> &[Vec<Instr>] {
        &self.sections
    }

    pub fn to_json(&self) -> Result<String, CacheError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CacheError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn render(&self, ctx: &mut RenderingContext) -> TemplateResult<String> {
        Ok(self.run(self.entry, ctx)?.to_output_string())
    }

    fn run(&self, section: SectionId, ctx: &mut RenderingContext) -> TemplateResult<Value> {
        let Some(instrs) = self.sections.get(section.index()) else {
            return Ok(Value::Null);
        };
        let mut values = Vec::with_capacity(instrs.len());
        for instr in instrs {
            values.push(self.execute(instr, ctx)?);
        }
        Ok(concat_values(values))
    }

    fn operand(&self, operand: &Operand<SectionId>, ctx: &mut RenderingContext) -> TemplateResult<Value> {
        match operand {
            Operand::Literal(scalar) => Ok(scalar.to_value()),
            Operand::Ref(section) => self.run(*section, ctx),
        }
    }

    fn execute(&self, instr: &Instr, ctx: &mut RenderingContext) -> TemplateResult<Value> {
        match instr {
            Instr::Text(text) => Ok(Value::String(text.clone())),
            Instr::Lookup(path) => Ok(ctx.variables().get_by_path(path)),
            Instr::Escape(section) => Ok(escape_value(self.run(*section, ctx)?)),
            Instr::Array(entries) => {
                let mut map = ValueMap::new();
                for (key, operand) in entries {
                    map.insert(key.clone(), self.operand(operand, ctx)?);
                }
                Ok(Value::Map(map))
            }
            Instr::Boolean(expression) => {
                let result = expression
                    .evaluate(&mut |operand: &Operand<SectionId>| self.operand(operand, ctx))
                    .map(Value::Bool);
                route_expression_error(result, ctx)
            }
            Instr::Ternary(ternary) => {
                let result =
                    ternary.evaluate(&mut |operand: &Operand<SectionId>| self.operand(operand, ctx));
                route_expression_error(result, ctx)
            }
            Instr::Math(math) => {
                let result =
                    math.evaluate(&mut |operand: &Operand<SectionId>| self.operand(operand, ctx));
                route_expression_error(result, ctx)
            }
            Instr::Cast(cast) => {
                let result =
                    cast.evaluate(&mut |operand: &Operand<SectionId>| self.operand(operand, ctx));
                route_expression_error(result, ctx)
            }
            Instr::Helper(call) => self.call(call, ctx),
        }
    }

    fn call(&self, call: &HelperCall, ctx: &mut RenderingContext) -> TemplateResult<Value> {
        let helper = match ctx.helper_instance(&self.identifier, call.call_site, &call.key) {
            Ok(helper) => helper,
            Err(error) => {
                let handler = Arc::clone(ctx.error_handler());
                return handler.handle_view_helper_error(error).map(Value::String);
            }
        };

        let mut arguments = Arguments::new(helper.argument_definitions());
        for (name, argument) in &call.arguments {
            let thunk: Thunk<'_> = match argument {
                CompiledArgument::Literal(scalar) => {
                    let value = scalar.to_value();
                    Box::new(move |_ctx: &mut RenderingContext| Ok(value.clone()))
                }
                CompiledArgument::Section(section) => {
                    let section = *section;
                    Box::new(move |ctx: &mut RenderingContext| self.run(section, ctx))
                }
            };
            arguments.push(name.as_str(), thunk);
        }

        let mut children = Children::new();
        match &call.children {
            CompiledChildren::Sections(sections) => {
                for child in sections {
                    let section = child.section;
                    let thunk: Thunk<'_> =
                        Box::new(move |ctx: &mut RenderingContext| self.run(section, ctx));
                    children.push(child.kind.clone(), thunk);
                }
            }
            CompiledChildren::Interpreted(fragment) => {
                let identifier = format!("{}#{}", self.identifier, call.call_site);
                let thunk: Thunk<'_> = Box::new(move |ctx: &mut RenderingContext| {
                    let template = TemplateParser::from_context(ctx).parse_fragment(
                        &fragment.source,
                        &identifier,
                        &fragment.namespaces,
                        fragment.escaping,
                    )?;
                    template.evaluate(template.root(), ctx)
                });
                children.push(ChildKind::Fragment, thunk);
            }
        }

        let mut invocation = Invocation::new(call.key.clone(), call.tag.clone(), arguments, children);
        invoke(helper.as_ref(), &mut invocation, ctx)
    }
}
