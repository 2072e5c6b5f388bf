/*
 * compiler/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template compilation.
//!
//! A parsed template is lowered into a [`CompiledTemplate`] that no longer
//! needs the syntax tree. Compiled units are kept in an in-process table and
//! persisted through a [`TemplateCache`] under an identifier derived from the
//! template path, its source and the namespace bindings it was parsed with.
//! Compilation is all or nothing: a template containing anything that cannot
//! be compiled is rendered by the interpreter instead.

mod program;
mod warmup;

pub use program::{
    CompiledArgument, CompiledChild, CompiledChildren, CompiledTemplate, FORMAT_VERSION,
    HelperCall, Instr, InterpretedFragment, SectionId,
};
pub use warmup::{
    CompilationResult, FileSystemTemplateLocator, MemoryTemplateLocator, TemplateEntry,
    TemplateKind, TemplateLocator, WarmupResult,
};

use crate::arguments::ArgumentValue;
use crate::ast::{CompileState, Node, NodeId, ParsedTemplate, ViewHelperNode};
use crate::cache::TemplateCache;
use crate::error::CompileError;
use crate::expression::Expression;
use crate::helper::CompileMode;
use crate::namespace::NamespaceTable;
use crate::parser::ParserConfiguration;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Compiles parsed templates and keeps the resulting units.
#[derive(Default)]
pub struct TemplateCompiler {
    units: RwLock<HashMap<String, Arc<CompiledTemplate>>>,
}

impl fmt::Debug for TemplateCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units = self.units.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("TemplateCompiler")
            .field("units", &units.len())
            .finish()
    }
}

impl TemplateCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache identifier for a template: the path made safe for file names,
    /// followed by a SHA-256 of the source, the namespace bindings and the
    /// parser configuration.
    pub fn identifier(
        path: &str,
        source: &str,
        namespaces: &NamespaceTable,
        config: &ParserConfiguration,
    ) -> String {
        let sanitized: String = path
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update([0u8]);
        hasher.update(namespaces.fingerprint().as_bytes());
        hasher.update([0u8]);
        hasher.update(config.fingerprint().as_bytes());
        format!("{}_{}", sanitized, hex::encode(hasher.finalize()))
    }

    /// Compile `template`, recording the outcome in its compile state.
    pub fn compile(&self, template: &mut ParsedTemplate) -> Result<Arc<CompiledTemplate>, CompileError> {
        if let Some(reason) = template.uncompilable_reason().map(str::to_string) {
            template.set_compile_state(CompileState::CompileFailed {
                reason: reason.clone(),
                mitigations: mitigations(&reason),
            });
            return Err(CompileError::CannotCompile {
                node: template.identifier().to_string(),
                reason,
            });
        }

        template.set_compile_state(CompileState::Compiling);
        match Emitter::new(template).finish() {
            Ok(unit) => {
                tracing::debug!(
                    identifier = %unit.identifier(),
                    sections = unit.sections().len(),
                    "Compiled template"
                );
                template.set_compile_state(CompileState::Compiled {
                    identifier: unit.identifier().to_string(),
                });
                Ok(Arc::new(unit))
            }
            Err(error) => {
                let reason = match &error {
                    CompileError::CannotCompile { node, reason } => format!("{node} {reason}"),
                    other => other.to_string(),
                };
                template.set_compile_state(CompileState::CompileFailed {
                    mitigations: mitigations(&reason),
                    reason,
                });
                Err(error)
            }
        }
    }

    /// The unit stored under `identifier`, from the in-process table or the
    /// cache. Cached units written by another format version are flushed and
    /// reported as a miss.
    pub fn load(
        &self,
        identifier: &str,
        cache: &dyn TemplateCache,
    ) -> Result<Option<Arc<CompiledTemplate>>, CompileError> {
        if let Some(unit) = self.get(identifier) {
            tracing::trace!(identifier, "Compiled template hit");
            return Ok(Some(unit));
        }
        let Some(json) = cache.get(identifier)? else {
            tracing::debug!(identifier, "Compiled template miss");
            return Ok(None);
        };
        match CompiledTemplate::from_json(&json) {
            Ok(unit) if unit.version() == FORMAT_VERSION && unit.identifier() == identifier => {
                tracing::debug!(identifier, "Loaded compiled template from cache");
                let unit = Arc::new(unit);
                self.insert(Arc::clone(&unit));
                Ok(Some(unit))
            }
            outdated => {
                let error = outdated.err().map(|error| error.to_string());
                tracing::debug!(identifier, ?error, "Flushing outdated compiled template");
                cache.flush(Some(identifier))?;
                Ok(None)
            }
        }
    }

    /// Persist `unit` in the cache and keep it in the in-process table.
    pub fn store(&self, unit: Arc<CompiledTemplate>, cache: &dyn TemplateCache) -> Result<(), CompileError> {
        cache.set(unit.identifier(), &unit.to_json()?)?;
        tracing::debug!(identifier = %unit.identifier(), "Stored compiled template");
        self.insert(unit);
        Ok(())
    }

    pub fn compile_and_store(
        &self,
        template: &mut ParsedTemplate,
        cache: &dyn TemplateCache,
    ) -> Result<Arc<CompiledTemplate>, CompileError> {
        let unit = self.compile(template)?;
        self.store(Arc::clone(&unit), cache)?;
        Ok(unit)
    }

    /// Forget one unit, or all of them, here and in the cache.
    pub fn flush(&self, identifier: Option<&str>, cache: &dyn TemplateCache) -> Result<(), CompileError> {
        {
            let mut units = self.units.write().unwrap_or_else(PoisonError::into_inner);
            match identifier {
                Some(identifier) => {
                    units.remove(identifier);
                }
                None => units.clear(),
            }
        }
        cache.flush(identifier)?;
        tracing::debug!(?identifier, "Flushed compiled templates");
        Ok(())
    }

    /// Whether `identifier` is in the in-process table.
    pub fn has(&self, identifier: &str) -> bool {
        self.units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(identifier)
    }

    fn get(&self, identifier: &str) -> Option<Arc<CompiledTemplate>> {
        self.units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identifier)
            .cloned()
    }

    fn insert(&self, unit: Arc<CompiledTemplate>) {
        self.units
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(unit.identifier().to_string(), unit);
    }
}

fn mitigations(reason: &str) -> Vec<String> {
    let mut mitigations = Vec::new();
    if reason.contains("custom expression") {
        mitigations.push("Replace the custom expression with a ViewHelper call".to_string());
    }
    if reason.contains('<') {
        mitigations.push("Move the uncompilable ViewHelper into a partial".to_string());
    }
    mitigations.push("Leave the template uncompiled; it is interpreted on every render".to_string());
    mitigations
}

/// Lowers one syntax tree into sections.
struct Emitter<'a> {
    template: &'a ParsedTemplate,
    sections: Vec<Vec<Instr>>,
    call_sites: u32,
}

impl<'a> Emitter<'a> {
    fn new(template: &'a ParsedTemplate) -> Self {
        Self {
            template,
            sections: Vec::new(),
            call_sites: 0,
        }
    }

    fn finish(mut self) -> Result<CompiledTemplate, CompileError> {
        let template = self.template;
        let entry = self.section(&[template.root()])?;
        Ok(CompiledTemplate {
            version: FORMAT_VERSION,
            identifier: template.identifier().to_string(),
            layout_name: template.layout_name().map(str::to_string),
            entry,
            sections: self.sections,
        })
    }

    /// A new section holding `nodes`. Sections are numbered in the order they
    /// are opened, so a parent comes before the sections it refers to.
    fn section(&mut self, nodes: &[NodeId]) -> Result<SectionId, CompileError> {
        let id = SectionId::from_index(self.sections.len());
        self.sections.push(Vec::new());
        let mut instrs = Vec::with_capacity(nodes.len());
        for node in nodes {
            self.emit(*node, &mut instrs)?;
        }
        self.sections[id.index()] = instrs;
        Ok(id)
    }

    fn emit(&mut self, id: NodeId, out: &mut Vec<Instr>) -> Result<(), CompileError> {
        let template = self.template;
        match template.tree().get(id) {
            Node::Root { children } => {
                for child in children {
                    self.emit(*child, out)?;
                }
            }
            Node::Text { text } => out.push(Instr::Text(text.clone())),
            Node::ObjectAccessor { path, .. } => out.push(Instr::Lookup(path.clone())),
            Node::Array { entries } => {
                let mut compiled = Vec::with_capacity(entries.len());
                for (key, operand) in entries {
                    compiled.push((key.clone(), operand.map_ref(&mut |id: &NodeId| self.operand_section(id))?));
                }
                out.push(Instr::Array(compiled));
            }
            Node::Boolean { expression } => {
                out.push(Instr::Boolean(expression.map_refs(&mut |id: &NodeId| self.operand_section(id))?));
            }
            Node::Escaping { child } => out.push(Instr::Escape(self.section(&[*child])?)),
            Node::Expression { expression, source } => {
                let instr = match expression {
                    Expression::Ternary(ternary) => {
                        Instr::Ternary(ternary.map_refs(&mut |id: &NodeId| self.operand_section(id))?)
                    }
                    Expression::Math(math) => Instr::Math(math.map_refs(&mut |id: &NodeId| self.operand_section(id))?),
                    Expression::Cast(cast) => Instr::Cast(cast.map_refs(&mut |id: &NodeId| self.operand_section(id))?),
                    Expression::Custom(custom) => {
                        return Err(CompileError::CannotCompile {
                            node: format!("{{{source}}}"),
                            reason: format!("uses custom expression \"{}\"", custom.name()),
                        });
                    }
                };
                out.push(instr);
            }
            Node::ViewHelper(node) => out.push(Instr::Helper(self.helper_call(node)?)),
        }
        Ok(())
    }

    fn operand_section(&mut self, id: &NodeId) -> Result<SectionId, CompileError> {
        self.section(&[*id])
    }

    fn helper_call(&mut self, node: &ViewHelperNode) -> Result<HelperCall, CompileError> {
        let template = self.template;
        let mode = node.helper.compile_mode();
        if let CompileMode::Uncompilable(reason) = &mode {
            return Err(CompileError::CannotCompile {
                node: format!("<{}>", node.tag),
                reason: reason.clone(),
            });
        }
        let call_site = self.call_sites;
        self.call_sites += 1;

        let mut arguments = Vec::with_capacity(node.arguments.len());
        for (name, value) in node.arguments.iter() {
            let compiled = match value {
                ArgumentValue::Literal(scalar) => CompiledArgument::Literal(scalar.clone()),
                ArgumentValue::Tree(root) => CompiledArgument::Section(self.section(&[*root])?),
            };
            arguments.push((name.to_string(), compiled));
        }

        let children = if mode == CompileMode::InterpretChildren
            && let Some(body) = &node.body
        {
            let source = template.source().get(body.start..body.end).ok_or_else(|| {
                CompileError::CannotCompile {
                    node: format!("<{}>", node.tag),
                    reason: format!("body {}..{} is outside the source", body.start, body.end),
                }
            })?;
            CompiledChildren::Interpreted(InterpretedFragment {
                source: source.to_string(),
                namespaces: body.namespaces.clone(),
                escaping: body.escaping,
            })
        } else {
            let tree = template.tree();
            let mut children = Vec::with_capacity(node.children.len());
            for child in &node.children {
                children.push(CompiledChild {
                    kind: tree.child_kind(*child),
                    section: self.section(&[*child])?,
                });
            }
            CompiledChildren::Sections(children)
        };

        Ok(HelperCall {
            key: node.key.clone(),
            tag: node.tag.clone(),
            call_site,
            arguments,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::context::RenderingContext;
    use crate::parser::TemplateParser;
    use crate::value::Value;
    use crate::variables::{StandardVariableProvider, VariableProvider};
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> ParsedTemplate {
        let ctx = RenderingContext::default();
        let identifier = TemplateCompiler::identifier(
            "test.html",
            source,
            &NamespaceTable::with_defaults(),
            &ParserConfiguration::default(),
        );
        TemplateParser::from_context(&ctx).parse(source, &identifier).unwrap()
    }

    fn context() -> RenderingContext {
        let mut provider = StandardVariableProvider::new();
        provider.add(
            "user",
            Value::from(serde_json::json!({"name": "<Ada>", "admin": true, "age": 36})),
        );
        provider.add("items", Value::from(serde_json::json!(["x", "y"])));
        RenderingContext::new(provider)
    }

    #[test]
    fn test_identifier_is_stable() {
        let namespaces = NamespaceTable::with_defaults();
        let config = ParserConfiguration::default();
        let a = TemplateCompiler::identifier("Pages/index.html", "<p>{a}</p>", &namespaces, &config);
        let b = TemplateCompiler::identifier("Pages/index.html", "<p>{a}</p>", &namespaces, &config);
        let c = TemplateCompiler::identifier("Pages/index.html", "<p>{b}</p>", &namespaces, &config);
        let mut other = namespaces.clone();
        other.bind("x", "acme::helpers");
        let d = TemplateCompiler::identifier("Pages/index.html", "<p>{a}</p>", &other, &config);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert!(a.starts_with("Pages_index_html_"));
        assert_eq!(a.len(), "Pages_index_html_".len() + 64);
    }

    #[test]
    fn test_compiled_output_matches_interpreted() {
        let source = "<h1>{user.name}</h1>\
            <f:if condition=\"{user.admin}\"><f:then>admin</f:then><f:else>user</f:else></f:if>\
            <f:for each=\"{items}\" as=\"item\" iteration=\"i\">{i.cycle}:{item}</f:for>\
            {user.age + 4} {user.age as string} {user.admin ? 'yes' : 'no'}\
            <f:format.raw>{user.name}</f:format.raw>";
        let mut template = parse(source);
        let interpreted = template.render(&mut context()).unwrap();

        let compiler = TemplateCompiler::new();
        let unit = compiler.compile(&mut template).unwrap();
        assert!(template.was_compiled());
        let compiled = unit.render(&mut context()).unwrap();

        assert_eq!(compiled, interpreted);
        assert_eq!(
            compiled,
            "<h1>&lt;Ada&gt;</h1>admin1:x2:y40 36 yes<Ada>"
        );
    }

    #[test]
    fn test_uncompilable_template() {
        let mut template = parse("a<f:cache.disable/>b");
        let compiler = TemplateCompiler::new();
        let result = compiler.compile(&mut template);
        assert!(matches!(result, Err(CompileError::CannotCompile { .. })));
        match template.compile_state() {
            CompileState::CompileFailed { reason, mitigations } => {
                assert!(reason.contains("f:cache.disable"));
                assert!(!mitigations.is_empty());
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert!(!template.was_compiled());
    }

    #[test]
    fn test_interpreted_children_are_kept_as_source() {
        let mut template = parse("a<f:comment>{hidden}</f:comment>b");
        let unit = TemplateCompiler::new().compile(&mut template).unwrap();
        let fragment = unit.sections().iter().flatten().find_map(|instr| match instr {
            Instr::Helper(HelperCall {
                children: CompiledChildren::Interpreted(fragment),
                ..
            }) => Some(fragment.source.clone()),
            _ => None,
        });
        assert_eq!(fragment.as_deref(), Some("{hidden}"));
        assert_eq!(unit.render(&mut context()).unwrap(), "ab");
    }

    #[test]
    fn test_store_and_load() {
        let mut template = parse("<p>{user.name}</p>");
        let identifier = template.identifier().to_string();
        let cache = MemoryCache::new();
        let compiler = TemplateCompiler::new();
        compiler.compile_and_store(&mut template, &cache).unwrap();
        assert!(compiler.has(&identifier));
        assert!(cache.contains(&identifier));

        // A fresh compiler finds the unit in the cache.
        let fresh = TemplateCompiler::new();
        let unit = fresh.load(&identifier, &cache).unwrap().unwrap();
        assert_eq!(unit.render(&mut context()).unwrap(), "<p>&lt;Ada&gt;</p>");
        assert!(fresh.has(&identifier));

        fresh.flush(Some(&identifier), &cache).unwrap();
        assert!(!fresh.has(&identifier));
        assert!(!cache.contains(&identifier));
    }

    #[test]
    fn test_outdated_unit_is_flushed() {
        let mut template = parse("x");
        let identifier = template.identifier().to_string();
        let unit = TemplateCompiler::new().compile(&mut template).unwrap();
        let mut stale = (*unit).clone();
        stale.version = FORMAT_VERSION + 1;

        let cache = MemoryCache::new();
        cache.set(&identifier, &stale.to_json().unwrap()).unwrap();
        assert!(TemplateCompiler::new().load(&identifier, &cache).unwrap().is_none());
        assert!(!cache.contains(&identifier));

        cache.set(&identifier, "not json").unwrap();
        assert!(TemplateCompiler::new().load(&identifier, &cache).unwrap().is_none());
        assert!(cache.is_empty());
    }
}
