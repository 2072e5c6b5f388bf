/*
 * compiler/warmup.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Cache warm-up: compile every template ahead of the first render.

use super::TemplateCompiler;
use crate::ast::CompileState;
use crate::cache::TemplateCache;
use crate::error::CompileError;
use crate::namespace::NamespaceTable;
use crate::parser::TemplateParser;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Template,
    Layout,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    pub path: String,
    pub kind: TemplateKind,
}

impl TemplateEntry {
    pub fn new(path: impl Into<String>, kind: TemplateKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// File name without directory and extension.
    pub fn name(&self) -> &str {
        let file = self.path.rsplit('/').next().unwrap_or(&self.path);
        file.split_once('.').map_or(file, |(stem, _)| stem)
    }
}

/// Source of the templates to warm up.
pub trait TemplateLocator {
    /// Every template, layout and partial, in a stable order.
    fn list(&self) -> Vec<TemplateEntry>;

    fn load(&self, path: &str) -> Result<String, CompileError>;

    /// The layout selected by `<f:layout name="...">`.
    fn layout(&self, name: &str) -> Option<TemplateEntry> {
        self.list()
            .into_iter()
            .find(|entry| entry.kind == TemplateKind::Layout && entry.name() == name)
    }
}

/// Templates held in memory, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryTemplateLocator {
    entries: Vec<TemplateEntry>,
    sources: HashMap<String, String>,
}

impl MemoryTemplateLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: &str, kind: TemplateKind, source: &str) -> &mut Self {
        if !self.sources.contains_key(path) {
            self.entries.push(TemplateEntry::new(path, kind));
        }
        self.sources.insert(path.to_string(), source.to_string());
        self
    }
}

impl TemplateLocator for MemoryTemplateLocator {
    fn list(&self) -> Vec<TemplateEntry> {
        self.entries.clone()
    }

    fn load(&self, path: &str) -> Result<String, CompileError> {
        self.sources.get(path).cloned().ok_or_else(|| CompileError::Load {
            path: path.to_string(),
            message: "no such template".to_string(),
        })
    }
}

/// Templates under a root directory laid out as `Templates/`, `Layouts/` and
/// `Partials/`. Paths are relative to the root with `/` separators.
#[derive(Debug, Clone)]
pub struct FileSystemTemplateLocator {
    root: PathBuf,
    extension: String,
}

const DIRECTORIES: [(&str, TemplateKind); 3] = [
    ("Templates", TemplateKind::Template),
    ("Layouts", TemplateKind::Layout),
    ("Partials", TemplateKind::Partial),
];

impl FileSystemTemplateLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "html".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

impl TemplateLocator for FileSystemTemplateLocator {
    fn list(&self) -> Vec<TemplateEntry> {
        let mut entries = Vec::new();
        for (directory, kind) in DIRECTORIES {
            let mut found: Vec<String> = WalkDir::new(self.root.join(directory))
                .follow_links(false)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .filter(|entry| {
                    entry
                        .path()
                        .extension()
                        .is_some_and(|ext| ext == self.extension.as_str())
                })
                .filter_map(|entry| self.relative(entry.path()))
                .collect();
            found.sort();
            entries.extend(found.into_iter().map(|path| TemplateEntry::new(path, kind)));
        }
        entries
    }

    fn load(&self, path: &str) -> Result<String, CompileError> {
        std::fs::read_to_string(self.root.join(path)).map_err(|error| CompileError::Load {
            path: path.to_string(),
            message: error.to_string(),
        })
    }

    fn layout(&self, name: &str) -> Option<TemplateEntry> {
        let path = format!("Layouts/{name}.{}", self.extension);
        self.root
            .join(&path)
            .is_file()
            .then(|| TemplateEntry::new(path, TemplateKind::Layout))
    }
}

/// Warm-up outcome for one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilationResult {
    pub kind: TemplateKind,
    /// Whether the template can be compiled.
    pub compilable: bool,
    /// Whether a compiled unit already existed before warm-up.
    pub compiled: bool,
    pub has_layout: bool,
    pub compiled_identifier: Option<String>,
    pub failure_reason: Option<String>,
    pub mitigations: Vec<String>,
}

impl CompilationResult {
    fn failed(kind: TemplateKind, reason: String, mitigations: Vec<String>) -> Self {
        Self {
            kind,
            compilable: false,
            compiled: false,
            has_layout: false,
            compiled_identifier: None,
            failure_reason: Some(reason),
            mitigations,
        }
    }
}

/// Warm-up outcomes keyed by template path, in the order they were visited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmupResult {
    templates: IndexMap<String, CompilationResult>,
}

impl WarmupResult {
    pub fn get(&self, path: &str) -> Option<&CompilationResult> {
        self.templates.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CompilationResult)> {
        self.templates.iter().map(|(path, result)| (path.as_str(), result))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Paths of the templates that could not be compiled.
    pub fn failures(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, result)| result.failure_reason.is_some())
            .map(|(path, _)| path)
            .collect()
    }
}

impl TemplateCompiler {
    /// Parse with `parser` and compile everything `locator` lists without
    /// rendering it, storing the units in `cache`. Layouts named by the
    /// templates are visited too. Templates that fail to load, parse or
    /// compile are recorded in the result; only cache failures abort.
    pub fn warmup(
        &self,
        locator: &dyn TemplateLocator,
        parser: &TemplateParser,
        cache: &dyn TemplateCache,
    ) -> Result<WarmupResult, CompileError> {
        let namespaces = parser.namespaces();
        let mut result = WarmupResult::default();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<TemplateEntry> = locator.list().into();

        while let Some(entry) = queue.pop_front() {
            if !seen.insert(entry.path.clone()) {
                continue;
            }
            let (outcome, layout) = self.warmup_one(parser, locator, &entry, cache, &namespaces)?;
            tracing::debug!(
                path = %entry.path,
                compilable = outcome.compilable,
                compiled = outcome.compiled,
                "Warmed up template"
            );
            if let Some(name) = layout {
                match locator.layout(&name) {
                    Some(layout) => queue.push_back(layout),
                    None => tracing::warn!(path = %entry.path, layout = %name, "Layout not found"),
                }
            }
            result.templates.insert(entry.path, outcome);
        }
        Ok(result)
    }

    fn warmup_one(
        &self,
        parser: &TemplateParser,
        locator: &dyn TemplateLocator,
        entry: &TemplateEntry,
        cache: &dyn TemplateCache,
        namespaces: &NamespaceTable,
    ) -> Result<(CompilationResult, Option<String>), CompileError> {
        let source = match locator.load(&entry.path) {
            Ok(source) => source,
            Err(error) => {
                let outcome = CompilationResult::failed(
                    entry.kind,
                    error.to_string(),
                    vec!["Check that the template exists and is readable".to_string()],
                );
                return Ok((outcome, None));
            }
        };
        let identifier = Self::identifier(&entry.path, &source, namespaces, parser.configuration());

        if let Some(unit) = self.load(&identifier, cache)? {
            let layout = unit.layout_name().map(str::to_string);
            let outcome = CompilationResult {
                kind: entry.kind,
                compilable: true,
                compiled: true,
                has_layout: layout.is_some(),
                compiled_identifier: Some(identifier),
                failure_reason: None,
                mitigations: Vec::new(),
            };
            return Ok((outcome, layout));
        }

        let mut template = match parser.parse(&source, &identifier) {
            Ok(template) => template,
            Err(error) => {
                let outcome = CompilationResult::failed(
                    entry.kind,
                    error.to_string(),
                    vec!["Fix the template so that it parses".to_string()],
                );
                return Ok((outcome, None));
            }
        };
        let layout = template.layout_name().map(str::to_string);
        let has_layout = layout.is_some();

        match self.compile_and_store(&mut template, cache) {
            Ok(unit) => {
                let outcome = CompilationResult {
                    kind: entry.kind,
                    compilable: true,
                    compiled: false,
                    has_layout,
                    compiled_identifier: Some(unit.identifier().to_string()),
                    failure_reason: None,
                    mitigations: Vec::new(),
                };
                Ok((outcome, layout))
            }
            Err(CompileError::Cache(error)) => Err(CompileError::Cache(error)),
            Err(error) => {
                let (reason, mitigations) = match template.compile_state() {
                    CompileState::CompileFailed {
                        reason,
                        mitigations,
                    } => (reason.clone(), mitigations.clone()),
                    _ => (error.to_string(), Vec::new()),
                };
                let mut outcome = CompilationResult::failed(entry.kind, reason, mitigations);
                outcome.has_layout = has_layout;
                Ok((outcome, layout))
            }
        }
    }
}
