/*
 * parser/state.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Mutable state of one parse.

use crate::ast::{CompileState, Node, NodeId, ParsedTemplate, SyntaxTree};
use crate::error::{ParseError, TemplateResult};
use crate::namespace::NamespaceTable;
use crate::source::{LineIndex, SourceLocation};
use std::sync::Arc;

/// Escaping scopes opened by helpers that do not escape their children.
#[derive(Debug, Clone, Default)]
pub struct EscapingState {
    enabled: bool,
    disabled_by: Vec<NodeId>,
}

impl EscapingState {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            disabled_by: Vec::new(),
        }
    }

    /// Whether escaping is on for the template at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether output created now gets escaped.
    pub fn is_active(&self) -> bool {
        self.enabled && self.disabled_by.is_empty()
    }

    pub fn disable_for(&mut self, node: NodeId) {
        self.disabled_by.push(node);
    }

    /// Close the scope opened by `node`, if it is the innermost one.
    pub fn restore(&mut self, node: NodeId) {
        if self.disabled_by.last() == Some(&node) {
            self.disabled_by.pop();
        }
    }
}

/// Everything a parse accumulates. Interceptors and helpers with parse-time
/// hooks receive it mutably.
#[derive(Debug)]
pub struct ParsingState {
    identifier: String,
    source: Arc<str>,
    lines: LineIndex,
    tree: SyntaxTree,
    root: NodeId,
    stack: Vec<NodeId>,
    namespaces: NamespaceTable,
    escaping: EscapingState,
    layout_name: Option<String>,
    uncompilable: Option<String>,
}

impl ParsingState {
    pub fn new(
        identifier: impl Into<String>,
        source: Arc<str>,
        namespaces: NamespaceTable,
        escaping: bool,
    ) -> Self {
        let mut tree = SyntaxTree::new();
        let root = tree.alloc(Node::Root {
            children: Vec::new(),
        });
        Self {
            identifier: identifier.into(),
            lines: LineIndex::new(&source),
            source,
            tree,
            root,
            stack: vec![root],
            namespaces,
            escaping: EscapingState::new(escaping),
            layout_name: None,
            uncompilable: None,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tree(&self) -> &SyntaxTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut SyntaxTree {
        &mut self.tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn namespaces(&self) -> &NamespaceTable {
        &self.namespaces
    }

    pub fn namespaces_mut(&mut self) -> &mut NamespaceTable {
        &mut self.namespaces
    }

    pub fn escaping(&self) -> &EscapingState {
        &self.escaping
    }

    pub fn escaping_mut(&mut self) -> &mut EscapingState {
        &mut self.escaping
    }

    pub fn layout_name(&self) -> Option<&str> {
        self.layout_name.as_deref()
    }

    pub fn set_layout_name(&mut self, name: impl Into<String>) {
        self.layout_name = Some(name.into());
    }

    /// Record that the template cannot be compiled. The first reason wins.
    pub fn mark_uncompilable(&mut self, reason: impl Into<String>) {
        if self.uncompilable.is_none() {
            self.uncompilable = Some(reason.into());
        }
    }

    pub fn is_compilable(&self) -> bool {
        self.uncompilable.is_none()
    }

    pub fn locate(&self, offset: usize) -> SourceLocation {
        self.lines.locate(&self.source, offset)
    }

    /// The node new children are appended to.
    pub fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or(self.root)
    }

    /// Number of open nodes, the root included.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn push(&mut self, node: NodeId) {
        self.stack.push(node);
    }

    /// Close the innermost open node. The template root is never popped.
    pub fn pop(&mut self) -> Option<NodeId> {
        if self.stack.len() > 1 {
            self.stack.pop()
        } else {
            None
        }
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        self.tree.alloc(node)
    }

    pub fn alloc_adopting(&mut self, node: Node) -> NodeId {
        self.tree.alloc_adopting(node)
    }

    /// Append `node` to the current node.
    pub fn append(&mut self, node: NodeId) {
        let parent = self.current();
        self.tree.append_child(parent, node);
    }

    /// Append text to the current node, extending the last child if it is
    /// text. Returns the node that was created, if any.
    pub fn append_text(&mut self, text: &str) -> Option<NodeId> {
        if text.is_empty() {
            return None;
        }
        let parent = self.current();
        if let Some(last) = self.tree.last_child(parent)
            && let Node::Text { text: existing } = self.tree.get_mut(last)
        {
            existing.push_str(text);
            return None;
        }
        let node = self.tree.alloc(Node::Text {
            text: text.to_string(),
        });
        self.tree.append_child(parent, node);
        Some(node)
    }

    /// Whether the last child of the current node is text.
    pub fn ends_with_text(&self) -> bool {
        self.tree
            .last_child(self.current())
            .is_some_and(|last| matches!(self.tree.get(last), Node::Text { .. }))
    }

    pub fn wrap_escaping(&mut self, node: NodeId) -> NodeId {
        self.tree.wrap_escaping(node)
    }

    /// Finish the parse. Fails with [`ParseError::UnclosedTag`] naming the
    /// innermost tag that is still open.
    pub fn finish(self) -> TemplateResult<ParsedTemplate> {
        if self.stack.len() > 1
            && let Some(&open) = self.stack.last()
        {
            let (tag, location) = match self.tree.get(open) {
                Node::ViewHelper(helper) => (helper.tag.clone(), helper.location),
                other => (other.kind_name().to_string(), SourceLocation::default()),
            };
            return Err(ParseError::UnclosedTag { tag, location }.into());
        }
        tracing::debug!(
            identifier = %self.identifier,
            nodes = self.tree.len(),
            compilable = self.uncompilable.is_none(),
            "Parsed template"
        );
        Ok(ParsedTemplate {
            identifier: self.identifier,
            tree: self.tree,
            root: self.root,
            source: self.source,
            namespaces: self.namespaces,
            layout_name: self.layout_name,
            uncompilable: self.uncompilable,
            state: CompileState::Parsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(source: &str) -> ParsingState {
        ParsingState::new("test", Arc::from(source), NamespaceTable::with_defaults(), true)
    }

    #[test]
    fn test_append_text_merges() {
        let mut state = state("ab");
        assert!(state.append_text("a").is_some());
        assert!(state.append_text("b").is_none());
        assert!(state.append_text("").is_none());
        let template = state.finish().unwrap();
        let children = template.tree().get(template.root()).child_ids();
        assert_eq!(children.len(), 1);
        match template.tree().get(children[0]) {
            Node::Text { text } => assert_eq!(text, "ab"),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_root_is_never_popped() {
        let mut state = state("");
        assert_eq!(state.pop(), None);
        assert_eq!(state.depth(), 1);
        assert_eq!(state.current(), state.root());
    }

    #[test]
    fn test_escaping_scopes() {
        let mut escaping = EscapingState::new(true);
        assert!(escaping.is_active());
        escaping.disable_for(NodeId::from_index(1));
        escaping.disable_for(NodeId::from_index(2));
        escaping.restore(NodeId::from_index(1));
        assert!(!escaping.is_active());
        escaping.restore(NodeId::from_index(2));
        escaping.restore(NodeId::from_index(1));
        assert!(escaping.is_active());
        escaping.set_enabled(false);
        assert!(!escaping.is_active());
    }

    #[test]
    fn test_first_uncompilable_reason_wins() {
        let mut state = state("");
        state.mark_uncompilable("first");
        state.mark_uncompilable("second");
        let template = state.finish().unwrap();
        assert_eq!(template.uncompilable_reason(), Some("first"));
    }

    #[test]
    fn test_locate() {
        let state = state("a\nbc");
        let location = state.locate(3);
        assert_eq!((location.line, location.column), (2, 2));
    }
}
