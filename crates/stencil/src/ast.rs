/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Syntax tree types.
//!
//! Nodes live in a per-parse arena ([`SyntaxTree`]) and refer to each other by
//! [`NodeId`]. The template root and every ViewHelper argument sub-tree are
//! [`Node::Root`] nodes; they are the only nodes without a parent.

use crate::arguments::ArgumentCollection;
use crate::expression::{BooleanExpression, Expression, Operand};
use crate::helper::{ChildKind, HelperKey, ViewHelper};
use crate::namespace::NamespaceTable;
use crate::source::SourceLocation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Index of a node in its [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn from_index(index: usize) -> Self {
        NodeId(u32::try_from(index).unwrap_or(u32::MAX))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node in the syntax tree.
#[derive(Debug, Clone)]
pub enum Node {
    /// Ordered children; never has a parent.
    Root { children: Vec<NodeId> },

    /// Literal text.
    Text { text: String },

    /// A variable path such as `user.name` or `user.{field}`.
    ObjectAccessor {
        path: String,
        location: SourceLocation,
    },

    /// An array literal `{key: value, ...}`.
    Array {
        entries: Vec<(String, Operand<NodeId>)>,
    },

    /// A boolean expression, used for `Boolean` arguments.
    Boolean { expression: BooleanExpression<NodeId> },

    ViewHelper(ViewHelperNode),

    /// HTML-escapes the output of its only child.
    Escaping { child: NodeId },

    /// A recognized expression (`{a ? b : c}`, `{a + 1}`, `{a as int}`, ...).
    Expression {
        expression: Expression,
        source: String,
    },
}

impl Node {
    /// Child nodes in evaluation order. Argument sub-trees are not children.
    pub fn child_ids(&self) -> Vec<NodeId> {
        match self {
            Node::Root { children } => children.clone(),
            Node::ViewHelper(helper) => helper.children.clone(),
            Node::Text { .. } | Node::ObjectAccessor { .. } => Vec::new(),
            Node::Array { entries } => entries
                .iter()
                .filter_map(|(_, operand)| operand.reference().copied())
                .collect(),
            Node::Boolean { expression } => expression.operand_refs().copied().collect(),
            Node::Escaping { child } => vec![*child],
            Node::Expression { expression, .. } => expression.operand_refs(),
        }
    }

    /// Whether the output of this node is escaped when escaping is active.
    pub fn is_escaping_enabled(&self) -> bool {
        match self {
            Node::ViewHelper(helper) => helper.helper.escape_output(),
            Node::ObjectAccessor { .. } | Node::Expression { .. } => true,
            Node::Root { .. }
            | Node::Text { .. }
            | Node::Array { .. }
            | Node::Boolean { .. }
            | Node::Escaping { .. } => false,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Root { .. } => "root",
            Node::Text { .. } => "text",
            Node::ObjectAccessor { .. } => "object accessor",
            Node::Array { .. } => "array",
            Node::Boolean { .. } => "boolean",
            Node::ViewHelper(_) => "ViewHelper",
            Node::Escaping { .. } => "escaping",
            Node::Expression { .. } => "expression",
        }
    }
}

/// Children of a helper kept as source, to be parsed when rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyFragment {
    /// Byte range of the body in the template source.
    pub start: usize,
    pub end: usize,
    /// Namespace bindings in effect at the opening tag.
    pub namespaces: NamespaceTable,
    /// Whether escaping was active inside the body.
    pub escaping: bool,
}

/// One occurrence of a ViewHelper.
#[derive(Clone)]
pub struct ViewHelperNode {
    /// Qualified tag name as written (`f:if`).
    pub tag: String,
    pub key: HelperKey,
    pub helper: Arc<dyn ViewHelper>,
    pub arguments: ArgumentCollection,
    pub children: Vec<NodeId>,
    /// Set for helpers whose children are interpreted even in compiled
    /// templates.
    pub body: Option<BodyFragment>,
    pub location: SourceLocation,
}

impl fmt::Debug for ViewHelperNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewHelperNode")
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("arguments", &self.arguments)
            .field("children", &self.children)
            .field("body", &self.body)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Arena of nodes for one parse.
#[derive(Debug, Clone, Default)]
pub struct SyntaxTree {
    nodes: Vec<Node>,
    parents: Vec<Option<NodeId>>,
}

impl SyntaxTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node without touching any parent links.
    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(node);
        self.parents.push(None);
        id
    }

    /// Add a node and make it the parent of the nodes it refers to.
    pub fn alloc_adopting(&mut self, node: Node) -> NodeId {
        let children = node.child_ids();
        let id = self.alloc(node);
        for child in children {
            self.adopt(id, child);
        }
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(id.index()).copied().flatten()
    }

    pub fn adopt(&mut self, parent: NodeId, child: NodeId) {
        if let Some(slot) = self.parents.get_mut(child.index()) {
            *slot = Some(parent);
        }
    }

    /// Append `child` to the child list of a `Root` or `ViewHelper` node.
    /// Other nodes do not take children and are left unchanged.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let appended = match self.get_mut(parent) {
            Node::Root { children } => {
                children.push(child);
                true
            }
            Node::ViewHelper(helper) => {
                helper.children.push(child);
                true
            }
            _ => false,
        };
        if appended {
            self.adopt(parent, child);
        }
    }

    /// The last child of a `Root` or `ViewHelper` node.
    pub fn last_child(&self, parent: NodeId) -> Option<NodeId> {
        match self.get(parent) {
            Node::Root { children } => children.last().copied(),
            Node::ViewHelper(helper) => helper.children.last().copied(),
            _ => None,
        }
    }

    /// Wrap `child` in a new `Escaping` node.
    pub fn wrap_escaping(&mut self, child: NodeId) -> NodeId {
        self.alloc_adopting(Node::Escaping { child })
    }

    /// Wrap each child of the `Root` node `root` whose output is escapable.
    /// Text children are left as they are.
    pub fn escape_children(&mut self, root: NodeId) {
        let children = match self.get(root) {
            Node::Root { children } => children.clone(),
            _ => return,
        };
        let mut wrapped = Vec::with_capacity(children.len());
        for child in children {
            if self.get(child).is_escaping_enabled() {
                wrapped.push(self.wrap_escaping(child));
            } else {
                wrapped.push(child);
            }
        }
        for child in &wrapped {
            self.adopt(root, *child);
        }
        if let Node::Root { children } = self.get_mut(root) {
            *children = wrapped;
        }
    }

    /// How `id` appears in a helper's child list. Escaping wrappers are
    /// transparent.
    pub fn child_kind(&self, id: NodeId) -> ChildKind {
        match self.get(id) {
            Node::Text { .. } => ChildKind::Text,
            Node::Escaping { child } => self.child_kind(*child),
            Node::ViewHelper(helper) => ChildKind::ViewHelper(helper.key.clone()),
            _ => ChildKind::Expression,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Where a parsed template is in the compile life cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileState {
    Parsed,
    Compiling,
    Compiled {
        identifier: String,
    },
    CompileFailed {
        reason: String,
        mitigations: Vec<String>,
    },
}

/// The immutable result of a parse.
#[derive(Debug, Clone)]
pub struct ParsedTemplate {
    pub(crate) identifier: String,
    pub(crate) tree: SyntaxTree,
    pub(crate) root: NodeId,
    pub(crate) source: Arc<str>,
    pub(crate) namespaces: NamespaceTable,
    pub(crate) layout_name: Option<String>,
    pub(crate) uncompilable: Option<String>,
    pub(crate) state: CompileState,
}

impl ParsedTemplate {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn tree(&self) -> &SyntaxTree {
        &self.tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Namespace bindings in effect at the end of the template.
    pub fn namespaces(&self) -> &NamespaceTable {
        &self.namespaces
    }

    /// Layout selected by `<f:layout name="..."/>`.
    pub fn layout_name(&self) -> Option<&str> {
        self.layout_name.as_deref()
    }

    pub fn is_compilable(&self) -> bool {
        self.uncompilable.is_none()
    }

    /// Why the template cannot be compiled.
    pub fn uncompilable_reason(&self) -> Option<&str> {
        self.uncompilable.as_deref()
    }

    pub fn compile_state(&self) -> &CompileState {
        &self.state
    }

    pub fn set_compile_state(&mut self, state: CompileState) {
        self.state = state;
    }

    pub fn was_compiled(&self) -> bool {
        matches!(self.state, CompileState::Compiled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(tree: &mut SyntaxTree, text: &str) -> NodeId {
        tree.alloc(Node::Text {
            text: text.to_string(),
        })
    }

    #[test]
    fn test_append_sets_parent() {
        let mut tree = SyntaxTree::new();
        let root = tree.alloc(Node::Root {
            children: Vec::new(),
        });
        let child = text(&mut tree, "a");
        tree.append_child(root, child);
        assert_eq!(tree.parent(child), Some(root));
        assert_eq!(tree.parent(root), None);
        assert_eq!(tree.get(root).child_ids(), vec![child]);
        assert_eq!(tree.last_child(root), Some(child));
    }

    #[test]
    fn test_text_takes_no_children() {
        let mut tree = SyntaxTree::new();
        let a = text(&mut tree, "a");
        let b = text(&mut tree, "b");
        tree.append_child(a, b);
        assert_eq!(tree.parent(b), None);
    }

    #[test]
    fn test_wrap_escaping() {
        let mut tree = SyntaxTree::new();
        let accessor = tree.alloc(Node::ObjectAccessor {
            path: "name".to_string(),
            location: SourceLocation::default(),
        });
        let wrapper = tree.wrap_escaping(accessor);
        assert_eq!(tree.parent(accessor), Some(wrapper));
        assert_eq!(tree.child_kind(wrapper), ChildKind::Expression);
        assert!(tree.get(accessor).is_escaping_enabled());
        assert!(!tree.get(wrapper).is_escaping_enabled());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_escape_children_skips_text() {
        let mut tree = SyntaxTree::new();
        let text = tree.alloc(Node::Text {
            text: "[".to_string(),
        });
        let accessor = tree.alloc(Node::ObjectAccessor {
            path: "name".to_string(),
            location: SourceLocation::default(),
        });
        let root = tree.alloc_adopting(Node::Root {
            children: vec![text, accessor],
        });
        tree.escape_children(root);

        let children = tree.get(root).child_ids();
        assert_eq!(children[0], text);
        assert_eq!(tree.get(children[1]).kind_name(), "escaping");
        assert_eq!(tree.parent(children[1]), Some(root));
        assert_eq!(tree.parent(accessor), Some(children[1]));
    }

    #[test]
    fn test_node_id_round_trip() {
        assert_eq!(NodeId::from_index(7).index(), 7);
        assert_eq!(NodeId::from_index(7).to_string(), "#7");
    }
}
