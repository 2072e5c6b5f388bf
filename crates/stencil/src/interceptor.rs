/*
 * interceptor.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Parse-time node interceptors.
//!
//! The parser hands every node it creates or closes to the interceptor
//! chain, which may return a replacement node (usually a wrapper). The
//! built-in [`EscapeInterceptor`] is how auto-escaping works: output nodes are
//! wrapped in [`Node::Escaping`] unless an enclosing helper turned escaping off
//! for its children.

use crate::ast::{Node, NodeId};
use crate::parser::ParsingState;
use std::sync::Arc;

/// Where in the parse an interceptor is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterceptionPoint {
    OpeningViewHelper,
    ClosingViewHelper,
    SelfClosingViewHelper,
    ObjectAccessor,
    Expression,
    Text,
}

pub trait Interceptor: Send + Sync {
    /// Points this interceptor wants to see.
    fn points(&self) -> &[InterceptionPoint];

    /// Process `node` and return the node to use in its place.
    fn process(&self, node: NodeId, point: InterceptionPoint, state: &mut ParsingState) -> NodeId;
}

/// Interceptors in registration order.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Whether any interceptor listens at `point`.
    pub fn handles(&self, point: InterceptionPoint) -> bool {
        self.interceptors
            .iter()
            .any(|interceptor| interceptor.points().contains(&point))
    }

    /// Run every interceptor registered for `point`, feeding each the node
    /// returned by the previous one.
    pub fn process(&self, node: NodeId, point: InterceptionPoint, state: &mut ParsingState) -> NodeId {
        self.interceptors
            .iter()
            .filter(|interceptor| interceptor.points().contains(&point))
            .fold(node, |node, interceptor| interceptor.process(node, point, state))
    }
}

/// Automatic HTML escaping.
#[derive(Debug, Default)]
pub struct EscapeInterceptor;

const ESCAPE_POINTS: &[InterceptionPoint] = &[
    InterceptionPoint::OpeningViewHelper,
    InterceptionPoint::ClosingViewHelper,
    InterceptionPoint::SelfClosingViewHelper,
    InterceptionPoint::ObjectAccessor,
    InterceptionPoint::Expression,
];

impl EscapeInterceptor {
    fn helper_flags(state: &ParsingState, node: NodeId) -> Option<(bool, bool)> {
        match state.tree().get(node) {
            Node::ViewHelper(helper) => Some((
                helper.helper.escape_children(),
                helper.helper.escape_output(),
            )),
            _ => None,
        }
    }

    fn open(node: NodeId, state: &mut ParsingState) {
        if let Some((false, _)) = Self::helper_flags(state, node) {
            state.escaping_mut().disable_for(node);
        }
    }

    fn close(node: NodeId, state: &mut ParsingState) -> NodeId {
        state.escaping_mut().restore(node);
        match Self::helper_flags(state, node) {
            Some((_, true)) if state.escaping().is_active() => state.wrap_escaping(node),
            _ => node,
        }
    }
}

impl Interceptor for EscapeInterceptor {
    fn points(&self) -> &[InterceptionPoint] {
        ESCAPE_POINTS
    }

    fn process(&self, node: NodeId, point: InterceptionPoint, state: &mut ParsingState) -> NodeId {
        match point {
            InterceptionPoint::OpeningViewHelper => {
                Self::open(node, state);
                node
            }
            InterceptionPoint::ClosingViewHelper => Self::close(node, state),
            InterceptionPoint::SelfClosingViewHelper => {
                Self::open(node, state);
                Self::close(node, state)
            }
            InterceptionPoint::ObjectAccessor | InterceptionPoint::Expression => {
                if state.escaping().is_active() && state.tree().get(node).is_escaping_enabled() {
                    state.wrap_escaping(node)
                } else {
                    node
                }
            }
            InterceptionPoint::Text => node,
        }
    }
}
