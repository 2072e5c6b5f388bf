/*
 * expression/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Expressions inside `{...}`.
//!
//! Beyond plain variable paths and inline ViewHelper calls, brace content can
//! hold a small expression language: casts, arithmetic, ternaries and boolean
//! logic. Each form is provided by an [`ExpressionRecognizer`]; the parser asks
//! the registered recognizers in order and the first that matches builds the
//! expression.
//!
//! Expressions reference their operands through [`Operand`], which is generic
//! over the reference type: syntax trees use [`NodeId`], compiled templates use
//! section ids. Evaluation goes through a resolver callback so the same
//! expression code serves both rendering modes.

pub mod boolean;
mod cast;
mod math;
pub(crate) mod scan;
mod ternary;

pub use boolean::{BareWords, BooleanExpression, BooleanOperator, BooleanToken};
pub use cast::{CastExpression, CastRecognizer, CastType};
pub use math::{MathExpression, MathOperator, MathRecognizer};
pub use ternary::{Ternary, TernaryRecognizer};

use crate::ast::NodeId;
use crate::context::RenderingContext;
use crate::error::TemplateResult;
use crate::value::{Scalar, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An expression operand: a literal, or a reference to something that
/// evaluates to a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand<R> {
    Literal(Scalar),
    Ref(R),
}

impl<R> Operand<R> {
    pub fn map_ref<S, E>(&self, f: &mut impl FnMut(&R) -> Result<S, E>) -> Result<Operand<S>, E> {
        Ok(match self {
            Operand::Literal(scalar) => Operand::Literal(scalar.clone()),
            Operand::Ref(r) => Operand::Ref(f(r)?),
        })
    }

    pub fn reference(&self) -> Option<&R> {
        match self {
            Operand::Ref(r) => Some(r),
            Operand::Literal(_) => None,
        }
    }
}

/// Callback that turns an operand into a value.
pub type Resolve<'r, R> = dyn FnMut(&Operand<R>) -> TemplateResult<Value> + 'r;

/// Extension point for expressions that need direct access to the rendering
/// context. Templates containing one cannot be compiled.
pub trait CustomExpression: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, ctx: &mut RenderingContext) -> TemplateResult<Value>;
}

/// An expression node's payload.
#[derive(Debug, Clone)]
pub enum Expression {
    Ternary(Ternary<NodeId>),
    Math(MathExpression<NodeId>),
    Cast(CastExpression<NodeId>),
    Custom(Arc<dyn CustomExpression>),
}

impl Expression {
    pub fn name(&self) -> &str {
        match self {
            Expression::Ternary(_) => "ternary",
            Expression::Math(_) => "math",
            Expression::Cast(_) => "cast",
            Expression::Custom(custom) => custom.name(),
        }
    }

    /// Nodes referenced by the operands, in evaluation order.
    pub fn operand_refs(&self) -> Vec<NodeId> {
        match self {
            Expression::Ternary(ternary) => ternary.operand_refs().copied().collect(),
            Expression::Math(math) => math.operands().filter_map(Operand::reference).copied().collect(),
            Expression::Cast(cast) => cast.operand.reference().into_iter().copied().collect(),
            Expression::Custom(_) => Vec::new(),
        }
    }
}

/// Allocates operand nodes while a recognizer builds an expression.
pub trait OperandBuilder {
    /// A variable path operand.
    fn path(&mut self, path: &str) -> TemplateResult<NodeId>;

    /// A `{...}` operand; `content` is the text between the braces.
    fn nested(&mut self, content: &str) -> TemplateResult<NodeId>;
}

/// Recognizes one expression form.
pub trait ExpressionRecognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap syntactic check on the brace content.
    fn matches(&self, content: &str) -> bool;

    fn build(&self, content: &str, builder: &mut dyn OperandBuilder) -> TemplateResult<Expression>;
}

/// Cast, math, ternary.
pub fn default_recognizers() -> Vec<Arc<dyn ExpressionRecognizer>> {
    vec![
        Arc::new(CastRecognizer),
        Arc::new(MathRecognizer),
        Arc::new(TernaryRecognizer),
    ]
}

/// An operand classified from text, before any node is allocated.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOperand<'s> {
    Literal(Scalar),
    Braced(&'s str),
    Path(&'s str),
}

impl RawOperand<'_> {
    pub fn build(self, builder: &mut dyn OperandBuilder) -> TemplateResult<Operand<NodeId>> {
        Ok(match self {
            RawOperand::Literal(scalar) => Operand::Literal(scalar),
            RawOperand::Braced(content) => Operand::Ref(builder.nested(content)?),
            RawOperand::Path(path) => Operand::Ref(builder.path(path)?),
        })
    }
}

/// Classify a single operand: a quoted string, number, `true`/`false`/`null`,
/// a `{...}` group or a variable path.
pub fn classify_operand(text: &str) -> Option<RawOperand<'_>> {
    let text = text.trim();
    if let Some(content) = scan::unquote(text) {
        return Some(RawOperand::Literal(Scalar::String(content)));
    }
    if let Some(scalar) = Scalar::parse_keyword_or_number(text) {
        return Some(RawOperand::Literal(scalar));
    }
    if let Some(content) = scan::unbrace(text) {
        return Some(RawOperand::Braced(content));
    }
    is_valid_path(text).then_some(RawOperand::Path(text))
}

/// Whether `path` is a dotted variable path, possibly with `{...}` segments.
pub fn is_valid_path(path: &str) -> bool {
    if path.is_empty() || path.starts_with(['.', '-']) || path.ends_with('.') {
        return false;
    }
    let mut depth = 0usize;
    let mut previous = '.';
    for ch in path.chars() {
        match ch {
            '{' => depth += 1,
            '}' => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            '.' if depth == 0 && previous == '.' => return false,
            c if depth == 0 && !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.')) => {
                return false;
            }
            _ => {}
        }
        previous = ch;
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert!(is_valid_path("user"));
        assert!(is_valid_path("user.name"));
        assert!(is_valid_path("items.0.title"));
        assert!(is_valid_path("user.{field}"));
        assert!(is_valid_path("data-set.x_y"));
        assert!(is_valid_path("_all"));
    }

    #[test]
    fn test_invalid_paths() {
        assert!(!is_valid_path(""));
        assert!(!is_valid_path("a..b"));
        assert!(!is_valid_path(".a"));
        assert!(!is_valid_path("a."));
        assert!(!is_valid_path("a b"));
        assert!(!is_valid_path("a ? b : c"));
        assert!(!is_valid_path("a.{b"));
        assert!(!is_valid_path("f:x()"));
    }

    #[test]
    fn test_classify_operand() {
        assert_eq!(
            classify_operand(" 'it' "),
            Some(RawOperand::Literal(Scalar::String("it".to_string())))
        );
        assert_eq!(classify_operand("3"), Some(RawOperand::Literal(Scalar::Int(3))));
        assert_eq!(classify_operand("null"), Some(RawOperand::Literal(Scalar::Null)));
        assert_eq!(classify_operand("{a}"), Some(RawOperand::Braced("a")));
        assert_eq!(classify_operand("a.b"), Some(RawOperand::Path("a.b")));
        assert_eq!(classify_operand("a b"), None);
    }
}
