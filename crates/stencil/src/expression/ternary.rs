/*
 * expression/ternary.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `{condition ? then : else}`

use super::boolean::{BareWords, BooleanExpression};
use super::{
    Expression, ExpressionRecognizer, Operand, OperandBuilder, Resolve, classify_operand, scan,
};
use crate::error::{ExpressionError, TemplateResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A conditional expression. Only the chosen branch is evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ternary<R> {
    pub condition: BooleanExpression<R>,
    pub then_branch: Operand<R>,
    pub else_branch: Operand<R>,
}

impl<R> Ternary<R> {
    pub fn evaluate(&self, resolve: &mut Resolve<'_, R>) -> TemplateResult<Value> {
        if self.condition.evaluate(resolve)? {
            resolve(&self.then_branch)
        } else {
            resolve(&self.else_branch)
        }
    }

    pub fn operand_refs(&self) -> impl Iterator<Item = &R> {
        self.condition
            .operand_refs()
            .chain(self.then_branch.reference())
            .chain(self.else_branch.reference())
    }

    pub fn map_refs<S, E>(&self, f: &mut impl FnMut(&R) -> Result<S, E>) -> Result<Ternary<S>, E> {
        Ok(Ternary {
            condition: self.condition.map_refs(&mut *f)?,
            then_branch: self.then_branch.map_ref(&mut *f)?,
            else_branch: self.else_branch.map_ref(&mut *f)?,
        })
    }
}

/// A `:` between two word characters belongs to a namespaced name
/// (`f:format.raw`), not to the ternary.
fn is_namespace_colon(text: &str, index: usize) -> bool {
    let bytes = text.as_bytes();
    index > 0
        && bytes[index - 1].is_ascii_alphanumeric()
        && bytes.get(index + 1).is_some_and(u8::is_ascii_alphabetic)
}

/// Split at the top-level `?` and the matching `:`.
fn split(content: &str) -> Option<(&str, &str, &str)> {
    let top = scan::top_level(content);
    let question = top.iter().position(|(_, c)| *c == '?')?;
    let (question_at, _) = top[question];
    let (colon_at, _) = top[question + 1..]
        .iter()
        .find(|(i, c)| *c == ':' && !is_namespace_colon(content, *i))?;
    let parts = (
        content[..question_at].trim(),
        content[question_at + 1..*colon_at].trim(),
        content[colon_at + 1..].trim(),
    );
    (!parts.0.is_empty() && !parts.1.is_empty() && !parts.2.is_empty()).then_some(parts)
}

#[derive(Debug, Default)]
pub struct TernaryRecognizer;

impl ExpressionRecognizer for TernaryRecognizer {
    fn name(&self) -> &str {
        "ternary"
    }

    fn matches(&self, content: &str) -> bool {
        split(content).is_some()
    }

    fn build(&self, content: &str, builder: &mut dyn OperandBuilder) -> TemplateResult<Expression> {
        let (condition, then_text, else_text) = split(content)
            .ok_or_else(|| ExpressionError::syntax(content, "expected 'condition ? then : else'"))?;
        let invalid_branch = |branch: &str| {
            ExpressionError::syntax(content, format!("invalid ternary branch \"{branch}\""))
        };
        let then_raw = classify_operand(then_text).ok_or_else(|| invalid_branch(then_text))?;
        let else_raw = classify_operand(else_text).ok_or_else(|| invalid_branch(else_text))?;
        let condition = BooleanExpression::parse(condition, BareWords::Variables, builder)?;
        let then_branch = then_raw.build(builder)?;
        let else_branch = else_raw.build(builder)?;
        Ok(Expression::Ternary(Ternary {
            condition,
            then_branch,
            else_branch,
        }))
    }
}
