/*
 * expression/math.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Arithmetic: `{a + b * 2}`.
//!
//! Operators are `+ - * / % ^`, applied strictly left to right. A `-` is only
//! an operator when surrounded by whitespace, so `data-id` stays a path and
//! `-1` stays a number. Operands that are not numeric count as 0.

use super::{
    Expression, ExpressionRecognizer, Operand, OperandBuilder, RawOperand, Resolve,
    classify_operand, scan,
};
use crate::error::{ExpressionError, TemplateResult};
use crate::value::{Number, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
}

impl MathOperator {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            '+' => MathOperator::Add,
            '-' => MathOperator::Subtract,
            '*' => MathOperator::Multiply,
            '/' => MathOperator::Divide,
            '%' => MathOperator::Modulo,
            '^' => MathOperator::Power,
            _ => return None,
        })
    }

    pub fn apply(self, left: Number, right: Number, expression: &str) -> Result<Number, ExpressionError> {
        use Number::{Float, Int};
        let division_by_zero = || ExpressionError::DivisionByZero {
            expression: expression.to_string(),
        };
        let float = |f: fn(f64, f64) -> f64| Float(f(left.as_f64(), right.as_f64()));
        Ok(match (self, left, right) {
            (MathOperator::Add, Int(a), Int(b)) => a.checked_add(b).map_or(float(|a, b| a + b), Int),
            (MathOperator::Add, _, _) => float(|a, b| a + b),
            (MathOperator::Subtract, Int(a), Int(b)) => {
                a.checked_sub(b).map_or(float(|a, b| a - b), Int)
            }
            (MathOperator::Subtract, _, _) => float(|a, b| a - b),
            (MathOperator::Multiply, Int(a), Int(b)) => {
                a.checked_mul(b).map_or(float(|a, b| a * b), Int)
            }
            (MathOperator::Multiply, _, _) => float(|a, b| a * b),
            (MathOperator::Divide, _, _) if right.is_zero() => return Err(division_by_zero()),
            (MathOperator::Divide, Int(a), Int(b)) if a.checked_rem(b) == Some(0) => {
                a.checked_div(b).map_or(float(|a, b| a / b), Int)
            }
            (MathOperator::Divide, _, _) => float(|a, b| a / b),
            (MathOperator::Modulo, _, _) => {
                let divisor = right.as_i64();
                if divisor == 0 {
                    return Err(division_by_zero());
                }
                Int(left.as_i64().checked_rem(divisor).unwrap_or(0))
            }
            (MathOperator::Power, Int(a), Int(b)) => u32::try_from(b)
                .ok()
                .and_then(|exponent| a.checked_pow(exponent))
                .map_or(float(f64::powf), Int),
            (MathOperator::Power, _, _) => float(f64::powf),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathExpression<R> {
    pub first: Operand<R>,
    pub rest: Vec<(MathOperator, Operand<R>)>,
    pub source: String,
}

impl<R> MathExpression<R> {
    pub fn operands(&self) -> impl Iterator<Item = &Operand<R>> {
        std::iter::once(&self.first).chain(self.rest.iter().map(|(_, operand)| operand))
    }

    pub fn evaluate(&self, resolve: &mut Resolve<'_, R>) -> TemplateResult<Value> {
        let mut accumulator = resolve(&self.first)?.to_number_or_zero();
        for (operator, operand) in &self.rest {
            let value = resolve(operand)?.to_number_or_zero();
            accumulator = operator.apply(accumulator, value, &self.source)?;
        }
        Ok(accumulator.into_value())
    }

    pub fn map_refs<S, E>(
        &self,
        f: &mut impl FnMut(&R) -> Result<S, E>,
    ) -> Result<MathExpression<S>, E> {
        let mut rest = Vec::with_capacity(self.rest.len());
        for (operator, operand) in &self.rest {
            rest.push((*operator, operand.map_ref(&mut *f)?));
        }
        Ok(MathExpression {
            first: self.first.map_ref(&mut *f)?,
            rest,
            source: self.source.clone(),
        })
    }
}

/// Split into operands and operators. `None` unless every piece is a valid
/// operand and there is at least one operator.
fn split(content: &str) -> Option<(RawOperand<'_>, Vec<(MathOperator, RawOperand<'_>)>)> {
    let bytes = content.as_bytes();
    let mut cuts = Vec::new();
    for (i, c) in scan::top_level(content) {
        let is_operator = match c {
            '-' => {
                i > 0
                    && bytes[i - 1].is_ascii_whitespace()
                    && bytes.get(i + 1).is_some_and(u8::is_ascii_whitespace)
            }
            '+' | '*' | '/' | '%' | '^' => true,
            _ => false,
        };
        if is_operator {
            cuts.push((i, MathOperator::from_char(c)?));
        }
    }
    if cuts.is_empty() {
        return None;
    }
    let first = classify_operand(&content[..cuts[0].0])?;
    let mut rest = Vec::with_capacity(cuts.len());
    for (n, (at, operator)) in cuts.iter().enumerate() {
        let end = cuts.get(n + 1).map_or(content.len(), |(next, _)| *next);
        rest.push((*operator, classify_operand(&content[at + 1..end])?));
    }
    Some((first, rest))
}

#[derive(Debug, Default)]
pub struct MathRecognizer;

impl ExpressionRecognizer for MathRecognizer {
    fn name(&self) -> &str {
        "math"
    }

    fn matches(&self, content: &str) -> bool {
        split(content).is_some()
    }

    fn build(&self, content: &str, builder: &mut dyn OperandBuilder) -> TemplateResult<Expression> {
        let (first, rest) =
            split(content).ok_or_else(|| ExpressionError::syntax(content, "invalid arithmetic"))?;
        let first = first.build(builder)?;
        let mut operations = Vec::with_capacity(rest.len());
        for (operator, operand) in rest {
            operations.push((operator, operand.build(builder)?));
        }
        Ok(Expression::Math(MathExpression {
            first,
            rest: operations,
            source: content.trim().to_string(),
        }))
    }
}
