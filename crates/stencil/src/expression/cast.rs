/*
 * expression/cast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Type casts: `{value as integer}`.

use super::{Expression, ExpressionRecognizer, Operand, OperandBuilder, Resolve, classify_operand};
use crate::error::{ExpressionError, TemplateResult};
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static CAST_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(.+?)\s+as\s+(integer|int|float|double|boolean|bool|string|array)\s*$")
        .expect("cast pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastType {
    Integer,
    Float,
    Boolean,
    String,
    Array,
}

impl CastType {
    fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "integer" | "int" => CastType::Integer,
            "float" | "double" => CastType::Float,
            "boolean" | "bool" => CastType::Boolean,
            "string" => CastType::String,
            "array" => CastType::Array,
            _ => return None,
        })
    }

    pub fn apply(self, value: Value) -> Value {
        match self {
            CastType::Integer => Value::Int(value.to_number_or_zero().as_i64()),
            CastType::Float => Value::Float(value.to_number_or_zero().as_f64()),
            CastType::Boolean => Value::Bool(value.is_truthy()),
            CastType::String => Value::String(value.to_output_string()),
            CastType::Array => match value {
                Value::List(_) | Value::Map(_) => value,
                Value::Null => Value::List(Vec::new()),
                Value::String(text) => Value::List(
                    text.split(',')
                        .map(|item| Value::from(item.trim()))
                        .collect(),
                ),
                other => Value::List(vec![other]),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastExpression<R> {
    pub operand: Operand<R>,
    pub target: CastType,
}

impl<R> CastExpression<R> {
    pub fn evaluate(&self, resolve: &mut Resolve<'_, R>) -> TemplateResult<Value> {
        Ok(self.target.apply(resolve(&self.operand)?))
    }

    pub fn map_refs<S, E>(
        &self,
        f: &mut impl FnMut(&R) -> Result<S, E>,
    ) -> Result<CastExpression<S>, E> {
        Ok(CastExpression {
            operand: self.operand.map_ref(f)?,
            target: self.target,
        })
    }
}

#[derive(Debug, Default)]
pub struct CastRecognizer;

impl CastRecognizer {
    fn split(content: &str) -> Option<(&str, CastType)> {
        let captures = CAST_PATTERN.captures(content)?;
        let operand = captures.get(1)?.as_str();
        let target = CastType::from_keyword(captures.get(2)?.as_str())?;
        classify_operand(operand)?;
        Some((operand, target))
    }
}

impl ExpressionRecognizer for CastRecognizer {
    fn name(&self) -> &str {
        "cast"
    }

    fn matches(&self, content: &str) -> bool {
        Self::split(content).is_some()
    }

    fn build(&self, content: &str, builder: &mut dyn OperandBuilder) -> TemplateResult<Expression> {
        let (operand, target) = Self::split(content)
            .ok_or_else(|| ExpressionError::syntax(content, "expected 'value as type'"))?;
        let operand = classify_operand(operand)
            .ok_or_else(|| ExpressionError::syntax(content, "invalid cast operand"))?
            .build(builder)?;
        Ok(Expression::Cast(CastExpression { operand, target }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Scalar;

    #[test]
    fn test_split() {
        assert_eq!(
            CastRecognizer::split("price as integer"),
            Some(("price", CastType::Integer))
        );
        assert_eq!(
            CastRecognizer::split("'1,2' as array"),
            Some(("'1,2'", CastType::Array))
        );
        assert_eq!(CastRecognizer::split("price as money"), None);
        assert_eq!(CastRecognizer::split("a b as int"), None);
        assert_eq!(CastRecognizer::split("alias"), None);
    }

    #[test]
    fn test_apply() {
        assert_eq!(CastType::Integer.apply(Value::from("12.7")), Value::Int(12));
        assert_eq!(CastType::Integer.apply(Value::from("abc")), Value::Int(0));
        assert_eq!(CastType::Float.apply(Value::Int(2)), Value::Float(2.0));
        assert_eq!(CastType::Boolean.apply(Value::from("0")), Value::Bool(false));
        assert_eq!(CastType::String.apply(Value::Int(5)), Value::from("5"));
    }

    #[test]
    fn test_array_cast() {
        assert_eq!(
            CastType::Array.apply(Value::from("a, b")),
            Value::from(vec!["a", "b"])
        );
        assert_eq!(CastType::Array.apply(Value::Null), Value::List(Vec::new()));
        assert_eq!(CastType::Array.apply(Value::Int(1)), Value::from(vec![1]));
    }

    #[test]
    fn test_evaluate_literal() {
        let cast = CastExpression::<()> {
            operand: Operand::Literal(Scalar::String("3".to_string())),
            target: CastType::Integer,
        };
        let value = cast
            .evaluate(&mut |operand: &Operand<()>| match operand {
                Operand::Literal(scalar) => Ok(scalar.to_value()),
                Operand::Ref(()) => Ok(Value::Null),
            })
            .unwrap();
        assert_eq!(value, Value::Int(3));
    }
}
