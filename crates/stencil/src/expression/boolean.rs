/*
 * expression/boolean.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Boolean expressions.
//!
//! Grammar: operands (numbers, quoted strings, `true`/`false`/`null`, `{...}`
//! groups, bare words), the unary `!`, the binary operators `&&`, `||`, `==`,
//! `!=`, `===`, `!==`, `<`, `<=`, `>`, `>=`, `%`, and parentheses.
//!
//! Precedence, lowest to highest: `||`, `&&`, equality, relational, `%`, `!`.
//! Expressions are converted to reverse Polish notation with the
//! shunting-yard algorithm when parsed, and evaluated with a value stack.
//!
//! Every operand is evaluated: `&&` and `||` do not short-circuit.

use super::{Operand, OperandBuilder, RawOperand, Resolve, is_valid_path, scan};
use crate::ast::NodeId;
use crate::error::{ExpressionError, TemplateResult};
use crate::lexer::matching_brace;
use crate::value::{Scalar, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanOperator {
    Not,
    And,
    Or,
    Equal,
    NotEqual,
    Identical,
    NotIdentical,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Modulo,
}

impl BooleanOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BooleanOperator::Not => "!",
            BooleanOperator::And => "&&",
            BooleanOperator::Or => "||",
            BooleanOperator::Equal => "==",
            BooleanOperator::NotEqual => "!=",
            BooleanOperator::Identical => "===",
            BooleanOperator::NotIdentical => "!==",
            BooleanOperator::Less => "<",
            BooleanOperator::LessOrEqual => "<=",
            BooleanOperator::Greater => ">",
            BooleanOperator::GreaterOrEqual => ">=",
            BooleanOperator::Modulo => "%",
        }
    }

    pub fn precedence(self) -> u8 {
        match self {
            BooleanOperator::Or => 1,
            BooleanOperator::And => 2,
            BooleanOperator::Equal
            | BooleanOperator::NotEqual
            | BooleanOperator::Identical
            | BooleanOperator::NotIdentical => 3,
            BooleanOperator::Less
            | BooleanOperator::LessOrEqual
            | BooleanOperator::Greater
            | BooleanOperator::GreaterOrEqual => 4,
            BooleanOperator::Modulo => 5,
            BooleanOperator::Not => 6,
        }
    }

    fn apply(self, left: &Value, right: &Value, expression: &str) -> Result<Value, ExpressionError> {
        let ordered = |accept: fn(Ordering) -> bool| {
            Value::Bool(left.loose_cmp(right).is_some_and(accept))
        };
        Ok(match self {
            BooleanOperator::Not => Value::Bool(!right.is_truthy()),
            BooleanOperator::And => Value::Bool(left.is_truthy() && right.is_truthy()),
            BooleanOperator::Or => Value::Bool(left.is_truthy() || right.is_truthy()),
            BooleanOperator::Equal => Value::Bool(left.loose_eq(right)),
            BooleanOperator::NotEqual => Value::Bool(!left.loose_eq(right)),
            BooleanOperator::Identical => Value::Bool(left.strict_eq(right)),
            BooleanOperator::NotIdentical => Value::Bool(!left.strict_eq(right)),
            BooleanOperator::Less => ordered(Ordering::is_lt),
            BooleanOperator::LessOrEqual => ordered(Ordering::is_le),
            BooleanOperator::Greater => ordered(Ordering::is_gt),
            BooleanOperator::GreaterOrEqual => ordered(Ordering::is_ge),
            BooleanOperator::Modulo => {
                let divisor = right.to_number_or_zero().as_i64();
                if divisor == 0 {
                    return Err(ExpressionError::DivisionByZero {
                        expression: expression.to_string(),
                    });
                }
                let dividend = left.to_number_or_zero().as_i64();
                Value::Int(dividend.checked_rem(divisor).unwrap_or(0))
            }
        })
    }
}

/// How bare words are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BareWords {
    /// As variable paths (inside `{...}`).
    Variables,
    /// As string literals (plain attribute values).
    Strings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BooleanToken<R> {
    Operand(Operand<R>),
    Operator(BooleanOperator),
}

/// A boolean expression in reverse Polish notation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanExpression<R> {
    tokens: Vec<BooleanToken<R>>,
    source: String,
}

#[derive(Debug, Clone, PartialEq)]
enum RawToken<'s> {
    Operand(RawOperand<'s>),
    Operator(BooleanOperator),
    Open,
    Close,
}

const OPERATOR_CHARS: &[u8] = b"()!=&|<>%'\"";

fn tokenize(source: &str, bare: BareWords) -> Result<Vec<RawToken<'_>>, ExpressionError> {
    let error = |message: &str| ExpressionError::syntax(source, message);
    let bytes = source.as_bytes();
    let next_is = |i: usize, b: u8| bytes.get(i) == Some(&b);
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let (token, width) = match b {
            b'(' => (RawToken::Open, 1),
            b')' => (RawToken::Close, 1),
            b'!' if next_is(i + 1, b'=') && next_is(i + 2, b'=') => {
                (RawToken::Operator(BooleanOperator::NotIdentical), 3)
            }
            b'!' if next_is(i + 1, b'=') => (RawToken::Operator(BooleanOperator::NotEqual), 2),
            b'!' => (RawToken::Operator(BooleanOperator::Not), 1),
            b'=' if next_is(i + 1, b'=') && next_is(i + 2, b'=') => {
                (RawToken::Operator(BooleanOperator::Identical), 3)
            }
            b'=' if next_is(i + 1, b'=') => (RawToken::Operator(BooleanOperator::Equal), 2),
            b'=' => return Err(error("'=' is not an operator, use '==' or '==='")),
            b'&' if next_is(i + 1, b'&') => (RawToken::Operator(BooleanOperator::And), 2),
            b'|' if next_is(i + 1, b'|') => (RawToken::Operator(BooleanOperator::Or), 2),
            b'&' | b'|' => return Err(error("expected '&&' or '||'")),
            b'<' if next_is(i + 1, b'=') => (RawToken::Operator(BooleanOperator::LessOrEqual), 2),
            b'<' => (RawToken::Operator(BooleanOperator::Less), 1),
            b'>' if next_is(i + 1, b'=') => {
                (RawToken::Operator(BooleanOperator::GreaterOrEqual), 2)
            }
            b'>' => (RawToken::Operator(BooleanOperator::Greater), 1),
            b'%' => (RawToken::Operator(BooleanOperator::Modulo), 1),
            b'\'' | b'"' => {
                let end = quoted_end(bytes, i).ok_or_else(|| error("unterminated string"))?;
                let content = scan::unquote(&source[i..end])
                    .ok_or_else(|| error("unterminated string"))?;
                (
                    RawToken::Operand(RawOperand::Literal(Scalar::String(content))),
                    end - i,
                )
            }
            b'{' => {
                let close = matching_brace(source, i).ok_or_else(|| error("unbalanced braces"))?;
                (
                    RawToken::Operand(RawOperand::Braced(&source[i + 1..close])),
                    close + 1 - i,
                )
            }
            _ => {
                let end = word_end(source, i).ok_or_else(|| error("unbalanced braces"))?;
                let word = &source[i..end];
                let operand = match Scalar::parse_keyword_or_number(word) {
                    Some(scalar) => RawOperand::Literal(scalar),
                    None => match bare {
                        BareWords::Strings => {
                            RawOperand::Literal(Scalar::String(word.to_string()))
                        }
                        BareWords::Variables if is_valid_path(word) => RawOperand::Path(word),
                        BareWords::Variables => {
                            return Err(error(&format!("invalid operand \"{word}\"")));
                        }
                    },
                };
                (RawToken::Operand(operand), end - i)
            }
        };
        tokens.push(token);
        i += width;
    }
    Ok(tokens)
}

/// Byte index just past the quoted string starting at `start`.
fn quoted_end(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// End of a bare word. Braces inside a word (`user.{key}`) are kept with it.
fn word_end(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'{' {
            i = matching_brace(source, i)? + 1;
            continue;
        }
        if b.is_ascii_whitespace() || OPERATOR_CHARS.contains(&b) {
            break;
        }
        i += 1;
    }
    Some(i)
}

enum RpnEntry<'s> {
    Operand(RawOperand<'s>),
    Operator(BooleanOperator),
}

enum StackEntry {
    Operator(BooleanOperator),
    Open,
}

/// Shunting-yard conversion with arity checks.
fn to_rpn<'s>(
    source: &str,
    tokens: Vec<RawToken<'s>>,
) -> Result<Vec<RpnEntry<'s>>, ExpressionError> {
    let error = |message: &str| ExpressionError::syntax(source, message);
    let mut output = Vec::with_capacity(tokens.len());
    let mut stack: Vec<StackEntry> = Vec::new();
    let mut expect_operand = true;

    for token in tokens {
        match token {
            RawToken::Operand(operand) => {
                if !expect_operand {
                    return Err(error("missing operator between operands"));
                }
                output.push(RpnEntry::Operand(operand));
                expect_operand = false;
            }
            RawToken::Operator(BooleanOperator::Not) => {
                if !expect_operand {
                    return Err(error("'!' must precede an operand"));
                }
                stack.push(StackEntry::Operator(BooleanOperator::Not));
            }
            RawToken::Operator(operator) => {
                if expect_operand {
                    return Err(error(&format!(
                        "missing operand before '{}'",
                        operator.symbol()
                    )));
                }
                while let Some(StackEntry::Operator(top)) = stack.last() {
                    if top.precedence() < operator.precedence() {
                        break;
                    }
                    output.push(RpnEntry::Operator(*top));
                    stack.pop();
                }
                stack.push(StackEntry::Operator(operator));
                expect_operand = true;
            }
            RawToken::Open => {
                if !expect_operand {
                    return Err(error("missing operator before '('"));
                }
                stack.push(StackEntry::Open);
            }
            RawToken::Close => {
                if expect_operand {
                    return Err(error("missing operand before ')'"));
                }
                loop {
                    match stack.pop() {
                        Some(StackEntry::Operator(operator)) => output.push(RpnEntry::Operator(operator)),
                        Some(StackEntry::Open) => break,
                        None => return Err(error("unbalanced parentheses")),
                    }
                }
            }
        }
    }

    if expect_operand {
        return Err(error(if output.is_empty() {
            "empty expression"
        } else {
            "missing operand at end of expression"
        }));
    }
    while let Some(entry) = stack.pop() {
        match entry {
            StackEntry::Operator(operator) => output.push(RpnEntry::Operator(operator)),
            StackEntry::Open => return Err(error("unbalanced parentheses")),
        }
    }
    Ok(output)
}

impl BooleanExpression<NodeId> {
    /// Parse `source`. Syntax is checked completely before any operand node is
    /// allocated through `builder`.
    pub fn parse(
        source: &str,
        bare: BareWords,
        builder: &mut dyn OperandBuilder,
    ) -> TemplateResult<Self> {
        let rpn = Self::check(source, bare)?;
        let mut tokens = Vec::with_capacity(rpn.len());
        for entry in rpn {
            tokens.push(match entry {
                RpnEntry::Operand(operand) => BooleanToken::Operand(operand.build(builder)?),
                RpnEntry::Operator(operator) => BooleanToken::Operator(operator),
            });
        }
        Ok(Self {
            tokens,
            source: source.trim().to_string(),
        })
    }

    /// Syntax check without building anything.
    pub fn is_valid(source: &str, bare: BareWords) -> bool {
        Self::check(source, bare).is_ok()
    }

    fn check(
        source: &str,
        bare: BareWords,
    ) -> Result<Vec<RpnEntry<'_>>, ExpressionError> {
        to_rpn(source, tokenize(source, bare)?)
    }
}

impl<R> BooleanExpression<R> {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[BooleanToken<R>] {
        &self.tokens
    }

    /// The literal, if the whole expression is a single literal operand.
    pub fn as_literal(&self) -> Option<&Scalar> {
        match self.tokens.as_slice() {
            [BooleanToken::Operand(Operand::Literal(scalar))] => Some(scalar),
            _ => None,
        }
    }

    pub fn operand_refs(&self) -> impl Iterator<Item = &R> {
        self.tokens.iter().filter_map(|token| match token {
            BooleanToken::Operand(operand) => operand.reference(),
            BooleanToken::Operator(_) => None,
        })
    }

    pub fn map_refs<S, E>(
        &self,
        f: &mut impl FnMut(&R) -> Result<S, E>,
    ) -> Result<BooleanExpression<S>, E> {
        let mut tokens = Vec::with_capacity(self.tokens.len());
        for token in &self.tokens {
            tokens.push(match token {
                BooleanToken::Operand(operand) => BooleanToken::Operand(operand.map_ref(&mut *f)?),
                BooleanToken::Operator(operator) => BooleanToken::Operator(*operator),
            });
        }
        Ok(BooleanExpression {
            tokens,
            source: self.source.clone(),
        })
    }

    pub fn evaluate(&self, resolve: &mut Resolve<'_, R>) -> TemplateResult<bool> {
        let mut stack: Vec<Value> = Vec::with_capacity(self.tokens.len());
        for token in &self.tokens {
            match token {
                BooleanToken::Operand(operand) => stack.push(resolve(operand)?),
                BooleanToken::Operator(BooleanOperator::Not) => {
                    let value = self.pop(&mut stack)?;
                    stack.push(Value::Bool(!value.is_truthy()));
                }
                BooleanToken::Operator(operator) => {
                    let right = self.pop(&mut stack)?;
                    let left = self.pop(&mut stack)?;
                    stack.push(operator.apply(&left, &right, &self.source)?);
                }
            }
        }
        let result = self.pop(&mut stack)?;
        if !stack.is_empty() {
            return Err(self.malformed().into());
        }
        Ok(result.is_truthy())
    }

    fn pop(&self, stack: &mut Vec<Value>) -> Result<Value, ExpressionError> {
        stack.pop().ok_or_else(|| self.malformed())
    }

    fn malformed(&self) -> ExpressionError {
        ExpressionError::syntax(&self.source, "malformed expression")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueMap;

    /// Allocates sequential ids and remembers what each one refers to.
    #[derive(Default)]
    struct Recorder {
        refs: Vec<String>,
    }

    impl OperandBuilder for Recorder {
        fn path(&mut self, path: &str) -> TemplateResult<NodeId> {
            self.refs.push(path.to_string());
            Ok(NodeId::from_index(self.refs.len() - 1))
        }

        fn nested(&mut self, content: &str) -> TemplateResult<NodeId> {
            self.path(content)
        }
    }

    fn eval_with(source: &str, bare: BareWords, variables: &ValueMap) -> bool {
        let mut recorder = Recorder::default();
        let expression = BooleanExpression::parse(source, bare, &mut recorder).unwrap();
        expression
            .evaluate(&mut |operand: &Operand<NodeId>| {
                Ok(match operand {
                    Operand::Literal(scalar) => scalar.to_value(),
                    Operand::Ref(id) => variables
                        .get(&recorder.refs[id.index()])
                        .cloned()
                        .unwrap_or_default(),
                })
            })
            .unwrap()
    }

    fn eval(source: &str) -> bool {
        eval_with(source, BareWords::Variables, &ValueMap::new())
    }

    #[test]
    fn test_literals_and_logic() {
        assert!(eval("true"));
        assert!(!eval("false || false"));
        assert!(eval("true && !false"));
        assert!(eval("!(false || false)"));
    }

    #[test]
    fn test_comparisons() {
        assert!(eval("1 === 1"));
        assert!(eval("1 == '1'"));
        assert!(!eval("1 === true"));
        assert!(eval("1 !== '1'"));
        assert!(eval("2 > 1 && 1 <= 1"));
        assert!(eval("'a' < 'b'"));
        assert!(!eval("'foo' == 0"));
    }

    #[test]
    fn test_modulo_binds_tighter_than_comparison() {
        assert!(eval("5 % 2 == 1"));
        assert!(eval("4 % 2 == 0"));
    }

    #[test]
    fn test_precedence_and_over_or() {
        assert!(eval("true || false && false"));
        assert!(!eval("(true || false) && false"));
    }

    #[test]
    fn test_variables_and_nested_groups() {
        let mut variables = ValueMap::new();
        variables.insert("count".to_string(), Value::Int(3));
        variables.insert("user.name".to_string(), Value::from("Ada"));
        assert!(eval_with("count > 2", BareWords::Variables, &variables));
        assert!(eval_with("{user.name} == 'Ada'", BareWords::Variables, &variables));
    }

    #[test]
    fn test_attribute_mode_words_are_strings() {
        assert!(eval_with("foo == 'foo'", BareWords::Strings, &ValueMap::new()));
        assert!(!eval_with("foo == bar", BareWords::Strings, &ValueMap::new()));
    }

    #[test]
    fn test_rpn_order() {
        let expression = BooleanExpression::parse("1 == 1 && !x", BareWords::Variables, &mut Recorder::default())
            .unwrap();
        let symbols: Vec<String> = expression
            .tokens()
            .iter()
            .map(|t| match t {
                BooleanToken::Operand(Operand::Literal(s)) => format!("{s:?}"),
                BooleanToken::Operand(Operand::Ref(_)) => "ref".to_string(),
                BooleanToken::Operator(o) => o.symbol().to_string(),
            })
            .collect();
        assert_eq!(symbols, vec!["Int(1)", "Int(1)", "==", "ref", "!", "&&"]);
    }

    #[test]
    fn test_syntax_errors_allocate_nothing() {
        for source in ["", "1 ==", "== 1", "(1", "1)", "a = b", "1 2", "a & b", "'open"] {
            let mut recorder = Recorder::default();
            assert!(
                BooleanExpression::parse(source, BareWords::Variables, &mut recorder).is_err(),
                "{source:?} should not parse"
            );
            assert!(recorder.refs.is_empty());
        }
    }

    #[test]
    fn test_modulo_by_zero() {
        let expression =
            BooleanExpression::parse("1 % 0", BareWords::Variables, &mut Recorder::default())
                .unwrap();
        let result = expression.evaluate(&mut |operand: &Operand<NodeId>| match operand {
            Operand::Literal(scalar) => Ok(scalar.to_value()),
            Operand::Ref(_) => Ok(Value::Null),
        });
        assert!(matches!(
            result,
            Err(crate::error::TemplateError::Expression(
                ExpressionError::DivisionByZero { .. }
            ))
        ));
    }

    #[test]
    fn test_single_literal() {
        let expression =
            BooleanExpression::parse("TRUE", BareWords::Strings, &mut Recorder::default()).unwrap();
        assert_eq!(expression.as_literal(), Some(&Scalar::Bool(true)));
    }
}
