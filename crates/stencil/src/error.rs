/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template processing.

use crate::source::SourceLocation;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while splitting template source into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated tag")]
    UnterminatedTag { offset: usize },

    #[error("unterminated expression")]
    UnterminatedExpression { offset: usize },

    #[error("unterminated CDATA section")]
    UnterminatedCdata { offset: usize },

    #[error("malformed tag: {message}")]
    MalformedTag { offset: usize, message: String },
}

impl LexError {
    /// Byte offset where the offending construct starts.
    pub fn offset(&self) -> usize {
        match self {
            LexError::UnterminatedTag { offset }
            | LexError::UnterminatedExpression { offset }
            | LexError::UnterminatedCdata { offset }
            | LexError::MalformedTag { offset, .. } => *offset,
        }
    }
}

/// Structural errors found while building the syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{error} at {location}")]
    Lex {
        #[source]
        error: LexError,
        location: SourceLocation,
    },

    #[error("unclosed tag <{tag}> opened at {location}")]
    UnclosedTag {
        tag: String,
        location: SourceLocation,
    },

    #[error("mismatched closing tag </{found}> at {location}, expected </{expected}>")]
    MismatchedClosingTag {
        expected: String,
        found: String,
        location: SourceLocation,
    },

    #[error("unexpected closing tag </{tag}> at {location}")]
    UnexpectedClosingTag {
        tag: String,
        location: SourceLocation,
    },

    #[error("unknown namespace \"{prefix}\" at {location}")]
    UnknownNamespace {
        prefix: String,
        location: SourceLocation,
    },

    #[error("unknown ViewHelper <{tag}> at {location}")]
    UnknownViewHelper {
        tag: String,
        location: SourceLocation,
    },

    #[error("required argument \"{argument}\" missing for <{tag}> at {location}")]
    MissingRequiredArgument {
        tag: String,
        argument: String,
        location: SourceLocation,
    },

    #[error("unknown argument \"{argument}\" for <{tag}> at {location}")]
    UnknownArgument {
        tag: String,
        argument: String,
        location: SourceLocation,
    },

    #[error("argument \"{argument}\" given more than once for <{tag}> at {location}")]
    DuplicateArgument {
        tag: String,
        argument: String,
        location: SourceLocation,
    },

    #[error("invalid children for <{tag}> at {location}: {message}")]
    InvalidChildren {
        tag: String,
        message: String,
        location: SourceLocation,
    },
}

impl ParseError {
    pub fn location(&self) -> SourceLocation {
        match self {
            ParseError::Lex { location, .. }
            | ParseError::UnclosedTag { location, .. }
            | ParseError::MismatchedClosingTag { location, .. }
            | ParseError::UnexpectedClosingTag { location, .. }
            | ParseError::UnknownNamespace { location, .. }
            | ParseError::UnknownViewHelper { location, .. }
            | ParseError::MissingRequiredArgument { location, .. }
            | ParseError::UnknownArgument { location, .. }
            | ParseError::DuplicateArgument { location, .. }
            | ParseError::InvalidChildren { location, .. } => *location,
        }
    }
}

/// Errors raised by expression recognizers and expression evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("unrecognized expression {{{expression}}}")]
    Unrecognized { expression: String },

    #[error("invalid expression {{{expression}}}: {message}")]
    Syntax { expression: String, message: String },

    #[error("division by zero in {{{expression}}}")]
    DivisionByZero { expression: String },
}

impl ExpressionError {
    /// The offending expression text, without braces.
    pub fn expression(&self) -> &str {
        match self {
            ExpressionError::Unrecognized { expression }
            | ExpressionError::Syntax { expression, .. }
            | ExpressionError::DivisionByZero { expression } => expression,
        }
    }

    pub(crate) fn syntax(expression: impl Into<String>, message: impl Into<String>) -> Self {
        ExpressionError::Syntax {
            expression: expression.into(),
            message: message.into(),
        }
    }
}

/// Errors reported by ViewHelper implementations.
#[derive(Debug, Error)]
pub enum ViewHelperError {
    #[error("<{tag}> failed: {message}")]
    Failed { tag: String, message: String },

    #[error("invalid value for argument \"{argument}\" of <{tag}>: {message}")]
    InvalidArgument {
        tag: String,
        argument: String,
        message: String,
    },

    #[error("ViewHelper <{tag}> could not be resolved")]
    Unresolved { tag: String },

    /// An error from a nested evaluation that has already been through the
    /// error handler. It crosses the helper boundary untouched.
    #[error(transparent)]
    Propagated(Box<TemplateError>),
}

impl From<TemplateError> for ViewHelperError {
    fn from(error: TemplateError) -> Self {
        ViewHelperError::Propagated(Box::new(error))
    }
}

/// Errors raised while turning a parsed template into a compiled unit.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{node} cannot be compiled: {reason}")]
    CannotCompile { node: String, reason: String },

    #[error("template {path} could not be loaded: {message}")]
    Load { path: String, message: String },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Errors from compiled-template cache backends. Always fatal.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache directory {} does not exist", .path.display())]
    MissingDirectory { path: PathBuf },

    #[error("cache I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid cache identifier \"{identifier}\"")]
    InvalidIdentifier { identifier: String },

    #[error("compiled template could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors loading an engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Umbrella error for every template operation.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("ViewHelper error: {0}")]
    ViewHelper(#[from] ViewHelperError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;
