/*
 * error_handler.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error routing.
//!
//! Recoverable errors pass through an [`ErrorHandler`] at the point they
//! occur. The strict handler turns them back into errors; the tolerant one
//! records them and returns a placeholder that is rendered in place of the
//! failed fragment.

use crate::error::{CompileError, ExpressionError, ParseError, TemplateResult, ViewHelperError};
use std::sync::Mutex;

pub trait ErrorHandler: Send + Sync {
    /// A template failed to parse. The placeholder replaces the whole output.
    fn handle_parser_error(&self, error: ParseError) -> TemplateResult<String>;

    /// An expression could not be recognized or evaluated.
    fn handle_expression_error(&self, error: ExpressionError) -> TemplateResult<String>;

    /// A ViewHelper failed while rendering.
    fn handle_view_helper_error(&self, error: ViewHelperError) -> TemplateResult<String>;

    /// A template could not be compiled. Rendering falls back to
    /// interpretation unless this returns an error.
    fn handle_compiler_error(&self, error: CompileError) -> TemplateResult<String>;
}

/// Fails on every error except templates that cannot be compiled.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardErrorHandler;

impl ErrorHandler for StandardErrorHandler {
    fn handle_parser_error(&self, error: ParseError) -> TemplateResult<String> {
        Err(error.into())
    }

    fn handle_expression_error(&self, error: ExpressionError) -> TemplateResult<String> {
        Err(error.into())
    }

    fn handle_view_helper_error(&self, error: ViewHelperError) -> TemplateResult<String> {
        Err(error.into())
    }

    fn handle_compiler_error(&self, error: CompileError) -> TemplateResult<String> {
        match error {
            CompileError::CannotCompile { .. } => {
                tracing::debug!(error = %error, "Rendering uncompiled");
                Ok(String::new())
            }
            other => Err(other.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Parser,
    Expression,
    ViewHelper,
    Compiler,
}

impl DiagnosticKind {
    fn label(self) -> &'static str {
        match self {
            DiagnosticKind::Parser => "Parser",
            DiagnosticKind::Expression => "Expression",
            DiagnosticKind::ViewHelper => "ViewHelper",
            DiagnosticKind::Compiler => "Compiler",
        }
    }
}

/// An error recorded by the tolerant handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    /// `"<Kind> error: <message>"`
    pub fn placeholder(&self) -> String {
        format!("{} error: {}", self.kind.label(), self.message)
    }
}

/// Keeps rendering after errors, replacing each failed fragment by a
/// placeholder.
#[derive(Debug, Default)]
pub struct TolerantErrorHandler {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl TolerantErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, in order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .map(|diagnostics| diagnostics.clone())
            .unwrap_or_default()
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics().is_empty()
    }

    fn record(&self, kind: DiagnosticKind, message: String) -> String {
        let diagnostic = Diagnostic { kind, message };
        let placeholder = diagnostic.placeholder();
        tracing::warn!(kind = kind.label(), message = %diagnostic.message, "Template error");
        if let Ok(mut diagnostics) = self.diagnostics.lock() {
            diagnostics.push(diagnostic);
        }
        placeholder
    }
}

impl ErrorHandler for TolerantErrorHandler {
    fn handle_parser_error(&self, error: ParseError) -> TemplateResult<String> {
        Ok(self.record(DiagnosticKind::Parser, error.to_string()))
    }

    fn handle_expression_error(&self, error: ExpressionError) -> TemplateResult<String> {
        Ok(self.record(DiagnosticKind::Expression, error.to_string()))
    }

    fn handle_view_helper_error(&self, error: ViewHelperError) -> TemplateResult<String> {
        match error {
            ViewHelperError::Propagated(inner) => Err(*inner),
            other => Ok(self.record(DiagnosticKind::ViewHelper, other.to_string())),
        }
    }

    fn handle_compiler_error(&self, error: CompileError) -> TemplateResult<String> {
        match error {
            CompileError::Cache(cache) => Err(cache.into()),
            other => {
                self.record(DiagnosticKind::Compiler, other.to_string());
                Ok(String::new())
            }
        }
    }
}
