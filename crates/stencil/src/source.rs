/*
 * source.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Mapping byte offsets back to line/column positions for diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in template source.
///
/// `line` and `column` are 1-based; `column` counts characters, not bytes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SourceLocation {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Precomputed line starts for one source text.
#[derive(Debug, Clone, Default)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    /// Locate `offset` within `source`, which must be the text this index was
    /// built from. Offsets past the end are clamped.
    pub fn locate(&self, source: &str, offset: usize) -> SourceLocation {
        let offset = offset.min(source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let start = self.line_starts[line];
        let column = match source.get(start..offset) {
            Some(prefix) => prefix.chars().count(),
            None => offset - start,
        };
        SourceLocation {
            offset,
            line: line + 1,
            column: column + 1,
        }
    }
}
