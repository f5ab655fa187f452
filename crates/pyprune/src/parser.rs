//! Parsing front end: turns source text into a ruff syntax tree plus the
//! line index needed to attach 1-indexed line positions to statements.

use std::path::Path;

use ruff_python_ast::ModModule;
use ruff_python_parser::{Parsed, parse_module};
use ruff_text_size::TextRange;

use crate::error::PypruneError;
use crate::nodes::NodeLocation;

/// Maps byte offsets to line/column positions.
///
/// Built once per file by scanning for newlines; every statement location
/// is derived from its `TextRange` through this table.
#[derive(Debug)]
pub struct LineIndex {
    /// Byte offset of the start of each line, first entry always 0.
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (offset, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset + 1);
            }
        }
        Self { line_starts }
    }

    /// 1-indexed line containing `offset`.
    pub fn line_of(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= offset)
    }

    /// 0-indexed byte column of `offset` within its line.
    pub fn col_of(&self, offset: usize) -> usize {
        let line = self.line_of(offset);
        offset - self.line_starts[line - 1]
    }

    /// Statement location for a parser range. The end line is the line
    /// holding the last byte of the range, so a parenthesized import's
    /// closing parenthesis line is included.
    pub fn location(&self, range: TextRange) -> NodeLocation {
        let start = usize::from(range.start());
        let end = usize::from(range.end());
        NodeLocation::new(
            self.line_of(start),
            self.col_of(start),
            self.line_of(end.saturating_sub(1).max(start)),
        )
    }
}

/// Multi-line rendering style of an import statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultilineKind {
    /// `from m import (a,` ... `)`
    Parenthesized,
    /// `from m import a, \` continuation
    Backslash,
}

/// Classify a statement's multi-line style from its first source line,
/// `None` when the statement fits on one line.
pub fn multiline_kind(first_line: &str) -> Option<MultilineKind> {
    if first_line.contains('(') {
        Some(MultilineKind::Parenthesized)
    } else if first_line.trim_end().ends_with('\\') {
        Some(MultilineKind::Backslash)
    } else {
        None
    }
}

/// Parse `source`, rejecting null bytes up front and mapping parser
/// failures into a located, snippeted error.
pub fn parse(source: &str, path: &Path) -> Result<Parsed<ModModule>, PypruneError> {
    if source.contains('\0') {
        return Err(PypruneError::UnparsableFile {
            path: path.to_path_buf(),
            line: None,
            column: None,
            reason: "ValueError: source code containing null bytes".to_string(),
            text: None,
        });
    }

    parse_module(source).map_err(|err| {
        let index = LineIndex::new(source);
        let offset = usize::from(err.location.start());
        let line = index.line_of(offset);
        let column = index.col_of(offset);
        let text = source.lines().nth(line - 1).map(str::to_string);
        PypruneError::UnparsableFile {
            path: path.to_path_buf(),
            line: Some(line),
            column: Some(column),
            reason: format!("SyntaxError: {}", err.error),
            text,
        }
    })
}

/// Re-parse a source fragment that is known to be a single expression
/// (quoted annotations, type comments, `cast` targets).
pub fn parse_fragment(text: &str) -> Option<ruff_python_ast::Expr> {
    let parsed = ruff_python_parser::parse_expression(text.trim()).ok()?;
    Some(*parsed.into_syntax().body)
}
