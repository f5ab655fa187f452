//! Reconstructs import statement text from surviving entries, preserving
//! the original single-line, backslash-continued, or parenthesized shape,
//! and cleans up `pass` statements the rewrite made redundant.

use std::path::Path;

use ruff_python_ast::{Expr, Stmt};
use ruff_text_size::Ranged;

use crate::error::PypruneError;
use crate::nodes::{ImportKind, ImportStmt, ImportedName, NodeLocation};
use crate::parser::{LineIndex, MultilineKind};

/// A star expansion producing more names than this is forced into
/// parenthesized multi-line form instead of one unreasonably long line.
pub const STAR_EXPAND_WRAP_THRESHOLD: usize = 3;

/// Replacement text for one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuiltImport {
    /// Nothing survives and the statement sat at module level: its lines
    /// vanish from the output.
    Removed,
    Lines(Vec<String>),
}

/// Per-line replacement buffer for one file. Each slot maps an original
/// line to its replacement lines (possibly more than one, possibly none),
/// so later statements keep their original line numbers while edits
/// accumulate.
pub type LineBuffer = Vec<Option<Vec<String>>>;

pub fn line_buffer(source: &str) -> LineBuffer {
    source
        .split('\n')
        .map(|line| Some(vec![line.to_string()]))
        .collect()
}

pub fn flatten(buffer: LineBuffer) -> String {
    let lines: Vec<String> = buffer.into_iter().flatten().flatten().collect();
    lines.join("\n")
}

/// Statement forms that cannot be rewritten textually without corrupting
/// the surrounding code.
pub fn check_supported(
    stmt: &ImportStmt,
    source_lines: &[&str],
    path: &Path,
) -> Result<(), PypruneError> {
    let start = stmt.location.start;
    let unsupported = |reason: &str| PypruneError::UnsupportedCase {
        path: path.to_path_buf(),
        line: start.line,
        column: start.col,
        reason: reason.to_string(),
    };

    let first_line = source_lines.get(start.line - 1).copied().unwrap_or("");
    if !first_line
        .get(..start.col)
        .unwrap_or("")
        .trim()
        .is_empty()
    {
        return Err(unsupported("import statement inside an inline block body"));
    }
    for line_number in start.line..=stmt.location.end_line {
        let line = source_lines.get(line_number - 1).copied().unwrap_or("");
        // Comments cannot occur inside an import statement's own tokens,
        // so anything before `#` is statement text.
        let code = line.split('#').next().unwrap_or("");
        if code.contains(';') {
            return Err(unsupported("semicolon-separated compound statement"));
        }
    }
    Ok(())
}

fn render_name(name: &ImportedName) -> String {
    match &name.asname {
        Some(asname) => format!("{} as {}", name.name, asname),
        None => name.name.clone(),
    }
}

fn join_names(names: &[ImportedName]) -> String {
    names.iter().map(render_name).collect::<Vec<_>>().join(", ")
}

/// Statement head up to and including the `import` keyword.
fn statement_head(stmt: &ImportStmt) -> String {
    match &stmt.kind {
        ImportKind::Import => "import".to_string(),
        ImportKind::ImportFrom { .. } => format!("from {} import", stmt.relative_name()),
    }
}

/// Single-line rendering without indentation, used for reporting.
pub fn render_statement(stmt: &ImportStmt, names: &[ImportedName]) -> String {
    format!("{} {}", statement_head(stmt), join_names(names))
}

/// Rebuild one statement's replacement lines from its surviving entries.
///
/// `style` is the statement's original multi-line form, when it had one;
/// `force_wrap` switches a grown statement (star expansion) into
/// parenthesized form regardless of the original shape.
pub fn rebuild(
    stmt: &ImportStmt,
    survivors: &[ImportedName],
    style: Option<MultilineKind>,
    force_wrap: bool,
) -> RebuiltImport {
    let indent = " ".repeat(stmt.location.start.col);

    if survivors.is_empty() {
        // An indented block must keep at least one statement.
        return if indent.is_empty() {
            RebuiltImport::Removed
        } else {
            RebuiltImport::Lines(vec![format!("{indent}pass")])
        };
    }

    let head = statement_head(stmt);
    let parenthesized = matches!(&stmt.kind, ImportKind::ImportFrom { .. })
        && (force_wrap || (style == Some(MultilineKind::Parenthesized) && survivors.len() > 1));
    let backslash = !parenthesized
        && style == Some(MultilineKind::Backslash)
        && survivors.len() > 1;

    if parenthesized {
        let mut lines = vec![format!("{indent}{head} (")];
        for (position, name) in survivors.iter().enumerate() {
            let separator = if position + 1 < survivors.len() { "," } else { "" };
            lines.push(format!("{indent}    {}{separator}", render_name(name)));
        }
        lines.push(format!("{indent})"));
        return RebuiltImport::Lines(lines);
    }

    if backslash {
        let mut lines = Vec::with_capacity(survivors.len());
        for (position, name) in survivors.iter().enumerate() {
            let rendered = render_name(name);
            let line = match (position, position + 1 == survivors.len()) {
                (0, _) => format!("{indent}{head} {rendered}, \\"),
                (_, false) => format!("{indent}    {rendered}, \\"),
                (_, true) => format!("{indent}    {rendered}"),
            };
            lines.push(line);
        }
        return RebuiltImport::Lines(lines);
    }

    RebuiltImport::Lines(vec![format!("{indent}{head} {}", join_names(survivors))])
}

/// Write a rebuilt statement over its original span. Replacement lines go
/// into the first slot; the remaining spanned slots empty out, so every
/// later line keeps its index.
pub fn splice(buffer: &mut LineBuffer, location: NodeLocation, rebuilt: RebuiltImport) {
    let start = location.start.line - 1;
    for index in start..location.end_line.min(buffer.len()) {
        buffer[index] = None;
    }
    if let RebuiltImport::Lines(lines) = rebuilt {
        if let Some(slot) = buffer.get_mut(start) {
            *slot = Some(lines);
        }
    }
}

/// Delete `pass` statements the rewrite made redundant: any block that
/// still holds other statements drops its `pass` lines, except a `pass`
/// that is the sole statement after a docstring. Try/except branches are
/// counted per branch. Returns `None` when the rewritten source no longer
/// parses, which callers treat as an internal failure.
pub fn remove_useless_passes(source: &str) -> Option<String> {
    let parsed = ruff_python_parser::parse_module(source).ok()?;
    let index = LineIndex::new(source);
    let source_lines: Vec<&str> = source.split('\n').collect();

    let mut doomed: Vec<usize> = Vec::new();
    scrub_body(&parsed.syntax().body, &index, &source_lines, &mut doomed);

    if doomed.is_empty() {
        return Some(source.to_string());
    }

    let kept: Vec<&str> = source_lines
        .iter()
        .enumerate()
        .filter(|(number, _)| !doomed.contains(&(number + 1)))
        .map(|(_, line)| *line)
        .collect();
    Some(kept.join("\n"))
}

fn scrub_body(body: &[Stmt], index: &LineIndex, source_lines: &[&str], doomed: &mut Vec<usize>) {
    let mut remaining = body.len();
    for child in body {
        if !matches!(child, Stmt::Pass(_)) || remaining <= 1 {
            continue;
        }
        if is_sole_statement_after_docstring(body, child) {
            continue;
        }
        let line = index.line_of(usize::from(child.range().start()));
        // Only drop a line that holds nothing but the pass itself.
        if source_lines
            .get(line - 1)
            .is_some_and(|text| text.trim() == "pass")
        {
            remaining -= 1;
            doomed.push(line);
        }
    }

    for child in body {
        match child {
            Stmt::FunctionDef(func_def) => scrub_body(&func_def.body, index, source_lines, doomed),
            Stmt::ClassDef(class_def) => scrub_body(&class_def.body, index, source_lines, doomed),
            Stmt::With(with_stmt) => scrub_body(&with_stmt.body, index, source_lines, doomed),
            Stmt::For(for_stmt) => {
                scrub_body(&for_stmt.body, index, source_lines, doomed);
                scrub_body(&for_stmt.orelse, index, source_lines, doomed);
            }
            Stmt::While(while_stmt) => {
                scrub_body(&while_stmt.body, index, source_lines, doomed);
                scrub_body(&while_stmt.orelse, index, source_lines, doomed);
            }
            Stmt::If(if_stmt) => {
                scrub_body(&if_stmt.body, index, source_lines, doomed);
                for clause in &if_stmt.elif_else_clauses {
                    scrub_body(&clause.body, index, source_lines, doomed);
                }
            }
            Stmt::Try(try_stmt) => {
                scrub_body(&try_stmt.body, index, source_lines, doomed);
                for handler in &try_stmt.handlers {
                    let ruff_python_ast::ExceptHandler::ExceptHandler(handler) = handler;
                    scrub_body(&handler.body, index, source_lines, doomed);
                }
                scrub_body(&try_stmt.orelse, index, source_lines, doomed);
                scrub_body(&try_stmt.finalbody, index, source_lines, doomed);
            }
            Stmt::Match(match_stmt) => {
                for case in &match_stmt.cases {
                    scrub_body(&case.body, index, source_lines, doomed);
                }
            }
            _ => {}
        }
    }
}

fn is_sole_statement_after_docstring(body: &[Stmt], child: &Stmt) -> bool {
    body.len() == 2
        && matches!(
            &body[0],
            Stmt::Expr(expr) if matches!(expr.value.as_ref(), Expr::StringLiteral(_))
        )
        && body[1].range() == child.range()
}
