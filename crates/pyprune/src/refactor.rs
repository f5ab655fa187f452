//! Per-file cleaning session: analyze usage, decide per imported entry
//! whether it stays, and splice rewritten statements back into the
//! original line buffer.

use std::path::Path;

use log::debug;
use rustc_hash::FxHashSet;

use crate::config::Config;
use crate::directives;
use crate::expand;
use crate::io;
use crate::nodes::{ImportKind, ImportStmt, ImportedName};
use crate::parser::{self, LineIndex};
use crate::report::Report;
use crate::resolver::{ModuleResolver, SearchPaths};
use crate::rewriter::{self, STAR_EXPAND_WRAP_THRESHOLD};
use crate::scan::{SourceAnalyzer, SourceStats};
use crate::side_effects::SideEffectsChecker;

/// What one file's pipeline produced.
enum Outcome {
    Unchanged,
    Changed { content: String, removed: usize },
    /// Failure or safety abort; events were already reported.
    Skipped,
}

/// Drives the pipeline over files. One instance serves a whole run; the
/// resolver and side-effect memos are shared across files, everything
/// else is per file.
#[derive(Debug)]
pub struct Refactor<'a> {
    config: &'a Config,
    resolver: ModuleResolver<'a>,
    side_effects: SideEffectsChecker,
}

impl<'a> Refactor<'a> {
    pub fn new(config: &'a Config, search_paths: &'a SearchPaths) -> Self {
        Self {
            config,
            resolver: ModuleResolver::new(search_paths),
            side_effects: SideEffectsChecker::new(),
        }
    }

    /// Read, clean, and write back (or check/diff) one file. All failures
    /// are reported and contained here.
    pub fn process_file(&mut self, path: &Path, reporter: &mut Report) {
        let write_back = !(self.config.check || self.config.diff);
        let (content, encoding, newline) = match io::safe_read(path, write_back) {
            Ok(read) => read,
            Err(err) => {
                reporter.failure(&err.to_string(), None);
                return;
            }
        };

        if directives::skip_file(&content) {
            reporter.ignored_path(path, "file-level suppression comment");
            return;
        }

        match self.refactor_source(path, &content, reporter) {
            Outcome::Unchanged => reporter.unchanged_file(path),
            Outcome::Skipped => {}
            Outcome::Changed { content: fixed, removed } => {
                if self.config.diff {
                    reporter.print_diff(path, &content, &fixed);
                } else if write_back {
                    if let Err(err) = io::safe_write(path, &fixed, encoding, &newline) {
                        reporter.failure(&err.to_string(), None);
                        return;
                    }
                }
                reporter.changed_file(path, removed);
            }
        }
    }

    /// Run the analysis and rewriting passes over one file's source.
    fn refactor_source(&mut self, path: &Path, content: &str, reporter: &mut Report) -> Outcome {
        let parsed = match parser::parse(content, path) {
            Ok(parsed) => parsed,
            Err(err) => {
                reporter.failure(&err.to_string(), None);
                return Outcome::Skipped;
            }
        };

        let line_index = LineIndex::new(content);
        let facts = SourceAnalyzer::new(&line_index).analyze(parsed.syntax(), content);

        let source_lines: Vec<&str> = content.split('\n').collect();
        let mut buffer = rewriter::line_buffer(content);

        let is_stub = path.extension().is_some_and(|ext| ext == "pyi");
        let is_init = path
            .file_name()
            .is_some_and(|name| name == "__init__.py" || name == "__init__.pyi");
        // Without an __all__ declaration an __init__ file's public surface
        // is implicit, and removing "unused" imports there breaks callers.
        let init_guard = is_init && !facts.has_all && !self.config.disable_all_dunder_policy;

        let mut changed = false;
        let mut removed_count = 0usize;

        for mut stmt in facts.imports {
            let start_line = stmt.location.start.line;
            let first_line = source_lines.get(start_line - 1).copied().unwrap_or("");
            let last_line = source_lines
                .get(stmt.location.end_line - 1)
                .copied()
                .unwrap_or("");

            if directives::skip_import(first_line) || directives::skip_import(last_line) {
                reporter.ignored_import(path, &stmt, "suppression comment");
                continue;
            }

            if stmt.guarded {
                debug!(
                    "{}:{start_line} retained: guarded by import-error handler",
                    path.display()
                );
                continue;
            }

            let skip_listed = match &stmt.kind {
                // Any skip-listed entry protects the whole statement.
                ImportKind::Import => stmt.names.iter().any(|entry| {
                    let top = entry.name.split('.').next().unwrap_or("");
                    self.config.skip_imports.contains(top)
                }),
                ImportKind::ImportFrom { .. } => {
                    let top = stmt.top_level_module();
                    !top.is_empty() && self.config.skip_imports.contains(top)
                }
            };
            if skip_listed {
                reporter.ignored_import(path, &stmt, "skip-imports configuration");
                continue;
            }

            if let Err(err) = rewriter::check_supported(&stmt, &source_lines, path) {
                reporter.failure(&err.to_string(), None);
                continue;
            }

            let was_star = stmt.is_star();
            if was_star && is_stub {
                // Exported stars are part of a stub's public interface.
                continue;
            }
            if was_star && init_guard {
                reporter.init_without_all(path);
                return Outcome::Skipped;
            }

            let mut expanded = false;
            if was_star {
                match expand::expand_import_star(&mut stmt, path, &mut self.resolver) {
                    Ok(()) => expanded = true,
                    Err(err) => {
                        reporter.ignored_import(path, &stmt, &err.to_string());
                        continue;
                    }
                }
            }

            let mut kept: Vec<ImportedName> = Vec::new();
            let mut dropped: Vec<ImportedName> = Vec::new();
            for entry in &stmt.names {
                if self.entry_is_used(entry, &facts.stats, expanded, &facts.names_to_skip, is_stub)
                {
                    kept.push(entry.clone());
                } else if self.removable(path, &stmt, entry) {
                    dropped.push(entry.clone());
                } else {
                    kept.push(entry.clone());
                }
            }

            if init_guard && !dropped.is_empty() {
                reporter.init_without_all(path);
                return Outcome::Skipped;
            }

            let materialize_star = expanded && self.config.expand_star_imports;
            if dropped.is_empty() && !materialize_star {
                continue;
            }

            let survivors;
            let mut force_wrap = false;
            if expanded && !self.config.expand_star_imports {
                if kept.is_empty() {
                    // Nothing the wildcard provides is used anywhere.
                    survivors = Vec::new();
                } else {
                    reporter.ignored_import(path, &stmt, "wildcard import partially used");
                    continue;
                }
            } else {
                if kept.is_empty() && dropped.is_empty() {
                    continue;
                }
                force_wrap = materialize_star && kept.len() > STAR_EXPAND_WRAP_THRESHOLD;
                survivors = kept;
            }

            let style = stmt
                .location
                .is_multiline()
                .then(|| parser::multiline_kind(first_line))
                .flatten();
            let rebuilt = rewriter::rebuild(&stmt, &survivors, style, force_wrap);
            rewriter::splice(&mut buffer, stmt.location, rebuilt);
            changed = true;
            removed_count += dropped.len();

            for entry in &dropped {
                reporter.removed_import(path, &stmt, entry);
            }
            if materialize_star {
                reporter.expanded_star(path, &stmt);
            }
        }

        if !changed {
            return Outcome::Unchanged;
        }

        let rewritten = rewriter::flatten(buffer);
        match rewriter::remove_useless_passes(&rewritten) {
            Some(cleaned) => Outcome::Changed {
                content: cleaned,
                removed: removed_count,
            },
            None => {
                reporter.failure(
                    &format!(
                        "{}: rewritten output failed to parse; file left unchanged",
                        path.display()
                    ),
                    None,
                );
                Outcome::Skipped
            }
        }
    }

    /// Liveness of one bound entry against the file's usage facts.
    fn entry_is_used(
        &self,
        entry: &ImportedName,
        stats: &SourceStats,
        expanded: bool,
        names_to_skip: &FxHashSet<String>,
        is_stub: bool,
    ) -> bool {
        // `import X as X` is the stub re-export idiom; never remove it there.
        if is_stub && entry.is_self_alias() {
            return true;
        }

        let bound = entry.bound_name();
        // A wildcard-provided name whose only "use" is a protected dunder
        // assignment is a local shadow, not an export use.
        if expanded && names_to_skip.contains(bound) {
            return false;
        }
        if has_used(stats, bound) {
            return true;
        }

        // `import a.b.c` binds `a`; a reference to any dotted prefix keeps
        // the whole entry alive.
        if entry.asname.is_none() && entry.name.contains('.') {
            let segments: Vec<&str> = entry.name.split('.').collect();
            for take in 1..segments.len() {
                if has_used(stats, &segments[..take].join(".")) {
                    return true;
                }
            }
        }
        false
    }

    /// Whether an unused entry may actually be dropped.
    fn removable(&mut self, source: &Path, stmt: &ImportStmt, entry: &ImportedName) -> bool {
        if self.config.all {
            return true;
        }
        let status = match &stmt.kind {
            ImportKind::Import => self.side_effects.check_import(
                &mut self.resolver,
                source,
                Some(&entry.name),
                0,
            ),
            ImportKind::ImportFrom { module, level } => self.side_effects.check_import(
                &mut self.resolver,
                source,
                module.as_deref(),
                *level,
            ),
        };
        debug!(
            "{}: side effects of {} -> {status:?}",
            source.display(),
            rewriter::render_statement(stmt, std::slice::from_ref(entry)),
        );
        status.is_removable()
    }
}

/// Dotted liveness: the root must be read as a bare name and every
/// following segment must appear as an attribute access somewhere.
fn has_used(stats: &SourceStats, name: &str) -> bool {
    match name.split_once('.') {
        None => stats.has_name(name),
        Some((root, rest)) => {
            stats.has_name(root) && rest.split('.').all(|segment| stats.has_attr(segment))
        }
    }
}
