//! Event sink and counters for everything a run observes. Owns all the
//! user-facing phrasing; the pipeline just calls one method per event.

use std::fmt;
use std::path::Path;

use crate::config::Config;
use crate::nodes::{ImportStmt, ImportedName};
use crate::rewriter;

/// Nothing to do.
pub const EXIT_CLEAN: u8 = 0;
/// At least one file would change under --check/--diff.
pub const EXIT_CHANGES: u8 = 1;
/// Tool malfunction, distinct from legitimate findings.
pub const EXIT_FAILURE: u8 = 250;

#[derive(Debug, Default)]
pub struct Report {
    check: bool,
    diff: bool,
    verbose: bool,
    quiet: bool,
    silence: bool,

    removed_imports: usize,
    expanded_stars: usize,
    changed_files: usize,
    unchanged_files: usize,
    ignored_paths: usize,
    ignored_imports: usize,
    failures: usize,
}

impl Report {
    pub fn new(config: &Config) -> Self {
        Self {
            check: config.check,
            diff: config.diff,
            verbose: config.verbose,
            quiet: config.quiet,
            silence: config.silence,
            ..Self::default()
        }
    }

    fn location_of(stmt: &ImportStmt, source: &Path) -> String {
        format!(
            "{}:{}:{}",
            source.display(),
            stmt.location.start.line,
            stmt.location.start.col
        )
    }

    /// One import entry was (or would be) removed.
    pub fn removed_import(&mut self, source: &Path, stmt: &ImportStmt, entry: &ImportedName) {
        if !(self.diff || self.quiet || self.silence) {
            let statement = rewriter::render_statement(stmt, std::slice::from_ref(entry));
            let verb = if self.check {
                "would be removed"
            } else {
                "removed"
            };
            println!(
                "{statement} {verb} from {}",
                Self::location_of(stmt, source)
            );
        }
        self.removed_imports += 1;
    }

    /// A wildcard import was materialized into explicit names.
    pub fn expanded_star(&mut self, source: &Path, stmt: &ImportStmt) {
        if !(self.diff || self.quiet || self.silence) {
            let verb = if self.check {
                "would be expanded"
            } else {
                "expanded"
            };
            println!(
                "import star {verb} at {}",
                Self::location_of(stmt, source)
            );
        }
        self.expanded_stars += 1;
    }

    pub fn changed_file(&mut self, source: &Path, removed_imports: usize) {
        if !(self.diff || self.silence) {
            let s = if removed_imports == 1 { "" } else { "s" };
            let verb = if self.check { "would be removed" } else { "removed" };
            println!(
                "{removed_imports} import{s} {verb} from {}",
                source.display()
            );
        }
        self.changed_files += 1;
    }

    pub fn unchanged_file(&mut self, source: &Path) {
        if self.verbose && !self.silence {
            println!("{} has no unused imports", source.display());
        }
        self.unchanged_files += 1;
    }

    /// A path was skipped before analysis (exclude pattern, gitignore,
    /// file-level suppression).
    pub fn ignored_path(&mut self, path: &Path, reason: &str) {
        if self.verbose && !self.silence {
            eprintln!("{} ignored: {reason}", path.display());
        }
        self.ignored_paths += 1;
    }

    /// A statement was left untouched on purpose.
    pub fn ignored_import(&mut self, source: &Path, stmt: &ImportStmt, reason: &str) {
        if self.verbose && !self.silence {
            let statement = rewriter::render_statement(stmt, &stmt.names);
            eprintln!(
                "{statement} at {} ignored: {reason}",
                Self::location_of(stmt, source)
            );
        }
        self.ignored_imports += 1;
    }

    /// An `__init__.py` without `__all__` had removal candidates; the
    /// whole file is left alone.
    pub fn init_without_all(&mut self, path: &Path) {
        if !self.silence {
            eprintln!(
                "{} skipped: no __all__ declared, so its imports may be implicit re-exports \
                 (use --disable-all-dunder-policy to rewrite it anyway)",
                path.display()
            );
        }
        self.ignored_paths += 1;
    }

    /// File- or statement-scoped malfunction.
    pub fn failure(&mut self, message: &str, source: Option<&Path>) {
        if !self.silence {
            match source {
                Some(source) => eprintln!("{} {message}", source.display()),
                None => eprintln!("{message}"),
            }
        }
        self.failures += 1;
    }

    /// Minimal unified-style diff: one hunk covering everything between
    /// the common prefix and suffix.
    pub fn print_diff(&self, path: &Path, original: &str, fixed: &str) {
        if self.silence {
            return;
        }
        let old: Vec<&str> = original.split('\n').collect();
        let new: Vec<&str> = fixed.split('\n').collect();

        let prefix = old
            .iter()
            .zip(new.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let max_suffix = old.len().min(new.len()) - prefix;
        let suffix = old
            .iter()
            .rev()
            .zip(new.iter().rev())
            .take_while(|(a, b)| a == b)
            .count()
            .min(max_suffix);

        println!("--- {}", path.display());
        println!("+++ {} (fixed)", path.display());
        println!(
            "@@ -{},{} +{},{} @@",
            prefix + 1,
            old.len() - prefix - suffix,
            prefix + 1,
            new.len() - prefix - suffix
        );
        for line in &old[prefix..old.len() - suffix] {
            println!("-{line}");
        }
        for line in &new[prefix..new.len() - suffix] {
            println!("+{line}");
        }
    }

    pub fn exit_code(&self) -> u8 {
        if self.failures > 0 {
            EXIT_FAILURE
        } else if (self.check || self.diff) && self.changed_files > 0 {
            EXIT_CHANGES
        } else {
            EXIT_CLEAN
        }
    }

    pub fn changed_files(&self) -> usize {
        self.changed_files
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn removed_imports(&self) -> usize {
        self.removed_imports
    }

    pub fn expanded_stars(&self) -> usize {
        self.expanded_stars
    }

    pub fn ignored_imports(&self) -> usize {
        self.ignored_imports
    }

    pub fn ignored_paths(&self) -> usize {
        self.ignored_paths
    }

    pub fn unchanged_files(&self) -> usize {
        self.unchanged_files
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dry_run = self.check || self.diff;
        let (removed, changed, unchanged) = if dry_run {
            ("would be removed", "would be changed", "would be left unchanged")
        } else {
            ("removed", "changed", "left unchanged")
        };

        let mut parts: Vec<String> = Vec::new();
        if self.removed_imports > 0 {
            let s = if self.removed_imports == 1 { "" } else { "s" };
            parts.push(format!("{} import{s} {removed}", self.removed_imports));
        }
        if self.expanded_stars > 0 {
            let s = if self.expanded_stars == 1 { "" } else { "s" };
            parts.push(format!("{} import star{s} expanded", self.expanded_stars));
        }
        if self.changed_files > 0 {
            let s = if self.changed_files == 1 { "" } else { "s" };
            parts.push(format!("{} file{s} {changed}", self.changed_files));
        }
        if self.unchanged_files > 0 {
            let s = if self.unchanged_files == 1 { "" } else { "s" };
            parts.push(format!("{} file{s} {unchanged}", self.unchanged_files));
        }
        if self.failures > 0 {
            let s = if self.failures == 1 { "" } else { "s" };
            parts.push(format!("{} file{s} failed to be cleaned", self.failures));
        }
        if self.verbose {
            if self.ignored_imports > 0 {
                let s = if self.ignored_imports == 1 { "" } else { "s" };
                parts.push(format!("{} import{s} ignored", self.ignored_imports));
            }
            if self.ignored_paths > 0 {
                let s = if self.ignored_paths == 1 { "" } else { "s" };
                parts.push(format!("{} path{s} ignored", self.ignored_paths));
            }
        }

        if parts.is_empty() {
            write!(f, "Nothing to do")
        } else {
            write!(f, "{}.", parts.join(", "))
        }
    }
}
