//! Inline suppression comments and the include/exclude pattern helpers.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Default pattern for files to process: `.py` and `.pyi`.
pub const INCLUDE_REGEX: &str = r".*\.pyi?$";

/// Default pattern for directories that are never worth descending into.
pub const EXCLUDE_REGEX: &str =
    r"(\.eggs|\.git|\.hg|\.mypy_cache|__pycache__|\.nox|\.tox|\.venv|\.svn|buck-out|build|dist)/";

static SKIP_IMPORT: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"#\s*((noqa\s*:?)|(nopyprune\s*:\s*import)).*")
        .case_insensitive(true)
        .build()
        .expect("skip-import pattern is valid")
});

static SKIP_FILE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"#\s*nopyprune\s*:\s*file.*")
        .case_insensitive(true)
        .build()
        .expect("skip-file pattern is valid")
});

/// `# noqa`, `# noqa: F401`, or `# nopyprune: import` on the line keeps
/// the whole statement untouched.
pub fn skip_import(line: &str) -> bool {
    SKIP_IMPORT.is_match(line)
}

/// A `# nopyprune: file` comment anywhere skips the entire file.
pub fn skip_file(source: &str) -> bool {
    SKIP_FILE.is_match(source)
}

/// Compile a user-supplied include/exclude pattern, naming the option in
/// the failure message. Patterns are anchored so that entry names must
/// match in full.
pub fn safe_compile(pattern: &str, option: &str) -> Result<Regex> {
    RegexBuilder::new(&format!("^(?:{pattern})$"))
        .case_insensitive(true)
        .build()
        .with_context(|| format!("invalid regular expression for --{option}: {pattern:?}"))
}

/// Entry names are matched in full, directories with a trailing `/`.
pub fn is_included(name: &str, regex: &Regex) -> bool {
    regex.is_match(name)
}

pub fn is_excluded(name: &str, regex: &Regex) -> bool {
    is_included(name, regex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_import_matches_noqa_variants() {
        assert!(skip_import("import os  # noqa"));
        assert!(skip_import("import os  # NOQA: F401"));
        assert!(skip_import("import os  # nopyprune: import"));
        assert!(skip_import("import os  #nopyprune:import"));
        assert!(!skip_import("import os  # a comment"));
        assert!(!skip_import("import os"));
    }

    #[test]
    fn skip_file_matches_anywhere() {
        assert!(skip_file("x = 1\n# nopyprune: file\nimport os\n"));
        assert!(!skip_file("x = 1\n# nopyprune: import\n"));
    }

    #[test]
    fn include_is_a_full_match() {
        let regex = safe_compile(INCLUDE_REGEX, "include").expect("default compiles");
        assert!(is_included("mod.py", &regex));
        assert!(is_included("mod.pyi", &regex));
        assert!(!is_included("mod.pyc", &regex));
        assert!(!is_included("mod.py.bak", &regex));
    }

    #[test]
    fn exclude_matches_directories() {
        let regex = safe_compile(EXCLUDE_REGEX, "exclude").expect("default compiles");
        assert!(is_excluded("__pycache__/", &regex));
        assert!(is_excluded(".venv/", &regex));
        assert!(!is_excluded("src/", &regex));
    }

    #[test]
    fn invalid_pattern_is_reported_with_its_option() {
        let err = safe_compile("(", "exclude").unwrap_err();
        assert!(format!("{err:#}").contains("--exclude"));
    }
}
