use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced while cleaning a single file or statement.
///
/// Every variant is scoped to one file or one statement; none of them
/// aborts the overall run. Callers report the error and move on.
#[derive(Debug, Error)]
pub enum PypruneError {
    #[error("{}: Permission denied [READ] [Errno 13]", .path.display())]
    ReadPermission { path: PathBuf },

    #[error("{}: Permission denied [WRITE] [Errno 13]", .path.display())]
    WritePermission { path: PathBuf },

    #[error("{}: `__init__.py` file does not exist [Errno 2]", .path.display())]
    InitFileDoesNotExist { path: PathBuf },

    /// Syntax error, encoding conflict, null bytes, or any other reason
    /// the file cannot be turned into a syntax tree.
    #[error("{}{} {reason}{}", .path.display(), format_location(.line, .column), format_snippet(.text.as_deref()))]
    UnparsableFile {
        path: PathBuf,
        line: Option<usize>,
        column: Option<usize>,
        reason: String,
        /// Offending source line, when one can be pointed at.
        text: Option<String>,
    },

    /// A wildcard import whose target cannot be resolved or analyzed.
    #[error("{}:{line}:{column} UnexpandableImportStar: {reason}", .path.display())]
    UnexpandableImportStar {
        path: PathBuf,
        line: usize,
        column: usize,
        reason: String,
    },

    /// Statement forms the rewriter refuses to touch, like
    /// `import a; import b` or `if x: import y`.
    #[error("{}:{line}:{column} UnsupportedCase: {reason}", .path.display())]
    UnsupportedCase {
        path: PathBuf,
        line: usize,
        column: usize,
        reason: String,
    },
}

fn format_location(line: &Option<usize>, column: &Option<usize>) -> String {
    match (*line, *column) {
        (Some(line), Some(column)) => format!(":{line}:{column}"),
        (Some(line), None) => format!(":{line}"),
        _ => String::new(),
    }
}

fn format_snippet(text: Option<&str>) -> String {
    match text {
        Some(text) => format!(" {:?}", text.trim()),
        None => String::new(),
    }
}

impl PypruneError {
    /// True for failures that leave a single statement untouched while the
    /// rest of the file is still processed.
    pub fn is_statement_scoped(&self) -> bool {
        matches!(
            self,
            Self::UnexpandableImportStar { .. } | Self::UnsupportedCase { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_message_includes_location_and_snippet() {
        let err = PypruneError::UnparsableFile {
            path: PathBuf::from("pkg/mod.py"),
            line: Some(3),
            column: Some(7),
            reason: "SyntaxError: invalid syntax".to_string(),
            text: Some("import os,\n".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "pkg/mod.py:3:7 SyntaxError: invalid syntax \"import os,\""
        );
    }

    #[test]
    fn unparsable_message_without_location() {
        let err = PypruneError::UnparsableFile {
            path: PathBuf::from("mod.py"),
            line: None,
            column: None,
            reason: "source code containing null bytes".to_string(),
            text: None,
        };
        assert_eq!(err.to_string(), "mod.py source code containing null bytes");
    }

    #[test]
    fn statement_scoped_classification() {
        let star = PypruneError::UnexpandableImportStar {
            path: PathBuf::from("a.py"),
            line: 1,
            column: 0,
            reason: "module not found".to_string(),
        };
        assert!(star.is_statement_scoped());

        let read = PypruneError::ReadPermission {
            path: PathBuf::from("a.py"),
        };
        assert!(!read.is_statement_scoped());
    }
}
