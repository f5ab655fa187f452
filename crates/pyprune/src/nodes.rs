//! Located import-statement records, decoupled from the parser's node types
//! so statements can be keyed, mutated, and rebuilt independently of the
//! syntax tree they came from.

/// A point in a source file. Line numbers are 1-indexed, columns 0-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodePosition {
    pub line: usize,
    pub col: usize,
}

/// The span of one statement: start position plus end line.
///
/// Two import statements never share a location, so this is also the
/// statement's identity for set membership and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeLocation {
    pub start: NodePosition,
    pub end_line: usize,
}

impl NodeLocation {
    pub fn new(start_line: usize, start_col: usize, end_line: usize) -> Self {
        debug_assert!(end_line >= start_line);
        Self {
            start: NodePosition {
                line: start_line,
                col: start_col,
            },
            end_line,
        }
    }

    /// Number of source lines the statement spans.
    pub fn line_count(&self) -> usize {
        self.end_line - self.start.line + 1
    }

    pub fn is_multiline(&self) -> bool {
        self.end_line > self.start.line
    }
}

/// One `name` or `name as alias` entry of an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedName {
    pub name: String,
    pub asname: Option<String>,
}

impl ImportedName {
    pub fn new(name: impl Into<String>, asname: Option<String>) -> Self {
        Self {
            name: name.into(),
            asname,
        }
    }

    /// The identifier this entry binds into scope: the alias when present,
    /// otherwise the imported name itself (whose first segment is what a
    /// dotted `import a.b.c` actually binds).
    pub fn bound_name(&self) -> &str {
        self.asname.as_deref().unwrap_or(&self.name)
    }

    /// `import X as X` and `from m import X as X`, the re-export idiom in
    /// stub files.
    pub fn is_self_alias(&self) -> bool {
        self.asname.as_deref() == Some(self.name.as_str())
    }

    pub fn is_star(&self) -> bool {
        self.name == "*"
    }
}

/// The two statement forms that bind imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    /// `import a.b, c as d`
    Import,
    /// `from .pkg.mod import x, y as z` with `level` leading dots.
    ImportFrom { module: Option<String>, level: u32 },
}

/// A collected import statement. `id` is assigned in collection order and
/// stays stable for the whole session, so downstream passes key decisions
/// by it instead of hashing mutable nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStmt {
    pub id: usize,
    pub location: NodeLocation,
    pub names: Vec<ImportedName>,
    pub kind: ImportKind,
    /// Set when the statement sits in a `try` block guarded by an
    /// import-related `except` handler.
    pub guarded: bool,
}

impl ImportStmt {
    /// The module path as written after `from`, dots included.
    /// Empty for plain `import` statements.
    pub fn relative_name(&self) -> String {
        match &self.kind {
            ImportKind::Import => String::new(),
            ImportKind::ImportFrom { module, level } => {
                let dots = ".".repeat(*level as usize);
                match module {
                    Some(module) => format!("{dots}{module}"),
                    None => dots,
                }
            }
        }
    }

    pub fn is_star(&self) -> bool {
        matches!(self.kind, ImportKind::ImportFrom { .. })
            && self.names.len() == 1
            && self.names[0].is_star()
    }

    /// Top-level package name of the statement's target, used for
    /// skip-list matching. For `from . import x` this is empty.
    pub fn top_level_module(&self) -> &str {
        let module = match &self.kind {
            ImportKind::Import => self.names.first().map(|n| n.name.as_str()).unwrap_or(""),
            ImportKind::ImportFrom { module, .. } => module.as_deref().unwrap_or(""),
        };
        module.split('.').next().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_stmt(module: Option<&str>, level: u32, names: &[(&str, Option<&str>)]) -> ImportStmt {
        ImportStmt {
            id: 0,
            location: NodeLocation::new(1, 0, 1),
            names: names
                .iter()
                .map(|(n, a)| ImportedName::new(*n, a.map(str::to_string)))
                .collect(),
            kind: ImportKind::ImportFrom {
                module: module.map(str::to_string),
                level,
            },
            guarded: false,
        }
    }

    #[test]
    fn bound_name_prefers_alias() {
        let plain = ImportedName::new("os.path", None);
        assert_eq!(plain.bound_name(), "os.path");

        let aliased = ImportedName::new("os.path", Some("ospath".to_string()));
        assert_eq!(aliased.bound_name(), "ospath");
    }

    #[test]
    fn self_alias_detection() {
        assert!(ImportedName::new("x", Some("x".to_string())).is_self_alias());
        assert!(!ImportedName::new("x", Some("y".to_string())).is_self_alias());
        assert!(!ImportedName::new("x", None).is_self_alias());
    }

    #[test]
    fn relative_name_renders_level_dots() {
        assert_eq!(from_stmt(Some("pkg.mod"), 0, &[("x", None)]).relative_name(), "pkg.mod");
        assert_eq!(from_stmt(Some("mod"), 2, &[("x", None)]).relative_name(), "..mod");
        assert_eq!(from_stmt(None, 1, &[("x", None)]).relative_name(), ".");
    }

    #[test]
    fn star_detection() {
        assert!(from_stmt(Some("pkg"), 0, &[("*", None)]).is_star());
        assert!(!from_stmt(Some("pkg"), 0, &[("x", None), ("*", None)]).is_star());
    }

    #[test]
    fn top_level_module_for_both_kinds() {
        let import = ImportStmt {
            id: 0,
            location: NodeLocation::new(1, 0, 1),
            names: vec![ImportedName::new("os.path", None)],
            kind: ImportKind::Import,
            guarded: false,
        };
        assert_eq!(import.top_level_module(), "os");
        assert_eq!(from_stmt(Some("a.b.c"), 0, &[("x", None)]).top_level_module(), "a");
    }

    #[test]
    fn location_line_count() {
        let loc = NodeLocation::new(3, 4, 6);
        assert_eq!(loc.line_count(), 4);
        assert!(loc.is_multiline());
        assert!(!NodeLocation::new(3, 0, 3).is_multiline());
    }
}
