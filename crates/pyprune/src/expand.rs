//! Wildcard import expansion: resolve the target module, compute the names
//! it actually provides, and repopulate the statement with them.

use std::fs;
use std::path::Path;

use indexmap::IndexSet;
use ruff_python_ast::{self as ast, Expr, ModModule, Stmt};

use crate::error::PypruneError;
use crate::nodes::{ImportKind, ImportStmt, ImportedName};
use crate::parser;
use crate::resolver::{ModuleResolver, is_compiled};

/// Nested wildcard chains (a star import whose target itself star-imports)
/// stop being followed past this depth.
const MAX_EXPANSION_DEPTH: usize = 5;

/// Replace the statement's single `*` entry with one entry per exported
/// name. Order is the collection order of the export set, not source
/// order. Fails with a reason when the target cannot be inspected.
pub fn expand_import_star(
    stmt: &mut ImportStmt,
    source: &Path,
    resolver: &mut ModuleResolver<'_>,
) -> Result<(), PypruneError> {
    let ImportKind::ImportFrom { module, level } = &stmt.kind else {
        return Ok(());
    };
    let module = module.clone();
    let level = *level;

    let unexpandable = |reason: String| PypruneError::UnexpandableImportStar {
        path: source.to_path_buf(),
        line: stmt.location.start.line,
        column: stmt.location.start.col,
        reason,
    };

    let Some(path) = resolver.resolve_import_from(source, module.as_deref(), level) else {
        return Err(unexpandable("module not found".to_string()));
    };
    if is_compiled(&path) {
        return Err(unexpandable(format!(
            "cannot inspect compiled module at {}",
            path.display()
        )));
    }

    let importables = collect_importables(&path, resolver, 0).map_err(unexpandable)?;

    stmt.names.clear();
    for name in importables {
        stmt.names.push(ImportedName::new(name, None));
    }
    Ok(())
}

/// Parse the module at `path` and list its importable names.
fn collect_importables(
    path: &Path,
    resolver: &mut ModuleResolver<'_>,
    depth: usize,
) -> Result<IndexSet<String>, String> {
    if depth >= MAX_EXPANSION_DEPTH {
        return Err("wildcard expansion nested too deeply".to_string());
    }
    let source = fs::read_to_string(path).map_err(|err| err.to_string())?;
    let parsed = parser::parse(&source, path).map_err(|err| err.to_string())?;

    let mut analyzer = ImportablesAnalyzer {
        importables: IndexSet::new(),
        has_all: false,
        path,
        resolver,
        depth,
    };
    analyzer.collect(parsed.syntax());

    let mut importables = analyzer.importables;
    let has_all = analyzer.has_all;

    // A package entry file also re-exports its sibling modules, unless an
    // explicit `__all__` pins the public surface.
    if !has_all && path.file_name().is_some_and(|name| name == "__init__.py") {
        collect_sibling_modules(path, &mut importables);
    }

    Ok(importables)
}

/// Tracks exports rather than uses: module-level definitions, assignment
/// targets, and import bindings. Once any `__all__` assignment is seen,
/// only `__all__` names are exported and everything else is discarded.
struct ImportablesAnalyzer<'r, 'sp, 'p> {
    importables: IndexSet<String>,
    has_all: bool,
    path: &'p Path,
    resolver: &'r mut ModuleResolver<'sp>,
    depth: usize,
}

impl ImportablesAnalyzer<'_, '_, '_> {
    fn collect(&mut self, module: &ModModule) {
        self.collect_body(&module.body);
    }

    fn collect_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            if self.has_all {
                // Only further `__all__` mutations still matter.
                self.collect_all_mutations(stmt);
                continue;
            }
            self.collect_stmt(stmt);
        }
    }

    fn collect_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(func_def) => {
                self.importables.insert(func_def.name.to_string());
            }
            Stmt::ClassDef(class_def) => {
                self.importables.insert(class_def.name.to_string());
            }
            Stmt::Assign(assign) => {
                if self.is_all_assignment(assign) {
                    return;
                }
                for target in &assign.targets {
                    self.collect_target(target);
                }
            }
            Stmt::AnnAssign(ann_assign) => self.collect_target(&ann_assign.target),
            Stmt::Import(import_stmt) => {
                for alias in &import_stmt.names {
                    let bound = match &alias.asname {
                        Some(asname) => asname.as_str(),
                        // Dotted `import a.b` binds only the root.
                        None => alias.name.as_str().split('.').next().unwrap_or(""),
                    };
                    if !bound.is_empty() {
                        self.importables.insert(bound.to_string());
                    }
                }
            }
            Stmt::ImportFrom(import_from) => self.collect_import_from(import_from),
            // Conditional and guarded definitions still bind at module
            // level when their branch runs.
            Stmt::If(if_stmt) => {
                self.collect_body(&if_stmt.body);
                for clause in &if_stmt.elif_else_clauses {
                    self.collect_body(&clause.body);
                }
            }
            Stmt::Try(try_stmt) => {
                self.collect_body(&try_stmt.body);
                for handler in &try_stmt.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    self.collect_body(&handler.body);
                }
                self.collect_body(&try_stmt.orelse);
                self.collect_body(&try_stmt.finalbody);
            }
            Stmt::With(with_stmt) => self.collect_body(&with_stmt.body),
            Stmt::For(for_stmt) => {
                self.collect_body(&for_stmt.body);
                self.collect_body(&for_stmt.orelse);
            }
            Stmt::While(while_stmt) => {
                self.collect_body(&while_stmt.body);
                self.collect_body(&while_stmt.orelse);
            }
            _ => {}
        }
    }

    fn collect_import_from(&mut self, import_from: &ast::StmtImportFrom) {
        if import_from.module.as_ref().is_some_and(|m| m.as_str() == "__future__") {
            return;
        }
        let is_star =
            import_from.names.len() == 1 && import_from.names[0].name.as_str() == "*";
        if is_star {
            // Re-exported wildcard: pull in the nested module's names too.
            let resolved = self.resolver.resolve_import_from(
                self.path,
                import_from.module.as_ref().map(|m| m.as_str()),
                import_from.level,
            );
            if let Some(target) = resolved {
                if !is_compiled(&target) {
                    if let Ok(nested) =
                        collect_importables(&target, self.resolver, self.depth + 1)
                    {
                        self.importables.extend(nested);
                    }
                }
            }
            return;
        }
        for alias in &import_from.names {
            let bound = alias
                .asname
                .as_ref()
                .map(|a| a.as_str())
                .unwrap_or(alias.name.as_str());
            self.importables.insert(bound.to_string());
        }
    }

    fn collect_target(&mut self, target: &Expr) {
        match target {
            Expr::Name(name) => {
                self.importables.insert(name.id.to_string());
            }
            Expr::Tuple(tuple) => {
                for element in &tuple.elts {
                    self.collect_target(element);
                }
            }
            Expr::List(list) => {
                for element in &list.elts {
                    self.collect_target(element);
                }
            }
            Expr::Starred(starred) => self.collect_target(&starred.value),
            _ => {}
        }
    }

    fn is_all_assignment(&mut self, assign: &ast::StmtAssign) -> bool {
        let is_all = assign
            .targets
            .iter()
            .any(|target| matches!(target, Expr::Name(name) if name.id.as_str() == "__all__"));
        if is_all {
            self.has_all = true;
            self.importables.clear();
            collect_string_elements(&assign.value, &mut self.importables);
        }
        is_all
    }

    fn collect_all_mutations(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign(assign) => {
                if assign
                    .targets
                    .iter()
                    .any(|t| matches!(t, Expr::Name(name) if name.id.as_str() == "__all__"))
                {
                    self.importables.clear();
                    collect_string_elements(&assign.value, &mut self.importables);
                }
            }
            Stmt::AugAssign(aug_assign) => {
                if matches!(aug_assign.target.as_ref(), Expr::Name(name) if name.id.as_str() == "__all__")
                    && matches!(aug_assign.op, ast::Operator::Add)
                {
                    collect_string_elements(&aug_assign.value, &mut self.importables);
                }
            }
            Stmt::Expr(expr_stmt) => {
                let Expr::Call(call) = expr_stmt.value.as_ref() else {
                    return;
                };
                let Expr::Attribute(attr) = call.func.as_ref() else {
                    return;
                };
                if !matches!(attr.value.as_ref(), Expr::Name(name) if name.id.as_str() == "__all__")
                {
                    return;
                }
                match attr.attr.as_str() {
                    "append" => {
                        for arg in &call.arguments.args {
                            if let Expr::StringLiteral(literal) = arg {
                                self.importables.insert(literal.value.to_str().to_string());
                            }
                        }
                    }
                    "extend" => {
                        if let Some(first) = call.arguments.args.first() {
                            collect_string_elements(first, &mut self.importables);
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

/// String elements of list/tuple/set literals, flattening `+` chains.
fn collect_string_elements(expr: &Expr, out: &mut IndexSet<String>) {
    match expr {
        Expr::List(list) => {
            for element in &list.elts {
                collect_string_elements(element, out);
            }
        }
        Expr::Tuple(tuple) => {
            for element in &tuple.elts {
                collect_string_elements(element, out);
            }
        }
        Expr::Set(set) => {
            for element in &set.elts {
                collect_string_elements(element, out);
            }
        }
        Expr::BinOp(binop) if matches!(binop.op, ast::Operator::Add) => {
            collect_string_elements(&binop.left, out);
            collect_string_elements(&binop.right, out);
        }
        Expr::StringLiteral(literal) => {
            out.insert(literal.value.to_str().to_string());
        }
        _ => {}
    }
}

/// Sibling `.py` files and packages next to an `__init__.py` are
/// submodules a wildcard import may re-export.
fn collect_sibling_modules(init_file: &Path, importables: &mut IndexSet<String>) {
    let Some(package_dir) = init_file.parent() else {
        return;
    };
    let Ok(entries) = fs::read_dir(package_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let path = entry.path();
        if path.is_dir() {
            if path.join("__init__.py").is_file() {
                importables.insert(name.to_string());
            }
        } else if let Some(stem) = name.strip_suffix(".py") {
            if stem != "__init__" && !stem.is_empty() {
                importables.insert(stem.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::NodeLocation;
    use crate::resolver::SearchPaths;
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(path, content).expect("write fixture");
    }

    fn star_stmt(module: &str) -> ImportStmt {
        ImportStmt {
            id: 0,
            location: NodeLocation::new(1, 0, 1),
            names: vec![ImportedName::new("*", None)],
            kind: ImportKind::ImportFrom {
                module: Some(module.to_string()),
                level: 0,
            },
            guarded: false,
        }
    }

    #[test]
    fn expands_to_module_definitions_and_assignments() {
        let tree = TempDir::new().expect("tempdir");
        let root = tree.path();
        write(
            &root.join("pkg.py"),
            "CONST = 1\n\ndef helper():\n    pass\n\nclass Widget:\n    pass\n",
        );
        write(&root.join("main.py"), "from pkg import *\n");

        let search_paths = SearchPaths::empty(10);
        let mut resolver = ModuleResolver::new(&search_paths);
        let mut stmt = star_stmt("pkg");
        expand_import_star(&mut stmt, &root.join("main.py"), &mut resolver).expect("expands");

        let names: Vec<&str> = stmt.names.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["CONST", "helper", "Widget"]);
    }

    #[test]
    fn all_declaration_pins_the_export_set() {
        let tree = TempDir::new().expect("tempdir");
        let root = tree.path();
        write(
            &root.join("pkg.py"),
            "__all__ = [\"a\", \"b\"]\n\ndef a():\n    pass\n\ndef hidden():\n    pass\n",
        );
        write(&root.join("main.py"), "from pkg import *\n");

        let search_paths = SearchPaths::empty(10);
        let mut resolver = ModuleResolver::new(&search_paths);
        let mut stmt = star_stmt("pkg");
        expand_import_star(&mut stmt, &root.join("main.py"), &mut resolver).expect("expands");

        let names: Vec<&str> = stmt.names.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn init_file_exports_sibling_modules() {
        let tree = TempDir::new().expect("tempdir");
        let root = tree.path();
        write(&root.join("pkg/__init__.py"), "VERSION = \"1.0\"\n");
        write(&root.join("pkg/util.py"), "def u():\n    pass\n");
        write(&root.join("pkg/sub/__init__.py"), "");
        write(&root.join("main.py"), "from pkg import *\n");

        let search_paths = SearchPaths::empty(10);
        let mut resolver = ModuleResolver::new(&search_paths);
        let mut stmt = star_stmt("pkg");
        expand_import_star(&mut stmt, &root.join("main.py"), &mut resolver).expect("expands");

        let names: Vec<&str> = stmt.names.iter().map(|n| n.name.as_str()).collect();
        assert!(names.contains(&"VERSION"));
        assert!(names.contains(&"util"));
        assert!(names.contains(&"sub"));
    }

    #[test]
    fn guarded_conditional_definitions_are_exported() {
        let tree = TempDir::new().expect("tempdir");
        let root = tree.path();
        write(
            &root.join("pkg.py"),
            "try:\n    from fast import loads\nexcept ImportError:\n    def loads(s):\n        return s\n",
        );
        write(&root.join("main.py"), "from pkg import *\n");

        let search_paths = SearchPaths::empty(10);
        let mut resolver = ModuleResolver::new(&search_paths);
        let mut stmt = star_stmt("pkg");
        expand_import_star(&mut stmt, &root.join("main.py"), &mut resolver).expect("expands");

        let names: Vec<&str> = stmt.names.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["loads"]);
    }

    #[test]
    fn unresolvable_module_reports_not_found() {
        let tree = TempDir::new().expect("tempdir");
        let root = tree.path();
        write(&root.join("main.py"), "from nowhere import *\n");

        let search_paths = SearchPaths::empty(10);
        let mut resolver = ModuleResolver::new(&search_paths);
        let mut stmt = star_stmt("nowhere");
        let err = expand_import_star(&mut stmt, &root.join("main.py"), &mut resolver).unwrap_err();
        assert!(err.to_string().contains("module not found"));
        // The statement still holds its star entry.
        assert!(stmt.is_star());
    }
}
