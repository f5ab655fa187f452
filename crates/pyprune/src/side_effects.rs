//! Decides whether importing a module executes observable code: any call
//! at module level, or a transitive import of a module that does.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use ruff_python_ast::{self as ast, Expr, Stmt};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::parser;
use crate::resolver::{IMPORTS_WITH_SIDE_EFFECTS, ModuleResolver, is_compiled};

/// Import side-effect classification. `Yes` is sticky for the whole import
/// statement; `Unknown` and `Maybe` are treated as "has side effects" when
/// deciding removals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffects {
    Yes,
    Maybe,
    No,
    NotAModule,
    Unknown,
}

impl SideEffects {
    /// True when the classification allows removing an unused import.
    pub fn is_removable(self) -> bool {
        matches!(self, Self::No | Self::NotAModule)
    }
}

/// Transitive import inspection stops degrading to `Unknown` past this
/// many nested module resolutions.
pub const MAX_RESOLUTION_DEPTH: usize = 5;

/// Memoizing checker shared across one process run. The memo is keyed by
/// resolved file path; modules whose analysis is still in flight (cyclic
/// self-imports) read back as `Unknown` instead of recursing forever.
#[derive(Debug, Default)]
pub struct SideEffectsChecker {
    memo: FxHashMap<PathBuf, SideEffects>,
    in_flight: FxHashSet<PathBuf>,
}

impl SideEffectsChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify the module imported by `source` as `module` (with
    /// `level` leading dots for relative imports).
    pub fn check_import(
        &mut self,
        resolver: &mut ModuleResolver<'_>,
        source: &Path,
        module: Option<&str>,
        level: u32,
    ) -> SideEffects {
        if level == 0 {
            let Some(module) = module else {
                return SideEffects::Unknown;
            };
            let top = module.split('.').next().unwrap_or(module);
            if IMPORTS_WITH_SIDE_EFFECTS.contains(top) {
                return SideEffects::Yes;
            }
            // Standard library modules are assumed effect-free without
            // reading their source.
            if resolver.search_paths().is_stdlib_module(top) {
                return SideEffects::No;
            }
        }

        match resolver.resolve_import_from(source, module, level) {
            None => SideEffects::Unknown,
            Some(path) if is_compiled(&path) => SideEffects::NotAModule,
            Some(path) => self.check_path(resolver, &path, 0),
        }
    }

    fn check_path(
        &mut self,
        resolver: &mut ModuleResolver<'_>,
        path: &Path,
        depth: usize,
    ) -> SideEffects {
        if let Some(&status) = self.memo.get(path) {
            return status;
        }
        if depth >= MAX_RESOLUTION_DEPTH {
            debug!("Resolution depth cap hit at {}", path.display());
            return SideEffects::Unknown;
        }
        if !self.in_flight.insert(path.to_path_buf()) {
            debug!("Cyclic import chain through {}", path.display());
            return SideEffects::Unknown;
        }

        let status = self.analyze_file(resolver, path, depth);
        self.in_flight.remove(path);
        self.memo.insert(path.to_path_buf(), status);
        status
    }

    fn analyze_file(
        &mut self,
        resolver: &mut ModuleResolver<'_>,
        path: &Path,
        depth: usize,
    ) -> SideEffects {
        let Ok(source) = fs::read_to_string(path) else {
            return SideEffects::Unknown;
        };
        let Ok(parsed) = parser::parse(&source, path) else {
            return SideEffects::Unknown;
        };

        let analysis = SideEffectsAnalyzer::analyze(parsed.syntax());
        if analysis.has_module_level_call {
            return SideEffects::Yes;
        }

        let mut status = SideEffects::No;
        for (module, level) in &analysis.imports {
            let top = module.split('.').next().unwrap_or(module);
            if IMPORTS_WITH_SIDE_EFFECTS.contains(top) {
                return SideEffects::Yes;
            }
            if *level == 0 && resolver.search_paths().is_stdlib_module(top) {
                continue;
            }
            let module = (!module.is_empty()).then_some(module.as_str());
            match resolver.resolve_import_from(path, module, *level) {
                None => status = SideEffects::Maybe,
                Some(target) if is_compiled(&target) => {}
                Some(target) => match self.check_path(resolver, &target, depth + 1) {
                    SideEffects::Yes => return SideEffects::Yes,
                    SideEffects::Maybe | SideEffects::Unknown => status = SideEffects::Maybe,
                    SideEffects::No | SideEffects::NotAModule => {}
                },
            }
        }
        status
    }
}

/// Collects the facts `SideEffectsChecker` needs from one module: whether
/// any call runs at import time, and which modules it imports in turn.
/// Function and class bodies are skipped; decorators, parameter defaults,
/// and base-class expressions do execute at import and are walked.
#[derive(Debug, Default)]
struct SideEffectsAnalyzer {
    has_module_level_call: bool,
    imports: Vec<(String, u32)>,
}

impl SideEffectsAnalyzer {
    fn analyze(module: &ast::ModModule) -> Self {
        let mut analyzer = Self::default();
        analyzer.walk_body(&module.body);
        analyzer
    }

    fn walk_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Import(import_stmt) => {
                for alias in &import_stmt.names {
                    self.imports.push((alias.name.to_string(), 0));
                }
            }
            Stmt::ImportFrom(import_from) => {
                if let Some(module) = &import_from.module {
                    self.imports.push((module.to_string(), import_from.level));
                } else {
                    self.imports.push((String::new(), import_from.level));
                }
            }
            Stmt::FunctionDef(func_def) => {
                for decorator in &func_def.decorator_list {
                    self.walk_expr(&decorator.expression);
                }
                self.walk_parameters(&func_def.parameters);
                // Body runs only when called, not at import.
            }
            Stmt::ClassDef(class_def) => {
                for decorator in &class_def.decorator_list {
                    self.walk_expr(&decorator.expression);
                }
                for base in class_def.bases() {
                    self.walk_expr(base);
                }
                for keyword in class_def.keywords() {
                    self.walk_expr(&keyword.value);
                }
            }
            Stmt::Expr(expr_stmt) => self.walk_expr(&expr_stmt.value),
            Stmt::Assign(assign) => self.walk_expr(&assign.value),
            Stmt::AugAssign(aug_assign) => self.walk_expr(&aug_assign.value),
            Stmt::AnnAssign(ann_assign) => {
                if let Some(value) = &ann_assign.value {
                    self.walk_expr(value);
                }
            }
            Stmt::If(if_stmt) => {
                self.walk_expr(&if_stmt.test);
                self.walk_body(&if_stmt.body);
                for clause in &if_stmt.elif_else_clauses {
                    if let Some(test) = &clause.test {
                        self.walk_expr(test);
                    }
                    self.walk_body(&clause.body);
                }
            }
            Stmt::For(for_stmt) => {
                self.walk_expr(&for_stmt.iter);
                self.walk_body(&for_stmt.body);
                self.walk_body(&for_stmt.orelse);
            }
            Stmt::While(while_stmt) => {
                self.walk_expr(&while_stmt.test);
                self.walk_body(&while_stmt.body);
                self.walk_body(&while_stmt.orelse);
            }
            Stmt::With(with_stmt) => {
                for item in &with_stmt.items {
                    self.walk_expr(&item.context_expr);
                }
                self.walk_body(&with_stmt.body);
            }
            Stmt::Try(try_stmt) => {
                self.walk_body(&try_stmt.body);
                for handler in &try_stmt.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    self.walk_body(&handler.body);
                }
                self.walk_body(&try_stmt.orelse);
                self.walk_body(&try_stmt.finalbody);
            }
            _ => {}
        }
    }

    fn walk_parameters(&mut self, parameters: &ast::Parameters) {
        for param in parameters
            .posonlyargs
            .iter()
            .chain(parameters.args.iter())
            .chain(parameters.kwonlyargs.iter())
        {
            if let Some(default) = &param.default {
                self.walk_expr(default);
            }
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        if self.has_module_level_call {
            return;
        }
        match expr {
            Expr::Call(_) => {
                self.has_module_level_call = true;
            }
            Expr::BinOp(binop) => {
                self.walk_expr(&binop.left);
                self.walk_expr(&binop.right);
            }
            Expr::UnaryOp(unary) => self.walk_expr(&unary.operand),
            Expr::BoolOp(boolop) => {
                for value in &boolop.values {
                    self.walk_expr(value);
                }
            }
            Expr::Compare(compare) => {
                self.walk_expr(&compare.left);
                for comparator in &compare.comparators {
                    self.walk_expr(comparator);
                }
            }
            Expr::Attribute(attribute) => self.walk_expr(&attribute.value),
            Expr::Subscript(subscript) => {
                self.walk_expr(&subscript.value);
                self.walk_expr(&subscript.slice);
            }
            Expr::List(list) => {
                for element in &list.elts {
                    self.walk_expr(element);
                }
            }
            Expr::Tuple(tuple) => {
                for element in &tuple.elts {
                    self.walk_expr(element);
                }
            }
            Expr::Set(set) => {
                for element in &set.elts {
                    self.walk_expr(element);
                }
            }
            Expr::Dict(dict) => {
                for item in &dict.items {
                    if let Some(key) = &item.key {
                        self.walk_expr(key);
                    }
                    self.walk_expr(&item.value);
                }
            }
            Expr::Starred(starred) => self.walk_expr(&starred.value),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruff_python_parser::parse_module;

    fn analyze(source: &str) -> SideEffectsAnalyzer {
        let parsed = parse_module(source).expect("valid source");
        SideEffectsAnalyzer::analyze(parsed.syntax())
    }

    #[test]
    fn module_level_call_is_a_side_effect() {
        let analysis = analyze("import os\nprint('loading')\n");
        assert!(analysis.has_module_level_call);
    }

    #[test]
    fn calls_inside_functions_and_classes_are_not() {
        let analysis = analyze(
            "def f():\n    print('hi')\n\nclass C:\n    def m(self):\n        setup()\n",
        );
        assert!(!analysis.has_module_level_call);
    }

    #[test]
    fn decorators_and_defaults_run_at_import() {
        let analysis = analyze("@register()\ndef f():\n    pass\n");
        assert!(analysis.has_module_level_call);

        let analysis = analyze("def f(x=make_default()):\n    pass\n");
        assert!(analysis.has_module_level_call);
    }

    #[test]
    fn assignments_of_literals_are_effect_free() {
        let analysis = analyze("X = 1\nNAMES = ['a', 'b']\nTABLE = {'k': X}\n");
        assert!(!analysis.has_module_level_call);
    }

    #[test]
    fn conditional_bodies_run_at_import() {
        let analysis = analyze("import sys\nif sys.platform == 'win32':\n    configure()\n");
        assert!(analysis.has_module_level_call);
    }

    #[test]
    fn imports_are_collected_with_levels() {
        let analysis = analyze("import os.path\nfrom ..pkg import x\nfrom . import y\n");
        assert_eq!(
            analysis.imports,
            vec![
                ("os.path".to_string(), 0),
                ("pkg".to_string(), 2),
                (String::new(), 1),
            ]
        );
    }

    #[test]
    fn removable_classifications() {
        assert!(SideEffects::No.is_removable());
        assert!(SideEffects::NotAModule.is_removable());
        assert!(!SideEffects::Maybe.is_removable());
        assert!(!SideEffects::Unknown.is_removable());
        assert!(!SideEffects::Yes.is_removable());
    }
}
