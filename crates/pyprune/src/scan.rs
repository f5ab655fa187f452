//! Single-traversal usage analysis of one file: every name read, every
//! attribute suffix, `__all__` exports, try/except import guards, and the
//! names smuggled inside strings (quoted annotations, type comments,
//! `cast` targets, typing subscripts).

use once_cell::sync::Lazy;
use regex::Regex;
use ruff_python_ast::visitor::{Visitor, walk_expr, walk_stmt};
use ruff_python_ast::{self as ast, Expr, ModModule, Stmt};
use ruff_text_size::Ranged;
use rustc_hash::FxHashSet;

use crate::nodes::{ImportKind, ImportStmt, ImportedName};
use crate::parser::{self, LineIndex};

/// Exception names that mark a try/except block as an import guard.
pub const IMPORT_EXCEPTIONS: [&str; 3] = ["ImportError", "ImportWarning", "ModuleNotFoundError"];

/// Assignment targets that never count as real uses of an import when a
/// star import is being resolved.
static PROTECTED_DUNDERS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    FxHashSet::from_iter([
        "__name__",
        "__doc__",
        "__package__",
        "__loader__",
        "__spec__",
        "__build_class__",
        "__import__",
        "__all__",
    ])
});

/// typing constructs whose string subscript elements are forward
/// references. Case-sensitive by design.
static SUBSCRIPT_GENERICS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    FxHashSet::from_iter([
        "List",
        "Dict",
        "Set",
        "FrozenSet",
        "Tuple",
        "Optional",
        "Union",
        "Callable",
        "Type",
        "Iterator",
        "Iterable",
        "Sequence",
        "MutableSequence",
        "Mapping",
        "MutableMapping",
        "Awaitable",
        "Coroutine",
        "Generator",
        "AsyncGenerator",
        "AsyncIterator",
        "AsyncIterable",
        "ClassVar",
        "Final",
        "Annotated",
        "Literal",
        "DefaultDict",
        "OrderedDict",
        "Counter",
        "Deque",
        "Match",
        "Pattern",
    ])
});

static TYPE_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#\s*type:\s*(.+)").expect("type comment pattern is valid"));

/// Bare identifier reads and attribute-access suffixes seen anywhere in
/// the file.
#[derive(Debug, Default)]
pub struct SourceStats {
    pub name_: FxHashSet<String>,
    pub attr_: FxHashSet<String>,
}

impl SourceStats {
    pub fn has_name(&self, name: &str) -> bool {
        self.name_.contains(name)
    }

    pub fn has_attr(&self, attr: &str) -> bool {
        self.attr_.contains(attr)
    }
}

/// Everything one traversal learns about a file.
#[derive(Debug, Default)]
pub struct FileFacts {
    pub stats: SourceStats,
    /// Targets of protected dunder assignments; see [`PROTECTED_DUNDERS`].
    pub names_to_skip: FxHashSet<String>,
    /// Import statements in source order, ids matching vector positions.
    pub imports: Vec<ImportStmt>,
    /// Whether any `__all__` declaration or mutation was seen.
    pub has_all: bool,
}

/// Depth-first analyzer. Import statements contribute their own records
/// but their identifier tokens never count as uses.
#[derive(Debug)]
pub struct SourceAnalyzer<'idx> {
    line_index: &'idx LineIndex,
    facts: FileFacts,
    guarded_ranges: FxHashSet<(usize, usize)>,
}

impl<'idx> SourceAnalyzer<'idx> {
    pub fn new(line_index: &'idx LineIndex) -> Self {
        Self {
            line_index,
            facts: FileFacts::default(),
            guarded_ranges: FxHashSet::default(),
        }
    }

    pub fn analyze(mut self, module: &ModModule, source: &str) -> FileFacts {
        for stmt in &module.body {
            self.visit_stmt(stmt);
        }
        self.scan_type_comments(source);
        self.facts
    }

    fn collect_import(&mut self, stmt: &ast::StmtImport) {
        let names = stmt
            .names
            .iter()
            .map(|alias| {
                ImportedName::new(
                    alias.name.as_str(),
                    alias.asname.as_ref().map(|a| a.as_str().to_string()),
                )
            })
            .collect();
        self.push_import(stmt.range(), names, ImportKind::Import);
    }

    fn collect_import_from(&mut self, stmt: &ast::StmtImportFrom) {
        let module = stmt.module.as_ref().map(|m| m.as_str().to_string());
        // `from __future__ import ...` is a compiler directive, not a
        // binding worth analyzing.
        if module.as_deref() == Some("__future__") {
            return;
        }
        let names = stmt
            .names
            .iter()
            .map(|alias| {
                ImportedName::new(
                    alias.name.as_str(),
                    alias.asname.as_ref().map(|a| a.as_str().to_string()),
                )
            })
            .collect();
        self.push_import(
            stmt.range(),
            names,
            ImportKind::ImportFrom {
                module,
                level: stmt.level,
            },
        );
    }

    fn push_import(
        &mut self,
        range: ruff_text_size::TextRange,
        names: Vec<ImportedName>,
        kind: ImportKind,
    ) {
        let guarded = self.guarded_ranges.contains(&range_key(range));
        self.facts.imports.push(ImportStmt {
            id: self.facts.imports.len(),
            location: self.line_index.location(range),
            names,
            kind,
            guarded,
        });
    }

    /// A handler catching an import-related exception exempts every import
    /// directly inside the try body, the handler bodies, and the else
    /// block; static analysis cannot tell which branch is "the used one".
    fn guard_try_imports(&mut self, try_stmt: &ast::StmtTry) {
        let mut is_skip_case = false;
        for handler in &try_stmt.handlers {
            let ast::ExceptHandler::ExceptHandler(handler) = handler;
            if let Some(type_) = &handler.type_ {
                is_skip_case |= match type_.as_ref() {
                    Expr::Name(name) => IMPORT_EXCEPTIONS.contains(&name.id.as_str()),
                    Expr::Tuple(tuple) => tuple.elts.iter().any(|element| {
                        matches!(element, Expr::Name(name) if IMPORT_EXCEPTIONS.contains(&name.id.as_str()))
                    }),
                    _ => false,
                };
            }
            if is_skip_case {
                self.guard_body(&handler.body);
            }
        }
        if is_skip_case {
            self.guard_body(&try_stmt.body);
            self.guard_body(&try_stmt.orelse);
        }
    }

    fn guard_body(&mut self, body: &[Stmt]) {
        for child in body {
            if matches!(child, Stmt::Import(_) | Stmt::ImportFrom(_)) {
                self.guarded_ranges.insert(range_key(child.range()));
            }
        }
    }

    fn handle_assign(&mut self, assign: &ast::StmtAssign) {
        let Some(Expr::Name(target)) = assign.targets.first() else {
            return;
        };
        if PROTECTED_DUNDERS.contains(target.id.as_str()) {
            self.facts.names_to_skip.insert(target.id.to_string());
        }
        if target.id.as_str() == "__all__" {
            self.facts.has_all = true;
            self.collect_exports(&assign.value);
        }
    }

    fn handle_aug_assign(&mut self, aug_assign: &ast::StmtAugAssign) {
        if let Expr::Name(target) = aug_assign.target.as_ref() {
            // `x += 1` both reads and writes x.
            self.facts.stats.name_.insert(target.id.to_string());
            if target.id.as_str() == "__all__" && matches!(aug_assign.op, ast::Operator::Add) {
                self.facts.has_all = true;
                self.collect_exports(&aug_assign.value);
            }
        }
    }

    /// `__all__.append("x")` and `__all__.extend(["x", "y"])`.
    fn handle_expr_stmt(&mut self, expr_stmt: &ast::StmtExpr) {
        let Expr::Call(call) = expr_stmt.value.as_ref() else {
            return;
        };
        let Expr::Attribute(attr) = call.func.as_ref() else {
            return;
        };
        let Expr::Name(target) = attr.value.as_ref() else {
            return;
        };
        if target.id.as_str() != "__all__" {
            return;
        }
        match attr.attr.as_str() {
            "append" => {
                self.facts.has_all = true;
                for arg in &call.arguments.args {
                    self.push_export_string(arg);
                }
            }
            "extend" => {
                self.facts.has_all = true;
                if let Some(first) = call.arguments.args.first() {
                    self.collect_exports(first);
                }
            }
            _ => {}
        }
    }

    /// Exported names count as uses. Literal `+` concatenation chains are
    /// flattened recursively.
    fn collect_exports(&mut self, expr: &Expr) {
        match expr {
            Expr::List(list) => {
                for element in &list.elts {
                    self.push_export_string(element);
                }
            }
            Expr::Tuple(tuple) => {
                for element in &tuple.elts {
                    self.push_export_string(element);
                }
            }
            Expr::Set(set) => {
                for element in &set.elts {
                    self.push_export_string(element);
                }
            }
            Expr::BinOp(binop) if matches!(binop.op, ast::Operator::Add) => {
                self.collect_exports(&binop.left);
                self.collect_exports(&binop.right);
            }
            _ => {}
        }
    }

    fn push_export_string(&mut self, expr: &Expr) {
        if let Expr::StringLiteral(literal) = expr {
            self.facts
                .stats
                .name_
                .insert(literal.value.to_str().to_string());
        }
    }

    /// Quoted forward references hide names the traversal would otherwise
    /// miss; re-parse and fold them into the same fact sets.
    fn fold_fragment(&mut self, text: &str) {
        if let Some(expr) = parser::parse_fragment(text) {
            FragmentCollector {
                stats: &mut self.facts.stats,
            }
            .visit_expr(&expr);
        }
    }

    fn fold_annotation(&mut self, expr: &Expr) {
        if let Expr::StringLiteral(literal) = expr {
            self.fold_fragment(literal.value.to_str());
        }
    }

    fn fold_function_annotations(&mut self, func_def: &ast::StmtFunctionDef) {
        let params = &func_def.parameters;
        for param in params
            .posonlyargs
            .iter()
            .chain(params.args.iter())
            .chain(params.kwonlyargs.iter())
        {
            if let Some(annotation) = &param.parameter.annotation {
                self.fold_annotation(annotation);
            }
        }
        if let Some(vararg) = &params.vararg {
            if let Some(annotation) = &vararg.annotation {
                self.fold_annotation(annotation);
            }
        }
        if let Some(kwarg) = &params.kwarg {
            if let Some(annotation) = &kwarg.annotation {
                self.fold_annotation(annotation);
            }
        }
        if let Some(returns) = &func_def.returns {
            self.fold_annotation(returns);
        }
    }

    /// `cast("SomeType", value)` or `typing.cast("SomeType", value)`.
    fn handle_call(&mut self, call: &ast::ExprCall) {
        let is_cast = match call.func.as_ref() {
            Expr::Name(name) => name.id.as_str() == "cast",
            Expr::Attribute(attr) => {
                attr.attr.as_str() == "cast"
                    && matches!(attr.value.as_ref(), Expr::Name(name) if name.id.as_str() == "typing")
            }
            _ => false,
        };
        if is_cast {
            if let Some(Expr::StringLiteral(literal)) = call.arguments.args.first() {
                self.fold_fragment(literal.value.to_str());
            }
        }
    }

    /// String elements under `List[...]`, `Union[...]` and friends are
    /// forward references; elements that fail to parse (a `Literal[" "]`
    /// value, say) are silently not forward references.
    fn handle_subscript(&mut self, subscript: &ast::ExprSubscript) {
        let is_generic = match subscript.value.as_ref() {
            Expr::Name(name) => SUBSCRIPT_GENERICS.contains(name.id.as_str()),
            Expr::Attribute(attr) => SUBSCRIPT_GENERICS.contains(attr.attr.as_str()),
            _ => false,
        };
        if !is_generic {
            return;
        }
        match subscript.slice.as_ref() {
            Expr::Tuple(tuple) => {
                for element in &tuple.elts {
                    self.fold_annotation(element);
                }
            }
            element => self.fold_annotation(element),
        }
    }

    /// `# type:` comments never reach the syntax tree; scan the raw lines
    /// and re-parse their payloads in the matching grammar form.
    fn scan_type_comments(&mut self, source: &str) {
        for line in source.lines() {
            let Some(captures) = TYPE_COMMENT.captures(line) else {
                continue;
            };
            let payload = captures[1].trim();
            if payload.starts_with("ignore") {
                continue;
            }
            if let Some((args, returns)) = payload.split_once("->") {
                // Signature form: `(int, str) -> bool`.
                self.fold_fragment(args.trim());
                self.fold_fragment(returns.trim());
            } else {
                self.fold_fragment(payload);
            }
        }
    }
}

impl<'a> Visitor<'a> for SourceAnalyzer<'_> {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::Import(import_stmt) => {
                self.collect_import(import_stmt);
                return;
            }
            Stmt::ImportFrom(import_from) => {
                self.collect_import_from(import_from);
                return;
            }
            Stmt::Try(try_stmt) => self.guard_try_imports(try_stmt),
            Stmt::Assign(assign) => self.handle_assign(assign),
            Stmt::AugAssign(aug_assign) => self.handle_aug_assign(aug_assign),
            Stmt::Expr(expr_stmt) => self.handle_expr_stmt(expr_stmt),
            Stmt::AnnAssign(ann_assign) => self.fold_annotation(&ann_assign.annotation),
            Stmt::FunctionDef(func_def) => self.fold_function_annotations(func_def),
            _ => {}
        }
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Name(name) => {
                if !matches!(name.ctx, ast::ExprContext::Store) {
                    self.facts.stats.name_.insert(name.id.to_string());
                }
            }
            Expr::Attribute(attr) => {
                self.facts.stats.attr_.insert(attr.attr.to_string());
            }
            Expr::Call(call) => self.handle_call(call),
            Expr::Subscript(subscript) => self.handle_subscript(subscript),
            _ => {}
        }
        walk_expr(self, expr);
    }
}

/// Folds names and attributes out of a re-parsed fragment. Strings nested
/// inside fragments (quoted generics in type comments) recurse.
struct FragmentCollector<'s> {
    stats: &'s mut SourceStats,
}

impl<'a> Visitor<'a> for FragmentCollector<'_> {
    fn visit_expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Name(name) => {
                self.stats.name_.insert(name.id.to_string());
            }
            Expr::Attribute(attr) => {
                self.stats.attr_.insert(attr.attr.to_string());
            }
            Expr::StringLiteral(literal) => {
                if let Some(nested) = parser::parse_fragment(literal.value.to_str()) {
                    // Fresh collector so the borrow is scoped to the
                    // re-parsed fragment.
                    FragmentCollector {
                        stats: &mut *self.stats,
                    }
                    .visit_expr(&nested);
                    return;
                }
            }
            _ => {}
        }
        walk_expr(self, expr);
    }
}

fn range_key(range: ruff_text_size::TextRange) -> (usize, usize) {
    (usize::from(range.start()), usize::from(range.end()))
}
