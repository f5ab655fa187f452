//! Locates the source file behind an import: local package first, then the
//! standard library, then installed third-party packages. A `None` result
//! means "cannot inspect source" and is never an error.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use log::debug;
use once_cell::sync::Lazy;
use ruff_python_stdlib::sys;
use rustc_hash::FxHashSet;

use crate::config::Config;

/// Standard library modules that run observable code on import. These are
/// checked before stdlib membership in every code path, so they can never
/// be classified as safe stdlib modules.
pub static IMPORTS_WITH_SIDE_EFFECTS: Lazy<FxHashSet<&'static str>> =
    Lazy::new(|| FxHashSet::from_iter(["this", "antigravity", "rlcompleter"]));

/// How many parent directories local resolution may climb when an import
/// was written relative to a package root rather than the importing file.
pub const MAX_ASCENSION_STEPS: usize = 10;

/// Extensions a resolved path may carry without being parseable source.
const COMPILED_EXTENSIONS: &[&str] = &["so", "pyd", "pyc", "dylib"];

/// Immutable lookup tables shared by every per-file session: directories
/// that may contain standard library or installed package sources.
/// Built once at process start and passed by reference into resolver calls.
#[derive(Debug)]
pub struct SearchPaths {
    python_version: u8,
    stdlib_dirs: Vec<PathBuf>,
    site_packages_dirs: Vec<PathBuf>,
}

impl SearchPaths {
    pub fn discover(config: &Config) -> Self {
        let python_version = config.python_version().unwrap_or(10);

        let stdlib_dirs = discover_stdlib_dirs(python_version);
        let mut site_packages_dirs = discover_site_packages_dirs(&stdlib_dirs);
        extend_with_pth_entries(&mut site_packages_dirs);

        debug!(
            "Search paths: {} stdlib dirs, {} site-packages dirs",
            stdlib_dirs.len(),
            site_packages_dirs.len()
        );

        Self {
            python_version,
            stdlib_dirs,
            site_packages_dirs,
        }
    }

    #[cfg(test)]
    pub fn empty(python_version: u8) -> Self {
        Self {
            python_version,
            stdlib_dirs: Vec::new(),
            site_packages_dirs: Vec::new(),
        }
    }

    pub fn python_version(&self) -> u8 {
        self.python_version
    }

    /// Standard library membership by top-level name. The side-effect
    /// override set is consulted first and wins.
    pub fn is_stdlib_module(&self, module: &str) -> bool {
        let top = module.split('.').next().unwrap_or(module);
        if IMPORTS_WITH_SIDE_EFFECTS.contains(top) {
            return false;
        }
        sys::is_known_standard_library(self.python_version, top)
    }

    fn resolve_stdlib(&self, module: &str) -> Option<PathBuf> {
        resolve_in_dirs(&self.stdlib_dirs, module)
    }

    fn resolve_third_party(&self, module: &str) -> Option<PathBuf> {
        resolve_in_dirs(&self.site_packages_dirs, module)
    }
}

/// Resolves import targets to files, memoizing per (importing directory,
/// relative level, module) key. Shared within one process run; sessions
/// only read the search path tables.
#[derive(Debug)]
pub struct ModuleResolver<'a> {
    search_paths: &'a SearchPaths,
    /// Cache of resolved module paths
    cache: IndexMap<String, Option<PathBuf>>,
}

impl<'a> ModuleResolver<'a> {
    pub fn new(search_paths: &'a SearchPaths) -> Self {
        Self {
            search_paths,
            cache: IndexMap::new(),
        }
    }

    pub fn search_paths(&self) -> &SearchPaths {
        self.search_paths
    }

    /// Resolve the target of `import <module>` written in `source`.
    pub fn resolve_import(&mut self, source: &Path, module: &str) -> Option<PathBuf> {
        self.resolve_import_from(source, Some(module), 0)
    }

    /// Resolve the module named by a `from <module> import ...` statement
    /// (or a plain `import`, with `level` 0). Relative imports only ever
    /// resolve locally.
    pub fn resolve_import_from(
        &mut self,
        source: &Path,
        module: Option<&str>,
        level: u32,
    ) -> Option<PathBuf> {
        let dir = source.parent()?.to_path_buf();
        let key = format!("{}|{level}|{}", dir.display(), module.unwrap_or(""));
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        let resolved = self.resolve_uncached(&dir, module, level);
        self.cache.insert(key, resolved.clone());
        resolved
    }

    fn resolve_uncached(&self, dir: &Path, module: Option<&str>, level: u32) -> Option<PathBuf> {
        if level > 0 {
            // Climb level-1 directories; level 1 is the file's own package.
            let mut base = dir.to_path_buf();
            for _ in 1..level {
                if !base.pop() {
                    return None;
                }
            }
            return match module {
                Some(module) => resolve_in_dir(&base, module),
                // Pure-relative `from . import x` targets the package itself.
                None => {
                    let init = base.join("__init__.py");
                    init.is_file().then_some(init)
                }
            };
        }

        let module = module?;
        if let Some(path) = resolve_local(dir, module) {
            return Some(path);
        }
        if self.search_paths.is_stdlib_module(module) {
            // A stdlib name with no discoverable source is a compiled or
            // builtin module; report unresolved rather than trying the
            // third-party directories.
            return self.search_paths.resolve_stdlib(module);
        }
        self.search_paths.resolve_third_party(module)
    }
}

/// A resolved path that is not parseable Python source (compiled
/// extension, data directory entry).
pub fn is_compiled(path: &Path) -> bool {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => COMPILED_EXTENSIONS
            .iter()
            .any(|compiled| ext.eq_ignore_ascii_case(compiled)),
        None => path.is_dir(),
    }
}

/// Local resolution relative to the importing file's directory, climbing
/// outward a bounded number of steps to recover from imports written
/// against a package root.
fn resolve_local(dir: &Path, module: &str) -> Option<PathBuf> {
    let mut current = dir.to_path_buf();
    for _ in 0..=MAX_ASCENSION_STEPS {
        if let Some(path) = resolve_in_dir(&current, module) {
            return Some(path);
        }
        if !current.pop() {
            break;
        }
    }
    None
}

/// `<name>.py` first, then `<name>/__init__.py`, with leading dotted
/// segments mapped onto directories.
fn resolve_in_dir(dir: &Path, module: &str) -> Option<PathBuf> {
    let parts: Vec<&str> = module.split('.').collect();
    let (last, package_parts) = parts.split_last()?;

    let mut base = dir.to_path_buf();
    for part in package_parts {
        base.push(part);
    }

    let module_file = base.join(format!("{last}.py"));
    if module_file.is_file() {
        return Some(module_file);
    }
    let stub_file = base.join(format!("{last}.pyi"));
    if stub_file.is_file() {
        return Some(stub_file);
    }
    let init_file = base.join(last).join("__init__.py");
    if init_file.is_file() {
        return Some(init_file);
    }
    // Compiled extension modules still count as resolved; callers decide
    // what an uninspectable result means.
    if let Ok(entries) = fs::read_dir(&base) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.strip_prefix(last).is_some_and(|rest| rest.starts_with('.'))
                && is_compiled(&entry.path())
            {
                return Some(entry.path());
            }
        }
    }
    None
}

fn resolve_in_dirs(dirs: &[PathBuf], module: &str) -> Option<PathBuf> {
    dirs.iter().find_map(|dir| resolve_in_dir(dir, module))
}

fn discover_stdlib_dirs(python_version: u8) -> Vec<PathBuf> {
    let version_dir = format!("python3.{python_version}");
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Ok(home) = std::env::var("PYTHONHOME") {
        candidates.push(PathBuf::from(home).join("lib").join(&version_dir));
    }
    for prefix in ["/usr/lib", "/usr/local/lib", "/opt/homebrew/lib"] {
        candidates.push(PathBuf::from(prefix).join(&version_dir));
    }

    let mut dirs = Vec::new();
    for candidate in candidates {
        if candidate.is_dir() {
            let dynload = candidate.join("lib-dynload");
            dirs.push(candidate);
            if dynload.is_dir() {
                dirs.push(dynload);
            }
        }
    }
    dirs
}

fn discover_site_packages_dirs(stdlib_dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut unique_dirs: IndexSet<PathBuf> = IndexSet::new();

    // An active or conventionally named virtual environment wins.
    let explicit_virtualenv = std::env::var("VIRTUAL_ENV").ok().map(PathBuf::from);
    let virtualenv_roots = match explicit_virtualenv {
        Some(root) => vec![root],
        None => detect_fallback_virtualenv_paths(),
    };
    for root in virtualenv_roots {
        for site_packages in virtualenv_site_packages(&root) {
            unique_dirs.insert(site_packages);
        }
    }

    // Interpreter-level install locations next to the stdlib.
    for stdlib_dir in stdlib_dirs {
        for name in ["site-packages", "dist-packages"] {
            let candidate = stdlib_dir.join(name);
            if candidate.is_dir() {
                unique_dirs.insert(candidate);
            }
        }
        // Debian-style /usr/lib/python3/dist-packages.
        if let Some(parent) = stdlib_dir.parent() {
            let candidate = parent.join("python3").join("dist-packages");
            if candidate.is_dir() {
                unique_dirs.insert(candidate);
            }
        }
    }

    unique_dirs.into_iter().collect()
}

/// Detect common virtual environment directory names in the current
/// working directory.
fn detect_fallback_virtualenv_paths() -> Vec<PathBuf> {
    let Ok(current_dir) = std::env::current_dir() else {
        return Vec::new();
    };

    let common_venv_names = [".venv", "venv", "env", ".virtualenv", "virtualenv"];
    common_venv_names
        .iter()
        .map(|name| current_dir.join(name))
        .filter(|path| path.is_dir() && !virtualenv_site_packages(path).is_empty())
        .collect()
}

/// Site-packages directories inside one virtual environment root.
fn virtualenv_site_packages(venv_root: &Path) -> Vec<PathBuf> {
    if cfg!(windows) {
        let site_packages = venv_root.join("Lib").join("site-packages");
        return if site_packages.is_dir() {
            vec![site_packages]
        } else {
            Vec::new()
        };
    }

    let lib_dir = venv_root.join("lib");
    let Ok(entries) = fs::read_dir(&lib_dir) else {
        return Vec::new();
    };

    entries
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with("python"))
        })
        .map(|entry| entry.path().join("site-packages"))
        .filter(|path| path.is_dir())
        .collect()
}

/// Each non-comment line of a `.pth` file naming an existing directory
/// extends the package search path.
fn extend_with_pth_entries(site_packages_dirs: &mut Vec<PathBuf>) {
    let mut extensions: Vec<PathBuf> = Vec::new();
    for dir in site_packages_dirs.iter() {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("pth") {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') || line.starts_with("import ") {
                    continue;
                }
                let target = dir.join(line);
                if target.is_dir() {
                    extensions.push(target);
                }
            }
        }
    }
    site_packages_dirs.extend(extensions);
}
