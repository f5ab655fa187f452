//! Recursive discovery of the `.py`/`.pyi` files to clean, honoring
//! include/exclude patterns and `.gitignore`.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use regex::Regex;

use crate::directives::{is_excluded, is_included};
use crate::report::Report;

/// Build a matcher for the `.gitignore` at `root`, or an empty matcher
/// when there is none.
pub fn gitignore_matcher(root: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(root);
    builder.add(root.join(".gitignore"));
    builder.build().unwrap_or_else(|_| Gitignore::empty())
}

/// Walk `root` and return every file to process, reporting each skipped
/// entry with its reason. Exclusions are computed before inclusions;
/// symlinks are never followed.
pub fn yield_sources(
    root: &Path,
    include: &Regex,
    exclude: &Regex,
    gitignore: Option<&Gitignore>,
    reporter: &mut Report,
) -> Vec<PathBuf> {
    let mut sources = Vec::new();
    walk(root, include, exclude, gitignore, reporter, &mut sources);
    sources
}

fn walk(
    dir: &Path,
    include: &Regex,
    exclude: &Regex,
    gitignore: Option<&Gitignore>,
    reporter: &mut Report,
    sources: &mut Vec<PathBuf>,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            reporter.failure(&format!("{}: {err}", dir.display()), None);
            return;
        }
    };

    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|entry| entry.file_name());

    let mut subdirs: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_symlink() {
            continue;
        }

        let path = entry.path();
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let is_dir = file_type.is_dir();
        let match_name = if is_dir {
            format!("{name}/")
        } else {
            name.to_string()
        };

        if is_excluded(&match_name, exclude) {
            reporter.ignored_path(&path, "exclude pattern");
            continue;
        }
        if gitignore.is_some_and(|matcher| matcher.matched(&path, is_dir).is_ignore()) {
            reporter.ignored_path(&path, "gitignore");
            continue;
        }

        if is_dir {
            subdirs.push(path);
        } else if is_included(&match_name, include) {
            sources.push(path);
        } else {
            reporter.ignored_path(&path, "include pattern");
        }
    }

    for subdir in subdirs {
        walk(&subdir, include, exclude, gitignore, reporter, sources);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::directives;
    use std::fs;
    use tempfile::TempDir;

    fn fixture_tree() -> TempDir {
        let tree = TempDir::new().expect("tempdir");
        let root = tree.path();
        fs::create_dir_all(root.join("pkg/__pycache__")).expect("mkdir");
        fs::create_dir_all(root.join("ignored_dir")).expect("mkdir");
        fs::write(root.join("top.py"), "").expect("write");
        fs::write(root.join("notes.txt"), "").expect("write");
        fs::write(root.join("pkg/mod.py"), "").expect("write");
        fs::write(root.join("pkg/stub.pyi"), "").expect("write");
        fs::write(root.join("pkg/__pycache__/mod.cpython-310.pyc"), "").expect("write");
        fs::write(root.join("ignored_dir/hidden.py"), "").expect("write");
        fs::write(root.join(".gitignore"), "ignored_dir/\n").expect("write");
        tree
    }

    fn silent_report() -> Report {
        Report::new(&Config {
            silence: true,
            ..Config::default()
        })
    }

    #[test]
    fn collects_python_files_recursively() {
        let tree = fixture_tree();
        let include = directives::safe_compile(directives::INCLUDE_REGEX, "include").unwrap();
        let exclude = directives::safe_compile(directives::EXCLUDE_REGEX, "exclude").unwrap();
        let mut reporter = silent_report();

        let mut sources = yield_sources(tree.path(), &include, &exclude, None, &mut reporter);
        sources.sort();

        let names: Vec<String> = sources
            .iter()
            .map(|p| {
                p.strip_prefix(tree.path())
                    .expect("under root")
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        // Without a gitignore matcher, ignored_dir is still walked; the
        // exclude pattern keeps __pycache__ out and include keeps .txt out.
        assert_eq!(
            names,
            vec!["ignored_dir/hidden.py", "pkg/mod.py", "pkg/stub.pyi", "top.py"]
        );
    }

    #[test]
    fn gitignore_patterns_prune_directories() {
        let tree = fixture_tree();
        let include = directives::safe_compile(directives::INCLUDE_REGEX, "include").unwrap();
        let exclude = directives::safe_compile(directives::EXCLUDE_REGEX, "exclude").unwrap();
        let matcher = gitignore_matcher(tree.path());
        let mut reporter = silent_report();

        let sources = yield_sources(tree.path(), &include, &exclude, Some(&matcher), &mut reporter);
        assert!(
            sources.iter().all(|p| !p.to_string_lossy().contains("ignored_dir")),
            "gitignored directory was walked: {sources:?}"
        );
    }

    #[test]
    fn exclude_beats_include() {
        let tree = fixture_tree();
        let include = directives::safe_compile(directives::INCLUDE_REGEX, "include").unwrap();
        let exclude = directives::safe_compile(r"pkg/", "exclude").unwrap();
        let mut reporter = silent_report();

        let mut sources = yield_sources(tree.path(), &include, &exclude, None, &mut reporter);
        sources.sort();
        let names: Vec<String> = sources
            .iter()
            .map(|p| {
                p.strip_prefix(tree.path())
                    .expect("under root")
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, vec!["ignored_dir/hidden.py", "top.py"]);
    }
}
