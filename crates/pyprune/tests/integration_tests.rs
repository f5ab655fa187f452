//! End-to-end pipeline tests: write a fixture tree, run one cleaning
//! session over a file, and assert on the rewritten content and the
//! reported events.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use pyprune::config::Config;
use pyprune::refactor::Refactor;
use pyprune::report::Report;
use pyprune::resolver::SearchPaths;
use tempfile::TempDir;

fn silent_config() -> Config {
    Config {
        silence: true,
        ..Config::default()
    }
}

fn write(tree: &TempDir, rel: &str, content: &str) {
    let path = tree.path().join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(path, content).expect("write fixture");
}

/// Run one session over `rel` and return the file's content afterwards
/// together with the report.
fn clean(tree: &TempDir, rel: &str, config: &Config) -> (String, Report) {
    let search_paths = SearchPaths::discover(config);
    let mut reporter = Report::new(config);
    let mut session = Refactor::new(config, &search_paths);
    let path = tree.path().join(rel);
    session.process_file(&path, &mut reporter);
    let content = fs::read_to_string(&path).expect("file still readable");
    (content, reporter)
}

#[test]
fn unused_stdlib_import_is_removed() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "target.py", "import os, sys\nos.getcwd()\n");

    let (content, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, "import os\nos.getcwd()\n");
    assert_eq!(report.removed_imports(), 1);
    assert_eq!(report.changed_files(), 1);
    assert_eq!(report.failures(), 0);
}

#[test]
fn unknown_module_is_kept_without_all_flag() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "target.py", "import x, y\nx\n");

    let (content, report) = clean(&tree, "target.py", &silent_config());
    // y cannot be resolved, so its side effects are unknown and it stays.
    assert_eq!(content, "import x, y\nx\n");
    assert_eq!(report.changed_files(), 0);
}

#[test]
fn unknown_module_is_removed_with_all_flag() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "target.py", "import x, y\nx\n");

    let config = Config {
        all: true,
        ..silent_config()
    };
    let (content, report) = clean(&tree, "target.py", &config);
    assert_eq!(content, "import x\nx\n");
    assert_eq!(report.removed_imports(), 1);
}

#[test]
fn fully_used_dotted_import_is_kept() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "target.py", "import os.path\nos.path.join('a', 'b')\n");

    let (content, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, "import os.path\nos.path.join('a', 'b')\n");
    assert_eq!(report.changed_files(), 0);
}

#[test]
fn dotted_prefix_usage_keeps_the_import() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "target.py", "import os.path\nos.path\n");

    let (content, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, "import os.path\nos.path\n");
    assert_eq!(report.changed_files(), 0);
}

#[test]
fn import_guard_retains_both_branches() {
    let tree = TempDir::new().expect("tempdir");
    let source = "try:\n    import foo\nexcept ImportError:\n    import bar\n";
    write(&tree, "target.py", source);

    let (content, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, source);
    assert_eq!(report.changed_files(), 0);
}

#[test]
fn parenthesized_multiline_style_survives_partial_removal() {
    let tree = TempDir::new().expect("tempdir");
    write(
        &tree,
        "x.py",
        "def a():\n    pass\n\ndef b():\n    pass\n\ndef c():\n    pass\n",
    );
    write(
        &tree,
        "target.py",
        "from x import (\n    a,\n    b,\n    c,\n)\n\na()\nc()\n",
    );

    let (content, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, "from x import (\n    a,\n    c\n)\n\na()\nc()\n");
    assert_eq!(report.removed_imports(), 1);
}

#[test]
fn backslash_multiline_style_survives_partial_removal() {
    let tree = TempDir::new().expect("tempdir");
    write(
        &tree,
        "x.py",
        "def a():\n    pass\n\ndef b():\n    pass\n\ndef c():\n    pass\n",
    );
    write(
        &tree,
        "target.py",
        "from x import a, \\\n    b, \\\n    c\n\na()\nc()\n",
    );

    let (content, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, "from x import a, \\\n    c\n\na()\nc()\n");
    assert_eq!(report.removed_imports(), 1);
}

#[test]
fn second_pass_is_a_fixed_point() {
    let tree = TempDir::new().expect("tempdir");
    write(
        &tree,
        "x.py",
        "def a():\n    pass\n\ndef b():\n    pass\n\ndef c():\n    pass\n",
    );
    write(
        &tree,
        "target.py",
        "from x import (\n    a,\n    b,\n    c,\n)\nimport os, sys\n\na()\nc()\nos.getcwd()\n",
    );

    let (first, first_report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(first_report.changed_files(), 1);

    let (second, second_report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(second, first);
    assert_eq!(second_report.changed_files(), 0);
    assert_eq!(second_report.removed_imports(), 0);
}

#[test]
fn rewritten_output_still_parses() {
    let tree = TempDir::new().expect("tempdir");
    write(
        &tree,
        "target.py",
        "import os, sys\nimport json\n\ndef f():\n    import re\n    return os.sep\n",
    );

    let config = Config {
        all: true,
        ..silent_config()
    };
    let (content, _) = clean(&tree, "target.py", &config);
    ruff_python_parser::parse_module(&content).expect("rewritten output is valid Python");
}

#[test]
fn empty_and_comment_only_files_are_untouched() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "empty.py", "");
    write(&tree, "comments.py", "# just a comment\n");

    let (content, report) = clean(&tree, "empty.py", &silent_config());
    assert_eq!(content, "");
    assert_eq!(report.unchanged_files(), 1);

    let (content, report) = clean(&tree, "comments.py", &silent_config());
    assert_eq!(content, "# just a comment\n");
    assert_eq!(report.unchanged_files(), 1);
}

#[test]
fn module_level_import_with_no_survivors_disappears() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "target.py", "import os\n");

    let (content, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, "");
    assert_eq!(report.removed_imports(), 1);
}

#[test]
fn indented_import_with_no_survivors_becomes_pass() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "target.py", "def f():\n    import os\n");

    let (content, _) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, "def f():\n    pass\n");
}

#[test]
fn placeholder_pass_is_cleaned_when_block_has_other_statements() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "target.py", "def f():\n    import os\n    return 1\n");

    let (content, _) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, "def f():\n    return 1\n");
}

#[test]
fn init_file_without_all_is_left_alone() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "pkg/__init__.py", "import os\n");

    let (content, report) = clean(&tree, "pkg/__init__.py", &silent_config());
    assert_eq!(content, "import os\n");
    assert_eq!(report.changed_files(), 0);
    assert_eq!(report.removed_imports(), 0);
    assert_eq!(report.ignored_paths(), 1);
}

#[test]
fn init_file_with_all_is_rewritten() {
    let tree = TempDir::new().expect("tempdir");
    write(
        &tree,
        "pkg/__init__.py",
        "import os\nimport sys\n\n__all__ = [\"os\"]\n",
    );

    let (content, report) = clean(&tree, "pkg/__init__.py", &silent_config());
    assert_eq!(content, "import os\n\n__all__ = [\"os\"]\n");
    assert_eq!(report.removed_imports(), 1);
}

#[test]
fn init_file_abort_can_be_disabled() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "pkg/__init__.py", "import os\n");

    let config = Config {
        disable_all_dunder_policy: true,
        ..silent_config()
    };
    let (content, report) = clean(&tree, "pkg/__init__.py", &config);
    assert_eq!(content, "");
    assert_eq!(report.removed_imports(), 1);
}

#[test]
fn suppression_comments_keep_the_statement() {
    let tree = TempDir::new().expect("tempdir");
    write(
        &tree,
        "target.py",
        "import os  # noqa\nimport sys  # nopyprune: import\n",
    );

    let (content, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, "import os  # noqa\nimport sys  # nopyprune: import\n");
    assert_eq!(report.ignored_imports(), 2);
    assert_eq!(report.changed_files(), 0);
}

#[test]
fn file_level_suppression_skips_the_file() {
    let tree = TempDir::new().expect("tempdir");
    let source = "# nopyprune: file\nimport os\n";
    write(&tree, "target.py", source);

    let (content, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, source);
    assert_eq!(report.ignored_paths(), 1);
}

#[test]
fn skip_imports_configuration_wins() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "target.py", "import os\nimport sys\n");

    let mut config = silent_config();
    config.skip_imports.insert("os".to_string());
    let (content, report) = clean(&tree, "target.py", &config);
    // os is protected even though unused; sys is still removed.
    assert_eq!(content, "import os\n");
    assert_eq!(report.ignored_imports(), 1);
    assert_eq!(report.removed_imports(), 1);
}

#[test]
fn stub_self_alias_is_retained() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "target.pyi", "import os as os\nimport sys\n");

    let (content, report) = clean(&tree, "target.pyi", &silent_config());
    assert_eq!(content, "import os as os\n");
    assert_eq!(report.removed_imports(), 1);
}

#[test]
fn semicolon_compound_statement_is_a_contained_failure() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "target.py", "import os; import sys\nimport json\n");

    let (content, report) = clean(&tree, "target.py", &silent_config());
    // Both statements on the compound line are refused; the rest of the
    // file is still cleaned.
    assert!(content.starts_with("import os; import sys\n"), "got: {content}");
    assert!(!content.contains("import json"));
    assert_eq!(report.failures(), 2);
    assert_eq!(report.exit_code(), 250);
}

#[test]
fn syntax_errors_leave_the_file_untouched() {
    let tree = TempDir::new().expect("tempdir");
    let source = "import (\n";
    write(&tree, "target.py", source);

    let (content, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, source);
    assert_eq!(report.failures(), 1);
}

#[test]
fn quoted_annotation_keeps_its_import() {
    let tree = TempDir::new().expect("tempdir");
    write(
        &tree,
        "target.py",
        "from decimal import Decimal\n\ndef price() -> \"Decimal\":\n    raise NotImplementedError\n",
    );

    let (content, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(report.changed_files(), 0);
    assert!(content.contains("from decimal import Decimal"));
}

#[test]
fn type_comment_keeps_its_import() {
    let tree = TempDir::new().expect("tempdir");
    write(
        &tree,
        "target.py",
        "from typing import List\n\nnames = []  # type: List[str]\n",
    );

    let (_, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(report.changed_files(), 0);
}

#[test]
fn check_mode_reports_without_writing() {
    let tree = TempDir::new().expect("tempdir");
    let source = "import os, sys\nos.getcwd()\n";
    write(&tree, "target.py", source);

    let config = Config {
        check: true,
        ..silent_config()
    };
    let (content, report) = clean(&tree, "target.py", &config);
    assert_eq!(content, source);
    assert_eq!(report.changed_files(), 1);
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn diff_mode_reports_without_writing() {
    let tree = TempDir::new().expect("tempdir");
    let source = "import os, sys\nos.getcwd()\n";
    write(&tree, "target.py", source);

    let config = Config {
        diff: true,
        ..silent_config()
    };
    let (content, report) = clean(&tree, "target.py", &config);
    assert_eq!(content, source);
    assert_eq!(report.changed_files(), 1);
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn crlf_files_keep_their_line_endings() {
    let tree = TempDir::new().expect("tempdir");
    let path = tree.path().join("target.py");
    fs::write(&path, b"import os, sys\r\nos.getcwd()\r\n").expect("write fixture");

    let config = silent_config();
    let search_paths = SearchPaths::discover(&config);
    let mut reporter = Report::new(&config);
    let mut session = Refactor::new(&config, &search_paths);
    session.process_file(&path, &mut reporter);

    let bytes = fs::read(&path).expect("read back");
    assert_eq!(bytes, b"import os\r\nos.getcwd()\r\n");
}

#[test]
fn summary_phrasing_in_check_mode() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "target.py", "import os, sys\nos.getcwd()\n");

    let config = Config {
        check: true,
        ..silent_config()
    };
    let (_, report) = clean(&tree, "target.py", &config);
    insta::assert_snapshot!(
        report.to_string(),
        @"1 import would be removed, 1 file would be changed."
    );
}

#[test]
fn local_module_with_import_time_calls_is_kept() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "noisy.py", "print('side effect at import time')\n");
    write(&tree, "target.py", "import noisy\n");

    let (content, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, "import noisy\n");
    assert_eq!(report.changed_files(), 0);
}

#[test]
fn local_module_without_side_effects_is_removed() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "calm.py", "def helper():\n    pass\n");
    write(&tree, "target.py", "import calm\n");

    let (content, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, "");
    assert_eq!(report.removed_imports(), 1);
}

#[test]
fn transitive_side_effects_propagate() {
    let tree = TempDir::new().expect("tempdir");
    write(&tree, "noisy.py", "setup()\n");
    write(&tree, "wrapper.py", "import noisy\n\ndef api():\n    pass\n");
    write(&tree, "target.py", "import wrapper\n");

    let (content, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, "import wrapper\n");
    assert_eq!(report.changed_files(), 0);
}

#[test]
fn exports_count_as_uses() {
    let tree = TempDir::new().expect("tempdir");
    write(
        &tree,
        "target.py",
        "import os\nimport sys\n\n__all__ = [\"os\"] + [\"extra\"]\n",
    );

    let (content, report) = clean(&tree, "target.py", &silent_config());
    assert_eq!(content, "import os\n\n__all__ = [\"os\"] + [\"extra\"]\n");
    assert_eq!(report.removed_imports(), 1);
}

#[test]
fn missing_file_is_a_failure_not_a_panic() {
    let tree = TempDir::new().expect("tempdir");
    let config = silent_config();
    let search_paths = SearchPaths::discover(&config);
    let mut reporter = Report::new(&config);
    let mut session = Refactor::new(&config, &search_paths);
    session.process_file(Path::new(&tree.path().join("absent.py")), &mut reporter);
    assert_eq!(reporter.failures(), 1);
}
