use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use indexmap::IndexSet;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::combine::Combine;
use crate::directives;
use crate::dirs::{system_config_file, user_pyprune_config_dir};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Files and directories to clean.
    pub paths: Vec<PathBuf>,

    /// Regex a file or directory name must fully match to be processed.
    pub include: String,

    /// Regex that excludes matching names from recursive searches.
    pub exclude: String,

    /// Remove unused imports regardless of inferred side effects.
    pub all: bool,

    /// Report what would change without writing files back.
    pub check: bool,

    /// Print a diff for each file instead of writing it back.
    pub diff: bool,

    /// Also report ignored paths/imports and unchanged files.
    pub verbose: bool,

    /// Suppress non-error messages.
    pub quiet: bool,

    /// Suppress both stdout and stderr messages.
    pub silence: bool,

    /// Replace `from module import *` with the used names it provides.
    pub expand_star_imports: bool,

    /// Module name prefixes whose imports are never removed.
    pub skip_imports: IndexSet<String>,

    /// Allow rewriting `__init__.py` files that declare no `__all__`.
    pub disable_all_dunder_policy: bool,

    /// Do not honor `.gitignore` patterns.
    pub no_gitignore: bool,

    /// Target Python version for standard library membership checks.
    /// Supports Ruff-style string values: "py38" through "py313".
    pub target_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            include: directives::INCLUDE_REGEX.to_owned(),
            exclude: directives::EXCLUDE_REGEX.to_owned(),
            all: false,
            check: false,
            diff: false,
            verbose: false,
            quiet: false,
            silence: false,
            expand_star_imports: false,
            skip_imports: IndexSet::new(),
            disable_all_dunder_policy: false,
            no_gitignore: false,
            target_version: "py310".to_owned(),
        }
    }
}

impl Combine for Config {
    fn combine(self, other: Self) -> Self {
        let defaults = Config::default();
        Self {
            // For collections and patterns, higher precedence (self) replaces
            // lower precedence (other) only when it carries non-default values.
            paths: if self.paths.is_empty() {
                other.paths
            } else {
                self.paths
            },
            include: if self.include != defaults.include {
                self.include
            } else {
                other.include
            },
            exclude: if self.exclude != defaults.exclude {
                self.exclude
            } else {
                other.exclude
            },
            skip_imports: if self.skip_imports.is_empty() {
                other.skip_imports
            } else {
                self.skip_imports
            },
            // For flags, a layer that sets them wins.
            all: self.all || other.all,
            check: self.check || other.check,
            diff: self.diff || other.diff,
            verbose: self.verbose || other.verbose,
            quiet: self.quiet || other.quiet,
            silence: self.silence || other.silence,
            expand_star_imports: self.expand_star_imports || other.expand_star_imports,
            disable_all_dunder_policy: self.disable_all_dunder_policy
                || other.disable_all_dunder_policy,
            no_gitignore: self.no_gitignore || other.no_gitignore,
            target_version: if self.target_version != defaults.target_version {
                self.target_version
            } else {
                other.target_version
            },
        }
    }
}

/// Configuration values from environment variables with PYPRUNE_ prefix
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub include: Option<String>,
    pub exclude: Option<String>,
    pub all: Option<bool>,
    pub expand_star_imports: Option<bool>,
    pub skip_imports: Option<IndexSet<String>>,
    pub disable_all_dunder_policy: Option<bool>,
    pub no_gitignore: Option<bool>,
    pub target_version: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables with PYPRUNE_ prefix
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(include) = env::var("PYPRUNE_INCLUDE") {
            if !include.is_empty() {
                config.include = Some(include);
            }
        }

        if let Ok(exclude) = env::var("PYPRUNE_EXCLUDE") {
            if !exclude.is_empty() {
                config.exclude = Some(exclude);
            }
        }

        if let Ok(value) = env::var("PYPRUNE_ALL") {
            config.all = parse_bool(&value);
        }

        if let Ok(value) = env::var("PYPRUNE_EXPAND_STAR_IMPORTS") {
            config.expand_star_imports = parse_bool(&value);
        }

        // PYPRUNE_SKIP_IMPORTS - comma-separated list of module name prefixes
        if let Ok(skip_str) = env::var("PYPRUNE_SKIP_IMPORTS") {
            let modules: IndexSet<String> = skip_str
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
            if !modules.is_empty() {
                config.skip_imports = Some(modules);
            }
        }

        if let Ok(value) = env::var("PYPRUNE_DISABLE_ALL_DUNDER_POLICY") {
            config.disable_all_dunder_policy = parse_bool(&value);
        }

        if let Ok(value) = env::var("PYPRUNE_NO_GITIGNORE") {
            config.no_gitignore = parse_bool(&value);
        }

        if let Ok(target_version) = env::var("PYPRUNE_TARGET_VERSION") {
            config.target_version = Some(target_version);
        }

        config
    }

    /// Apply environment config to base config
    pub fn apply_to(self, mut config: Config) -> Config {
        if let Some(include) = self.include {
            config.include = include;
        }
        if let Some(exclude) = self.exclude {
            config.exclude = exclude;
        }
        if let Some(all) = self.all {
            config.all = all;
        }
        if let Some(expand) = self.expand_star_imports {
            config.expand_star_imports = expand;
        }
        if let Some(skip_imports) = self.skip_imports {
            config.skip_imports = skip_imports;
        }
        if let Some(disable) = self.disable_all_dunder_policy {
            config.disable_all_dunder_policy = disable;
        }
        if let Some(no_gitignore) = self.no_gitignore {
            config.no_gitignore = no_gitignore;
        }
        if let Some(target_version) = self.target_version {
            config.target_version = target_version;
        }
        config
    }
}

/// Parse a boolean value from string, supporting various common formats
fn parse_bool(value: &str) -> Option<bool> {
    use cow_utils::CowUtils;
    match value.cow_to_lowercase().as_ref() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Parse a Ruff-style target version string to u8 version number
    /// Supports: "py38" -> 8, "py39" -> 9, ..., "py313" -> 13
    pub fn parse_target_version(version_str: &str) -> Result<u8> {
        match version_str {
            "py38" => Ok(8),
            "py39" => Ok(9),
            "py310" => Ok(10),
            "py311" => Ok(11),
            "py312" => Ok(12),
            "py313" => Ok(13),
            _ => Err(anyhow!(
                "Invalid target version '{}'. Supported versions: py38, py39, py310, py311, py312, py313",
                version_str
            )),
        }
    }

    /// Get the Python minor version as u8 for stdlib membership checks
    pub fn python_version(&self) -> Result<u8> {
        Self::parse_target_version(&self.target_version)
    }

    /// Set the target version from a string value
    pub fn set_target_version(&mut self, version: String) -> Result<()> {
        Self::parse_target_version(&version)?;
        self.target_version = version;
        Ok(())
    }

    /// Compiled include pattern.
    pub fn include_regex(&self) -> Result<Regex> {
        directives::safe_compile(&self.include, "include")
    }

    /// Compiled exclude pattern.
    pub fn exclude_regex(&self) -> Result<Regex> {
        directives::safe_compile(&self.exclude, "exclude")
    }

    /// Load a single config file from a path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {path:?}"))?;

        config.python_version().with_context(|| {
            format!(
                "Invalid target-version in config file: {}",
                config.target_version
            )
        })?;

        Ok(config)
    }

    fn try_load_and_combine<P: AsRef<Path>>(
        config: &mut Config,
        path: P,
        context: &str,
    ) -> Result<()> {
        if path.as_ref().exists() {
            log::debug!("Loading {} from: {:?}", context, path.as_ref());
            let loaded = Self::load_from_file(&path)
                .with_context(|| format!("Failed to load {} from {:?}", context, path.as_ref()))?;
            *config = loaded.combine(config.clone());
        }
        Ok(())
    }

    /// Load configuration with hierarchical precedence:
    /// 1. CLI-provided config path (highest precedence)
    /// 2. Environment variables (PYPRUNE_*)
    /// 3. Project config (pyprune.toml in current directory)
    /// 4. User config (~/.config/pyprune/pyprune.toml)
    /// 5. System config (/etc/pyprune/pyprune.toml or equivalent)
    /// 6. Default values (lowest precedence)
    pub fn load(cli_config_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(system_config_path) = system_config_file() {
            Self::try_load_and_combine(&mut config, &system_config_path, "system config")?;
        }

        if let Some(user_config_dir) = user_pyprune_config_dir() {
            let user_config_path = user_config_dir.join("pyprune.toml");
            Self::try_load_and_combine(&mut config, &user_config_path, "user config")?;
        }

        let project_config_path = PathBuf::from("pyprune.toml");
        Self::try_load_and_combine(&mut config, &project_config_path, "project config")?;

        let env_config = EnvConfig::from_env();
        config = env_config.apply_to(config);

        if let Some(cli_config_path) = cli_config_path {
            Self::try_load_and_combine(&mut config, cli_config_path, "CLI config")?;
        }

        // Final validation
        config.python_version().with_context(|| {
            format!(
                "Invalid target-version in final config: {}",
                config.target_version
            )
        })?;
        config.include_regex()?;
        config.exclude_regex()?;

        Ok(config)
    }
}
