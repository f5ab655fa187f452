//! Locations of `pyprune.toml` configuration files outside the project.

use std::{
    env,
    path::{Path, PathBuf},
};

use etcetera::BaseStrategy;

const CONFIG_DIR: &str = "pyprune";
const CONFIG_FILE: &str = "pyprune.toml";

/// Per-user configuration directory: `%APPDATA%\pyprune` on Windows,
/// `$XDG_CONFIG_HOME/pyprune` (or `~/.config/pyprune`) elsewhere.
pub fn user_pyprune_config_dir() -> Option<PathBuf> {
    etcetera::choose_base_strategy()
        .ok()
        .map(|dirs| dirs.config_dir().join(CONFIG_DIR))
}

#[cfg(not(windows))]
fn locate_system_config_xdg(value: Option<&str>) -> Option<PathBuf> {
    let config_dirs = value.filter(|s| !s.is_empty()).unwrap_or("/etc/xdg");
    config_dirs
        .split(':')
        .take_while(|s| !s.is_empty())
        .map(|dir| Path::new(dir).join(CONFIG_DIR).join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

#[cfg(windows)]
fn locate_system_config_windows(system_drive: impl AsRef<Path>) -> Option<PathBuf> {
    let candidate = system_drive
        .as_ref()
        .join("ProgramData")
        .join(CONFIG_DIR)
        .join(CONFIG_FILE);
    candidate.as_path().is_file().then_some(candidate)
}

/// System-wide configuration file, if one exists: `XDG_CONFIG_DIRS` then
/// `/etc/pyprune/pyprune.toml` on Unix, `%SYSTEMDRIVE%\ProgramData` on
/// Windows.
pub fn system_config_file() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        env::var("SYSTEMDRIVE")
            .ok()
            .and_then(|system_drive| locate_system_config_windows(PathBuf::from(system_drive)))
    }

    #[cfg(not(windows))]
    {
        let xdg_config_dirs = env::var("XDG_CONFIG_DIRS").ok();
        if let Some(path) = locate_system_config_xdg(xdg_config_dirs.as_deref()) {
            return Some(path);
        }

        let candidate = Path::new("/etc").join(CONFIG_DIR).join(CONFIG_FILE);
        match candidate.try_exists() {
            Ok(true) => Some(candidate),
            Ok(false) => None,
            Err(err) => {
                log::warn!("Failed to query system configuration file: {err}");
                None
            }
        }
    }
}
