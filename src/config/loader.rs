// src/config/loader.rs

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DevloopError, Result};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "Devloop.toml";

/// Read and deserialize `path` without semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        DevloopError::ConfigError(format!("cannot read {}: {e}", path.display()))
    })?;
    Ok(toml::from_str(&contents)?)
}

/// Read, deserialize and validate `path`.
///
/// Relative paths inside the file stay relative; resolve them with
/// [`ConfigFile::rooted_at`] and [`config_root_dir`].
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let config = ConfigFile::try_from(load_from_path(path)?)?;
    debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Directory that relative config paths are resolved against: the config
/// file's own directory, or the working directory for a bare file name.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    let dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    dir.canonicalize().unwrap_or(dir)
}
