// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DevloopError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DevloopError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.entry,
            raw.watch,
            raw.supervisor,
            raw.compiler,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_entry(cfg)?;
    validate_watch(cfg)?;
    validate_compiler(cfg)?;
    Ok(())
}

fn validate_entry(cfg: &RawConfigFile) -> Result<()> {
    if cfg.entry.cmd.trim().is_empty() {
        return Err(DevloopError::ConfigError(
            "[entry].cmd must not be empty".to_string(),
        ));
    }
    if cfg.entry.eval_filename.is_some() && cfg.entry.eval.is_none() {
        return Err(DevloopError::ConfigError(
            "[entry].eval_filename is set but [entry].eval is missing".to_string(),
        ));
    }
    Ok(())
}

fn validate_watch(cfg: &RawConfigFile) -> Result<()> {
    // An empty rule would match every path, both as prefix and as regex.
    if let Some(idx) = cfg.watch.ignore.iter().position(|r| r.is_empty()) {
        return Err(DevloopError::ConfigError(format!(
            "[watch].ignore[{idx}] is empty; it would ignore every file"
        )));
    }

    let boundary = cfg.watch.boundary.trim();
    if boundary.is_empty() || boundary.contains('/') || boundary.contains('\\') {
        return Err(DevloopError::ConfigError(format!(
            "[watch].boundary must be a single directory name (got {:?})",
            cfg.watch.boundary
        )));
    }

    if cfg.watch.interval_ms == 0 {
        return Err(DevloopError::ConfigError(
            "[watch].interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_compiler(cfg: &RawConfigFile) -> Result<()> {
    if cfg.compiler.marker_file.as_os_str().is_empty() {
        return Err(DevloopError::ConfigError(
            "[compiler].marker_file must not be empty".to_string(),
        ));
    }
    Ok(())
}
