// src/exec/spec.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::ConfigFile;
use crate::fs::FileSystem;
use crate::ipc::env::{
    DEFAULT_EVAL_FILENAME, DEVLOOP_COMPILE_MARKER, DEVLOOP_DEV_MODE, DEVLOOP_ENV, DEVLOOP_EVAL,
    DEVLOOP_EVAL_FILENAME, DEVLOOP_RELAY, DEVLOOP_TYPEGEN_CONTEXT,
};

/// Everything needed to start one generation of the child, except the IPC
/// address, which is per generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Overlay on top of the supervisor's own environment.
    pub env: BTreeMap<String, String>,
    /// Detach the child from stdin (the supervisor reads it for manual
    /// restarts).
    pub stdin_null: bool,
    /// Run the child in its own process group and signal the whole group.
    pub tree_kill: bool,
}

impl ChildSpec {
    pub fn from_config(cfg: &ConfigFile, fs: &dyn FileSystem) -> Self {
        let mut env = BTreeMap::new();

        env.insert(DEVLOOP_DEV_MODE.to_string(), "true".to_string());
        let app_env = std::env::var(DEVLOOP_ENV).unwrap_or_else(|_| "development".to_string());
        env.insert(DEVLOOP_ENV.to_string(), app_env);

        if let Some(eval) = &cfg.entry.eval {
            env.insert(DEVLOOP_EVAL.to_string(), eval.clone());
            let filename = cfg
                .entry
                .eval_filename
                .clone()
                .unwrap_or_else(|| DEFAULT_EVAL_FILENAME.to_string());
            env.insert(DEVLOOP_EVAL_FILENAME.to_string(), filename);
        }

        if let Some(path) = &cfg.entry.context_file {
            match read_context(fs, path) {
                Ok(json) => {
                    env.insert(DEVLOOP_TYPEGEN_CONTEXT.to_string(), json);
                }
                Err(err) => warn!(?path, error = %err, "type context not forwarded to the child"),
            }
        }

        env.insert(
            DEVLOOP_COMPILE_MARKER.to_string(),
            cfg.compiler.marker_file.to_string_lossy().into_owned(),
        );
        let relay = if cfg.supervisor.fork { "1" } else { "0" };
        env.insert(DEVLOOP_RELAY.to_string(), relay.to_string());

        // User overlay wins.
        for (key, value) in &cfg.entry.env {
            env.insert(key.clone(), value.clone());
        }

        debug!(keys = ?env.keys().collect::<Vec<_>>(), "child environment overlay");

        Self {
            program: cfg.entry.cmd.clone(),
            args: cfg.entry.args.clone(),
            cwd: cfg.entry.cwd.clone(),
            env,
            stdin_null: cfg.supervisor.manual_restart_token().is_some(),
            tree_kill: cfg.supervisor.tree_kill,
        }
    }
}

/// Read the type-context document and normalize it to compact JSON.
fn read_context(fs: &dyn FileSystem, path: &std::path::Path) -> anyhow::Result<String> {
    if !fs.exists(path) {
        anyhow::bail!("context file does not exist");
    }
    let raw = fs.read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    Ok(serde_json::to_string(&value)?)
}
