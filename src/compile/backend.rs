// src/compile/backend.rs

//! Pluggable compiler backend.
//!
//! The runtime talks to a `CompileBackend` instead of spawning compiler
//! commands itself, so tests can swap in a recorder. `CommandCompiler` is
//! the production implementation: each configured command runs through the
//! platform shell.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{CompileOutcome, CompileRequest};
use crate::config::CompilerSection;
use crate::engine::RuntimeEvent;
use crate::errors::{DevloopError, Result};
use crate::exec::shell_command;

/// Environment passed to compiler commands.
pub const ENV_COMPILE: &str = "DEVLOOP_COMPILE";
pub const ENV_COMPILED_PATH: &str = "DEVLOOP_COMPILED_PATH";
pub const ENV_CHANGED_PATH: &str = "DEVLOOP_CHANGED_PATH";

pub trait CompileBackend: Send {
    /// (Re)initialize the compiler. Awaited before the restart proceeds.
    fn init(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Start compiling `request`. Completion is reported asynchronously as
    /// `RuntimeEvent::CompileFinished`.
    fn compile(&mut self, request: CompileRequest) -> Result<()>;

    /// Tell the compiler that `path` changed.
    fn compile_changed(&mut self, path: &Path) -> Result<()>;
}

/// Runs the `[compiler]` commands.
#[derive(Debug)]
pub struct CommandCompiler {
    cmd: Option<String>,
    init_cmd: Option<String>,
    changed_cmd: Option<String>,
    cwd: Option<PathBuf>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl CommandCompiler {
    pub fn new(
        section: &CompilerSection,
        cwd: Option<PathBuf>,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
    ) -> Self {
        Self {
            cmd: section.cmd.clone(),
            init_cmd: section.init_cmd.clone(),
            changed_cmd: section.changed_cmd.clone(),
            cwd,
            runtime_tx,
        }
    }

    fn command(&self, cmd: &str) -> tokio::process::Command {
        let mut command = shell_command(cmd);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        command.stdin(Stdio::null());
        command
    }
}

impl CompileBackend for CommandCompiler {
    fn init(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let Some(init_cmd) = self.init_cmd.as_deref() else {
                return Ok(());
            };

            info!(cmd = %init_cmd, "initializing compiler");
            let status = self.command(init_cmd).status().await.map_err(|e| {
                DevloopError::SpawnError {
                    program: init_cmd.to_string(),
                    reason: e.to_string(),
                }
            })?;

            if !status.success() {
                // Keep going: the compiler reports its own errors and the
                // next config change retries.
                warn!(cmd = %init_cmd, code = ?status.code(), "compiler init failed");
            }
            Ok(())
        })
    }

    fn compile(&mut self, request: CompileRequest) -> Result<()> {
        let target = request.compiled_path.clone();

        let Some(cmd) = self.cmd.as_deref() else {
            debug!(module = %target, "no compiler command configured; nothing to compile");
            let tx = self.runtime_tx.clone();
            tokio::spawn(async move {
                let _ = tx
                    .send(RuntimeEvent::CompileFinished {
                        target,
                        outcome: CompileOutcome::Success,
                    })
                    .await;
            });
            return Ok(());
        };

        let mut command = self.command(cmd);
        command
            .env(ENV_COMPILE, &request.compile)
            .env(ENV_COMPILED_PATH, &request.compiled_path);

        let mut child = command.spawn().map_err(|e| DevloopError::SpawnError {
            program: cmd.to_string(),
            reason: e.to_string(),
        })?;

        info!(module = %target, descriptor = %request.compile, "compiling");

        let tx = self.runtime_tx.clone();
        tokio::spawn(async move {
            let outcome = match child.wait().await {
                Ok(status) if status.success() => CompileOutcome::Success,
                Ok(status) => CompileOutcome::Failed(status.code().unwrap_or(1)),
                Err(err) => {
                    warn!(module = %target, error = %err, "failed to wait for compiler");
                    CompileOutcome::Failed(-1)
                }
            };
            if let Err(err) = tx.send(RuntimeEvent::CompileFinished { target, outcome }).await {
                warn!("failed to send RuntimeEvent::CompileFinished: {err}");
            }
        });

        Ok(())
    }

    fn compile_changed(&mut self, path: &Path) -> Result<()> {
        let Some(cmd) = self.changed_cmd.as_deref() else {
            return Ok(());
        };

        let mut command = self.command(cmd);
        command.env(ENV_CHANGED_PATH, path);
        let mut child = command.spawn().map_err(|e| DevloopError::SpawnError {
            program: cmd.to_string(),
            reason: e.to_string(),
        })?;

        let path = path.to_path_buf();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!(?path, "compiler notified of change"),
                Ok(status) => warn!(?path, code = ?status.code(), "changed-file command failed"),
                Err(err) => warn!(?path, error = %err, "failed to wait for changed-file command"),
            }
        });
        Ok(())
    }
}
