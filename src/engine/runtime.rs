// src/engine/runtime.rs

use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::compile::{CompileBackend, CompileOutcome, MarkerFile};
use crate::errors::Result;
use crate::exec::{ChildSpec, ProcessBackend};
use crate::fs::FileSystem;
use crate::watch::{WatchBackend, WatchOutcome};

use super::core::Orchestrator;
use super::{CoreCommand, CoreStep, RuntimeEvent};

/// The three backends the runtime drives.
pub struct Backends<P, W, C> {
    pub processes: P,
    pub watcher: W,
    pub compiler: C,
}

/// Files the session owns on disk.
#[derive(Debug, Clone)]
pub struct SessionFiles {
    pub fs: Arc<dyn FileSystem>,
    /// Compile-request marker, truncated before every spawn.
    pub marker: MarkerFile,
    /// Sentinel holding the pid of the current child.
    pub ready: Option<PathBuf>,
}

/// Drives the orchestrator in response to `RuntimeEvent`s and executes its
/// commands against the process, watch and compile backends.
///
/// This is a pure IO shell around `Orchestrator`, which contains all the
/// restart semantics.
pub struct Runtime<P: ProcessBackend, W: WatchBackend, C: CompileBackend> {
    core: Orchestrator,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    /// Events produced while executing commands; handled before the channel.
    backlog: VecDeque<RuntimeEvent>,
    backends: Backends<P, W, C>,
    spec: ChildSpec,
    files: SessionFiles,
}

impl<P: ProcessBackend, W: WatchBackend, C: CompileBackend> fmt::Debug for Runtime<P, W, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("backlog", &self.backlog.len())
            .finish_non_exhaustive()
    }
}

impl<P: ProcessBackend, W: WatchBackend, C: CompileBackend> Runtime<P, W, C> {
    pub fn new(
        core: Orchestrator,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        backends: Backends<P, W, C>,
        spec: ChildSpec,
        files: SessionFiles,
    ) -> Self {
        Self {
            core,
            event_rx,
            backlog: VecDeque::new(),
            backends,
            spec,
            files,
        }
    }

    /// Main event loop. Returns the exit code for the supervisor process.
    ///
    /// - Starts the session (compiler init, first spawn).
    /// - Feeds every event into the core and executes the returned commands.
    /// - Stops when the core asks to exit or every event sender is gone.
    pub async fn run(mut self) -> Result<i32> {
        info!("devloop runtime started");

        let step = self.core.start();
        if let Some(code) = self.apply(step).await? {
            return Ok(code);
        }

        loop {
            let event = match self.backlog.pop_front() {
                Some(e) => e,
                None => match self.event_rx.recv().await {
                    Some(e) => e,
                    None => {
                        info!("runtime event channel closed; exiting");
                        return Ok(0);
                    }
                },
            };

            debug!(?event, "runtime received event");

            if let RuntimeEvent::ChildExited { id, .. } = &event {
                self.backends.processes.reap(*id);
            }

            let step = self.core.step(event);
            if let Some(code) = self.apply(step).await? {
                info!(code, "runtime exiting");
                return Ok(code);
            }
        }
    }

    /// Execute a step's commands. `Some(code)` when the session is over.
    async fn apply(&mut self, step: CoreStep) -> Result<Option<i32>> {
        let mut exit_code = None;
        for command in step.commands {
            if let CoreCommand::Exit(code) = command {
                exit_code = Some(code);
                continue;
            }
            self.execute_command(command).await?;
        }

        if step.keep_running {
            Ok(None)
        } else {
            Ok(Some(exit_code.unwrap_or(0)))
        }
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::ClearScreen => clear_screen(),
            CoreCommand::ReinitCompiler => {
                if let Err(err) = self.backends.compiler.init().await {
                    warn!(error = %err, "compiler initialization failed");
                }
            }
            CoreCommand::CompileChanged(path) => {
                if let Err(err) = self.backends.compiler.compile_changed(&path) {
                    warn!(?path, error = %err, "failed to notify compiler of change");
                }
            }
            CoreCommand::Compile(request) => {
                let target = request.compiled_path.clone();
                if let Err(err) = self.backends.compiler.compile(request) {
                    warn!(module = %target, error = %err, "failed to start compiler");
                    self.backlog.push_back(RuntimeEvent::CompileFinished {
                        target,
                        outcome: CompileOutcome::Failed(-1),
                    });
                }
            }
            CoreCommand::UnwatchAll => self.backends.watcher.unwatch_all(),
            CoreCommand::Watch(path) => match self.backends.watcher.watch(&path) {
                Ok(WatchOutcome::FellBack { reason }) => {
                    self.backlog.push_back(RuntimeEvent::WatcherFellBack { reason });
                }
                Ok(WatchOutcome::Missing) => debug!(?path, "required path does not exist"),
                Ok(_) => {}
                Err(err) => warn!(?path, error = %err, "failed to watch path"),
            },
            CoreCommand::Spawn(id) => self.spawn(id),
            CoreCommand::Stop { id, signal } => {
                if let Err(err) = self.backends.processes.stop(id, signal) {
                    warn!(child = %id, error = %err, "failed to stop child");
                }
            }
            CoreCommand::ReportCrash { id, stack } => {
                error!(child = %id, "child crashed:\n{stack}");
                info!("waiting for file changes before restart");
            }
            CoreCommand::WarnWatchFallback {
                reason,
                suggest_no_deps,
            } => {
                let hint = if suggest_no_deps {
                    " or set `deps = 0` (`--deps 0`) to stop watching dependencies"
                } else {
                    ""
                };
                warn!(
                    %reason,
                    "native file watching is exhausted; falling back to polling. \
                     Raise the limit with `ulimit -n 10000`{hint}"
                );
            }
            CoreCommand::Kill(id) => self.backends.processes.kill(id),
            CoreCommand::Exit(_) => {}
        }
        Ok(())
    }

    fn spawn(&mut self, id: super::ChildId) {
        if let Err(err) = self.files.marker.reset(self.files.fs.as_ref()) {
            warn!(path = ?self.files.marker.path(), error = %err, "failed to reset compile marker");
        }

        match self.backends.processes.spawn(id, &self.spec) {
            Ok(pid) => {
                self.backlog.push_back(RuntimeEvent::ChildSpawned { id, pid });
                if let Some(ready) = &self.files.ready {
                    if let Err(err) = self.files.fs.write(ready, format!("{pid}\n").as_bytes()) {
                        warn!(path = ?ready, error = %err, "failed to write ready file");
                    }
                }
            }
            Err(err) => {
                error!(child = %id, error = %err, "failed to spawn child");
                self.backlog.push_back(RuntimeEvent::SpawnFailed {
                    id,
                    error: err.to_string(),
                });
            }
        }
    }

    pub fn core(&self) -> &Orchestrator {
        &self.core
    }
}

fn clear_screen() {
    let mut stdout = std::io::stdout();
    if let Err(err) = stdout
        .write_all(b"\x1B[2J\x1B[3J\x1B[H")
        .and_then(|()| stdout.flush())
    {
        debug!(error = %err, "failed to clear the terminal");
    }
}
