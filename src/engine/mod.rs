// src/engine/mod.rs

//! Restart orchestration for devloop.
//!
//! This module ties together:
//! - the watch set (what the current child has loaded)
//! - the compile coordinator
//! - the child lifecycle (spawn, stop, restart on exit)
//! - the main runtime event loop that reacts to:
//!   - debounced file changes and manual restarts
//!   - IPC messages from the child and its descendants
//!   - child exits
//!   - compiler completions
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::fmt;
use std::path::{Path, PathBuf};

use crate::compile::{CompileOutcome, CompileRequest};
use crate::config::ConfigFile;
use crate::ipc::IpcMessage;

/// Generation number of a spawned child. Every spawn gets a fresh id, so
/// events from an old generation can be told apart and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChildId(pub u64);

impl fmt::Display for ChildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of the supervision session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No child running; waiting for a change.
    Idle,
    /// Child spawned, no message from it yet.
    Starting,
    Running,
    /// Child asked to stop, either for a restart or after a crash.
    Stopping,
    /// A further change arrived while the child was stopping; the restart
    /// is armed and later changes are absorbed.
    RestartPending,
}

/// Events flowing into the runtime from watchers, IPC readers, process
/// waiters, the compiler and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A watched file changed (debounced), or a manual restart was typed
    /// (`manual = true`, empty path).
    FileChanged { path: PathBuf, manual: bool },
    /// The native watcher ran out of capacity and switched to polling.
    WatcherFellBack { reason: String },
    /// The child's OS pid is known.
    ChildSpawned { id: ChildId, pid: u32 },
    /// First IPC connection from this generation.
    ChildConnected { id: ChildId },
    Ipc { id: ChildId, message: IpcMessage },
    /// `code` is `None` when the child died from a signal.
    ChildExited { id: ChildId, code: Option<i32> },
    SpawnFailed { id: ChildId, error: String },
    /// Compile request read from the marker file.
    CompileRequested { request: CompileRequest },
    CompileFinished { target: String, outcome: CompileOutcome },
    /// SIGTERM / Ctrl-C.
    ShutdownRequested,
}

/// Options used by the core.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Keep supervising after the child exits on its own.
    pub respawn: bool,
    /// Clear the terminal before every restart.
    pub clear: bool,
    /// The compiler's configuration file; a change to it reinitializes the
    /// compiler.
    pub compiler_config: Option<PathBuf>,
    /// Paths watched on every spawn regardless of what the child loads.
    pub static_paths: Vec<PathBuf>,
    /// Files devloop writes itself (compile marker, ready file). Changes to
    /// them, or to the directories holding them, never restart the child.
    pub own_files: Vec<PathBuf>,
}

impl RuntimeOptions {
    /// Whether `path` is one of devloop's own files or a directory holding
    /// one.
    pub fn is_own_file(&self, path: &Path) -> bool {
        self.own_files
            .iter()
            .any(|own| own == path || own.parent() == Some(path))
    }


    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            respawn: cfg.supervisor.respawn,
            clear: cfg.supervisor.clear,
            compiler_config: cfg.compiler.config_file.clone(),
            static_paths: cfg.watch.paths.clone(),
            own_files: std::iter::once(cfg.compiler.marker_file.clone())
                .chain(cfg.supervisor.ready_file.clone())
                .collect(),
        }
    }
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use self::core::{ChildHandle, Connectivity, Orchestrator, WatchSet};
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::{Backends, Runtime, SessionFiles};
