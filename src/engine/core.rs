// src/engine/core.rs

//! Pure core state machine.
//!
//! [`Orchestrator`] consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for reading
//! events from channels and executing the commands against the process,
//! watch and compile backends.
//!
//! The core owns no channels, no Tokio types, and performs no IO, so every
//! interleaving of events can be unit tested directly.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::compile::CompileCoordinator;
use crate::engine::event_handlers::{
    handle_child_connected, handle_child_exited, handle_child_spawned, handle_compile_finished,
    handle_compile_requested, handle_file_changed, handle_ipc, handle_shutdown,
    handle_spawn_failed, handle_watcher_fell_back, spawn_child, CoreCommand, CoreStep,
};
use crate::engine::{ChildId, RuntimeEvent, RuntimeOptions, SupervisorState};
use crate::watch::WatchFilter;

/// Whether the child's IPC channel is still live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Connected,
    /// The supervisor closed the channel while stopping the child.
    Disconnected,
}

/// The supervisor's view of one spawned child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildHandle {
    pub id: ChildId,
    pub pid: Option<u32>,
    pub connectivity: Connectivity,
    /// A stop was already issued; further stops are no-ops.
    pub stopping: bool,
    /// On exit, keep supervising instead of exiting with the child's code.
    pub respawn: bool,
}

impl ChildHandle {
    pub fn new(id: ChildId, respawn: bool) -> Self {
        Self {
            id,
            pid: None,
            connectivity: Connectivity::Connected,
            stopping: false,
            respawn,
        }
    }
}

/// Files the current child generation has loaded (plus static paths) that
/// passed the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSet(BTreeSet<PathBuf>);

impl WatchSet {
    /// Returns true if `path` was newly added.
    pub fn insert(&mut self, path: PathBuf) -> bool {
        self.0.insert(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.0.contains(path)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.0.iter()
    }
}

/// Restart orchestrator state.
#[derive(Debug)]
pub struct Orchestrator {
    pub(super) state: SupervisorState,
    pub(super) child: Option<ChildHandle>,
    /// Spawn a new child once the current one has exited.
    pub(super) restart_on_exit: bool,
    pub(super) next_id: u64,
    pub(super) watch_set: WatchSet,
    pub(super) filter: WatchFilter,
    pub(super) compiles: CompileCoordinator,
    pub(super) options: RuntimeOptions,
    pub(super) fallback_warned: bool,
}

impl Orchestrator {
    pub fn new(filter: WatchFilter, options: RuntimeOptions) -> Self {
        Self {
            state: SupervisorState::Idle,
            child: None,
            restart_on_exit: false,
            next_id: 1,
            watch_set: WatchSet::default(),
            filter,
            compiles: CompileCoordinator::new(),
            options,
            fallback_warned: false,
        }
    }

    /// Commands for session startup: initialize the compiler, then spawn
    /// the first child.
    pub fn start(&mut self) -> CoreStep {
        let mut commands = vec![CoreCommand::ReinitCompiler];
        commands.extend(spawn_child(self));
        CoreStep {
            commands,
            keep_running: true,
        }
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::FileChanged { path, manual } => handle_file_changed(self, path, manual),
            RuntimeEvent::WatcherFellBack { reason } => handle_watcher_fell_back(self, reason),
            RuntimeEvent::ChildSpawned { id, pid } => handle_child_spawned(self, id, pid),
            RuntimeEvent::ChildConnected { id } => handle_child_connected(self, id),
            RuntimeEvent::Ipc { id, message } => handle_ipc(self, id, message),
            RuntimeEvent::ChildExited { id, code } => handle_child_exited(self, id, code),
            RuntimeEvent::SpawnFailed { id, error } => handle_spawn_failed(self, id, error),
            RuntimeEvent::CompileRequested { request } => handle_compile_requested(self, request),
            RuntimeEvent::CompileFinished { target, outcome } => {
                handle_compile_finished(self, target, outcome)
            }
            RuntimeEvent::ShutdownRequested => handle_shutdown(self),
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn child(&self) -> Option<&ChildHandle> {
        self.child.as_ref()
    }

    pub fn restart_armed(&self) -> bool {
        self.restart_on_exit
    }

    pub fn watch_set(&self) -> &WatchSet {
        &self.watch_set
    }

    pub fn compiles(&self) -> &CompileCoordinator {
        &self.compiles
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }
}
