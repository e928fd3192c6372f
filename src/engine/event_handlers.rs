// src/engine/event_handlers.rs

//! Event handling logic for the core orchestrator.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::compile::{CompileOutcome, CompileRequest};
use crate::engine::core::{ChildHandle, Connectivity, Orchestrator};
use crate::engine::{ChildId, SupervisorState};
use crate::ipc::IpcMessage;

/// Command produced by the pure core, to be executed by the IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    ClearScreen,
    /// (Re)initialize the compiler; awaited before later commands run.
    ReinitCompiler,
    /// Tell the compiler a file changed.
    CompileChanged(PathBuf),
    Compile(CompileRequest),
    UnwatchAll,
    Watch(PathBuf),
    Spawn(ChildId),
    /// Disconnect the child and, if `signal`, ask it to terminate.
    Stop { id: ChildId, signal: bool },
    /// Surface a fatal error reported by the child.
    ReportCrash { id: ChildId, stack: String },
    /// One-time guidance after the watcher fell back to polling.
    WarnWatchFallback { reason: String, suggest_no_deps: bool },
    /// Best-effort immediate termination (shutdown).
    Kill(ChildId),
    /// End the session with this exit code.
    Exit(i32),
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn continue_with(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    fn exit(mut commands: Vec<CoreCommand>, code: i32) -> Self {
        commands.push(CoreCommand::Exit(code));
        Self {
            commands,
            keep_running: false,
        }
    }
}

/// Start a new child generation. Only called when no child exists, which is
/// what rules out two live children.
pub(super) fn spawn_child(core: &mut Orchestrator) -> Vec<CoreCommand> {
    debug_assert!(core.child.is_none(), "spawn while a child is alive");

    let id = ChildId(core.next_id);
    core.next_id += 1;
    core.child = Some(ChildHandle::new(id, core.options.respawn));
    core.restart_on_exit = false;
    core.state = SupervisorState::Starting;

    info!(child = %id, "starting child");

    let mut commands = vec![CoreCommand::Spawn(id)];
    let statics: Vec<PathBuf> = core
        .options
        .static_paths
        .iter()
        .chain(core.options.compiler_config.iter())
        .cloned()
        .collect();
    for path in statics {
        commands.extend(track(core, path));
    }
    commands
}

/// Add `path` to the watch set if the classifier admits it.
fn track(core: &mut Orchestrator, path: PathBuf) -> Option<CoreCommand> {
    if core.watch_set.contains(&path) {
        return None;
    }
    if !core.filter.should_watch(&path) {
        debug!(?path, "not watching (ignored or too deep)");
        return None;
    }
    core.watch_set.insert(path.clone());
    Some(CoreCommand::Watch(path))
}

/// Stop the current child. Idempotent: a child already stopping is left
/// alone. With `will_terminate` the child exits by itself and is only
/// disconnected.
fn stop_child(core: &mut Orchestrator, will_terminate: bool) -> Vec<CoreCommand> {
    let Some(child) = core.child.as_mut() else {
        return Vec::new();
    };
    if child.stopping {
        debug!(child = %child.id, "already stopping");
        return Vec::new();
    }

    child.stopping = true;
    child.respawn = true;
    core.state = SupervisorState::Stopping;

    if child.connectivity != Connectivity::Connected {
        return Vec::new();
    }
    child.connectivity = Connectivity::Disconnected;
    vec![CoreCommand::Stop {
        id: child.id,
        signal: !will_terminate,
    }]
}

/// Handle a debounced file change or a manual restart.
pub fn handle_file_changed(core: &mut Orchestrator, path: PathBuf, manual: bool) -> CoreStep {
    if !manual && core.options.is_own_file(&path) {
        debug!(?path, "ignoring change to devloop's own file");
        return CoreStep::continue_with(Vec::new());
    }

    let mut commands = Vec::new();

    if !manual && core.options.compiler_config.as_deref() == Some(path.as_path()) {
        info!(?path, "compiler configuration changed; reinitializing");
        commands.push(CoreCommand::ReinitCompiler);
    }
    if core.options.clear {
        commands.push(CoreCommand::ClearScreen);
    }
    if manual {
        info!("manual restart");
    } else {
        info!(?path, "restarting: file changed");
        commands.push(CoreCommand::CompileChanged(path));
    }

    match core.state {
        SupervisorState::Stopping | SupervisorState::RestartPending => {
            if core.restart_on_exit {
                info!("already starting");
            } else {
                // The child is going down after a crash; restart once it's gone.
                core.restart_on_exit = true;
                core.watch_set.clear();
                commands.push(CoreCommand::UnwatchAll);
            }
            core.state = SupervisorState::RestartPending;
        }
        SupervisorState::Idle | SupervisorState::Starting | SupervisorState::Running => {
            core.watch_set.clear();
            commands.push(CoreCommand::UnwatchAll);

            if core.child.is_some() {
                core.restart_on_exit = true;
                commands.extend(stop_child(core, false));
            } else {
                commands.extend(spawn_child(core));
            }
        }
    }

    CoreStep::continue_with(commands)
}

pub fn handle_watcher_fell_back(core: &mut Orchestrator, reason: String) -> CoreStep {
    if core.fallback_warned {
        return CoreStep::continue_with(Vec::new());
    }
    core.fallback_warned = true;
    CoreStep::continue_with(vec![CoreCommand::WarnWatchFallback {
        reason,
        suggest_no_deps: core.filter.max_depth().watches_dependencies(),
    }])
}

pub fn handle_child_spawned(core: &mut Orchestrator, id: ChildId, pid: u32) -> CoreStep {
    if let Some(child) = core.child.as_mut().filter(|c| c.id == id) {
        child.pid = Some(pid);
    }
    CoreStep::continue_with(Vec::new())
}

pub fn handle_child_connected(core: &mut Orchestrator, id: ChildId) -> CoreStep {
    let is_current = core.child.as_ref().is_some_and(|c| c.id == id);
    if is_current && core.state == SupervisorState::Starting {
        core.state = SupervisorState::Running;
        debug!(child = %id, "child connected");
    }
    CoreStep::continue_with(Vec::new())
}

/// Dispatch one IPC message from generation `id`.
pub fn handle_ipc(core: &mut Orchestrator, id: ChildId, message: IpcMessage) -> CoreStep {
    let live = core
        .child
        .as_ref()
        .is_some_and(|c| c.id == id && c.connectivity == Connectivity::Connected);
    if !live {
        debug!(child = %id, ?message, "ignoring message from stale or disconnected child");
        return CoreStep::continue_with(Vec::new());
    }
    if core.state == SupervisorState::Starting {
        core.state = SupervisorState::Running;
    }

    let mut commands = Vec::new();
    match message {
        IpcMessage::Required(path) => commands.extend(track(core, path)),
        IpcMessage::Compile(request) => {
            if let Some(request) = core.compiles.request(request) {
                commands.push(CoreCommand::Compile(request));
            }
        }
        IpcMessage::Error(report) => {
            commands.push(CoreCommand::ReportCrash {
                id,
                stack: report.stack,
            });
            commands.extend(stop_child(core, report.will_terminate));
        }
    }

    CoreStep::continue_with(commands)
}

/// Handle the exit of a child process.
pub fn handle_child_exited(core: &mut Orchestrator, id: ChildId, code: Option<i32>) -> CoreStep {
    let Some(child) = core.child.as_ref().filter(|c| c.id == id) else {
        debug!(child = %id, "exit of stale child ignored");
        return CoreStep::continue_with(Vec::new());
    };

    // Signal deaths have no code.
    let code = code.unwrap_or(1);

    if !child.respawn {
        info!(child = %id, code, "child exited; exiting with its code");
        core.child = None;
        core.state = SupervisorState::Idle;
        return CoreStep::exit(Vec::new(), code);
    }

    core.child = None;
    if core.restart_on_exit {
        debug!(child = %id, code, "child exited; restarting");
        CoreStep::continue_with(spawn_child(core))
    } else {
        info!(child = %id, code, "child exited; waiting for changes");
        core.state = SupervisorState::Idle;
        CoreStep::continue_with(Vec::new())
    }
}

pub fn handle_spawn_failed(core: &mut Orchestrator, id: ChildId, error: String) -> CoreStep {
    warn!(child = %id, %error, "child failed to start");
    core.child = None;
    core.state = SupervisorState::Idle;
    CoreStep::exit(Vec::new(), 1)
}

pub fn handle_compile_requested(core: &mut Orchestrator, request: CompileRequest) -> CoreStep {
    let commands = core
        .compiles
        .request(request)
        .map(CoreCommand::Compile)
        .into_iter()
        .collect();
    CoreStep::continue_with(commands)
}

pub fn handle_compile_finished(
    core: &mut Orchestrator,
    target: String,
    outcome: CompileOutcome,
) -> CoreStep {
    match outcome {
        CompileOutcome::Success => info!(module = %target, "compiled"),
        CompileOutcome::Failed(code) => warn!(module = %target, code, "compile failed"),
    }
    if !core.compiles.finish(&target) {
        debug!(module = %target, "completion for a target that is no longer active");
    }
    CoreStep::continue_with(Vec::new())
}

/// SIGTERM / Ctrl-C: kill the child best-effort and exit cleanly.
pub fn handle_shutdown(core: &mut Orchestrator) -> CoreStep {
    info!("shutdown requested");
    let mut commands = Vec::new();
    if let Some(child) = core.child.take() {
        commands.push(CoreCommand::Kill(child.id));
    }
    core.state = SupervisorState::Idle;
    CoreStep::exit(commands, 0)
}
