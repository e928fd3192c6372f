// src/exec/supervisor.rs

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{ChildSpec, ProcessBackend};
use crate::engine::{ChildId, RuntimeEvent};
use crate::errors::{DevloopError, Result};
use crate::ipc::env::DEVLOOP_IPC_ADDR;
use crate::ipc::IpcChannel;

/// Delay between SIGTERM and SIGKILL when terminating a process group.
#[cfg(unix)]
const SIGKILL_ESCALATION_MS: u64 = 200;

struct ActiveChild {
    pid: u32,
    channel: Option<IpcChannel>,
    kill_tx: Option<oneshot::Sender<()>>,
    tree_kill: bool,
}

/// Production `ProcessBackend`: real OS processes via `tokio::process`.
///
/// Each spawned child gets its own IPC listener and a waiter task that
/// reports `RuntimeEvent::ChildExited` once the process is gone.
pub struct ProcessSupervisor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    active: HashMap<ChildId, ActiveChild>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("active", &self.active.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProcessSupervisor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            active: HashMap::new(),
        }
    }

    pub fn pid_of(&self, id: ChildId) -> Option<u32> {
        self.active.get(&id).map(|c| c.pid)
    }
}

impl ProcessBackend for ProcessSupervisor {
    fn spawn(&mut self, id: ChildId, spec: &ChildSpec) -> Result<u32> {
        let channel = IpcChannel::bind(id, self.runtime_tx.clone())?;

        let mut command = tokio::process::Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .env(DEVLOOP_IPC_ADDR, channel.addr().to_string())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if spec.stdin_null {
            command.stdin(Stdio::null());
        }
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        #[cfg(unix)]
        if spec.tree_kill {
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|e| DevloopError::SpawnError {
            program: spec.program.clone(),
            reason: e.to_string(),
        })?;
        let pid = child.id().ok_or_else(|| DevloopError::SpawnError {
            program: spec.program.clone(),
            reason: "process exited before its pid was known".to_string(),
        })?;

        info!(child = %id, pid, program = %spec.program, "child spawned");

        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let tx = self.runtime_tx.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Ok(()) = &mut kill_rx => {
                    if let Err(err) = child.start_kill() {
                        warn!(child = %id, error = %err, "failed to kill child");
                    }
                    child.wait().await
                }
            };

            let code = match status {
                Ok(status) => exit_code(status),
                Err(err) => {
                    warn!(child = %id, error = %err, "failed to wait for child");
                    None
                }
            };
            debug!(child = %id, ?code, "child exited");

            if let Err(err) = tx.send(RuntimeEvent::ChildExited { id, code }).await {
                warn!("failed to send RuntimeEvent::ChildExited: {err}");
            }
        });

        self.active.insert(
            id,
            ActiveChild {
                pid,
                channel: Some(channel),
                kill_tx: Some(kill_tx),
                tree_kill: spec.tree_kill,
            },
        );
        Ok(pid)
    }

    fn stop(&mut self, id: ChildId, signal: bool) -> Result<()> {
        let Some(active) = self.active.get_mut(&id) else {
            debug!(child = %id, "stop for unknown child ignored");
            return Ok(());
        };

        if let Some(channel) = active.channel.take() {
            channel.disconnect();
        }
        if !signal {
            debug!(child = %id, "child terminates by itself; not signalling");
            return Ok(());
        }

        info!(child = %id, pid = active.pid, tree = active.tree_kill, "stopping child");
        terminate(active)
    }

    fn kill(&mut self, id: ChildId) {
        let Some(active) = self.active.get_mut(&id) else {
            return;
        };
        active.channel.take();
        if let Err(err) = terminate(active) {
            warn!(child = %id, error = %err, "failed to kill child");
        }
        // Escalate to a hard kill if the waiter gets to run before exit.
        if let Some(kill_tx) = active.kill_tx.take() {
            let _ = kill_tx.send(());
        }
    }

    fn reap(&mut self, id: ChildId) {
        if self.active.remove(&id).is_some() {
            debug!(child = %id, "child reaped");
        }
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;

    if let Some(signal) = status.signal() {
        debug!(signal, "child terminated by signal");
    }
    status.code()
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code()
}

/// Send SIGTERM to the child, or to its whole process group with a delayed
/// SIGKILL for stragglers.
#[cfg(unix)]
fn terminate(active: &mut ActiveChild) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(active.pid as i32);

    if !active.tree_kill {
        return match kill(pid, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(err) => Err(DevloopError::Other(anyhow::anyhow!(
                "failed to signal pid {}: {err}",
                active.pid
            ))),
        };
    }

    match killpg(pid, Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => {
            return Err(DevloopError::Other(anyhow::anyhow!(
                "failed to signal process group {}: {err}",
                active.pid
            )));
        }
    }

    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(SIGKILL_ESCALATION_MS)).await;
        match killpg(pid, Signal::SIGKILL) {
            Ok(()) => debug!(pgid = %pid, "sent SIGKILL to process group"),
            Err(Errno::ESRCH) => {}
            Err(err) => warn!(pgid = %pid, error = %err, "failed to SIGKILL process group"),
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn terminate(active: &mut ActiveChild) -> Result<()> {
    if let Some(kill_tx) = active.kill_tx.take() {
        let _ = kill_tx.send(());
    }
    Ok(())
}
