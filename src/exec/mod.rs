// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`spec`] resolves what to run (program, args, environment) from the
//!   config.
//! - [`supervisor`] owns the running child: spawn, IPC hook-up, stop, kill
//!   and exit reporting via `RuntimeEvent::ChildExited`.
//!
//! The runtime talks to a [`ProcessBackend`] so tests can replace real
//! processes with a recorder.

pub mod spec;
pub mod supervisor;

pub use spec::ChildSpec;
pub use supervisor::ProcessSupervisor;

use crate::engine::ChildId;
use crate::errors::Result;

/// Trait abstracting how the supervised child is run.
pub trait ProcessBackend: Send {
    /// Start generation `id` of the child. Returns its OS pid.
    fn spawn(&mut self, id: ChildId, spec: &ChildSpec) -> Result<u32>;

    /// Disconnect the child's IPC channel and, if `signal` is set, ask it to
    /// terminate. The exit is reported later as `RuntimeEvent::ChildExited`.
    fn stop(&mut self, id: ChildId, signal: bool) -> Result<()>;

    /// Best-effort immediate termination, used on shutdown.
    fn kill(&mut self, id: ChildId);

    /// Forget a child whose exit has been handled.
    fn reap(&mut self, id: ChildId);
}

/// Build a command running `cmd` through the platform shell.
pub fn shell_command(cmd: &str) -> tokio::process::Command {
    #[cfg(unix)]
    {
        let mut command = tokio::process::Command::new("sh");
        command.arg("-c").arg(cmd);
        command
    }
    #[cfg(not(unix))]
    {
        let mut command = tokio::process::Command::new("cmd");
        command.arg("/C").arg(cmd);
        command
    }
}
