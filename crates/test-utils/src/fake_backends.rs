use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use devloop::compile::{CompileBackend, CompileOutcome, CompileRequest};
use devloop::engine::{ChildId, RuntimeEvent};
use devloop::errors::{DevloopError, Result};
use devloop::exec::{ChildSpec, ProcessBackend};
use devloop::watch::{WatchBackend, WatchOutcome};

/// Shared, inspectable call log.
pub type CallLog<T> = Arc<Mutex<Vec<T>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessCall {
    Spawn(ChildId),
    Stop { id: ChildId, signal: bool },
    Kill(ChildId),
    Reap(ChildId),
}

/// A fake process backend that:
/// - records every call
/// - reports `ChildExited` as soon as a child is stopped (like a child that
///   honours SIGTERM), optionally also right after spawn.
pub struct FakeProcesses {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    calls: CallLog<ProcessCall>,
    next_pid: u32,
    fail_spawns: bool,
    exit_on_stop: bool,
    exit_after_spawn: Option<Option<i32>>,
}

impl FakeProcesses {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            calls: Arc::new(Mutex::new(Vec::new())),
            next_pid: 1000,
            fail_spawns: false,
            exit_on_stop: true,
            exit_after_spawn: None,
        }
    }

    pub fn failing_spawns(mut self) -> Self {
        self.fail_spawns = true;
        self
    }

    /// Stopped children never exit.
    pub fn ignoring_stops(mut self) -> Self {
        self.exit_on_stop = false;
        self
    }

    /// Every spawned child exits right away with `code`.
    pub fn exiting_after_spawn(mut self, code: Option<i32>) -> Self {
        self.exit_after_spawn = Some(code);
        self
    }

    pub fn calls(&self) -> CallLog<ProcessCall> {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: ProcessCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn report_exit(&self, id: ChildId, code: Option<i32>) {
        self.runtime_tx
            .try_send(RuntimeEvent::ChildExited { id, code })
            .expect("runtime channel full or closed");
    }
}

impl ProcessBackend for FakeProcesses {
    fn spawn(&mut self, id: ChildId, spec: &ChildSpec) -> Result<u32> {
        self.record(ProcessCall::Spawn(id));
        if self.fail_spawns {
            return Err(DevloopError::SpawnError {
                program: spec.program.clone(),
                reason: "fake spawn failure".to_string(),
            });
        }
        if let Some(code) = self.exit_after_spawn {
            self.report_exit(id, code);
        }
        self.next_pid += 1;
        Ok(self.next_pid)
    }

    fn stop(&mut self, id: ChildId, signal: bool) -> Result<()> {
        self.record(ProcessCall::Stop { id, signal });
        if self.exit_on_stop {
            self.report_exit(id, None);
        }
        Ok(())
    }

    fn kill(&mut self, id: ChildId) {
        self.record(ProcessCall::Kill(id));
    }

    fn reap(&mut self, id: ChildId) {
        self.record(ProcessCall::Reap(id));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCall {
    Watch(PathBuf),
    UnwatchAll,
}

/// A fake watcher that records calls and can pretend to fall back to
/// polling on the n-th watched path.
pub struct FakeWatcher {
    calls: CallLog<WatchCall>,
    watched: usize,
    fall_back_at: Option<usize>,
}

impl FakeWatcher {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            watched: 0,
            fall_back_at: None,
        }
    }

    /// The `n`-th watch (1-based) and every later one report a fallback.
    pub fn falling_back_at(mut self, n: usize) -> Self {
        self.fall_back_at = Some(n);
        self
    }

    pub fn calls(&self) -> CallLog<WatchCall> {
        Arc::clone(&self.calls)
    }
}

impl Default for FakeWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchBackend for FakeWatcher {
    fn watch(&mut self, path: &Path) -> Result<WatchOutcome> {
        self.calls
            .lock()
            .unwrap()
            .push(WatchCall::Watch(path.to_path_buf()));
        self.watched += 1;
        match self.fall_back_at {
            Some(n) if self.watched >= n => Ok(WatchOutcome::FellBack {
                reason: "fake watch limit".to_string(),
            }),
            _ => Ok(WatchOutcome::Watched),
        }
    }

    fn unwatch_all(&mut self) {
        self.calls.lock().unwrap().push(WatchCall::UnwatchAll);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileCall {
    Init,
    Compile(CompileRequest),
    Changed(PathBuf),
}

/// A fake compiler that records calls and, unless told otherwise,
/// immediately reports every compile as successful.
pub struct FakeCompiler {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    calls: CallLog<CompileCall>,
    complete: bool,
}

impl FakeCompiler {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            calls: Arc::new(Mutex::new(Vec::new())),
            complete: true,
        }
    }

    /// Compiles never finish.
    pub fn hanging(mut self) -> Self {
        self.complete = false;
        self
    }

    pub fn calls(&self) -> CallLog<CompileCall> {
        Arc::clone(&self.calls)
    }
}

impl CompileBackend for FakeCompiler {
    fn init(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let calls = Arc::clone(&self.calls);
        Box::pin(async move {
            calls.lock().unwrap().push(CompileCall::Init);
            Ok(())
        })
    }

    fn compile(&mut self, request: CompileRequest) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(CompileCall::Compile(request.clone()));
        if self.complete {
            self.runtime_tx
                .try_send(RuntimeEvent::CompileFinished {
                    target: request.compiled_path,
                    outcome: CompileOutcome::Success,
                })
                .map_err(anyhow::Error::from)?;
        }
        Ok(())
    }

    fn compile_changed(&mut self, path: &Path) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(CompileCall::Changed(path.to_path_buf()));
        Ok(())
    }
}
