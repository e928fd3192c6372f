// tests/runtime_fake_backends.rs

mod common;
use crate::common::builders::RuntimeOptionsBuilder;
use crate::common::{init_tracing, orchestrator, p, with_timeout};

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use devloop::compile::{CompileRequest, MarkerFile};
use devloop::engine::{Backends, ChildId, Runtime, RuntimeEvent, RuntimeOptions, SessionFiles};
use devloop::exec::ChildSpec;
use devloop::fs::mock::MockFileSystem;
use devloop::ipc::IpcMessage;
use devloop_test_utils::fake_backends::{
    CallLog, CompileCall, FakeCompiler, FakeProcesses, FakeWatcher, ProcessCall, WatchCall,
};

type TestResult = Result<(), Box<dyn Error>>;

const MARKER: &str = "/project/.devloop/compile-request";
const READY: &str = "/project/.devloop/ready";

fn spec() -> ChildSpec {
    ChildSpec {
        program: "node".to_string(),
        args: vec!["dist/server.js".to_string()],
        cwd: None,
        env: BTreeMap::new(),
        stdin_null: false,
        tree_kill: false,
    }
}

fn files(fs: &MockFileSystem) -> SessionFiles {
    SessionFiles {
        fs: Arc::new(fs.clone()),
        marker: MarkerFile::new(MARKER),
        ready: Some(p(READY)),
    }
}

async fn wait_for<T: PartialEq>(log: &CallLog<T>, expected: T) {
    with_timeout(async {
        while !log.lock().unwrap().contains(&expected) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn child_exit_code_becomes_session_exit_code() -> TestResult {
    init_tracing();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let fs = MockFileSystem::new();
    fs.add_file(MARKER, "tsc\n/project/src/stale.ts\n");

    let processes = FakeProcesses::new(tx.clone()).exiting_after_spawn(Some(7));
    let process_calls = processes.calls();
    let compiler = FakeCompiler::new(tx.clone());
    let compile_calls = compiler.calls();

    let runtime = Runtime::new(
        orchestrator(RuntimeOptions::default()),
        rx,
        Backends {
            processes,
            watcher: FakeWatcher::new(),
            compiler,
        },
        spec(),
        files(&fs),
    );

    let code = with_timeout(runtime.run()).await?;
    assert_eq!(code, 7);

    assert_eq!(
        *process_calls.lock().unwrap(),
        vec![ProcessCall::Spawn(ChildId(1)), ProcessCall::Reap(ChildId(1))]
    );
    assert_eq!(*compile_calls.lock().unwrap(), vec![CompileCall::Init]);

    // Marker truncated before the spawn, sentinel holds the pid.
    assert_eq!(fs.contents(MARKER).as_deref(), Some(""));
    assert_eq!(fs.contents(READY).as_deref(), Some("1001\n"));
    Ok(())
}

#[tokio::test]
async fn change_restarts_child_and_rebuilds_watches() -> TestResult {
    init_tracing();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let fs = MockFileSystem::new();

    let processes = FakeProcesses::new(tx.clone());
    let process_calls = processes.calls();
    let watcher = FakeWatcher::new();
    let watch_calls = watcher.calls();
    let compiler = FakeCompiler::new(tx.clone());
    let compile_calls = compiler.calls();

    let options = RuntimeOptionsBuilder::new().static_path("/app/src").build();
    let runtime = Runtime::new(
        orchestrator(options),
        rx,
        Backends {
            processes,
            watcher,
            compiler,
        },
        spec(),
        files(&fs),
    );
    let handle = tokio::spawn(runtime.run());

    tx.send(RuntimeEvent::FileChanged {
        path: p("/app/src/a.ts"),
        manual: false,
    })
    .await?;

    wait_for(&process_calls, ProcessCall::Spawn(ChildId(2))).await;
    tx.send(RuntimeEvent::ShutdownRequested).await?;

    let code = with_timeout(handle).await??;
    assert_eq!(code, 0);

    assert_eq!(
        *process_calls.lock().unwrap(),
        vec![
            ProcessCall::Spawn(ChildId(1)),
            ProcessCall::Stop {
                id: ChildId(1),
                signal: true
            },
            ProcessCall::Reap(ChildId(1)),
            ProcessCall::Spawn(ChildId(2)),
            ProcessCall::Kill(ChildId(2)),
        ]
    );
    assert_eq!(
        *watch_calls.lock().unwrap(),
        vec![
            WatchCall::Watch(p("/app/src")),
            WatchCall::UnwatchAll,
            WatchCall::Watch(p("/app/src")),
        ]
    );
    assert_eq!(
        *compile_calls.lock().unwrap(),
        vec![CompileCall::Init, CompileCall::Changed(p("/app/src/a.ts"))]
    );
    assert_eq!(fs.contents(READY).as_deref(), Some("1002\n"));
    Ok(())
}

#[tokio::test]
async fn spawn_failure_exits_with_one() -> TestResult {
    init_tracing();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let fs = MockFileSystem::new();
    let processes = FakeProcesses::new(tx.clone()).failing_spawns();

    let runtime = Runtime::new(
        orchestrator(RuntimeOptions::default()),
        rx,
        Backends {
            processes,
            watcher: FakeWatcher::new(),
            compiler: FakeCompiler::new(tx.clone()),
        },
        spec(),
        files(&fs),
    );

    assert_eq!(with_timeout(runtime.run()).await?, 1);
    assert_eq!(fs.contents(READY), None);
    Ok(())
}

#[tokio::test]
async fn duplicate_compile_requests_reach_compiler_once() -> TestResult {
    init_tracing();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let fs = MockFileSystem::new();
    let compiler = FakeCompiler::new(tx.clone()).hanging();
    let compile_calls = compiler.calls();

    let req = CompileRequest::new("/project/src/index.ts", "tsc");
    tx.send(RuntimeEvent::Ipc {
        id: ChildId(1),
        message: IpcMessage::Compile(req.clone()),
    })
    .await?;
    tx.send(RuntimeEvent::CompileRequested {
        request: req.clone(),
    })
    .await?;
    tx.send(RuntimeEvent::ShutdownRequested).await?;

    let runtime = Runtime::new(
        orchestrator(RuntimeOptions::default()),
        rx,
        Backends {
            processes: FakeProcesses::new(tx.clone()),
            watcher: FakeWatcher::new(),
            compiler,
        },
        spec(),
        files(&fs),
    );

    assert_eq!(with_timeout(runtime.run()).await?, 0);
    assert_eq!(
        *compile_calls.lock().unwrap(),
        vec![CompileCall::Init, CompileCall::Compile(req)]
    );
    Ok(())
}

#[tokio::test]
async fn watch_fallback_does_not_stop_the_session() -> TestResult {
    init_tracing();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let fs = MockFileSystem::new();
    let watcher = FakeWatcher::new().falling_back_at(1);
    let watch_calls = watcher.calls();

    tx.send(RuntimeEvent::Ipc {
        id: ChildId(1),
        message: IpcMessage::Required(p("/app/src/index.ts")),
    })
    .await?;
    tx.send(RuntimeEvent::Ipc {
        id: ChildId(1),
        message: IpcMessage::Required(p("/app/src/util.ts")),
    })
    .await?;
    tx.send(RuntimeEvent::ShutdownRequested).await?;

    let runtime = Runtime::new(
        orchestrator(RuntimeOptions::default()),
        rx,
        Backends {
            processes: FakeProcesses::new(tx.clone()),
            watcher,
            compiler: FakeCompiler::new(tx.clone()),
        },
        spec(),
        files(&fs),
    );

    assert_eq!(with_timeout(runtime.run()).await?, 0);
    assert_eq!(
        *watch_calls.lock().unwrap(),
        vec![
            WatchCall::Watch(p("/app/src/index.ts")),
            WatchCall::Watch(p("/app/src/util.ts")),
        ]
    );
    Ok(())
}
