// tests/compile_coordinator.rs

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use devloop::compile::{
    parse_marker, spawn_marker_watcher, CompileCoordinator, CompileRequest, MarkerFile,
};
use devloop::engine::RuntimeEvent;
use devloop::fs::mock::MockFileSystem;
use devloop::fs::{FileSystem, RealFileSystem};
use devloop::ipc::child::append_marker;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn repeated_requests_forward_once_until_finished() {
    let mut coordinator = CompileCoordinator::new();
    let req = CompileRequest::new("/project/src/index.ts", "tsc");

    assert_eq!(coordinator.request(req.clone()), Some(req.clone()));
    for _ in 0..5 {
        assert_eq!(coordinator.request(req.clone()), None);
    }
    assert_eq!(coordinator.current(), Some("/project/src/index.ts"));

    assert!(coordinator.finish("/project/src/index.ts"));
    assert_eq!(coordinator.current(), None);
    assert_eq!(coordinator.request(req.clone()), Some(req));
}

#[test]
fn different_target_replaces_current() {
    let mut coordinator = CompileCoordinator::new();
    assert!(coordinator.request(CompileRequest::new("/a.ts", "tsc")).is_some());
    assert!(coordinator.request(CompileRequest::new("/b.ts", "tsc")).is_some());
    assert_eq!(coordinator.current(), Some("/b.ts"));

    // Completion of the superseded target leaves the current one alone.
    assert!(!coordinator.finish("/a.ts"));
    assert_eq!(coordinator.current(), Some("/b.ts"));
}

#[test]
fn empty_target_is_dropped() {
    let mut coordinator = CompileCoordinator::new();
    assert_eq!(coordinator.request(CompileRequest::new("", "tsc")), None);
    assert_eq!(coordinator.current(), None);
}

#[test]
fn identical_appends_to_one_marker_forward_once() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("compile-request");
    let marker = MarkerFile::new(&path);
    let fs = RealFileSystem;
    marker.reset(&fs)?;

    let mut coordinator = CompileCoordinator::new();
    let expected = CompileRequest::new("/project/src/index.ts", "tsc");

    append_marker(&path, "tsc", "/project/src/index.ts")?;
    let first = marker.read_new(&fs)?.expect("first write is a request");
    assert_eq!(first, expected);
    assert_eq!(coordinator.request(first), Some(expected.clone()));

    // Fields carry no trailing newline, so the second record is glued to
    // the first one on disk.
    append_marker(&path, "tsc", "/project/src/index.ts")?;
    assert_eq!(
        std::fs::read_to_string(&path)?,
        "tsc\n/project/src/index.tstsc\n/project/src/index.ts"
    );
    let second = marker.read_new(&fs)?.expect("second write is a request");
    assert_eq!(second, expected);
    assert_eq!(coordinator.request(second), None);

    // Nothing new since the last read.
    assert_eq!(marker.read_new(&fs)?, None);
    Ok(())
}

#[test]
fn reset_rewinds_the_marker_cursor() -> TestResult {
    let fs = MockFileSystem::new();
    let marker = MarkerFile::new("/project/.devloop/compile-request");

    fs.add_file(marker.path(), "tsc\n/project/src/a.ts");
    assert_eq!(
        marker.read_new(&fs)?,
        Some(CompileRequest::new("/project/src/a.ts", "tsc"))
    );

    // A write of the same length after a reset is still read from the start.
    marker.reset(&fs)?;
    fs.add_file(marker.path(), "tsc\n/project/src/b.ts");
    assert_eq!(
        marker.read_new(&fs)?,
        Some(CompileRequest::new("/project/src/b.ts", "tsc"))
    );
    Ok(())
}

#[test]
fn half_written_record_is_picked_up_once_complete() -> TestResult {
    let fs = MockFileSystem::new();
    let marker = MarkerFile::new("/project/.devloop/compile-request");

    fs.add_file(marker.path(), "tsc\n");
    assert_eq!(marker.read_new(&fs)?, None);

    fs.add_file(marker.path(), "tsc\n/project/src/a.ts");
    assert_eq!(
        marker.read_new(&fs)?,
        Some(CompileRequest::new("/project/src/a.ts", "tsc"))
    );
    Ok(())
}

#[test]
fn marker_last_complete_pair_wins() {
    let contents = "tsc\n/a.ts\ntsc -p x\n/b.ts\n";
    assert_eq!(
        parse_marker(contents),
        Some(CompileRequest::new("/b.ts", "tsc -p x"))
    );

    // A half-written trailing pair is ignored.
    let partial = "tsc\n/a.ts\ntsc";
    assert_eq!(parse_marker(partial), Some(CompileRequest::new("/a.ts", "tsc")));
}

#[test]
fn empty_or_targetless_marker_yields_nothing() {
    assert_eq!(parse_marker(""), None);
    assert_eq!(parse_marker("tsc\n"), None);
    assert_eq!(parse_marker("tsc\n\n"), None);
}

#[test]
fn reset_and_read_through_mock_fs() -> TestResult {
    let fs = MockFileSystem::new();
    let marker = MarkerFile::new("/project/.devloop/compile-request");

    assert_eq!(marker.read_new(&fs)?, None);

    fs.add_file(marker.path(), "tsc\n/project/src/a.ts\n");
    assert_eq!(
        marker.read_new(&fs)?,
        Some(CompileRequest::new("/project/src/a.ts", "tsc"))
    );

    marker.reset(&fs)?;
    assert_eq!(fs.contents(marker.path()).as_deref(), Some(""));
    assert_eq!(marker.read_new(&fs)?, None);
    Ok(())
}

#[tokio::test]
async fn marker_watcher_forwards_written_request() -> TestResult {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let marker = dir.path().join(".devloop").join("compile-request");
    std::fs::create_dir_all(marker.parent().unwrap())?;
    std::fs::write(&marker, "stale\n/old.ts\n")?;

    let (tx, mut rx) = mpsc::channel::<RuntimeEvent>(16);
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let _watcher = spawn_marker_watcher(
        MarkerFile::new(&marker),
        Some(Duration::from_millis(50)),
        fs,
        tx,
    )?;

    // Truncated at startup.
    assert_eq!(std::fs::read_to_string(&marker)?, "");

    // Let the poller take its baseline before writing.
    tokio::time::sleep(Duration::from_millis(150)).await;
    append_marker(&marker, "tsc", "/project/src/index.ts")?;

    let event = timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Some(RuntimeEvent::CompileRequested { request }) => return Some(request),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await?;

    assert_eq!(
        event,
        Some(CompileRequest::new("/project/src/index.ts", "tsc"))
    );
    Ok(())
}
