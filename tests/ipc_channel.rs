// tests/ipc_channel.rs

mod common;
use crate::common::{init_tracing, p, with_timeout};

use std::error::Error;
use std::io::Write;

use tokio::sync::mpsc;

use devloop::compile::CompileRequest;
use devloop::engine::{ChildId, RuntimeEvent};
use devloop::ipc::{ChildLink, FatalReport, IpcChannel, IpcMessage};

type TestResult = Result<(), Box<dyn Error>>;

async fn next_event(rx: &mut mpsc::Receiver<RuntimeEvent>) -> RuntimeEvent {
    with_timeout(rx.recv()).await.expect("runtime channel closed")
}

fn expect_ipc(event: RuntimeEvent, expected_id: ChildId) -> IpcMessage {
    match event {
        RuntimeEvent::Ipc { id, message } => {
            assert_eq!(id, expected_id);
            message
        }
        other => panic!("expected ipc event, got {other:?}"),
    }
}

#[tokio::test]
async fn child_messages_arrive_in_order_tagged_with_generation() -> TestResult {
    init_tracing();

    let (tx, mut rx) = mpsc::channel::<RuntimeEvent>(16);
    let channel = IpcChannel::bind(ChildId(3), tx)?;
    assert!(channel.addr().ip().is_loopback());

    let link = ChildLink::connect(channel.addr())?;
    link.required("/app/src/index.ts")?;
    link.compile(CompileRequest::new("/app/src/index.ts", "tsc"))?;
    link.error(FatalReport {
        stack: "Error: boom".to_string(),
        will_terminate: false,
    })?;

    assert!(matches!(
        next_event(&mut rx).await,
        RuntimeEvent::ChildConnected { id: ChildId(3) }
    ));
    assert_eq!(
        expect_ipc(next_event(&mut rx).await, ChildId(3)),
        IpcMessage::Required(p("/app/src/index.ts"))
    );
    assert_eq!(
        expect_ipc(next_event(&mut rx).await, ChildId(3)),
        IpcMessage::Compile(CompileRequest::new("/app/src/index.ts", "tsc"))
    );
    assert!(matches!(
        expect_ipc(next_event(&mut rx).await, ChildId(3)),
        IpcMessage::Error(FatalReport { will_terminate: false, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn descendants_share_the_channel() -> TestResult {
    init_tracing();

    let (tx, mut rx) = mpsc::channel::<RuntimeEvent>(16);
    let channel = IpcChannel::bind(ChildId(1), tx)?;

    let parent = ChildLink::connect(channel.addr())?;
    parent.required("/app/src/main.ts")?;

    assert!(matches!(
        next_event(&mut rx).await,
        RuntimeEvent::ChildConnected { id: ChildId(1) }
    ));
    assert_eq!(
        expect_ipc(next_event(&mut rx).await, ChildId(1)),
        IpcMessage::Required(p("/app/src/main.ts"))
    );

    let worker = ChildLink::connect(channel.addr())?;
    worker.required("/app/src/worker.ts")?;

    // No second ChildConnected for the same generation.
    assert_eq!(
        expect_ipc(next_event(&mut rx).await, ChildId(1)),
        IpcMessage::Required(p("/app/src/worker.ts"))
    );
    Ok(())
}

#[tokio::test]
async fn malformed_lines_are_skipped() -> TestResult {
    init_tracing();

    let (tx, mut rx) = mpsc::channel::<RuntimeEvent>(16);
    let channel = IpcChannel::bind(ChildId(1), tx)?;

    let mut raw = std::net::TcpStream::connect(channel.addr())?;
    raw.write_all(b"garbage\n\n{\"required\":\"/app/a.ts\"}\n")?;
    raw.flush()?;

    assert!(matches!(
        next_event(&mut rx).await,
        RuntimeEvent::ChildConnected { .. }
    ));
    assert_eq!(
        expect_ipc(next_event(&mut rx).await, ChildId(1)),
        IpcMessage::Required(p("/app/a.ts"))
    );
    Ok(())
}

#[tokio::test]
async fn disconnect_stops_forwarding() -> TestResult {
    init_tracing();

    let (tx, mut rx) = mpsc::channel::<RuntimeEvent>(16);
    let channel = IpcChannel::bind(ChildId(1), tx)?;

    let link = ChildLink::connect(channel.addr())?;
    link.required("/app/a.ts")?;
    assert!(matches!(
        next_event(&mut rx).await,
        RuntimeEvent::ChildConnected { .. }
    ));
    expect_ipc(next_event(&mut rx).await, ChildId(1));

    channel.disconnect();

    // Every sender lived in the channel's tasks, so the receiver drains.
    assert!(with_timeout(rx.recv()).await.is_none());
    Ok(())
}
