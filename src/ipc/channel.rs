// src/ipc/channel.rs

//! Supervisor side of the IPC channel.
//!
//! One loopback TCP listener per child generation. The child and any of its
//! descendants connect to it (address in `DEVLOOP_IPC_ADDR`); every accepted
//! connection is read line by line and each decoded message is forwarded to
//! the runtime tagged with the generation id. Messages from a single
//! connection keep their send order.

use std::net::{Ipv4Addr, SocketAddr};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use super::IpcMessage;
use crate::engine::{ChildId, RuntimeEvent};
use crate::errors::Result;

/// Listening end of the channel for one child generation.
///
/// Dropping it (or calling [`IpcChannel::disconnect`]) stops accepting and
/// closes every open connection.
#[derive(Debug)]
pub struct IpcChannel {
    id: ChildId,
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl IpcChannel {
    /// Bind a listener on an ephemeral loopback port and start accepting.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(id: ChildId, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Result<Self> {
        let std_listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        std_listener.set_nonblocking(true)?;
        let addr = std_listener.local_addr()?;
        let listener = TcpListener::from_std(std_listener)?;

        debug!(child = %id, %addr, "ipc listener bound");
        let task = tokio::spawn(accept_loop(id, listener, runtime_tx));

        Ok(Self { id, addr, task })
    }

    pub fn id(&self) -> ChildId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn disconnect(self) {
        debug!(child = %self.id, "ipc channel disconnected");
    }
}

impl Drop for IpcChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(id: ChildId, listener: TcpListener, runtime_tx: mpsc::Sender<RuntimeEvent>) {
    // Readers live in the JoinSet, so aborting this task closes them too.
    let mut readers = JoinSet::new();
    let mut connected = false;

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(child = %id, %peer, "ipc connection accepted");
                    if !connected {
                        connected = true;
                        if runtime_tx.send(RuntimeEvent::ChildConnected { id }).await.is_err() {
                            return;
                        }
                    }
                    readers.spawn(read_connection(id, stream, runtime_tx.clone()));
                }
                Err(err) => {
                    warn!(child = %id, error = %err, "ipc accept failed; no further connections");
                    break;
                }
            },
            Some(_) = readers.join_next(), if !readers.is_empty() => {}
        }
    }

    // Keep serving established connections.
    while readers.join_next().await.is_some() {}
}

async fn read_connection(id: ChildId, stream: TcpStream, runtime_tx: mpsc::Sender<RuntimeEvent>) {
    let mut lines = BufReader::new(stream).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                debug!(child = %id, error = %err, "ipc connection closed with error");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match IpcMessage::decode(&line) {
            Ok(message) => {
                if let Err(err) = runtime_tx.send(RuntimeEvent::Ipc { id, message }).await {
                    warn!("failed to send RuntimeEvent::Ipc: {err}");
                    return;
                }
            }
            Err(err) => warn!(child = %id, error = %err, line = %line, "malformed ipc message"),
        }
    }

    debug!(child = %id, "ipc connection finished");
}
