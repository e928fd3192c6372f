// src/watch/manual.rs

//! Manual restart: typing the restart token (default `rs`) on stdin forces a
//! restart as if a watched file had changed.

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::RuntimeEvent;

/// True if `line` (as typed, including any trailing newline) is the token.
pub fn is_manual_restart(line: &str, token: &str) -> bool {
    !token.is_empty() && line.trim() == token
}

/// Spawn a task reading stdin line by line and emitting a manual
/// `RuntimeEvent::FileChanged` for each line equal to `token`.
pub fn spawn_manual_trigger(token: String, runtime_tx: mpsc::Sender<RuntimeEvent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        info!(token = %token, "type the token and press enter to restart");

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if !is_manual_restart(&line, &token) {
                        continue;
                    }
                    let event = RuntimeEvent::FileChanged {
                        path: PathBuf::new(),
                        manual: true,
                    };
                    if let Err(err) = runtime_tx.send(event).await {
                        warn!("failed to send manual RuntimeEvent::FileChanged: {err}");
                        return;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "stopped reading stdin");
                    break;
                }
            }
        }

        debug!("manual restart reader finished");
    });
}
