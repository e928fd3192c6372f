// src/watch/debounce.rs

//! Per-path trailing-edge debounce.
//!
//! Every raw notification for a path pushes that path's deadline to
//! `now + window`; the path is emitted once the deadline passes without a
//! further notification. A burst of N notifications inside the window thus
//! produces exactly one change event.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, warn};

use crate::engine::RuntimeEvent;

/// Pending paths and their emit deadlines.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    /// Record a raw notification for `path` observed at `now`.
    pub fn record(&mut self, path: PathBuf, now: Instant) {
        let deadline = now + self.window;
        if self.pending.insert(path, deadline).is_some() {
            trace!("debounce window extended");
        }
    }

    /// Earliest deadline among pending paths.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Remove and return every path whose deadline is at or before `now`,
    /// sorted for deterministic output.
    pub fn take_due(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &due {
            self.pending.remove(path);
        }
        due.sort();
        due
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Consume raw changed paths, debounce them, and forward
/// `RuntimeEvent::FileChanged` to the runtime.
///
/// Runs until the raw channel closes (the watcher was dropped) or the
/// runtime stops listening.
pub async fn run_debounce_loop(
    window: Duration,
    mut raw_rx: mpsc::UnboundedReceiver<PathBuf>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let mut debouncer = Debouncer::new(window);

    loop {
        // Far-future placeholder while nothing is pending; the branch is
        // disabled in that case anyway.
        let deadline = debouncer.next_deadline();
        let wake_at = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            raw = raw_rx.recv() => match raw {
                Some(path) => debouncer.record(path, Instant::now()),
                None => break,
            },
            _ = sleep_until(wake_at), if deadline.is_some() => {
                for path in debouncer.take_due(Instant::now()) {
                    debug!(?path, "debounced change");
                    let event = RuntimeEvent::FileChanged { path, manual: false };
                    if let Err(err) = runtime_tx.send(event).await {
                        warn!("failed to send RuntimeEvent::FileChanged: {err}");
                        return;
                    }
                }
            }
        }
    }

    debug!("debounce loop finished");
}
