// src/compile/marker.rs

//! Marker-file handshake for compile requests.
//!
//! Descendants without an IPC link append `"<descriptor>\n<target>"` to the
//! marker file, with no trailing newline. The supervisor truncates the file
//! at startup and before every spawn, watches it, and on each observed
//! change parses only the bytes appended since the previous read. The last
//! complete pair in that fresh slice is forwarded as a compile request.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::CompileRequest;
use crate::engine::RuntimeEvent;
use crate::errors::{DevloopError, Result};
use crate::fs::FileSystem;

/// Parse marker contents into the last complete `(descriptor, target)` pair.
///
/// Pairs with an empty target are skipped; a trailing unpaired line (a write
/// still in progress) is ignored.
pub fn parse_marker(contents: &str) -> Option<CompileRequest> {
    parse_pairs(contents).0
}

/// Returns the last usable pair and the number of bytes it accounts for.
/// An unpaired trailing line is left unconsumed.
fn parse_pairs(contents: &str) -> (Option<CompileRequest>, usize) {
    let pieces: Vec<&str> = contents.split_inclusive('\n').collect();
    let paired = pieces.len() - pieces.len() % 2;
    let consumed: usize = pieces[..paired].iter().map(|piece| piece.len()).sum();

    let field = |piece: &str| piece.trim_end_matches('\n').trim_end_matches('\r').to_string();
    let request = pieces[..paired]
        .chunks_exact(2)
        .rev()
        .map(|pair| (field(pair[0]), field(pair[1])))
        .find(|(_, target)| !target.is_empty())
        .map(|(descriptor, target)| CompileRequest::new(target, descriptor));

    (request, consumed)
}

/// The marker file and a read cursor into it. Clones share the cursor, so
/// the runtime resetting the file rewinds the watcher's reads too.
#[derive(Debug, Clone)]
pub struct MarkerFile {
    path: PathBuf,
    consumed: Arc<AtomicUsize>,
}

impl MarkerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            consumed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate (or create) the file and rewind the cursor.
    pub fn reset(&self, fs: &dyn FileSystem) -> Result<()> {
        fs.write(&self.path, b"")?;
        self.consumed.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Parse whatever was appended since the last read. A missing file reads
    /// as no request; a file shorter than the cursor was truncated behind our
    /// back and is read from the start.
    pub fn read_new(&self, fs: &dyn FileSystem) -> Result<Option<CompileRequest>> {
        if !fs.exists(&self.path) {
            self.consumed.store(0, Ordering::SeqCst);
            return Ok(None);
        }
        let contents = fs.read_to_string(&self.path)?;

        let mut start = self.consumed.load(Ordering::SeqCst);
        if start > contents.len() || !contents.is_char_boundary(start) {
            start = 0;
        }
        let (request, used) = parse_pairs(&contents[start..]);
        self.consumed.store(start + used, Ordering::SeqCst);
        Ok(request)
    }
}

/// Keeps the marker file watcher alive. Dropping it stops watching.
pub struct MarkerWatcher {
    _inner: Box<dyn Watcher + Send>,
    path: PathBuf,
}

impl std::fmt::Debug for MarkerWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerWatcher").field("path", &self.path).finish()
    }
}

impl MarkerWatcher {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reset the marker file and start watching it, sending
/// `RuntimeEvent::CompileRequested` for every parsed request.
///
/// The parent directory is watched rather than the file itself so that
/// writers replacing the file are still observed. `poll` selects a
/// `PollWatcher` with the given interval.
pub fn spawn_marker_watcher(
    marker: MarkerFile,
    poll: Option<Duration>,
    fs: Arc<dyn FileSystem>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<MarkerWatcher> {
    marker.reset(fs.as_ref())?;
    let path = marker.path().to_path_buf();

    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| DevloopError::ConfigError(format!("marker file {:?} has no parent", path)))?;
    let file_name = path.file_name().map(|n| n.to_os_string());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<()>();
    let handler = move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }
            let touches_marker = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if touches_marker {
                let _ = event_tx.send(());
            }
        }
        Err(err) => eprintln!("devloop: marker watch error: {err}"),
    };

    let mut watcher: Box<dyn Watcher + Send> = match poll {
        Some(interval) => Box::new(PollWatcher::new(
            handler,
            Config::default().with_poll_interval(interval),
        )?),
        None => Box::new(RecommendedWatcher::new(handler, Config::default())?),
    };
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    info!(path = ?path, "watching compile marker");

    tokio::spawn(async move {
        while event_rx.recv().await.is_some() {
            let request = match marker.read_new(fs.as_ref()) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(err) => {
                    warn!(error = %err, "failed to read compile marker");
                    continue;
                }
            };
            debug!(module = %request.compiled_path, "compile request from marker");
            if let Err(err) = runtime_tx.send(RuntimeEvent::CompileRequested { request }).await {
                warn!("failed to send RuntimeEvent::CompileRequested: {err}");
                return;
            }
        }
        debug!("marker watcher loop finished");
    });

    Ok(MarkerWatcher {
        _inner: watcher,
        path,
    })
}
