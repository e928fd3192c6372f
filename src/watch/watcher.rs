// src/watch/watcher.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{
    Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::WatchSection;
use crate::engine::RuntimeEvent;
use crate::errors::{DevloopError, Result};
use crate::watch::debounce::run_debounce_loop;

/// What happened when a path was added to the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    Watched,
    AlreadyWatched,
    /// The path doesn't exist (yet); nothing was registered.
    Missing,
    /// The native backend ran out of watch capacity and the watcher
    /// switched to polling. The path is watched.
    FellBack { reason: String },
}

/// Seam between the runtime and the filesystem watcher.
///
/// Production code uses [`FileWatcher`]; tests record calls instead.
pub trait WatchBackend: Send {
    fn watch(&mut self, path: &Path) -> Result<WatchOutcome>;

    /// Drop every watch registered so far.
    fn unwatch_all(&mut self);
}

/// Settings for [`FileWatcher::spawn`].
#[derive(Debug, Clone, Copy)]
pub struct WatcherOptions {
    pub poll: bool,
    pub interval: Duration,
    pub debounce: Duration,
}

impl WatcherOptions {
    pub fn from_config(watch: &WatchSection) -> Self {
        Self {
            poll: watch.poll,
            interval: Duration::from_millis(watch.interval_ms),
            debounce: Duration::from_millis(watch.debounce_ms),
        }
    }
}

enum Backend {
    Native(RecommendedWatcher),
    Polling(PollWatcher),
}

impl Backend {
    fn watch(&mut self, path: &Path, mode: RecursiveMode) -> notify::Result<()> {
        match self {
            Backend::Native(w) => w.watch(path, mode),
            Backend::Polling(w) => w.watch(path, mode),
        }
    }

    fn unwatch(&mut self, path: &Path) -> notify::Result<()> {
        match self {
            Backend::Native(w) => w.unwatch(path),
            Backend::Polling(w) => w.unwatch(path),
        }
    }

    fn is_polling(&self) -> bool {
        matches!(self, Backend::Polling(_))
    }
}

/// Filesystem watcher over an explicit, growing set of paths.
///
/// Raw notifications go through an unbounded channel into a debounce task,
/// which emits `RuntimeEvent::FileChanged`. Dropping the watcher stops both.
pub struct FileWatcher {
    backend: Backend,
    watched: BTreeMap<PathBuf, RecursiveMode>,
    raw_tx: mpsc::UnboundedSender<PathBuf>,
    interval: Duration,
}

impl fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileWatcher")
            .field("polling", &self.backend.is_polling())
            .field("watched", &self.watched.len())
            .finish()
    }
}

impl FileWatcher {
    /// Create the watcher and spawn its debounce task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(options: WatcherOptions, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Result<Self> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<PathBuf>();

        let backend = if options.poll {
            Backend::Polling(polling_backend(raw_tx.clone(), options.interval)?)
        } else {
            Backend::Native(RecommendedWatcher::new(
                forward_paths(raw_tx.clone()),
                Config::default(),
            )?)
        };

        tokio::spawn(run_debounce_loop(options.debounce, raw_rx, runtime_tx));

        info!(polling = options.poll, "file watcher started");

        Ok(Self {
            backend,
            watched: BTreeMap::new(),
            raw_tx,
            interval: options.interval,
        })
    }

    pub fn is_polling(&self) -> bool {
        self.backend.is_polling()
    }

    pub fn watched_len(&self) -> usize {
        self.watched.len()
    }

    /// Swap the native backend for a polling one and re-register every
    /// watched path on it.
    fn fall_back_to_polling(&mut self) -> Result<()> {
        let mut polling = polling_backend(self.raw_tx.clone(), self.interval)?;
        for (path, mode) in &self.watched {
            if let Err(err) = polling.watch(path, *mode) {
                warn!(?path, error = %err, "failed to re-watch path after fallback");
            }
        }
        self.backend = Backend::Polling(polling);
        Ok(())
    }
}

impl WatchBackend for FileWatcher {
    fn watch(&mut self, path: &Path) -> Result<WatchOutcome> {
        if self.watched.contains_key(path) {
            return Ok(WatchOutcome::AlreadyWatched);
        }

        let mode = match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => RecursiveMode::Recursive,
            Ok(_) => RecursiveMode::NonRecursive,
            Err(_) => {
                debug!(?path, "not watching missing path");
                return Ok(WatchOutcome::Missing);
            }
        };

        match self.backend.watch(path, mode) {
            Ok(()) => {
                debug!(?path, "watching");
                self.watched.insert(path.to_path_buf(), mode);
                Ok(WatchOutcome::Watched)
            }
            Err(err) if !self.backend.is_polling() && is_capacity_error(&err) => {
                let reason = err.to_string();
                warn!(?path, error = %reason, "native watcher exhausted; switching to polling");
                self.fall_back_to_polling()?;
                self.backend.watch(path, mode)?;
                self.watched.insert(path.to_path_buf(), mode);
                Ok(WatchOutcome::FellBack { reason })
            }
            Err(err) => Err(DevloopError::WatchError(err)),
        }
    }

    fn unwatch_all(&mut self) {
        for path in self.watched.keys() {
            if let Err(err) = self.backend.unwatch(path) {
                // Deleted files are already gone from the backend.
                debug!(?path, error = %err, "unwatch failed");
            }
        }
        debug!(count = self.watched.len(), "cleared watch set");
        self.watched.clear();
    }
}

fn polling_backend(raw_tx: mpsc::UnboundedSender<PathBuf>, interval: Duration) -> Result<PollWatcher> {
    let config = Config::default().with_poll_interval(interval);
    Ok(PollWatcher::new(forward_paths(raw_tx), config)?)
}

/// Notify callback: runs on the backend's own thread, so it only forwards
/// paths into the async side.
fn forward_paths(
    raw_tx: mpsc::UnboundedSender<PathBuf>,
) -> impl FnMut(notify::Result<Event>) + Send + 'static {
    move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }
            for path in event.paths {
                if raw_tx.send(path).is_err() {
                    // Debounce task is gone; the watcher is shutting down.
                    return;
                }
            }
        }
        Err(err) => {
            eprintln!("devloop: file watch error: {err}");
        }
    }
}

/// True for errors that mean the native backend has no room for more
/// watches (inotify limit, open file limit).
fn is_capacity_error(err: &notify::Error) -> bool {
    match &err.kind {
        notify::ErrorKind::MaxFilesWatch => true,
        notify::ErrorKind::Io(io) => is_fd_exhaustion(io),
        _ => false,
    }
}

#[cfg(unix)]
fn is_fd_exhaustion(err: &std::io::Error) -> bool {
    use nix::errno::Errno;

    matches!(
        err.raw_os_error().map(Errno::from_raw),
        Some(Errno::EMFILE | Errno::ENFILE | Errno::ENOSPC)
    )
}

#[cfg(not(unix))]
fn is_fd_exhaustion(_err: &std::io::Error) -> bool {
    false
}
