// src/ipc/child.rs

//! Child side of the IPC channel.
//!
//! A process started by `devloop` (or any of its descendants, see
//! [`relay`]) uses [`ChildLink`] to report required files, compile requests
//! and fatal errors back to the supervisor. [`FatalHook`] turns a panic into
//! a single error report.

use std::backtrace::Backtrace;
use std::fs::OpenOptions;
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::panic::PanicHookInfo;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::env::{DEVLOOP_COMPILE_MARKER, DEVLOOP_IPC_ADDR, DEVLOOP_RELAY};
use super::{FatalReport, IpcMessage};
use crate::compile::CompileRequest;
use crate::errors::{DevloopError, Result};

/// Connection from a child process to its supervisor.
#[derive(Debug)]
pub struct ChildLink {
    addr: SocketAddr,
    stream: Mutex<TcpStream>,
}

impl ChildLink {
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            addr,
            stream: Mutex::new(stream),
        })
    }

    /// Connect to the supervisor named in `DEVLOOP_IPC_ADDR`.
    ///
    /// `Ok(None)` when the process is not running under `devloop`.
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(raw) = std::env::var(DEVLOOP_IPC_ADDR) else {
            return Ok(None);
        };
        let addr: SocketAddr = raw
            .parse()
            .map_err(|e| DevloopError::IpcLink(format!("invalid {DEVLOOP_IPC_ADDR} '{raw}': {e}")))?;
        Self::connect(addr).map(Some)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn send(&self, message: &IpcMessage) -> Result<()> {
        let line = message.encode()?;
        let mut stream = self
            .stream
            .lock()
            .map_err(|_| DevloopError::IpcLink("link lock poisoned".to_string()))?;
        stream.write_all(line.as_bytes())?;
        stream.flush()?;
        Ok(())
    }

    /// Report that the process loaded `path`. Call this from the module
    /// loader for every file it resolves.
    pub fn required(&self, path: impl AsRef<Path>) -> Result<()> {
        self.send(&IpcMessage::Required(path.as_ref().to_path_buf()))
    }

    pub fn compile(&self, request: CompileRequest) -> Result<()> {
        self.send(&IpcMessage::Compile(request))
    }

    pub fn error(&self, report: FatalReport) -> Result<()> {
        self.send(&IpcMessage::Error(report))
    }
}

/// Attach a process about to be spawned by the child to the same
/// supervisor, so its messages reach the top-level listener.
///
/// With relaying disabled (`DEVLOOP_RELAY=0`) the link variable is removed
/// instead and the descendant runs unsupervised.
pub fn relay(command: &mut std::process::Command) {
    let relay_enabled = std::env::var(DEVLOOP_RELAY).map(|v| v != "0").unwrap_or(true);

    if !relay_enabled {
        command.env_remove(DEVLOOP_IPC_ADDR);
        return;
    }
    if let Ok(addr) = std::env::var(DEVLOOP_IPC_ADDR) {
        command.env(DEVLOOP_IPC_ADDR, addr);
    }
    if let Ok(marker) = std::env::var(DEVLOOP_COMPILE_MARKER) {
        command.env(DEVLOOP_COMPILE_MARKER, marker);
    }
}

/// Append a compile request to the marker file named in
/// `DEVLOOP_COMPILE_MARKER`, for processes without an IPC link.
pub fn request_compile_via_marker(descriptor: &str, target: &str) -> Result<()> {
    let path = std::env::var(DEVLOOP_COMPILE_MARKER)
        .map(PathBuf::from)
        .map_err(|_| DevloopError::IpcLink(format!("{DEVLOOP_COMPILE_MARKER} is not set")))?;
    append_marker(&path, descriptor, target)
}

pub fn append_marker(path: &Path, descriptor: &str, target: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(format!("{descriptor}\n{target}").as_bytes())?;
    Ok(())
}

/// Application-provided handler for fatal errors.
pub type FatalHandler = Box<dyn Fn(&PanicHookInfo<'_>) + Send + Sync>;

/// Reports the first fatal error of the process to the supervisor.
///
/// Only the first report goes out; a panic while reporting, or in another
/// thread afterwards, is swallowed. With an application handler registered
/// the report is not printed and carries `willTerminate = true`: the
/// application owns the exit.
pub struct FatalHook {
    reported: AtomicBool,
    link: Option<ChildLink>,
    handler: Option<FatalHandler>,
}

impl std::fmt::Debug for FatalHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FatalHook")
            .field("reported", &self.reported.load(Ordering::SeqCst))
            .field("link", &self.link)
            .field("custom_handler", &self.handler.is_some())
            .finish()
    }
}

impl FatalHook {
    pub fn new(link: Option<ChildLink>) -> Self {
        Self {
            reported: AtomicBool::new(false),
            link,
            handler: None,
        }
    }

    pub fn with_handler(mut self, handler: FatalHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn has_reported(&self) -> bool {
        self.reported.load(Ordering::SeqCst)
    }

    /// Report `stack` once. Returns what was reported, or `None` for every
    /// call after the first.
    pub fn report(&self, stack: String) -> Option<FatalReport> {
        if self.reported.swap(true, Ordering::SeqCst) {
            return None;
        }

        let will_terminate = self.handler.is_some();
        if !will_terminate {
            eprintln!("{stack}");
        }

        let report = FatalReport {
            stack,
            will_terminate,
        };
        if let Some(link) = &self.link {
            if let Err(err) = link.error(report.clone()) {
                eprintln!("devloop: failed to report fatal error: {err}");
            }
        }
        Some(report)
    }

    /// Install as the process panic hook.
    pub fn install(self) {
        let hook = Arc::new(self);
        std::panic::set_hook(Box::new(move |info| {
            hook.report(format_panic(info));
            if let Some(handler) = &hook.handler {
                handler(info);
            }
        }));
    }
}

fn format_panic(info: &PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Box<dyn Any>".to_string());

    let location = info
        .location()
        .map(|l| format!(" at {}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_default();

    format!("panicked{location}: {message}\n{}", Backtrace::force_capture())
}
