// src/compile/mod.rs

//! Brokering between compile requests coming from the child (over IPC or the
//! marker file) and the external compiler command.
//!
//! - [`coordinator`] deduplicates requests against the active target.
//! - [`marker`] implements the marker-file handshake.
//! - [`backend`] provides the `CompileBackend` trait and the command-based
//!   production implementation.

use serde::{Deserialize, Serialize};

pub mod backend;
pub mod coordinator;
pub mod marker;

pub use backend::{CommandCompiler, CompileBackend};
pub use coordinator::CompileCoordinator;
pub use marker::{parse_marker, spawn_marker_watcher, MarkerFile, MarkerWatcher};

/// A request to compile `compiled_path`. `compile` is the descriptor the
/// requester supplied (e.g. the compiler invocation it expects).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub compiled_path: String,
    pub compile: String,
}

impl CompileRequest {
    pub fn new(compiled_path: impl Into<String>, compile: impl Into<String>) -> Self {
        Self {
            compiled_path: compiled_path.into(),
            compile: compile.into(),
        }
    }
}

/// Result of one compiler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileOutcome {
    Success,
    Failed(i32),
}
