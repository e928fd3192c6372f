// src/compile/coordinator.rs

use tracing::debug;

use super::CompileRequest;

/// Tracks the target currently being compiled.
///
/// A request for the active target is dropped rather than queued; the
/// in-flight compile will already pick up the latest source.
#[derive(Debug, Default)]
pub struct CompileCoordinator {
    current: Option<String>,
}

impl CompileCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `req` unless it is redundant. Returns the request to forward
    /// to the compiler.
    pub fn request(&mut self, req: CompileRequest) -> Option<CompileRequest> {
        if req.compiled_path.is_empty() {
            debug!(descriptor = %req.compile, "ignoring compile request without a target");
            return None;
        }
        if self.current.as_deref() == Some(req.compiled_path.as_str()) {
            debug!(module = %req.compiled_path, "compile already in progress; dropping request");
            return None;
        }

        self.current = Some(req.compiled_path.clone());
        Some(req)
    }

    /// Compiler reported completion for `target`. Returns true if it was the
    /// active target.
    pub fn finish(&mut self, target: &str) -> bool {
        if self.current.as_deref() == Some(target) {
            self.current = None;
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }
}
