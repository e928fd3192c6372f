// src/ipc/message.rs

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compile::CompileRequest;
use crate::errors::Result;

/// One message from the child (or a descendant) to the supervisor.
///
/// Wire format is one JSON object per line, keyed by the variant name:
///
/// ```text
/// {"required":"/project/src/index.ts"}
/// {"compile":{"compiledPath":"/project/src/index.ts","compile":"tsc"}}
/// {"error":{"stack":"...","willTerminate":false}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpcMessage {
    /// The child loaded this file.
    Required(PathBuf),
    Compile(CompileRequest),
    /// The child hit a fatal error.
    Error(FatalReport),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FatalReport {
    pub stack: String,
    /// The child terminates by itself; the supervisor must not signal it.
    #[serde(default)]
    pub will_terminate: bool,
}

impl IpcMessage {
    /// Encode as a single newline-terminated JSON line.
    pub fn encode(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn decode(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}
