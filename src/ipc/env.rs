// src/ipc/env.rs

//! Environment variables shared between the supervisor and the child.

/// Loopback address (`127.0.0.1:port`) of the supervisor's IPC listener.
pub const DEVLOOP_IPC_ADDR: &str = "DEVLOOP_IPC_ADDR";

/// Always `true` inside a supervised child.
pub const DEVLOOP_DEV_MODE: &str = "DEVLOOP_DEV_MODE";

/// `development` unless the user set it.
pub const DEVLOOP_ENV: &str = "DEVLOOP_ENV";

pub const DEVLOOP_EVAL: &str = "DEVLOOP_EVAL";
pub const DEVLOOP_EVAL_FILENAME: &str = "DEVLOOP_EVAL_FILENAME";

/// Serialized type-context extraction results (JSON).
pub const DEVLOOP_TYPEGEN_CONTEXT: &str = "DEVLOOP_TYPEGEN_CONTEXT";

/// Marker file for compile requests from descendants without IPC.
pub const DEVLOOP_COMPILE_MARKER: &str = "DEVLOOP_COMPILE_MARKER";

/// `1` if descendants of the child may report over the same channel.
pub const DEVLOOP_RELAY: &str = "DEVLOOP_RELAY";

/// Logical filename used for `DEVLOOP_EVAL` when none is configured.
pub const DEFAULT_EVAL_FILENAME: &str = "[eval]";
