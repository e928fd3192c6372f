// src/ipc/mod.rs

//! Message relay between the supervisor and the supervised child.
//!
//! - [`message`] defines the wire schema.
//! - [`channel`] is the supervisor's listener.
//! - [`child`] is the library half used inside the child and its
//!   descendants.
//! - [`env`] names the environment variables both sides agree on.

pub mod channel;
pub mod child;
pub mod env;
pub mod message;

pub use channel::IpcChannel;
pub use child::{relay, request_compile_via_marker, ChildLink, FatalHook};
pub use message::{FatalReport, IpcMessage};
