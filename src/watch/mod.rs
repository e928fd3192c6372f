// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Classifying required files (ignore rules, dependency depth).
//! - Wiring up a cross-platform filesystem watcher (`notify`), falling back
//!   to polling when the native backend runs out of capacity.
//! - Debouncing raw notifications into one change event per path.
//! - The stdin manual-restart trigger.
//!
//! It does **not** decide what a change means; it only turns filesystem
//! activity into `RuntimeEvent::FileChanged`.

pub mod classify;
pub mod debounce;
pub mod manual;
pub mod watcher;

pub use classify::{dependency_depth, IgnoreRule, WatchFilter};
pub use debounce::{run_debounce_loop, Debouncer};
pub use manual::{is_manual_restart, spawn_manual_trigger};
pub use watcher::{FileWatcher, WatchBackend, WatchOutcome, WatcherOptions};
