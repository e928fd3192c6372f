// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::config::{ConfigFile, DEFAULT_CONFIG_FILE};
use crate::types::DepthLimit;

/// Command-line arguments for `devloop`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "devloop",
    version,
    about = "Restart a development process whenever the files it uses change.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEVLOOP_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Poll the filesystem instead of using native change events.
    #[arg(long)]
    pub poll: bool,

    /// Terminate the child's whole process group on restart.
    #[arg(long)]
    pub tree_kill: bool,

    /// Keep running after the child exits on its own.
    #[arg(long)]
    pub respawn: bool,

    /// Clear the screen on every restart.
    #[arg(long)]
    pub clear: bool,

    /// Maximum dependency depth to watch (-1 for unlimited).
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub deps: Option<DepthLimit>,

    /// Parse + validate, print the resolved setup, but don't start anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Entry command overriding `[entry]` (everything after `--`).
    #[arg(last = true, value_name = "CMD")]
    pub command: Vec<String>,
}

impl CliArgs {
    /// Apply flags that override values from the config file.
    pub fn apply_overrides(&self, cfg: &mut ConfigFile) {
        if self.poll {
            cfg.watch.poll = true;
        }
        if self.tree_kill {
            cfg.supervisor.tree_kill = true;
        }
        if self.respawn {
            cfg.supervisor.respawn = true;
        }
        if self.clear {
            cfg.supervisor.clear = true;
        }
        if let Some(deps) = self.deps {
            cfg.watch.deps = deps;
        }
        if let Some((cmd, args)) = self.command.split_first() {
            cfg.entry.cmd = cmd.clone();
            cfg.entry.args = args.to_vec();
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
