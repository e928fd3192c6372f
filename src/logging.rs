// src/logging.rs

//! Supervisor log output.
//!
//! The level comes from `--log-level`, then `DEVLOOP_LOG`, then `info`.
//! `DEVLOOP_LOG` also accepts full `EnvFilter` directives
//! (e.g. `devloop::engine=debug,notify=warn`).
//!
//! The child inherits stdout and stderr, so supervisor lines are kept short
//! and go to stderr only.

use anyhow::{anyhow, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Env var holding the default log filter.
pub const LOG_ENV: &str = "DEVLOOP_LOG";

/// Install the global subscriber. Call once, before the runtime starts.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::default().add_directive(LevelFilter::from(level).into()),
        None => EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .with_env_var(LOG_ENV)
            .from_env_lossy(),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing log subscriber: {e}"))
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}
