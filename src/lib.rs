// src/lib.rs

pub mod cli;
pub mod compile;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod ipc;
pub mod logging;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::compile::{spawn_marker_watcher, CommandCompiler, MarkerFile};
use crate::config::{config_root_dir, load_and_validate, ConfigFile};
use crate::engine::{Backends, Orchestrator, Runtime, RuntimeEvent, RuntimeOptions, SessionFiles};
use crate::exec::{ChildSpec, ProcessSupervisor};
use crate::fs::{FileSystem, RealFileSystem};
use crate::watch::{spawn_manual_trigger, FileWatcher, WatchFilter, WatcherOptions};

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - config loading and CLI overrides
/// - the orchestrator core and its runtime shell
/// - process supervisor, file watcher, compiler and marker watcher
/// - stdin manual restarts
/// - SIGTERM / Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let root = config_root_dir(&config_path);
    let mut cfg = load_and_validate(&config_path)?.rooted_at(&root);
    args.apply_overrides(&mut cfg);

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(0);
    }

    info!(root = ?root, cmd = %cfg.entry.cmd, "devloop starting");

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let spec = ChildSpec::from_config(&cfg, fs.as_ref());

    let processes = ProcessSupervisor::new(rt_tx.clone());
    let watcher = FileWatcher::spawn(WatcherOptions::from_config(&cfg.watch), rt_tx.clone())?;
    let compiler = CommandCompiler::new(&cfg.compiler, cfg.entry.cwd.clone(), rt_tx.clone());

    let poll = cfg
        .watch
        .poll
        .then(|| Duration::from_millis(cfg.watch.interval_ms));
    let marker = MarkerFile::new(cfg.compiler.marker_file.clone());
    let _marker_watcher = spawn_marker_watcher(
        marker.clone(),
        poll,
        Arc::clone(&fs),
        rt_tx.clone(),
    )?;

    if let Some(token) = cfg.supervisor.manual_restart_token() {
        spawn_manual_trigger(token.to_string(), rt_tx.clone());
    }

    spawn_signal_listener(rt_tx);

    let core = Orchestrator::new(
        WatchFilter::from_config(&cfg.watch),
        RuntimeOptions::from_config(&cfg),
    );
    let files = SessionFiles {
        fs,
        marker,
        ready: cfg.supervisor.ready_file.clone(),
    };
    let backends = Backends {
        processes,
        watcher,
        compiler,
    };

    let runtime = Runtime::new(core, rt_rx, backends, spec, files);
    Ok(runtime.run().await?)
}

/// SIGTERM / Ctrl-C → graceful shutdown.
fn spawn_signal_listener(tx: mpsc::Sender<RuntimeEvent>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut term = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("failed to listen for SIGTERM: {e}");
                    return;
                }
            };
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if let Err(e) = res {
                        eprintln!("failed to listen for Ctrl+C: {e}");
                        return;
                    }
                }
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
        }

        let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
    });
}

/// Dry-run output: print the resolved setup.
fn print_dry_run(cfg: &ConfigFile) {
    println!("devloop dry-run");
    println!("  entry.cmd = {}", cfg.entry.cmd);
    if !cfg.entry.args.is_empty() {
        println!("  entry.args = {:?}", cfg.entry.args);
    }
    if let Some(cwd) = &cfg.entry.cwd {
        println!("  entry.cwd = {}", cwd.display());
    }
    if !cfg.entry.env.is_empty() {
        println!("  entry.env = {:?}", cfg.entry.env.keys().collect::<Vec<_>>());
    }
    if let Some(file) = &cfg.entry.context_file {
        println!("  entry.context_file = {}", file.display());
    }
    println!();

    println!("watch:");
    for path in &cfg.watch.paths {
        println!("  - {}", path.display());
    }
    if !cfg.watch.ignore.is_empty() {
        println!("  ignore: {:?}", cfg.watch.ignore);
    }
    println!("  deps: {} (boundary '{}')", cfg.watch.deps, cfg.watch.boundary);
    if cfg.watch.poll {
        println!("  poll: every {} ms", cfg.watch.interval_ms);
    }
    println!("  debounce: {} ms", cfg.watch.debounce_ms);
    println!();

    println!("supervisor:");
    println!("  respawn: {}", cfg.supervisor.respawn);
    println!("  tree_kill: {}", cfg.supervisor.tree_kill);
    println!("  clear: {}", cfg.supervisor.clear);
    println!("  fork: {}", cfg.supervisor.fork);
    match cfg.supervisor.manual_restart_token() {
        Some(token) => println!("  manual_restart: {token}"),
        None => println!("  manual_restart: disabled"),
    }
    if let Some(ready) = &cfg.supervisor.ready_file {
        println!("  ready_file: {}", ready.display());
    }
    println!();

    println!("compiler:");
    for (name, cmd) in [
        ("cmd", &cfg.compiler.cmd),
        ("init_cmd", &cfg.compiler.init_cmd),
        ("changed_cmd", &cfg.compiler.changed_cmd),
    ] {
        if let Some(cmd) = cmd {
            println!("  {name}: {cmd}");
        }
    }
    if let Some(file) = &cfg.compiler.config_file {
        println!("  config_file: {}", file.display());
    }
    println!("  marker_file: {}", cfg.compiler.marker_file.display());

    debug!("dry-run complete (nothing started)");
}
