// tests/config_loading.rs

mod common;
use crate::common::builders::ConfigFileBuilder;

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::Parser;

use devloop::cli::CliArgs;
use devloop::config::{load_and_validate, ConfigFile, RawConfigFile};
use devloop::engine::RuntimeOptions;
use devloop::errors::DevloopError;
use devloop::types::DepthLimit;

type TestResult = Result<(), Box<dyn Error>>;

fn demo_config_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/Devloop.toml")
}

fn parse(toml_src: &str) -> Result<ConfigFile, DevloopError> {
    let raw: RawConfigFile = toml::from_str(toml_src)?;
    ConfigFile::try_from(raw)
}

#[test]
fn demo_config_loads() -> TestResult {
    let cfg = load_and_validate(demo_config_path())?;

    assert_eq!(cfg.entry.cmd, "node");
    assert_eq!(cfg.entry.args, vec!["--enable-source-maps", "dist/server.js"]);
    assert_eq!(cfg.entry.env.get("PORT").map(String::as_str), Some("3000"));
    assert_eq!(cfg.watch.deps, DepthLimit::Max(1));
    assert_eq!(cfg.watch.ignore.len(), 2);
    assert!(cfg.supervisor.tree_kill);
    assert_eq!(cfg.supervisor.manual_restart_token(), Some("rs"));
    assert_eq!(cfg.compiler.cmd.as_deref(), Some("npx tsc --outDir dist"));
    Ok(())
}

#[test]
fn minimal_config_gets_defaults() -> TestResult {
    let cfg = parse("[entry]\ncmd = \"node\"\n")?;

    assert_eq!(cfg.watch.deps, DepthLimit::Max(1));
    assert_eq!(cfg.watch.boundary, "node_modules");
    assert_eq!(cfg.watch.debounce_ms, 300);
    assert!(!cfg.watch.poll);
    assert!(!cfg.supervisor.respawn);
    assert!(cfg.supervisor.fork);
    assert_eq!(cfg.supervisor.manual_restart_token(), Some("rs"));
    assert_eq!(cfg.supervisor.ready_file, Some(PathBuf::from(".devloop/ready")));
    assert_eq!(cfg.compiler.marker_file, PathBuf::from(".devloop/compile-request"));
    Ok(())
}

#[test]
fn unlimited_deps_parses() -> TestResult {
    let cfg = parse("[entry]\ncmd = \"node\"\n[watch]\ndeps = -1\n")?;
    assert_eq!(cfg.watch.deps, DepthLimit::Unlimited);
    Ok(())
}

#[test]
fn invalid_deps_is_rejected() {
    let err = parse("[entry]\ncmd = \"node\"\n[watch]\ndeps = -2\n").unwrap_err();
    assert!(matches!(err, DevloopError::TomlError(_)), "got {err:?}");
}

#[test]
fn empty_command_is_rejected() {
    let err = parse("[entry]\ncmd = \"  \"\n").unwrap_err();
    assert!(matches!(err, DevloopError::ConfigError(_)));
}

#[test]
fn empty_ignore_rule_is_rejected() {
    let raw = ConfigFileBuilder::new("node").ignore("").raw();
    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(err.to_string().contains("[watch].ignore[0]"));
}

#[test]
fn eval_filename_requires_eval() {
    let mut raw = ConfigFileBuilder::new("node").raw();
    raw.entry.eval_filename = Some("repl.ts".to_string());
    assert!(ConfigFile::try_from(raw).is_err());
}

#[test]
fn empty_manual_restart_disables_it() -> TestResult {
    let cfg = parse("[entry]\ncmd = \"node\"\n[supervisor]\nmanual_restart = \"\"\n")?;
    assert_eq!(cfg.supervisor.manual_restart_token(), None);
    Ok(())
}

#[test]
fn relative_paths_resolve_against_config_dir() {
    let cfg = ConfigFileBuilder::new("node")
        .watch_path("src")
        .watch_path("/abs/lib")
        .compiler_config("tsconfig.json")
        .context_file("types/context.json")
        .build()
        .rooted_at(Path::new("/project"));

    assert_eq!(cfg.entry.cwd, Some(PathBuf::from("/project")));
    assert_eq!(
        cfg.watch.paths,
        vec![PathBuf::from("/project/src"), PathBuf::from("/abs/lib")]
    );
    assert_eq!(
        cfg.compiler.config_file,
        Some(PathBuf::from("/project/tsconfig.json"))
    );
    assert_eq!(
        cfg.entry.context_file,
        Some(PathBuf::from("/project/types/context.json"))
    );
    assert_eq!(
        cfg.compiler.marker_file,
        PathBuf::from("/project/.devloop/compile-request")
    );
    assert_eq!(
        cfg.supervisor.ready_file,
        Some(PathBuf::from("/project/.devloop/ready"))
    );
}

#[test]
fn empty_ready_file_disables_sentinel() -> TestResult {
    let cfg = parse("[entry]\ncmd = \"node\"\n[supervisor]\nready_file = \"\"\n")?
        .rooted_at(Path::new("/project"));
    assert_eq!(cfg.supervisor.ready_file, None);
    Ok(())
}

#[test]
fn own_files_are_excluded_from_restarts() {
    let cfg = ConfigFileBuilder::new("node")
        .watch_path(".")
        .build()
        .rooted_at(Path::new("/project"));
    let options = RuntimeOptions::from_config(&cfg);

    assert_eq!(
        options.own_files,
        vec![
            PathBuf::from("/project/.devloop/compile-request"),
            PathBuf::from("/project/.devloop/ready"),
        ]
    );
    assert!(options.is_own_file(Path::new("/project/.devloop/ready")));
    assert!(options.is_own_file(Path::new("/project/.devloop")));
    assert!(!options.is_own_file(Path::new("/project/src/index.ts")));
    assert!(!options.is_own_file(Path::new("/project")));
}

#[test]
fn cli_flags_override_config() {
    let args = CliArgs::try_parse_from([
        "devloop",
        "--poll",
        "--respawn",
        "--deps",
        "-1",
        "--",
        "deno",
        "run",
        "main.ts",
    ])
    .expect("valid args");

    let mut cfg = ConfigFileBuilder::new("node").arg("server.js").build();
    args.apply_overrides(&mut cfg);

    assert!(cfg.watch.poll);
    assert!(cfg.supervisor.respawn);
    assert!(!cfg.supervisor.tree_kill);
    assert_eq!(cfg.watch.deps, DepthLimit::Unlimited);
    assert_eq!(cfg.entry.cmd, "deno");
    assert_eq!(cfg.entry.args, vec!["run", "main.ts"]);
}

#[test]
fn cli_without_command_keeps_config_entry() {
    let args = CliArgs::try_parse_from(["devloop", "--config", "app/Devloop.toml"])
        .expect("valid args");
    assert_eq!(args.config, "app/Devloop.toml");

    let mut cfg = ConfigFileBuilder::new("node").arg("server.js").build();
    args.apply_overrides(&mut cfg);
    assert_eq!(cfg.entry.cmd, "node");
    assert_eq!(cfg.entry.args, vec!["server.js"]);
}
