use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::types::DepthLimit;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [entry]
/// cmd = "node"
/// args = ["dist/server.js"]
///
/// [watch]
/// paths = ["src"]
/// ignore = ["/usr/lib/", "\\.test\\.ts$"]
/// deps = 1
///
/// [supervisor]
/// respawn = false
/// tree_kill = true
///
/// [compiler]
/// cmd = "tsc --outDir dist"
/// config_file = "tsconfig.json"
/// ```
///
/// Only `[entry]` is mandatory; every other section has defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub entry: EntrySection,

    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub supervisor: SupervisorSection,

    #[serde(default)]
    pub compiler: CompilerSection,
}

/// Validated configuration.
///
/// Construct it through `ConfigFile::try_from(raw)` (see `validate.rs`) or
/// [`crate::config::load_and_validate`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub entry: EntrySection,
    pub watch: WatchSection,
    pub supervisor: SupervisorSection,
    pub compiler: CompilerSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        entry: EntrySection,
        watch: WatchSection,
        supervisor: SupervisorSection,
        compiler: CompilerSection,
    ) -> Self {
        Self {
            entry,
            watch,
            supervisor,
            compiler,
        }
    }

    /// Resolve every relative path in the config against `root` (the
    /// directory holding the config file).
    pub fn rooted_at(mut self, root: &Path) -> Self {
        let join = |p: &PathBuf| -> PathBuf {
            if p.is_absolute() { p.clone() } else { root.join(p) }
        };

        self.entry.cwd = Some(self.entry.cwd.as_ref().map(join).unwrap_or_else(|| root.to_path_buf()));
        self.entry.context_file = self.entry.context_file.as_ref().map(join);
        self.watch.paths = self.watch.paths.iter().map(join).collect();
        // `ready_file = ""` disables the sentinel.
        self.supervisor.ready_file = self
            .supervisor
            .ready_file
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
            .map(join);
        self.compiler.config_file = self.compiler.config_file.as_ref().map(join);
        self.compiler.marker_file = join(&self.compiler.marker_file);
        self
    }
}

/// `[entry]` section: what the supervised child runs.
#[derive(Debug, Clone, Deserialize)]
pub struct EntrySection {
    /// Program to execute (looked up on `PATH`).
    pub cmd: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overlay applied on top of the supervisor's environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory of the child; defaults to the project root.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Source payload handed to the child in `DEVLOOP_EVAL`.
    #[serde(default)]
    pub eval: Option<String>,

    /// Logical filename of `eval`, passed in `DEVLOOP_EVAL_FILENAME`.
    #[serde(default)]
    pub eval_filename: Option<String>,

    /// JSON file with type-context extraction results, forwarded to the
    /// child in `DEVLOOP_TYPEGEN_CONTEXT`.
    #[serde(default)]
    pub context_file: Option<PathBuf>,
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// Paths watched on every start in addition to the files the child
    /// reports as required. Directories are watched recursively.
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// Ignore rules, each matched as a literal prefix and as a regex.
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Maximum dependency depth (`-1` = unlimited).
    #[serde(default)]
    pub deps: DepthLimit,

    /// Name of the package-boundary directory used to compute depth.
    #[serde(default = "default_boundary")]
    pub boundary: String,

    /// Force polling instead of native filesystem events.
    #[serde(default)]
    pub poll: bool,

    /// Polling interval in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Debounce window in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_boundary() -> String {
    "node_modules".to_string()
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_debounce_ms() -> u64 {
    300
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            ignore: Vec::new(),
            deps: DepthLimit::default(),
            boundary: default_boundary(),
            poll: false,
            interval_ms: default_interval_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// `[supervisor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSection {
    /// Keep supervising after the child exits on its own instead of
    /// exiting with its code.
    #[serde(default)]
    pub respawn: bool,

    /// Terminate the child's whole process group on stop.
    #[serde(default)]
    pub tree_kill: bool,

    /// Clear the terminal on every restart.
    #[serde(default)]
    pub clear: bool,

    /// Let processes spawned by the child report over the same channel.
    #[serde(default = "default_true")]
    pub fork: bool,

    /// Line typed on stdin that forces a restart. Empty string disables it.
    #[serde(default = "default_manual_restart")]
    pub manual_restart: String,

    /// Sentinel file written once the child is up.
    #[serde(default = "default_ready_file")]
    pub ready_file: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_manual_restart() -> String {
    "rs".to_string()
}

fn default_ready_file() -> Option<PathBuf> {
    Some(PathBuf::from(".devloop/ready"))
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            respawn: false,
            tree_kill: false,
            clear: false,
            fork: default_true(),
            manual_restart: default_manual_restart(),
            ready_file: default_ready_file(),
        }
    }
}

impl SupervisorSection {
    /// The manual restart token, if enabled.
    pub fn manual_restart_token(&self) -> Option<&str> {
        let token = self.manual_restart.trim();
        if token.is_empty() { None } else { Some(token) }
    }
}

/// `[compiler]` section: the external compiler collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct CompilerSection {
    /// Command run for every forwarded compile request.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Command run at startup and whenever `config_file` changes.
    #[serde(default)]
    pub init_cmd: Option<String>,

    /// Command run for every changed file before a restart.
    #[serde(default)]
    pub changed_cmd: Option<String>,

    /// The compiler's own configuration file (e.g. `tsconfig.json`).
    #[serde(default)]
    pub config_file: Option<PathBuf>,

    /// Compile-request marker file for descendants without an IPC link.
    #[serde(default = "default_marker_file")]
    pub marker_file: PathBuf,
}

fn default_marker_file() -> PathBuf {
    PathBuf::from(".devloop/compile-request")
}

impl Default for CompilerSection {
    fn default() -> Self {
        Self {
            cmd: None,
            init_cmd: None,
            changed_cmd: None,
            config_file: None,
            marker_file: default_marker_file(),
        }
    }
}
