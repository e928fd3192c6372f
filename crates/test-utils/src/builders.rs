#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use devloop::config::{
    CompilerSection, ConfigFile, EntrySection, RawConfigFile, SupervisorSection, WatchSection,
};
use devloop::engine::RuntimeOptions;
use devloop::types::DepthLimit;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            config: RawConfigFile {
                entry: EntrySection {
                    cmd: cmd.to_string(),
                    args: Vec::new(),
                    env: BTreeMap::new(),
                    cwd: None,
                    eval: None,
                    eval_filename: None,
                    context_file: None,
                },
                watch: WatchSection::default(),
                supervisor: SupervisorSection::default(),
                compiler: CompilerSection::default(),
            },
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.config.entry.args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config.entry.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn eval(mut self, code: &str, filename: Option<&str>) -> Self {
        self.config.entry.eval = Some(code.to_string());
        self.config.entry.eval_filename = filename.map(str::to_string);
        self
    }

    pub fn context_file(mut self, path: &str) -> Self {
        self.config.entry.context_file = Some(PathBuf::from(path));
        self
    }

    pub fn watch_path(mut self, path: &str) -> Self {
        self.config.watch.paths.push(PathBuf::from(path));
        self
    }

    pub fn ignore(mut self, rule: &str) -> Self {
        self.config.watch.ignore.push(rule.to_string());
        self
    }

    pub fn deps(mut self, deps: DepthLimit) -> Self {
        self.config.watch.deps = deps;
        self
    }

    pub fn respawn(mut self, val: bool) -> Self {
        self.config.supervisor.respawn = val;
        self
    }

    pub fn tree_kill(mut self, val: bool) -> Self {
        self.config.supervisor.tree_kill = val;
        self
    }

    pub fn fork(mut self, val: bool) -> Self {
        self.config.supervisor.fork = val;
        self
    }

    pub fn manual_restart(mut self, token: &str) -> Self {
        self.config.supervisor.manual_restart = token.to_string();
        self
    }

    pub fn compiler_cmd(mut self, cmd: &str) -> Self {
        self.config.compiler.cmd = Some(cmd.to_string());
        self
    }

    pub fn compiler_config(mut self, path: &str) -> Self {
        self.config.compiler.config_file = Some(PathBuf::from(path));
        self
    }

    pub fn marker_file(mut self, path: &str) -> Self {
        self.config.compiler.marker_file = PathBuf::from(path);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for the orchestrator's `RuntimeOptions`.
#[derive(Default)]
pub struct RuntimeOptionsBuilder {
    options: RuntimeOptions,
}

impl RuntimeOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respawn(mut self, val: bool) -> Self {
        self.options.respawn = val;
        self
    }

    pub fn clear(mut self, val: bool) -> Self {
        self.options.clear = val;
        self
    }

    pub fn compiler_config(mut self, path: &str) -> Self {
        self.options.compiler_config = Some(PathBuf::from(path));
        self
    }

    pub fn static_path(mut self, path: &str) -> Self {
        self.options.static_paths.push(PathBuf::from(path));
        self
    }

    pub fn own_file(mut self, path: &str) -> Self {
        self.options.own_files.push(PathBuf::from(path));
        self
    }

    pub fn build(self) -> RuntimeOptions {
        self.options
    }
}
