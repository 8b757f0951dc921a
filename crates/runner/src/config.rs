use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RunnerError, RunnerResult};
use crate::language::Language;

pub(crate) const DEFAULT_LISTEN: &str = "0.0.0.0:8000";
pub(crate) const DEFAULT_RUN_TIMEOUT_MS: u64 = 10_000;
pub(crate) const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 30_000;
pub(crate) const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;
pub(crate) const DEFAULT_MAX_CONCURRENT: usize = 4;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Runtime data directory; sandbox workspaces live under `<base_dir>/workspaces`.
    pub base_dir: PathBuf,
    pub listen: String,
    pub execution: ExecutionConfig,
    pub toolchains: ToolchainConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::temp_dir().join("runner"),
            listen: DEFAULT_LISTEN.to_string(),
            execution: ExecutionConfig::default(),
            toolchains: ToolchainConfig::default(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub run_timeout_ms: u64,
    pub compile_timeout_ms: u64,
    /// Per-stream cap on captured output.
    pub max_output_bytes: usize,
    /// Executions allowed to run at the same time; further requests wait.
    pub max_concurrent: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            run_timeout_ms: DEFAULT_RUN_TIMEOUT_MS,
            compile_timeout_ms: DEFAULT_COMPILE_TIMEOUT_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

impl ExecutionConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }
}

/// Programs used to build and run each language. Bare names are looked up on `PATH`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub node: String,
    pub python: String,
    pub cxx: String,
    pub javac: String,
    pub java: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            node: "node".into(),
            python: "python3".into(),
            cxx: "g++".into(),
            javac: "javac".into(),
            java: "java".into(),
        }
    }
}

impl ToolchainConfig {
    /// Programs a language needs on the host.
    pub fn commands_for(&self, language: Language) -> Vec<&str> {
        match language {
            Language::JavaScript => vec![self.node.as_str()],
            Language::Python => vec![self.python.as_str()],
            Language::Cpp => vec![self.cxx.as_str()],
            Language::Java => vec![self.javac.as_str(), self.java.as_str()],
        }
    }

    pub fn all_commands(&self) -> Vec<&str> {
        Language::ALL
            .iter()
            .flat_map(|language| self.commands_for(*language))
            .collect()
    }
}

/// Load and validate a runner config from a YAML file.
///
/// Relative paths in the config are resolved against the config file's parent directory.
pub async fn load(path: &Path) -> RunnerResult<RunnerConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RunnerError::Config(format!("read {}: {e}", path.display())))?;
    let mut config: RunnerConfig = serde_yaml_ng::from_str(&content)
        .map_err(|e| RunnerError::Config(format!("parse {}: {e}", path.display())))?;
    if let Some(config_dir) = path.parent() {
        config.resolve_relative_paths(config_dir);
    }
    config.finish()
}

/// Load the config at `path`, or fall back to defaults when no path is given.
pub async fn load_or_default(path: Option<&Path>) -> RunnerResult<RunnerConfig> {
    match path {
        Some(path) => load(path).await,
        None => RunnerConfig::default().finish(),
    }
}

impl RunnerConfig {
    /// Resolve relative paths against `config_dir` (the directory containing the YAML file).
    fn resolve_relative_paths(&mut self, config_dir: &Path) {
        if self.base_dir.is_relative() {
            self.base_dir = config_dir.join(&self.base_dir);
        }
    }

    /// Make `base_dir` absolute and validate.
    fn finish(mut self) -> RunnerResult<Self> {
        self.base_dir = std::path::absolute(&self.base_dir)
            .map_err(|e| RunnerError::Config(format!("base_dir {}: {e}", self.base_dir.display())))?;
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> RunnerResult<()> {
        self.listen_addr()?;
        let execution = &self.execution;
        let zero = [
            ("execution.run_timeout_ms", execution.run_timeout_ms == 0),
            ("execution.compile_timeout_ms", execution.compile_timeout_ms == 0),
            ("execution.max_output_bytes", execution.max_output_bytes == 0),
            ("execution.max_concurrent", execution.max_concurrent == 0),
        ];
        if let Some((label, _)) = zero.into_iter().find(|(_, is_zero)| *is_zero) {
            return Err(RunnerError::Config(format!("{label} must be greater than 0")));
        }
        for command in self.toolchains.all_commands() {
            if command.trim().is_empty() {
                return Err(RunnerError::Config("toolchain program must not be empty".into()));
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> RunnerResult<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| RunnerError::Config(format!("listen {:?}: {e}", self.listen)))
    }
}
