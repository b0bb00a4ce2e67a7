//! Configuration loaded from `~/.conductor/conductor.toml`.
//!
//! Every section is optional; a missing file or section means defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::core::agent::AgentRegistry;
use crate::orchestration::command::DEFAULT_COMMAND;
use crate::orchestration::coordinator::{DEFAULT_MAX_CONCURRENCY, DEFAULT_TASK_TIMEOUT_SECS};
use crate::orchestration::retry::RetryPolicy;
use crate::routing::{OrchestrationMode, RoutingConfig};
use crate::{Error, Result};

/// `[execution]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Per-attempt timeout.
    pub timeout_secs: u64,
    pub max_concurrency: usize,
    pub mode: OrchestrationMode,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            mode: OrchestrationMode::default(),
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[executor]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Command line run per attempt; the prompt is appended as the last argument.
    pub command: Option<String>,
}

impl ExecutorConfig {
    pub fn effective_command(&self) -> &str {
        self.command.as_deref().unwrap_or(DEFAULT_COMMAND)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Agent registry file; the built-in roster is used when unset.
    pub agents_file: Option<String>,
}

impl Config {
    pub fn conductor_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".conductor"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::conductor_dir()?.join("conductor.toml"))
    }

    /// Load from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        if !path.exists() {
            debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        debug!(
            max_retries = config.retry.max_retries,
            timeout_secs = config.execution.timeout_secs,
            mode = %config.execution.mode,
            agents_file = ?config.agents_file,
            "config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.execution.timeout_secs == 0 {
            return Err(Error::Config("execution.timeout_secs must be positive".to_string()));
        }
        if self.execution.max_concurrency == 0 {
            return Err(Error::Config("execution.max_concurrency must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(Error::Config(format!(
                "retry.jitter must be within 0.0..=1.0, got {}",
                self.retry.jitter
            )));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        if self.routing.domains.iter().any(|d| d.name.trim().is_empty()) {
            return Err(Error::Config("routing domains need a name".to_string()));
        }
        Ok(())
    }

    pub fn agents_path(&self) -> Option<PathBuf> {
        self.agents_file.as_deref().map(expand_tilde)
    }

    /// The configured registry, or the built-in roster.
    pub fn load_registry(&self) -> Result<AgentRegistry> {
        match self.agents_path() {
            Some(path) => AgentRegistry::load(&path),
            None => Ok(AgentRegistry::builtin()),
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
