//! Command-line agent executor.
//!
//! `CommandExecutor` runs a configured command once per attempt, by default
//! Claude Code in headless mode (`claude -p --output-format json`), passing a
//! prompt built from the agent, the task and the context snapshot as the
//! last argument. JSON output is parsed into an [`AgentOutput`]; anything
//! else is taken as plain text.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::core::agent::Agent;
use crate::core::context::ContextSnapshot;
use crate::core::task::Task;
use crate::error::{Error, Result};
use crate::orchestration::executor::{AgentExecutor, AgentOutput, ExecutorError};
use crate::util::{truncate, with_timeout};

/// Command used when none is configured.
pub const DEFAULT_COMMAND: &str = "claude -p --output-format json";

/// Longest prior output quoted back into a prompt.
const MAX_HISTORY_CHARS: usize = 2_000;

/// Internal struct for deserializing a JSON response.
#[derive(Debug, Deserialize)]
struct RawResponse {
    subtype: Option<String>,
    result: Option<String>,
    #[serde(default)]
    is_error: bool,
    session_id: Option<String>,
    total_cost_usd: Option<f64>,
    duration_ms: Option<u64>,
    num_turns: Option<u32>,
    #[serde(default)]
    error: Option<String>,
    /// Key/value writes for the shared context, if the command emits any.
    #[serde(default)]
    context: BTreeMap<String, Value>,
}

/// Runs agents as an external command.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    /// Resolved program path.
    program: PathBuf,
    /// Arguments placed before the prompt.
    args: Vec<String>,
    /// Working directory for the command, if not inherited.
    cwd: Option<PathBuf>,
}

impl CommandExecutor {
    /// Build an executor from a command line such as `claude -p`.
    ///
    /// The program is resolved on `PATH` with `which`.
    pub fn new(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("executor command is empty".to_string()))?;
        let resolved = which::which(program)
            .map_err(|_| Error::ExecutorUnavailable(program.to_string()))?;
        Ok(Self {
            program: resolved,
            args: parts.map(str::to_string).collect(),
            cwd: None,
        })
    }

    /// Use a specific program without a `PATH` lookup.
    pub fn with_binary(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Build the prompt for one attempt.
    pub fn build_prompt(task: &Task, agent: &Agent, context: &ContextSnapshot) -> String {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "You are the {} agent (tier {}).", agent.role, agent.tier.level());
        if let Some(domain) = &agent.domain {
            let _ = writeln!(prompt, "Domain: {}", domain);
        }
        if !agent.capabilities.is_empty() {
            let _ = writeln!(prompt, "Capabilities: {}", agent.capabilities.join(", "));
        }

        if !context.values().is_empty() {
            prompt.push_str("\nShared context:\n");
            for (key, value) in context.values() {
                let _ = writeln!(prompt, "- {}: {}", key, value);
            }
        }

        let prior: Vec<_> = task
            .dependencies
            .iter()
            .filter_map(|dep| context.output_of(dep).map(|out| (dep, out)))
            .collect();
        if !prior.is_empty() {
            prompt.push_str("\nResults of prerequisite tasks:\n");
            for (dep, output) in prior {
                let _ = writeln!(prompt, "[{}]\n{}", dep, truncate(output, MAX_HISTORY_CHARS));
            }
        }

        let _ = write!(prompt, "\nTask {}: {}", task.id, task.description);
        prompt
    }

    /// Parse JSON output from the command.
    ///
    /// Returns `None` when `stdout` is not a JSON response object.
    pub fn parse_json_response(stdout: &str) -> Option<std::result::Result<AgentOutput, ExecutorError>> {
        let raw: RawResponse = serde_json::from_str(stdout.trim()).ok()?;

        let failed = raw.is_error || raw.subtype.as_deref().is_some_and(|s| s.starts_with("error"));
        if failed || (raw.result.is_none() && raw.error.is_some()) {
            let message = raw
                .error
                .or(raw.result)
                .or(raw.subtype)
                .unwrap_or_else(|| "unknown error".to_string());
            return Some(Err(ExecutorError::classify(message)));
        }

        let Some(result) = raw.result else {
            return Some(Err(ExecutorError::permanent("unknown response format")));
        };

        let mut output = AgentOutput::new(result);
        output.context_updates = raw.context;
        if let Some(id) = raw.session_id {
            output = output.with_metadata("session_id", id);
        }
        if let Some(cost) = raw.total_cost_usd {
            output = output.with_metadata("cost_usd", cost);
        }
        if let Some(ms) = raw.duration_ms {
            output = output.with_metadata("duration_ms", ms);
        }
        if let Some(turns) = raw.num_turns {
            output = output.with_metadata("num_turns", turns);
        }
        Some(Ok(output))
    }
}

#[async_trait]
impl AgentExecutor for CommandExecutor {
    async fn run(
        &self,
        task: &Task,
        agent: &Agent,
        context: &ContextSnapshot,
        timeout: Duration,
    ) -> std::result::Result<AgentOutput, ExecutorError> {
        let prompt = Self::build_prompt(task, agent, context);
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(&prompt).kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        debug!(task = %task.id, agent = %agent.role, program = %self.program.display(), "spawning executor");

        let output = with_timeout(timeout, async { command.output().await.map_err(Error::Io) })
            .await
            .map_err(|e| match e {
                Error::Timeout(d) => ExecutorError::transient(format!("command timed out after {:?}", d)),
                Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    ExecutorError::permanent(format!("{} not found", self.program.display()))
                }
                other => ExecutorError::classify(other.to_string()),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if let Some(parsed) = Self::parse_json_response(&stdout) {
            return parsed;
        }

        if !output.status.success() {
            let message = if stderr.trim().is_empty() {
                format!(
                    "command failed with exit code {}",
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            return Err(ExecutorError::classify(message));
        }

        Ok(AgentOutput::new(stdout.trim()))
    }
}
