//! The boundary between the coordinator and whatever actually runs a task.
//!
//! Executors are remote or expensive in practice (a headless CLI, an HTTP
//! model endpoint). The coordinator only sees this trait, so tests swap in
//! deterministic mocks.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::core::agent::Agent;
use crate::core::context::ContextSnapshot;
use crate::core::task::Task;

/// Failure reported by an executor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// Worth retrying: rate limits, overloaded servers, dropped connections.
    #[error("transient: {0}")]
    Transient(String),

    /// Retrying will not help.
    #[error("permanent: {0}")]
    Permanent(String),
}

/// Lowercased fragments that mark an error message as transient.
pub const TRANSIENT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "too many requests",
    "429",
    "quota exceeded",
    "overloaded",
    "timeout",
    "timed out",
    "temporarily",
    "temporary",
    "try again",
    "connection refused",
    "connection reset",
    "network error",
    "500",
    "502",
    "503",
    "504",
];

/// Lowercased fragments that always mean permanent, checked first.
pub const PERMANENT_PATTERNS: &[&str] = &[
    "permission denied",
    "access denied",
    "authentication failed",
    "invalid credentials",
    "invalid api key",
    "not found: 404",
    "invalid request",
];

impl ExecutorError {
    pub fn transient(message: impl Into<String>) -> Self {
        ExecutorError::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        ExecutorError::Permanent(message.into())
    }

    /// Classify a raw error message.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if PERMANENT_PATTERNS.iter().any(|p| lower.contains(p)) {
            return ExecutorError::Permanent(message);
        }
        if TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) {
            return ExecutorError::Transient(message);
        }
        ExecutorError::Permanent(message)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ExecutorError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            ExecutorError::Transient(m) | ExecutorError::Permanent(m) => m,
        }
    }
}

/// What an executor returns for a successful attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentOutput {
    pub output: String,
    /// Key/value writes for the shared context, applied after the group.
    pub context_updates: BTreeMap<String, Value>,
    /// Copied into the task's result metadata.
    pub metadata: BTreeMap<String, Value>,
}

impl AgentOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context_updates.insert(key.to_string(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Runs one attempt of a task as a given agent.
///
/// `timeout` is advisory; the coordinator enforces it around the call
/// regardless.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn run(
        &self,
        task: &Task,
        agent: &Agent,
        context: &ContextSnapshot,
        timeout: Duration,
    ) -> Result<AgentOutput, ExecutorError>;
}
