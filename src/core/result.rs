//! Per-task execution results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::core::task::TaskId;

/// Outcome of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Failure,
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultStatus::Success => write!(f, "success"),
            ResultStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Why a task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Retryable executor failure; retries were exhausted.
    Transient,
    /// Non-retryable executor failure.
    Permanent,
    /// The attempt exceeded the per-task timeout; retries were exhausted.
    Timeout,
    /// A dependency failed, so the task never ran.
    BlockedByDependency,
    /// The run was cancelled before the task could finish.
    Cancelled,
}

impl FailureKind {
    /// Whether the executor was ever invoked for a task failing this way.
    pub fn was_attempted(self) -> bool {
        matches!(
            self,
            FailureKind::Transient | FailureKind::Permanent | FailureKind::Timeout
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Permanent => write!(f, "permanent"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::BlockedByDependency => write!(f, "blocked by dependency"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of a task's final attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub task_id: TaskId,
    pub status: ResultStatus,
    /// Agent output on success; empty otherwise.
    pub output: String,
    /// Error messages, one per failed attempt, oldest first.
    pub errors: Vec<String>,
    pub metadata: BTreeMap<String, Value>,
    /// Set when `status` is `Failure`.
    pub failure: Option<FailureKind>,
    /// Executor invocations made for this task.
    pub attempts: u32,
    /// Agent the task was routed to, if it was routed.
    pub agent_role: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionResult {
    pub fn success(task_id: TaskId, output: impl Into<String>) -> Self {
        Self {
            task_id,
            status: ResultStatus::Success,
            output: output.into(),
            errors: Vec::new(),
            metadata: BTreeMap::new(),
            failure: None,
            attempts: 0,
            agent_role: None,
            started_at: None,
            finished_at: Some(Utc::now()),
        }
    }

    pub fn failure(task_id: TaskId, kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            task_id,
            status: ResultStatus::Failure,
            output: String::new(),
            errors: vec![error.into()],
            metadata: BTreeMap::new(),
            failure: Some(kind),
            attempts: 0,
            agent_role: None,
            started_at: None,
            finished_at: Some(Utc::now()),
        }
    }

    /// Failure for a task whose dependency failed.
    pub fn blocked(task_id: TaskId, dependency: &TaskId) -> Self {
        Self::failure(
            task_id,
            FailureKind::BlockedByDependency,
            format!("blocked by dependency: {}", dependency),
        )
    }

    /// Failure for a task that never finished because the run was cancelled.
    pub fn cancelled(task_id: TaskId) -> Self {
        Self::failure(task_id, FailureKind::Cancelled, "cancelled")
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    pub fn is_blocked(&self) -> bool {
        self.failure == Some(FailureKind::BlockedByDependency)
    }

    pub fn is_cancelled(&self) -> bool {
        self.failure == Some(FailureKind::Cancelled)
    }

    /// The most recent error, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(String::as_str)
    }
}

/// Aggregate counts over a result list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub blocked: usize,
    pub cancelled: usize,
    pub attempts: u32,
}

impl BatchSummary {
    pub fn from_results(results: &[ExecutionResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            summary.attempts += result.attempts;
            match result.failure {
                None => summary.succeeded += 1,
                Some(FailureKind::BlockedByDependency) => summary.blocked += 1,
                Some(FailureKind::Cancelled) => summary.cancelled += 1,
                Some(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} tasks succeeded, {} failed, {} blocked, {} cancelled ({} attempts)",
            self.succeeded, self.total, self.failed, self.blocked, self.cancelled, self.attempts
        )
    }
}
