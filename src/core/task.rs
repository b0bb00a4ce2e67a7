//! Task data model for the execution DAG.
//!
//! Tasks are the atomic units of work routed to agents. Everything except
//! the status is fixed when the batch is submitted; the status is advanced
//! by the coordinator as the task moves through its lifecycle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{Error, Result};

/// Lowest task priority.
pub const MIN_PRIORITY: u8 = 1;

/// Highest task priority.
pub const MAX_PRIORITY: u8 = 5;

/// Priority used when the submitter does not give one.
pub const DEFAULT_PRIORITY: u8 = 3;

/// Identifier of a task within a batch.
///
/// Ids are supplied by the submitter and must be unique in the batch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task status in its lifecycle.
///
/// `Pending -> Ready -> Running -> {Succeeded | Retrying -> Running | Failed}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Task submitted, dependencies not yet satisfied.
    Pending,
    /// Dependencies satisfied, waiting for dispatch.
    Ready,
    /// An attempt is in flight.
    Running,
    /// Last attempt failed transiently; waiting out the backoff.
    Retrying {
        /// Number of the attempt that will run next (1-based).
        attempt: u32,
    },
    /// Task completed successfully.
    Succeeded,
    /// Task failed permanently, exhausted its retries, or never ran.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Ready => write!(f, "ready"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Retrying { attempt } => write!(f, "retrying (attempt {})", attempt),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

/// A single unit of work in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier within the batch.
    pub id: TaskId,
    /// What the task should accomplish. Drives routing.
    pub description: String,
    /// Dispatch priority, 1 (lowest) to 5 (highest).
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Tasks that must finish before this one may start.
    #[serde(default)]
    pub dependencies: BTreeSet<TaskId>,
    /// Current execution status.
    #[serde(default, skip_deserializing)]
    pub status: TaskStatus,
}

impl Task {
    /// Create a pending task with default priority and no dependencies.
    pub fn new(id: impl Into<TaskId>, description: &str) -> Self {
        Self {
            id: id.into(),
            description: description.to_string(),
            priority: DEFAULT_PRIORITY,
            dependencies: BTreeSet::new(),
            status: TaskStatus::Pending,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Check the per-task input constraints.
    ///
    /// Cross-task constraints (unique ids, resolvable dependencies, acyclicity)
    /// are checked by the graph builder.
    pub fn validate(&self) -> Result<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(Error::Validation("task id must not be empty".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(Error::Validation(format!(
                "task {} has an empty description",
                self.id
            )));
        }
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            return Err(Error::Validation(format!(
                "task {} has priority {} outside {}..={}",
                self.id, self.priority, MIN_PRIORITY, MAX_PRIORITY
            )));
        }
        Ok(())
    }

    pub fn mark_ready(&mut self) {
        self.status = TaskStatus::Ready;
    }

    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
    }

    /// Record that the next attempt will be a retry.
    pub fn retry(&mut self, attempt: u32) {
        self.status = TaskStatus::Retrying { attempt };
    }

    pub fn succeed(&mut self) {
        self.status = TaskStatus::Succeeded;
    }

    pub fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed {
            error: error.to_string(),
        };
    }

    /// Check if the task is in a terminal state (Succeeded or Failed).
    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Succeeded | TaskStatus::Failed { .. }
        )
    }

    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }
}

/// On-disk layout of a task file.
///
/// TOML files use `[[tasks]]` tables. JSON files may hold either a bare
/// array of tasks or an object with a `tasks` array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFile {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonTasks {
    List(Vec<Task>),
    File(TaskFile),
}

impl TaskFile {
    /// Parse task file contents. `.json` paths are read as JSON, anything
    /// else as TOML.
    pub fn parse(contents: &str, path: &Path) -> Result<Vec<Task>> {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            return Ok(match serde_json::from_str::<JsonTasks>(contents)? {
                JsonTasks::List(tasks) => tasks,
                JsonTasks::File(file) => file.tasks,
            });
        }
        let file: TaskFile = toml::from_str(contents)?;
        Ok(file.tasks)
    }

    pub fn load(path: &Path) -> Result<Vec<Task>> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents, path)
    }
}
