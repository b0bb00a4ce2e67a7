use thiserror::Error;

use crate::core::task::TaskId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Dependency cycle detected: {}", format_cycle(.tasks))]
    Cycle { tasks: Vec<TaskId> },

    #[error("Unknown task in execution plan: {0}")]
    UnknownTask(TaskId),

    #[error("Invalid agent registry: {0}")]
    InvalidRegistry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Executor not available: {0}")]
    ExecutorUnavailable(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Structural errors abort a batch before any task runs.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::Cycle { .. } | Error::UnknownTask(_)
        )
    }
}

fn format_cycle(tasks: &[TaskId]) -> String {
    let mut names: Vec<String> = tasks.iter().map(|t| t.to_string()).collect();
    if let Some(first) = tasks.first() {
        names.push(first.to_string());
    }
    names.join(" -> ")
}

pub type Result<T> = std::result::Result<T, Error>;
