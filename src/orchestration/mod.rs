//! Orchestration layer.
//!
//! Runs execution plans: the coordinator dispatches each parallel group,
//! retries transient failures and merges context between groups; executors
//! do the actual work behind the [`AgentExecutor`] trait; [`Conductor`] is
//! the batch entry point.

pub mod batch;
pub mod command;
pub mod coordinator;
pub mod executor;
pub mod retry;

pub use batch::{BatchRun, Conductor, RunOptions};
pub use command::{CommandExecutor, DEFAULT_COMMAND};
pub use coordinator::{
    CoordinatorEvent, TaskCoordinator, DEFAULT_MAX_CONCURRENCY, DEFAULT_TASK_TIMEOUT_SECS,
};
pub use executor::{AgentExecutor, AgentOutput, ExecutorError};
pub use retry::RetryPolicy;
