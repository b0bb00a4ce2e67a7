pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod routing;
pub mod util;

pub use config::Config;
pub use crate::core::{
    Agent, AgentRegistry, BatchSummary, ExecutionContext, ExecutionPlan, ExecutionResult,
    FailureKind, ResultStatus, Task, TaskFile, TaskGraphBuilder, TaskId, TaskStatus, Tier,
};
pub use error::{Error, Result};
pub use orchestration::{
    AgentExecutor, AgentOutput, CommandExecutor, Conductor, CoordinatorEvent, ExecutorError,
    RetryPolicy, RunOptions, TaskCoordinator,
};
pub use routing::{AgentRouter, CoordinationMode, ModeSelector, OrchestrationMode, RoutingConfig};
