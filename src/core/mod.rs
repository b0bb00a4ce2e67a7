//! Core domain models for conductor.
//!
//! Tasks, agents, results and the shared run context, plus the dependency
//! graph and the planner that turns a batch into parallel groups.

pub mod agent;
pub mod context;
pub mod dag;
pub mod plan;
pub mod result;
pub mod task;

pub use agent::{Agent, AgentRegistry, Tier};
pub use context::{ContextSnapshot, ContextWrites, ExecutionContext, HistoryEntry};
pub use dag::TaskDAG;
pub use plan::{ExecutionPlan, ParallelGroup, TaskGraphBuilder};
pub use result::{BatchSummary, ExecutionResult, FailureKind, ResultStatus};
pub use task::{Task, TaskFile, TaskId, TaskStatus};
