//! Batch entry point.
//!
//! [`Conductor`] ties the pieces together: it plans a batch, builds a
//! [`TaskCoordinator`] for the run options, wires up cancellation and an
//! optional deadline, and returns results in input order.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::core::agent::AgentRegistry;
use crate::core::context::ExecutionContext;
use crate::core::plan::{ExecutionPlan, TaskGraphBuilder};
use crate::core::result::{BatchSummary, ExecutionResult};
use crate::core::task::Task;
use crate::error::Result;
use crate::orchestration::coordinator::{CoordinatorEvent, TaskCoordinator};
use crate::orchestration::executor::AgentExecutor;
use crate::orchestration::retry::RetryPolicy;
use crate::routing::{AgentRouter, OrchestrationMode, RoutingConfig, RoutingDecision};

/// Per-run overrides. Unset fields fall back to the conductor's defaults.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: Option<OrchestrationMode>,
    pub max_retries: Option<u32>,
    pub timeout: Option<Duration>,
    pub max_concurrency: Option<usize>,
    /// Cancel the whole batch once this much time has passed.
    pub deadline: Option<Duration>,
    /// External cancellation.
    pub cancel: Option<CancellationToken>,
    /// Initial context; a fresh one is used when unset.
    pub context: Option<ExecutionContext>,
    pub events: Option<mpsc::Sender<CoordinatorEvent>>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: OrchestrationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn context(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn events(mut self, tx: mpsc::Sender<CoordinatorEvent>) -> Self {
        self.events = Some(tx);
        self
    }
}

/// Everything a finished run produced.
#[derive(Debug, Serialize)]
pub struct BatchRun {
    pub plan: ExecutionPlan,
    /// One per input task, in input order.
    pub results: Vec<ExecutionResult>,
    /// Input tasks with their final status.
    pub tasks: Vec<Task>,
    pub summary: BatchSummary,
    #[serde(skip)]
    pub context: ExecutionContext,
}

/// Plans and runs task batches.
#[derive(Clone)]
pub struct Conductor {
    router: Arc<AgentRouter>,
    registry: Arc<AgentRegistry>,
    executor: Arc<dyn AgentExecutor>,
    policy: RetryPolicy,
    timeout: Duration,
    max_concurrency: usize,
    mode: OrchestrationMode,
}

impl Conductor {
    /// A conductor with default routing, retry and execution settings.
    pub fn new(registry: AgentRegistry, executor: Arc<dyn AgentExecutor>) -> Result<Self> {
        Self::with_config(&Config::default(), registry, executor)
    }

    /// A conductor using `config` for routing, retries and execution.
    pub fn with_config(
        config: &Config,
        registry: AgentRegistry,
        executor: Arc<dyn AgentExecutor>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            router: Arc::new(AgentRouter::new(&config.routing)?),
            registry: Arc::new(registry),
            executor,
            policy: config.retry,
            timeout: config.execution.timeout(),
            max_concurrency: config.execution.max_concurrency,
            mode: config.execution.mode,
        })
    }

    /// Replace the routing tables.
    pub fn with_routing(mut self, routing: &RoutingConfig) -> Result<Self> {
        self.router = Arc::new(AgentRouter::new(routing)?);
        Ok(self)
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn router(&self) -> &AgentRouter {
        &self.router
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn default_mode(&self) -> OrchestrationMode {
        self.mode
    }

    /// Validate a batch and compute its parallel groups.
    pub fn plan(&self, tasks: &[Task]) -> Result<ExecutionPlan> {
        TaskGraphBuilder::new().plan(tasks)
    }

    /// Where a task would go, without running it.
    pub fn route(&self, task: &Task, mode: OrchestrationMode) -> RoutingDecision {
        self.router.route(task, &self.registry, mode)
    }

    /// Run a batch and return one result per task, in input order.
    ///
    /// Fails only for structural problems (invalid task, unknown dependency,
    /// cycle); task failures are reported in the results.
    pub async fn run_batch(
        &self,
        tasks: Vec<Task>,
        mode: OrchestrationMode,
        max_retries: u32,
        timeout_per_task: Duration,
    ) -> Result<Vec<ExecutionResult>> {
        let options = RunOptions::new()
            .mode(mode)
            .max_retries(max_retries)
            .timeout(timeout_per_task);
        Ok(self.run_batch_with(tasks, options).await?.results)
    }

    /// Run a batch with full control over the run.
    pub async fn run_batch_with(&self, mut tasks: Vec<Task>, options: RunOptions) -> Result<BatchRun> {
        let plan = self.plan(&tasks).inspect_err(|e| {
            error!(error = %e, "batch rejected");
        })?;

        let mut policy = self.policy;
        if let Some(max_retries) = options.max_retries {
            policy.max_retries = max_retries;
        }
        let mut coordinator = TaskCoordinator::new(
            Arc::clone(&self.router),
            Arc::clone(&self.registry),
            Arc::clone(&self.executor),
        )
        .with_policy(policy)
        .with_timeout(options.timeout.unwrap_or(self.timeout))
        .with_mode(options.mode.unwrap_or(self.mode))
        .with_max_concurrency(options.max_concurrency.unwrap_or(self.max_concurrency));
        if let Some(tx) = options.events {
            coordinator = coordinator.with_events(tx);
        }

        let cancel = options.cancel.unwrap_or_default().child_token();
        let deadline = options.deadline.map(|after| {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(after) => {
                        info!(deadline_ms = after.as_millis() as u64, "batch deadline reached, cancelling");
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        });

        let mut context = options.context.unwrap_or_default();
        let outcome = coordinator
            .execute(&plan, &mut tasks, &mut context, cancel)
            .await;
        if let Some(handle) = deadline {
            handle.abort();
        }
        let results = outcome?;

        let summary = BatchSummary::from_results(&results);
        Ok(BatchRun {
            plan,
            results,
            tasks,
            summary,
            context,
        })
    }
}
