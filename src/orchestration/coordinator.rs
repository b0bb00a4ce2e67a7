//! Task coordinator: drives an execution plan to completion.
//!
//! Groups run strictly one after another. Inside a group every task is
//! spawned onto the runtime and bounded by a semaphore, so at most
//! `max_concurrency` attempts are in flight. Each task is routed to an agent,
//! run through the [`AgentExecutor`] with a per-attempt timeout, and retried
//! with exponential backoff while failures stay transient.
//!
//! Context writes are buffered per task and merged once the group is done,
//! so siblings never see each other's writes. When a task finally fails,
//! every transitive dependent is short-circuited without ever reaching the
//! executor.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::agent::AgentRegistry;
use crate::core::context::{ContextSnapshot, ContextWrites, ExecutionContext, HistoryEntry};
use crate::core::plan::{ExecutionPlan, TaskGraphBuilder};
use crate::core::result::{BatchSummary, ExecutionResult, FailureKind};
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::orchestration::executor::AgentExecutor;
use crate::orchestration::retry::RetryPolicy;
use crate::routing::{AgentRouter, OrchestrationMode, RoutingDecision};

/// Default per-attempt timeout (10 minutes).
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 600;

/// Default number of attempts in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Events emitted by the coordinator as a run progresses.
///
/// These let a caller (the CLI, a dashboard) follow the run without polling.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// A parallel group is about to dispatch.
    GroupStarted {
        /// Zero-based group index.
        index: usize,
        /// Tasks that will actually run; blocked tasks are left out.
        tasks: Vec<TaskId>,
    },
    /// Every task of a group has finished and its writes are merged.
    GroupCompleted { index: usize },
    /// A task was assigned an agent.
    TaskRouted {
        task_id: TaskId,
        decision: RoutingDecision,
    },
    /// An attempt started.
    TaskStarted {
        task_id: TaskId,
        agent_role: String,
        /// 1-based attempt number.
        attempt: u32,
    },
    /// An attempt failed transiently and another is scheduled.
    TaskRetrying {
        task_id: TaskId,
        /// The attempt that will run next.
        attempt: u32,
        delay: Duration,
        error: String,
    },
    TaskSucceeded { task_id: TaskId, attempts: u32 },
    TaskFailed {
        task_id: TaskId,
        kind: FailureKind,
        error: String,
    },
    /// A task was skipped because a dependency failed.
    TaskBlocked { task_id: TaskId, dependency: TaskId },
    TaskCancelled { task_id: TaskId },
    /// The run is over.
    AllComplete { summary: BatchSummary },
}

/// What one spawned task hands back to the coordinator.
#[derive(Debug)]
struct TaskOutcome {
    position: usize,
    status: TaskStatus,
    result: ExecutionResult,
    writes: ContextWrites,
}

/// Executes plans against an agent registry and executor.
///
/// Cloning is cheap; all shared state sits behind `Arc`.
#[derive(Clone)]
pub struct TaskCoordinator {
    router: Arc<AgentRouter>,
    registry: Arc<AgentRegistry>,
    executor: Arc<dyn AgentExecutor>,
    policy: RetryPolicy,
    timeout: Duration,
    mode: OrchestrationMode,
    max_concurrency: usize,
    event_tx: Option<mpsc::Sender<CoordinatorEvent>>,
}

impl TaskCoordinator {
    pub fn new(
        router: Arc<AgentRouter>,
        registry: Arc<AgentRegistry>,
        executor: Arc<dyn AgentExecutor>,
    ) -> Self {
        Self {
            router,
            registry,
            executor,
            policy: RetryPolicy::default(),
            timeout: Duration::from_secs(DEFAULT_TASK_TIMEOUT_SECS),
            mode: OrchestrationMode::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            event_tx: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_mode(mut self, mode: OrchestrationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Bound concurrent attempts. Zero is treated as one.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Emit [`CoordinatorEvent`]s on `tx`. The receiver must keep draining,
    /// or the run stalls once the channel is full.
    pub fn with_events(mut self, tx: mpsc::Sender<CoordinatorEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn mode(&self) -> OrchestrationMode {
        self.mode
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Run `plan` over `tasks`.
    ///
    /// Returns one result per task, in the order of `tasks`, and leaves each
    /// task's final status in place. Task failures never surface as `Err`;
    /// only a plan that does not match the batch does.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        tasks: &mut [Task],
        context: &mut ExecutionContext,
        cancel: CancellationToken,
    ) -> Result<Vec<ExecutionResult>> {
        let position = check_plan(plan, tasks)?;
        let dag = TaskGraphBuilder::new().build_dag(tasks)?;

        for task in tasks.iter_mut() {
            task.status = TaskStatus::Pending;
        }
        let mut results: Vec<Option<ExecutionResult>> = vec![None; tasks.len()];
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        info!(
            run_id = %context.run_id(),
            tasks = tasks.len(),
            groups = plan.depth(),
            mode = %self.mode,
            "starting run"
        );

        for (index, group) in plan.groups().iter().enumerate() {
            if cancel.is_cancelled() {
                info!(group = index, "run cancelled, skipping remaining groups");
                break;
            }

            let runnable: Vec<usize> = group
                .iter()
                .filter_map(|id| position.get(id).copied())
                .filter(|&pos| results[pos].is_none())
                .collect();
            if runnable.is_empty() {
                continue;
            }

            self.emit(CoordinatorEvent::GroupStarted {
                index,
                tasks: runnable.iter().map(|&pos| tasks[pos].id.clone()).collect(),
            })
            .await;
            debug!(group = index, width = runnable.len(), "dispatching group");

            let snapshot = context.snapshot();
            let mut set = JoinSet::new();
            let mut spawned: HashMap<tokio::task::Id, usize> = HashMap::with_capacity(runnable.len());
            for &pos in &runnable {
                let task = &mut tasks[pos];
                task.mark_ready();
                let this = self.clone();
                let task = task.clone();
                let snapshot = snapshot.clone();
                let cancel = cancel.clone();
                let semaphore = Arc::clone(&semaphore);
                let handle =
                    set.spawn(async move { this.run_task(pos, task, snapshot, cancel, semaphore).await });
                spawned.insert(handle.id(), pos);
            }

            // Completion order drives both the merge and the short-circuit.
            let mut writes = Vec::with_capacity(runnable.len());
            while let Some(joined) = set.join_next_with_id().await {
                let outcome = match joined {
                    Ok((_, outcome)) => outcome,
                    Err(err) => {
                        let Some(&pos) = spawned.get(&err.id()) else {
                            return Err(Error::TaskJoin(err.to_string()));
                        };
                        self.crashed(pos, &tasks[pos], err).await
                    }
                };
                let failed_id = match outcome.result.failure {
                    Some(kind) if kind.was_attempted() => Some(outcome.result.task_id.clone()),
                    _ => None,
                };

                tasks[outcome.position].status = outcome.status;
                results[outcome.position] = Some(outcome.result);
                writes.push(outcome.writes);

                if let Some(failed) = failed_id {
                    for dependent in dag.transitive_dependents(&failed) {
                        let Some(&pos) = position.get(&dependent) else {
                            continue;
                        };
                        if results[pos].is_some() {
                            continue;
                        }
                        let blocked = ExecutionResult::blocked(dependent.clone(), &failed);
                        tasks[pos].fail(blocked.last_error().unwrap_or_default());
                        results[pos] = Some(blocked);
                        debug!(task = %dependent, dependency = %failed, "task blocked");
                        self.emit(CoordinatorEvent::TaskBlocked {
                            task_id: dependent,
                            dependency: failed.clone(),
                        })
                        .await;
                    }
                }
            }

            context.merge(writes.into_iter().filter(|w| !w.is_empty()));
            self.emit(CoordinatorEvent::GroupCompleted { index }).await;
        }

        // Anything still without a result never got to run.
        for (pos, slot) in results.iter_mut().enumerate() {
            if slot.is_none() {
                let task = &mut tasks[pos];
                task.fail("cancelled");
                *slot = Some(ExecutionResult::cancelled(task.id.clone()));
                self.emit(CoordinatorEvent::TaskCancelled {
                    task_id: task.id.clone(),
                })
                .await;
            }
        }

        let results: Vec<ExecutionResult> = results.into_iter().flatten().collect();
        let summary = BatchSummary::from_results(&results);
        info!(run_id = %context.run_id(), %summary, "run complete");
        self.emit(CoordinatorEvent::AllComplete { summary }).await;
        Ok(results)
    }

    /// Route one task and run attempts until success, a permanent failure,
    /// exhausted retries or cancellation.
    async fn run_task(
        self,
        position: usize,
        mut task: Task,
        snapshot: ContextSnapshot,
        cancel: CancellationToken,
        semaphore: Arc<Semaphore>,
    ) -> TaskOutcome {
        let _permit = tokio::select! {
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return self.cancelled(position, task, 0, Vec::new()).await,
            },
            _ = cancel.cancelled() => {
                return self.cancelled(position, task, 0, Vec::new()).await;
            }
        };
        if cancel.is_cancelled() {
            return self.cancelled(position, task, 0, Vec::new()).await;
        }

        let decision = self.router.route(&task, &self.registry, self.mode);
        let agent = self
            .registry
            .find(&decision.agent_role, decision.tier)
            .unwrap_or_else(|| self.registry.default_agent());
        self.emit(CoordinatorEvent::TaskRouted {
            task_id: task.id.clone(),
            decision: decision.clone(),
        })
        .await;

        let started_at = Utc::now();
        let mut errors: Vec<String> = Vec::new();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            task.start();
            self.emit(CoordinatorEvent::TaskStarted {
                task_id: task.id.clone(),
                agent_role: agent.role.clone(),
                attempt: attempts,
            })
            .await;
            debug!(task = %task.id, agent = %agent.role, attempt = attempts, "attempt started");

            let attempt = tokio::time::timeout(
                self.timeout,
                self.executor.run(&task, agent, &snapshot, self.timeout),
            )
            .await;

            let (kind, message) = match attempt {
                Ok(Ok(output)) => {
                    task.succeed();
                    debug!(task = %task.id, attempts, "task succeeded");
                    self.emit(CoordinatorEvent::TaskSucceeded {
                        task_id: task.id.clone(),
                        attempts,
                    })
                    .await;

                    let mut result = ExecutionResult::success(task.id.clone(), output.output.clone());
                    result.metadata = output.metadata;
                    result.errors = errors;
                    let result = finish(result, &decision, attempts, started_at);
                    let writes = ContextWrites {
                        values: output.context_updates,
                        history: Some(HistoryEntry {
                            task_id: task.id.clone(),
                            agent_role: agent.role.clone(),
                            output: output.output,
                        }),
                    };
                    return TaskOutcome {
                        position,
                        status: task.status,
                        result,
                        writes,
                    };
                }
                Ok(Err(err)) if err.is_transient() => (FailureKind::Transient, err.message().to_string()),
                Ok(Err(err)) => (FailureKind::Permanent, err.message().to_string()),
                Err(_) => (
                    FailureKind::Timeout,
                    format!("attempt timed out after {:?}", self.timeout),
                ),
            };
            errors.push(message.clone());

            let retryable = kind != FailureKind::Permanent;
            if !retryable || !self.policy.should_retry(attempts) {
                warn!(task = %task.id, attempts, kind = %kind, error = %message, "task failed");
                task.fail(&message);
                self.emit(CoordinatorEvent::TaskFailed {
                    task_id: task.id.clone(),
                    kind,
                    error: message.clone(),
                })
                .await;

                let mut result = ExecutionResult::failure(task.id.clone(), kind, message);
                result.errors = errors;
                return TaskOutcome {
                    position,
                    status: task.status,
                    result: finish(result, &decision, attempts, started_at),
                    writes: ContextWrites::default(),
                };
            }

            if cancel.is_cancelled() {
                return self.cancelled(position, task, attempts, errors).await;
            }

            let delay = self.policy.delay_for(attempts - 1);
            task.retry(attempts + 1);
            warn!(
                task = %task.id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "attempt failed, retrying"
            );
            self.emit(CoordinatorEvent::TaskRetrying {
                task_id: task.id.clone(),
                attempt: attempts + 1,
                delay,
                error: message,
            })
            .await;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return self.cancelled(position, task, attempts, errors).await;
                }
            }
        }
    }

    async fn cancelled(
        &self,
        position: usize,
        mut task: Task,
        attempts: u32,
        errors: Vec<String>,
    ) -> TaskOutcome {
        task.fail("cancelled");
        debug!(task = %task.id, attempts, "task cancelled");
        self.emit(CoordinatorEvent::TaskCancelled {
            task_id: task.id.clone(),
        })
        .await;

        let mut result = ExecutionResult::cancelled(task.id.clone());
        result.attempts = attempts;
        if !errors.is_empty() {
            let mut all = errors;
            all.append(&mut result.errors);
            result.errors = all;
        }
        TaskOutcome {
            position,
            status: task.status,
            result,
            writes: ContextWrites::default(),
        }
    }

    /// Outcome for a task whose future panicked or was aborted. Siblings keep
    /// running and dependents are blocked as for any permanent failure.
    async fn crashed(&self, position: usize, task: &Task, err: JoinError) -> TaskOutcome {
        let mut task = task.clone();
        if err.is_cancelled() {
            return self.cancelled(position, task, 0, Vec::new()).await;
        }

        let message = format!("executor panicked: {}", panic_message(err));
        warn!(task = %task.id, error = %message, "task panicked");
        task.fail(&message);
        self.emit(CoordinatorEvent::TaskFailed {
            task_id: task.id.clone(),
            kind: FailureKind::Permanent,
            error: message.clone(),
        })
        .await;

        let mut result = ExecutionResult::failure(task.id.clone(), FailureKind::Permanent, message);
        result.attempts = 1;
        TaskOutcome {
            position,
            status: task.status,
            result,
            writes: ContextWrites::default(),
        }
    }

    async fn emit(&self, event: CoordinatorEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}

/// Best-effort text of a panic payload.
fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => match payload.downcast::<String>() {
            Ok(text) => *text,
            Err(payload) => payload
                .downcast_ref::<&str>()
                .map(|text| text.to_string())
                .unwrap_or_else(|| "non-string panic payload".to_string()),
        },
        Err(err) => err.to_string(),
    }
}

/// Stamp routing details and timing onto a finished attempt's result.
fn finish(
    mut result: ExecutionResult,
    decision: &RoutingDecision,
    attempts: u32,
    started_at: chrono::DateTime<Utc>,
) -> ExecutionResult {
    result.attempts = attempts;
    result.agent_role = Some(decision.agent_role.clone());
    result.started_at = Some(started_at);
    result.finished_at = Some(Utc::now());
    result
        .with_metadata("routing_reason", decision.reason.clone())
        .with_metadata("tier", decision.tier.level())
}

/// Check that `plan` covers `tasks` exactly once and map ids to positions.
fn check_plan(plan: &ExecutionPlan, tasks: &[Task]) -> Result<HashMap<TaskId, usize>> {
    let mut position = HashMap::with_capacity(tasks.len());
    for (pos, task) in tasks.iter().enumerate() {
        if position.insert(task.id.clone(), pos).is_some() {
            return Err(Error::Validation(format!("duplicate task id {}", task.id)));
        }
    }

    let mut seen = HashSet::with_capacity(tasks.len());
    for id in plan.task_ids() {
        if !position.contains_key(id) {
            return Err(Error::UnknownTask(id.clone()));
        }
        if !seen.insert(id) {
            return Err(Error::Validation(format!("task {} appears twice in the plan", id)));
        }
    }
    if let Some(missing) = tasks.iter().find(|t| !seen.contains(&t.id)) {
        return Err(Error::Validation(format!(
            "task {} is missing from the plan",
            missing.id
        )));
    }
    Ok(position)
}
