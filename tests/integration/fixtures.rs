//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - A scripted mock executor with per-task outcomes and delays
//! - Predefined task sets
//! - Conductors wired to the mock

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use conductor::core::context::ContextSnapshot;
use conductor::{
    Agent, AgentExecutor, AgentOutput, AgentRegistry, Conductor, ExecutorError, RetryPolicy, Task,
    TaskId, Tier,
};

/// One scripted attempt outcome.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed(String),
    Transient(String),
    Permanent(String),
    /// Never returns on its own; only a timeout ends it.
    Hang,
}

/// What the executor saw when a task ran.
#[derive(Debug, Clone)]
pub struct Call {
    pub task_id: TaskId,
    pub agent_role: String,
    pub agent_tier: Tier,
    /// Context keys visible to the attempt.
    pub visible_keys: Vec<String>,
    /// Dependency outputs found in the snapshot history.
    pub visible_outputs: Vec<String>,
}

/// Executor whose behaviour is scripted per task.
///
/// Tasks without a script (or whose script ran out) succeed with
/// `done:<id>` and write their output under their own id.
#[derive(Default)]
pub struct MockExecutor {
    scripts: Mutex<HashMap<TaskId, VecDeque<Step>>>,
    delays: Mutex<HashMap<TaskId, Duration>>,
    attempts: Mutex<HashMap<TaskId, u32>>,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for a task, consumed one per attempt.
    pub fn script(self, id: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(TaskId::from(id), steps.into());
        self
    }

    /// Make every attempt of a task take `delay`.
    pub fn delay(self, id: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(TaskId::from(id), delay);
        self
    }

    pub fn attempts(&self, id: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(&TaskId::from(id))
            .copied()
            .unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_for(&self, id: &str) -> Option<Call> {
        self.calls()
            .into_iter()
            .rev()
            .find(|c| c.task_id.as_str() == id)
    }

    pub fn was_called(&self, id: &str) -> bool {
        self.attempts(id) > 0
    }

    /// Most attempts that were ever in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentExecutor for MockExecutor {
    async fn run(
        &self,
        task: &Task,
        agent: &Agent,
        context: &ContextSnapshot,
        _timeout: Duration,
    ) -> Result<AgentOutput, ExecutorError> {
        let (step, delay) = {
            *self
                .attempts
                .lock()
                .unwrap()
                .entry(task.id.clone())
                .or_insert(0) += 1;
            self.calls.lock().unwrap().push(Call {
                task_id: task.id.clone(),
                agent_role: agent.role.clone(),
                agent_tier: agent.tier,
                visible_keys: context.values().keys().cloned().collect(),
                visible_outputs: task
                    .dependencies
                    .iter()
                    .filter_map(|d| context.output_of(d).map(str::to_string))
                    .collect(),
            });
            let step = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&task.id)
                .and_then(|steps| steps.pop_front());
            let delay = self.delays.lock().unwrap().get(&task.id).copied();
            (step, delay)
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let outcome = match step {
            None => {
                let output = format!("done:{}", task.id);
                Ok(AgentOutput::new(output.clone()).with_context(task.id.as_str(), Value::from(output)))
            }
            Some(Step::Succeed(output)) => {
                Ok(AgentOutput::new(output.clone()).with_context(task.id.as_str(), Value::from(output)))
            }
            Some(Step::Transient(msg)) => Err(ExecutorError::transient(msg)),
            Some(Step::Permanent(msg)) => Err(ExecutorError::permanent(msg)),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(ExecutorError::permanent("hang ended"))
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// A conductor over the built-in roster with zero-delay retries.
pub fn conductor(executor: Arc<MockExecutor>, max_retries: u32) -> Conductor {
    Conductor::new(AgentRegistry::builtin(), executor)
        .expect("builtin conductor")
        .with_policy(RetryPolicy::immediate(max_retries))
}

/// research -> implement -> test
pub fn chain() -> Vec<Task> {
    vec![
        Task::new("A", "Research caching libraries"),
        Task::new("B", "Implement the cache layer").with_dependencies(["A"]),
        Task::new("C", "Write unit tests for the cache").with_dependencies(["B"]),
    ]
}

/// A fans out to B and C, which join into D.
pub fn diamond() -> Vec<Task> {
    vec![
        Task::new("A", "Design the data model"),
        Task::new("B", "Build the REST endpoint").with_dependencies(["A"]),
        Task::new("C", "Build the React form").with_dependencies(["A"]),
        Task::new("D", "Write integration tests").with_dependencies(["B", "C"]),
    ]
}

/// `n` tasks with no dependencies.
pub fn independent(n: usize) -> Vec<Task> {
    (0..n)
        .map(|i| Task::new(format!("t{}", i).as_str(), "Summarize the notes"))
        .collect()
}

pub fn ids(tasks: &[TaskId]) -> Vec<&str> {
    tasks.iter().map(|t| t.as_str()).collect()
}
