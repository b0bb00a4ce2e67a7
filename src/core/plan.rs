//! Execution planning: validation and parallel-group derivation.
//!
//! The [`TaskGraphBuilder`] turns a batch of tasks into an [`ExecutionPlan`],
//! an ordered list of groups where each group only depends on earlier ones.
//! Batching (not sequencing) is the goal, so groups are maximal-width.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::core::dag::TaskDAG;
use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};

/// A batch of tasks that may run concurrently.
pub type ParallelGroup = Vec<TaskId>;

/// Ordered sequence of parallel groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    groups: Vec<ParallelGroup>,
}

impl ExecutionPlan {
    /// Wrap pre-computed groups without validation.
    ///
    /// The coordinator re-checks any plan it is handed, so a hand-built plan
    /// with unknown ids surfaces as a structural error at execution time.
    pub fn from_groups(groups: Vec<ParallelGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[ParallelGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of groups (the critical path length).
    pub fn depth(&self) -> usize {
        self.groups.len()
    }

    /// Size of the widest group.
    pub fn max_width(&self) -> usize {
        self.groups.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn task_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Index of the group holding `id`.
    pub fn group_of(&self, id: &TaskId) -> Option<usize> {
        self.groups.iter().position(|g| g.contains(id))
    }

    /// Iterate every task id in dispatch order.
    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.groups.iter().flatten()
    }
}

/// Builds execution plans from task batches.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskGraphBuilder;

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Validate a batch and compute its parallel groups.
    ///
    /// # Errors
    /// - `Validation` for an empty description, an out-of-range priority, a
    ///   duplicate id, or a dependency on an id outside the batch.
    /// - `Cycle` naming the tasks of a dependency cycle.
    ///
    /// No partial plan is ever returned.
    pub fn plan(&self, tasks: &[Task]) -> Result<ExecutionPlan> {
        let dag = self.build_dag(tasks)?;
        let levels = dag.levels()?;

        let position: HashMap<&TaskId, usize> =
            tasks.iter().enumerate().map(|(i, t)| (&t.id, i)).collect();
        let priority: HashMap<&TaskId, u8> = tasks.iter().map(|t| (&t.id, t.priority)).collect();

        let groups = levels
            .into_iter()
            .map(|mut group| {
                // Stable: equal priorities keep input order.
                group.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
                group.sort_by(|a, b| {
                    let pa = priority.get(a).copied().unwrap_or_default();
                    let pb = priority.get(b).copied().unwrap_or_default();
                    pb.cmp(&pa)
                });
                group
            })
            .collect();

        let plan = ExecutionPlan { groups };
        tracing::debug!(
            tasks = plan.task_count(),
            groups = plan.depth(),
            max_width = plan.max_width(),
            "execution plan built"
        );
        Ok(plan)
    }

    /// Validate a batch and load it into a [`TaskDAG`].
    pub fn build_dag(&self, tasks: &[Task]) -> Result<TaskDAG> {
        let mut ids = HashSet::new();
        for task in tasks {
            task.validate()?;
            if !ids.insert(&task.id) {
                return Err(Error::Validation(format!("duplicate task id {}", task.id)));
            }
        }

        for task in tasks {
            if let Some(missing) = task.dependencies.iter().find(|d| !ids.contains(d)) {
                return Err(Error::Validation(format!(
                    "task {} depends on unknown task {}",
                    task.id, missing
                )));
            }
        }

        let mut dag = TaskDAG::new();
        for task in tasks {
            dag.add_task(task.clone());
        }
        for task in tasks {
            for dep in &task.dependencies {
                dag.add_dependency(dep, &task.id)?;
            }
        }
        Ok(dag)
    }
}
