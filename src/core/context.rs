//! Shared execution context threaded through a run.
//!
//! Tasks never write the context directly. Each group reads a
//! [`ContextSnapshot`] taken when the group starts; writes come back with the
//! task outputs and the coordinator merges them once the whole group is done.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::task::TaskId;

/// One completed task's contribution to the run history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub task_id: TaskId,
    pub agent_role: String,
    pub output: String,
}

/// Writes produced by one task, applied at the group boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextWrites {
    pub values: BTreeMap<String, Value>,
    pub history: Option<HistoryEntry>,
}

impl ContextWrites {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.history.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
struct ContextState {
    values: BTreeMap<String, Value>,
    history: Vec<HistoryEntry>,
}

/// Immutable view of the context handed to executors.
///
/// Cheap to clone; every task in a group shares the same snapshot.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    run_id: Uuid,
    state: Arc<ContextState>,
}

impl ContextSnapshot {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.values.get(key)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.state.values
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.state.history
    }

    /// Output recorded for an earlier task, if it ran in a previous group.
    pub fn output_of(&self, task_id: &TaskId) -> Option<&str> {
        self.state
            .history
            .iter()
            .rev()
            .find(|h| &h.task_id == task_id)
            .map(|h| h.output.as_str())
    }
}

/// Conversation and key/value state for one run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    run_id: Uuid,
    state: Arc<ContextState>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: Arc::new(ContextState::default()),
        }
    }

    /// Seed the context with initial values.
    pub fn with_values(values: BTreeMap<String, Value>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: Arc::new(ContextState {
                values,
                history: Vec::new(),
            }),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Take a consistent snapshot for the next group.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            run_id: self.run_id,
            state: Arc::clone(&self.state),
        }
    }

    /// Apply a group's buffered writes.
    ///
    /// Writes are applied in the order given, so for a shared key the last
    /// writer wins. History entries are appended in the same order.
    pub fn merge<I>(&mut self, writes: I)
    where
        I: IntoIterator<Item = ContextWrites>,
    {
        let state = Arc::make_mut(&mut self.state);
        for write in writes {
            state.values.extend(write.values);
            if let Some(entry) = write.history {
                state.history.push(entry);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.values.get(key)
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.state.history
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.state.values
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
