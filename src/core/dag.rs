//! Task DAG (Directed Acyclic Graph) for dependency management.
//!
//! This module provides the TaskDAG structure that represents task dependencies
//! as a directed graph, enabling parallel execution of independent tasks.
//! Edges point from a dependency to the task that depends on it.

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

/// DFS marking used by cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Not visited yet.
    White,
    /// On the current DFS path.
    Gray,
    /// Fully explored.
    Black,
}

/// The task dependency graph.
///
/// TaskDAG uses petgraph's DiGraph to represent task dependencies.
/// Nodes are tasks in insertion order; an edge `a -> b` means `b` depends on `a`.
pub struct TaskDAG {
    /// The underlying directed graph.
    graph: DiGraph<Task, ()>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    task_index: HashMap<TaskId, NodeIndex>,
}

impl TaskDAG {
    /// Create a new empty TaskDAG.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: HashMap::new(),
        }
    }

    /// Add a task to the DAG.
    ///
    /// Returns the NodeIndex for the added task.
    /// If the task already exists (same TaskId), returns the existing NodeIndex.
    pub fn add_task(&mut self, task: Task) -> NodeIndex {
        if let Some(&index) = self.task_index.get(&task.id) {
            return index;
        }

        let id = task.id.clone();
        let index = self.graph.add_node(task);
        self.task_index.insert(id, index);
        index
    }

    /// Add a dependency between two tasks.
    ///
    /// The dependency indicates that `from` must complete before `to` can start.
    /// Cycles are not rejected here; use [`TaskDAG::find_cycle`] once the graph
    /// is fully built so the whole cycle can be reported.
    ///
    /// # Errors
    /// Returns a validation error if either task is not in the DAG.
    pub fn add_dependency(&mut self, from: &TaskId, to: &TaskId) -> Result<()> {
        let from_index = self
            .task_index
            .get(from)
            .ok_or_else(|| Error::Validation(format!("Task {} not found in DAG", from)))?;

        let to_index = self
            .task_index
            .get(to)
            .ok_or_else(|| Error::Validation(format!("Task {} not found in DAG", to)))?;

        if self.graph.find_edge(*from_index, *to_index).is_none() {
            self.graph.add_edge(*from_index, *to_index, ());
        }
        Ok(())
    }

    /// Get the number of tasks in the DAG.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependencies (edges) in the DAG.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Neighbors in insertion order. petgraph yields them newest-first.
    fn sorted_neighbors(&self, index: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self.graph.neighbors_directed(index, direction).collect();
        out.sort();
        out
    }

    /// Every task that transitively depends on `id`, in insertion order.
    pub fn transitive_dependents(&self, id: &TaskId) -> Vec<TaskId> {
        let Some(&start) = self.task_index.get(id) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(index) = queue.pop_front() {
            for next in self.sorted_neighbors(index, Direction::Outgoing) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        let mut found: Vec<NodeIndex> = seen.into_iter().collect();
        found.sort();
        found
            .into_iter()
            .filter_map(|i| self.graph.node_weight(i).map(|t| t.id.clone()))
            .collect()
    }

    /// Check if the DAG is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Find a dependency cycle, if any.
    ///
    /// Depth-first search with white/gray/black marking. Roots and neighbors
    /// are visited in insertion order so the reported cycle is deterministic.
    /// The returned ids follow dependency edges, starting at the task the
    /// back-edge points to.
    pub fn find_cycle(&self) -> Option<Vec<TaskId>> {
        let mut color = vec![Color::White; self.graph.node_count()];

        for root in self.graph.node_indices() {
            if color[root.index()] != Color::White {
                continue;
            }

            // Explicit stack of (node, next neighbor position) so deep chains
            // cannot overflow the call stack.
            let mut path: Vec<NodeIndex> = vec![root];
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> =
                vec![(root, self.sorted_neighbors(root, Direction::Outgoing), 0)];
            color[root.index()] = Color::Gray;

            while let Some((node, neighbors, pos)) = stack.last_mut() {
                if *pos >= neighbors.len() {
                    color[node.index()] = Color::Black;
                    stack.pop();
                    path.pop();
                    continue;
                }

                let next = neighbors[*pos];
                *pos += 1;

                match color[next.index()] {
                    Color::White => {
                        color[next.index()] = Color::Gray;
                        path.push(next);
                        let next_neighbors = self.sorted_neighbors(next, Direction::Outgoing);
                        stack.push((next, next_neighbors, 0));
                    }
                    Color::Gray => {
                        let start = path.iter().position(|&n| n == next).unwrap_or(0);
                        return Some(
                            path[start..]
                                .iter()
                                .filter_map(|&n| self.graph.node_weight(n).map(|t| t.id.clone()))
                                .collect(),
                        );
                    }
                    Color::Black => {}
                }
            }
        }

        None
    }

    /// Partition the tasks into dependency levels.
    ///
    /// Level 0 holds every task without dependencies; level `k` holds every
    /// remaining task whose dependencies all sit in levels `0..k`. Within a
    /// level tasks keep insertion order.
    ///
    /// # Errors
    /// Returns `Error::Cycle` if the graph is cyclic.
    pub fn levels(&self) -> Result<Vec<Vec<TaskId>>> {
        if let Some(tasks) = self.find_cycle() {
            return Err(Error::Cycle { tasks });
        }

        let mut remaining: Vec<usize> = self
            .graph
            .node_indices()
            .map(|i| self.graph.neighbors_directed(i, Direction::Incoming).count())
            .collect();

        let mut frontier: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|i| remaining[i.index()] == 0)
            .collect();

        let mut levels = Vec::new();
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for &index in &frontier {
                for dependent in self.graph.neighbors_directed(index, Direction::Outgoing) {
                    remaining[dependent.index()] -= 1;
                    if remaining[dependent.index()] == 0 {
                        next.push(dependent);
                    }
                }
            }
            next.sort();

            levels.push(
                frontier
                    .iter()
                    .filter_map(|&i| self.graph.node_weight(i).map(|t| t.id.clone()))
                    .collect(),
            );
            frontier = next;
        }

        Ok(levels)
    }
}

impl Default for TaskDAG {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskDAG {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDAG")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
