//! Planning and dispatch integration tests.
//!
//! These tests verify that batches are split into the right parallel
//! groups, that groups run in order, and that results come back in input
//! order no matter how tasks finish.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use conductor::{Error, OrchestrationMode, RunOptions, Task, TaskGraphBuilder, TaskId};

use crate::fixtures::{self, MockExecutor};

/// Test: Linear chain
/// Given A <- B <- C
/// When the batch runs
/// Then three single-task groups run in order and all succeed
#[tokio::test]
async fn test_chain_runs_in_dependency_order() {
    let executor = Arc::new(MockExecutor::new());
    let conductor = fixtures::conductor(Arc::clone(&executor), 3);

    let run = conductor
        .run_batch_with(fixtures::chain(), RunOptions::new().mode(OrchestrationMode::Flat))
        .await
        .unwrap();

    let groups: Vec<Vec<&str>> = run.plan.groups().iter().map(|g| fixtures::ids(g)).collect();
    assert_eq!(groups, vec![vec!["A"], vec!["B"], vec!["C"]]);

    let order: Vec<String> = executor.calls().iter().map(|c| c.task_id.to_string()).collect();
    assert_eq!(order, vec!["A", "B", "C"]);

    assert!(run.summary.all_succeeded());
    assert_eq!(run.results[2].output, "done:C");
    assert_eq!(run.summary.attempts, 3);
}

/// Test: Diamond
/// Given A fanning out to B and C, joined by D
/// When planned
/// Then B and C share the middle group
#[test]
fn test_diamond_groups() {
    let plan = TaskGraphBuilder::new().plan(&fixtures::diamond()).unwrap();
    assert_eq!(plan.depth(), 3);
    assert_eq!(plan.max_width(), 2);
    assert_eq!(plan.group_of(&TaskId::from("B")), Some(1));
    assert_eq!(plan.group_of(&TaskId::from("C")), Some(1));
    assert_eq!(plan.group_of(&TaskId::from("D")), Some(2));
}

/// Test: Priority within a group
/// Given independent tasks of different priorities
/// When planned
/// Then higher priorities come first and equal priorities keep input order
#[test]
fn test_priority_orders_group() {
    let tasks = vec![
        Task::new("low", "x").with_priority(1),
        Task::new("high", "x").with_priority(5),
        Task::new("mid-1", "x"),
        Task::new("mid-2", "x"),
    ];
    let plan = TaskGraphBuilder::new().plan(&tasks).unwrap();
    assert_eq!(
        fixtures::ids(&plan.groups()[0]),
        vec!["high", "mid-1", "mid-2", "low"]
    );
}

/// Test: Result order invariance
/// Given independent tasks that finish in reverse order
/// When the batch runs
/// Then results are still in input order
#[tokio::test(start_paused = true)]
async fn test_results_follow_input_order() {
    let executor = Arc::new(
        MockExecutor::new()
            .delay("t0", Duration::from_millis(300))
            .delay("t1", Duration::from_millis(200))
            .delay("t2", Duration::from_millis(100)),
    );
    let conductor = fixtures::conductor(Arc::clone(&executor), 0);

    let results = conductor
        .run_batch(fixtures::independent(4), OrchestrationMode::Flat, 0, Duration::from_secs(5))
        .await
        .unwrap();

    let ids: Vec<&str> = results.iter().map(|r| r.task_id.as_str()).collect();
    assert_eq!(ids, vec!["t0", "t1", "t2", "t3"]);
    assert!(results.iter().all(|r| r.is_success()));
}

/// Test: Concurrency bound
/// Given eight slow independent tasks and a limit of two
/// When the batch runs
/// Then no more than two attempts are ever in flight
#[tokio::test(start_paused = true)]
async fn test_max_concurrency_is_respected() {
    let mut executor = MockExecutor::new();
    for i in 0..8 {
        executor = executor.delay(&format!("t{}", i), Duration::from_millis(50));
    }
    let executor = Arc::new(executor);
    let conductor = fixtures::conductor(Arc::clone(&executor), 0);

    let run = conductor
        .run_batch_with(
            fixtures::independent(8),
            RunOptions::new()
                .mode(OrchestrationMode::Flat)
                .max_concurrency(2),
        )
        .await
        .unwrap();

    assert!(run.summary.all_succeeded());
    assert!(executor.peak_concurrency() <= 2);
    assert!(executor.peak_concurrency() >= 1);
}

/// Test: Structural errors
/// Given a cycle or an unknown dependency
/// When the batch runs
/// Then it is rejected before any task reaches the executor
#[tokio::test]
async fn test_structural_errors_run_nothing() {
    let executor = Arc::new(MockExecutor::new());
    let conductor = fixtures::conductor(Arc::clone(&executor), 3);

    let cycle = vec![
        Task::new("A", "x").with_dependencies(["C"]),
        Task::new("B", "y").with_dependencies(["A"]),
        Task::new("C", "z").with_dependencies(["B"]),
    ];
    let err = conductor
        .run_batch(cycle, OrchestrationMode::Flat, 3, Duration::from_secs(1))
        .await
        .unwrap_err();
    match &err {
        Error::Cycle { tasks } => assert_eq!(tasks.len(), 3),
        other => panic!("expected cycle, got {:?}", other),
    }
    assert!(err.is_structural());

    let dangling = vec![Task::new("A", "x").with_dependencies(["ghost"])];
    let err = conductor
        .run_batch(dangling, OrchestrationMode::Flat, 3, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(err.is_structural());
    assert!(err.to_string().contains("ghost"));

    assert!(executor.calls().is_empty());
}

/// Test: Empty batch
/// Given no tasks
/// When the batch runs
/// Then the plan and results are empty
#[tokio::test]
async fn test_empty_batch() {
    let executor = Arc::new(MockExecutor::new());
    let run = fixtures::conductor(executor, 3)
        .run_batch_with(Vec::new(), RunOptions::new())
        .await
        .unwrap();
    assert!(run.plan.is_empty());
    assert!(run.results.is_empty());
    assert_eq!(run.summary.total, 0);
}

fn random_batch(rng: &mut StdRng, size: usize) -> Vec<Task> {
    (0..size)
        .map(|i| {
            let deps: Vec<String> = (0..i)
                .filter(|_| rng.gen_bool(0.3))
                .map(|j| format!("n{}", j))
                .collect();
            Task::new(format!("n{}", i).as_str(), "Summarize the notes")
                .with_priority(rng.gen_range(1..=5))
                .with_dependencies(deps)
        })
        .collect()
}

/// Test: Group validity on random DAGs
/// Given seeded random acyclic batches
/// When planned
/// Then every task appears once, after all of its dependencies, and in the
/// earliest group its dependencies allow
#[test]
fn test_random_dags_produce_valid_groups() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..50 {
        let size = rng.gen_range(1..30);
        let tasks = random_batch(&mut rng, size);
        let plan = TaskGraphBuilder::new().plan(&tasks).unwrap();

        assert_eq!(plan.task_count(), tasks.len());
        let group_of: HashMap<&TaskId, usize> = tasks
            .iter()
            .map(|t| (&t.id, plan.group_of(&t.id).expect("task planned")))
            .collect();

        for task in &tasks {
            let group = group_of[&task.id];
            let deepest_dep = task.dependencies.iter().map(|d| group_of[d]).max();
            match deepest_dep {
                None => assert_eq!(group, 0, "{} has no dependencies", task.id),
                Some(dep_group) => assert_eq!(group, dep_group + 1, "{} is not earliest", task.id),
            }
        }

        for group in plan.groups() {
            let priorities: Vec<u8> = group
                .iter()
                .map(|id| tasks.iter().find(|t| &t.id == id).map(|t| t.priority).unwrap_or(0))
                .collect();
            assert!(priorities.windows(2).all(|w| w[0] >= w[1]));
        }
    }
}

/// Test: Execution respects dependencies on random DAGs
/// Given a seeded random batch
/// When it runs
/// Then every task reaches the executor after all of its dependencies
#[tokio::test]
async fn test_random_dag_execution_order() {
    let mut rng = StdRng::seed_from_u64(42);
    let tasks = random_batch(&mut rng, 20);
    let executor = Arc::new(MockExecutor::new());
    let conductor = fixtures::conductor(Arc::clone(&executor), 0);

    let results = conductor
        .run_batch(tasks.clone(), OrchestrationMode::Flat, 0, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.is_success()));

    let position: HashMap<TaskId, usize> = executor
        .calls()
        .iter()
        .enumerate()
        .map(|(i, c)| (c.task_id.clone(), i))
        .collect();
    for task in &tasks {
        for dep in &task.dependencies {
            assert!(position[dep] < position[&task.id], "{} ran before {}", task.id, dep);
        }
    }
}
