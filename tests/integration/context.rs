//! Shared context integration tests.
//!
//! Writes from one group become visible to the next group only; siblings
//! never see each other's writes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use conductor::{ExecutionContext, OrchestrationMode, RunOptions, Task};

use crate::fixtures::{self, MockExecutor, Step};

/// Test: Group isolation
/// Given X and Y in the same group and Z depending on both
/// When the batch runs
/// Then X and Y see neither write, and Z sees both
#[tokio::test]
async fn test_siblings_do_not_see_each_other() {
    let executor = Arc::new(MockExecutor::new());
    let conductor = fixtures::conductor(Arc::clone(&executor), 0);
    let tasks = vec![
        Task::new("X", "x"),
        Task::new("Y", "y"),
        Task::new("Z", "z").with_dependencies(["X", "Y"]),
    ];

    let run = conductor
        .run_batch_with(tasks, RunOptions::new().mode(OrchestrationMode::Flat))
        .await
        .unwrap();
    assert!(run.summary.all_succeeded());

    let x = executor.call_for("X").unwrap();
    let y = executor.call_for("Y").unwrap();
    let z = executor.call_for("Z").unwrap();
    assert!(x.visible_keys.is_empty());
    assert!(y.visible_keys.is_empty());
    assert_eq!(z.visible_keys, vec!["X".to_string(), "Y".to_string()]);
    assert_eq!(z.visible_outputs, vec!["done:X".to_string(), "done:Y".to_string()]);

    assert_eq!(run.context.get("Z"), Some(&json!("done:Z")));
    assert_eq!(run.context.history().len(), 3);
}

/// Test: Initial context
/// Given a run seeded with a value
/// When the batch runs
/// Then the first group already sees it and it survives the run
#[tokio::test]
async fn test_initial_context_is_visible() {
    let executor = Arc::new(MockExecutor::new());
    let conductor = fixtures::conductor(Arc::clone(&executor), 0);
    let mut seed = BTreeMap::new();
    seed.insert("repo".to_string(), json!("conductor"));

    let run = conductor
        .run_batch_with(
            fixtures::chain(),
            RunOptions::new().context(ExecutionContext::with_values(seed)),
        )
        .await
        .unwrap();

    let a = executor.call_for("A").unwrap();
    assert_eq!(a.visible_keys, vec!["repo".to_string()]);
    let c = executor.call_for("C").unwrap();
    assert_eq!(c.visible_keys, vec!["A", "B", "repo"]);
    assert_eq!(run.context.get("repo"), Some(&json!("conductor")));
}

/// Test: Failed tasks write nothing
/// Given a failing task and a succeeding sibling
/// When the batch runs
/// Then only the sibling's write lands in the context
#[tokio::test]
async fn test_failed_tasks_do_not_write() {
    let executor = Arc::new(
        MockExecutor::new().script("bad", vec![Step::Permanent("boom".to_string())]),
    );
    let conductor = fixtures::conductor(Arc::clone(&executor), 0);
    let tasks = vec![Task::new("bad", "x"), Task::new("good", "y")];

    let run = conductor
        .run_batch_with(tasks, RunOptions::new())
        .await
        .unwrap();

    assert!(run.context.get("bad").is_none());
    assert_eq!(run.context.get("good"), Some(&json!("done:good")));
    assert_eq!(run.context.history().len(), 1);
}

/// Test: Dependency outputs flow forward
/// Given a task depending on another with scripted output
/// When the batch runs
/// Then the dependent sees that output and both writes are kept
#[tokio::test]
async fn test_dependency_output_flows_forward() {
    let executor = Arc::new(
        MockExecutor::new()
            .script("first", vec![Step::Succeed("one".to_string())])
            .script("second", vec![Step::Succeed("two".to_string())]),
    );
    let conductor = fixtures::conductor(Arc::clone(&executor), 0);
    let tasks = vec![
        Task::new("first", "x"),
        Task::new("second", "y").with_dependencies(["first"]),
    ];

    let run = conductor
        .run_batch_with(tasks, RunOptions::new())
        .await
        .unwrap();

    let second = executor.call_for("second").unwrap();
    assert_eq!(second.visible_outputs, vec!["one".to_string()]);
    assert_eq!(run.context.get("first"), Some(&json!("one")));
    assert_eq!(run.context.get("second"), Some(&json!("two")));
}
