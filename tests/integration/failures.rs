//! Failure handling integration tests.
//!
//! These tests verify retry bounds, the transient/permanent split,
//! timeouts, and that a failed task blocks everything downstream of it
//! without touching unrelated work.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use conductor::{
    AgentRegistry, Conductor, CoordinatorEvent, FailureKind, OrchestrationMode, RetryPolicy,
    RunOptions, Task, TaskStatus,
};

use crate::fixtures::{self, MockExecutor, Step};

fn transient(n: usize) -> Vec<Step> {
    (0..n).map(|i| Step::Transient(format!("connection reset #{}", i))).collect()
}

/// Test: Permanent failure blocks dependents
/// Given A <- B <- C where B fails permanently
/// When the batch runs
/// Then B is tried once and C never reaches the executor
#[tokio::test]
async fn test_permanent_failure_blocks_chain() {
    let executor = Arc::new(
        MockExecutor::new().script("B", vec![Step::Permanent("invalid request".to_string())]),
    );
    let conductor = fixtures::conductor(Arc::clone(&executor), 3);

    let run = conductor
        .run_batch_with(fixtures::chain(), RunOptions::new().mode(OrchestrationMode::Flat))
        .await
        .unwrap();

    let [a, b, c] = &run.results[..] else {
        panic!("expected three results");
    };
    assert!(a.is_success());
    assert_eq!(b.failure, Some(FailureKind::Permanent));
    assert_eq!(b.attempts, 1);
    assert_eq!(b.errors, vec!["invalid request".to_string()]);
    assert!(c.is_blocked());
    assert_eq!(c.attempts, 0);
    assert!(c.last_error().unwrap().contains('B'));

    assert_eq!(executor.attempts("B"), 1);
    assert!(!executor.was_called("C"));
    assert_eq!(run.summary.failed, 1);
    assert_eq!(run.summary.blocked, 1);

    assert!(matches!(run.tasks[1].status, TaskStatus::Failed { .. }));
    assert!(matches!(run.tasks[2].status, TaskStatus::Failed { .. }));
}

/// Test: Transitive blocking
/// Given a diamond whose root fails
/// When the batch runs
/// Then every other task is blocked by the root
#[tokio::test]
async fn test_failure_blocks_transitively() {
    let executor = Arc::new(
        MockExecutor::new().script("A", vec![Step::Permanent("bad schema".to_string())]),
    );
    let conductor = fixtures::conductor(Arc::clone(&executor), 3);

    let results = conductor
        .run_batch(fixtures::diamond(), OrchestrationMode::Flat, 3, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(results[0].failure, Some(FailureKind::Permanent));
    for result in &results[1..] {
        assert!(result.is_blocked(), "{} should be blocked", result.task_id);
        assert_eq!(result.last_error(), Some("blocked by dependency: A"));
    }
    assert_eq!(executor.calls().len(), 1);
}

/// Test: Unrelated work continues
/// Given a failing task next to an independent chain
/// When the batch runs
/// Then the independent chain still completes
#[tokio::test]
async fn test_failure_does_not_touch_unrelated_tasks() {
    let executor = Arc::new(
        MockExecutor::new().script("bad", vec![Step::Permanent("nope".to_string())]),
    );
    let conductor = fixtures::conductor(Arc::clone(&executor), 0);
    let tasks = vec![
        Task::new("bad", "x"),
        Task::new("after-bad", "y").with_dependencies(["bad"]),
        Task::new("x", "z"),
        Task::new("y", "w").with_dependencies(["x"]),
    ];

    let results = conductor
        .run_batch(tasks, OrchestrationMode::Flat, 0, Duration::from_secs(5))
        .await
        .unwrap();

    assert!(!results[0].is_success());
    assert!(results[1].is_blocked());
    assert!(results[2].is_success());
    assert!(results[3].is_success());
}

/// Test: Transient failures are retried
/// Given a task that fails transiently twice and then succeeds
/// When run with three retries
/// Then it succeeds on the third attempt and keeps both errors
#[tokio::test]
async fn test_transient_then_success() {
    let mut steps = transient(2);
    steps.push(Step::Succeed("finally".to_string()));
    let executor = Arc::new(MockExecutor::new().script("A", steps));
    let conductor = fixtures::conductor(Arc::clone(&executor), 3);

    let results = conductor
        .run_batch(vec![Task::new("A", "x")], OrchestrationMode::Flat, 3, Duration::from_secs(5))
        .await
        .unwrap();

    assert!(results[0].is_success());
    assert_eq!(results[0].output, "finally");
    assert_eq!(results[0].attempts, 3);
    assert_eq!(results[0].errors.len(), 2);
}

/// Test: Retry bound
/// Given a task that always fails transiently
/// When run with N retries
/// Then the executor is called exactly N + 1 times
#[tokio::test]
async fn test_retry_bound() {
    for max_retries in [0, 1, 4] {
        let executor = Arc::new(MockExecutor::new().script("A", transient(10)));
        let conductor = fixtures::conductor(Arc::clone(&executor), max_retries);

        let results = conductor
            .run_batch(
                vec![Task::new("A", "x")],
                OrchestrationMode::Flat,
                max_retries,
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(executor.attempts("A"), max_retries + 1);
        assert_eq!(results[0].attempts, max_retries + 1);
        assert_eq!(results[0].failure, Some(FailureKind::Transient));
        assert_eq!(results[0].errors.len() as u32, max_retries + 1);
    }
}

/// Test: Timeouts are retried
/// Given a task whose attempts never return
/// When run with a one-second timeout and two retries
/// Then three attempts time out and the task fails with a timeout
#[tokio::test(start_paused = true)]
async fn test_timeout_is_retried() {
    let executor = Arc::new(MockExecutor::new().script("A", vec![Step::Hang, Step::Hang, Step::Hang]));
    let conductor = fixtures::conductor(Arc::clone(&executor), 2);

    let results = conductor
        .run_batch(vec![Task::new("A", "x")], OrchestrationMode::Flat, 2, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(executor.attempts("A"), 3);
    assert_eq!(results[0].failure, Some(FailureKind::Timeout));
    assert!(results[0].last_error().unwrap().contains("timed out"));
}

/// Test: A timeout followed by success
/// Given a task that hangs once and then succeeds
/// When run with retries
/// Then the second attempt's output is the result
#[tokio::test(start_paused = true)]
async fn test_timeout_then_success() {
    let executor = Arc::new(
        MockExecutor::new().script("A", vec![Step::Hang, Step::Succeed("ok".to_string())]),
    );
    let conductor = fixtures::conductor(Arc::clone(&executor), 1);

    let results = conductor
        .run_batch(vec![Task::new("A", "x")], OrchestrationMode::Flat, 1, Duration::from_secs(2))
        .await
        .unwrap();

    assert!(results[0].is_success());
    assert_eq!(results[0].attempts, 2);
}

/// Test: Backoff waits between attempts
/// Given the default retry policy
/// When a task fails transiently once
/// Then the retry happens only after the base delay (minus jitter)
#[tokio::test(start_paused = true)]
async fn test_backoff_delays_retry() {
    let executor = Arc::new(MockExecutor::new().script("A", transient(1)));
    let conductor = Conductor::new(AgentRegistry::builtin(), executor.clone())
        .unwrap()
        .with_policy(RetryPolicy::default());

    let started = tokio::time::Instant::now();
    let results = conductor
        .run_batch(vec![Task::new("A", "x")], OrchestrationMode::Flat, 3, Duration::from_secs(5))
        .await
        .unwrap();

    assert!(results[0].is_success());
    assert!(started.elapsed() >= Duration::from_millis(400));
    assert!(started.elapsed() <= Duration::from_millis(600));
}

/// Test: Progress events
/// Given a chain whose middle task retries and then fails
/// When the batch runs with an event channel
/// Then retry, failure and blocked events are emitted and AllComplete is last
#[tokio::test]
async fn test_failure_events() {
    let executor = Arc::new(MockExecutor::new().script("B", transient(5)));
    let conductor = fixtures::conductor(Arc::clone(&executor), 1);
    let (tx, mut rx) = mpsc::channel(1024);

    conductor
        .run_batch_with(
            fixtures::chain(),
            RunOptions::new().mode(OrchestrationMode::Flat).events(tx),
        )
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(events.iter().any(|e| matches!(
        e,
        CoordinatorEvent::TaskRetrying { task_id, attempt: 2, .. } if task_id.as_str() == "B"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        CoordinatorEvent::TaskFailed { kind: FailureKind::Transient, .. }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        CoordinatorEvent::TaskBlocked { task_id, dependency }
            if task_id.as_str() == "C" && dependency.as_str() == "B"
    )));
    match events.last() {
        Some(CoordinatorEvent::AllComplete { summary }) => {
            assert_eq!(summary.succeeded, 1);
            assert_eq!(summary.failed, 1);
            assert_eq!(summary.blocked, 1);
        }
        other => panic!("expected AllComplete last, got {:?}", other),
    }
}
