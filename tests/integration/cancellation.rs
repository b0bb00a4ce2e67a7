//! Cancellation and deadline integration tests.
//!
//! In-flight attempts are allowed to finish; once the token fires no new
//! attempt, retry or group starts and everything left over is reported as
//! cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use conductor::{
    AgentRegistry, Conductor, FailureKind, OrchestrationMode, RetryPolicy, RunOptions, TaskStatus,
};

use crate::fixtures::{self, MockExecutor, Step};

/// Test: Cancelled before start
/// Given a token that is already cancelled
/// When the batch runs
/// Then every task is cancelled and the executor is never called
#[tokio::test]
async fn test_cancelled_before_start() {
    let executor = Arc::new(MockExecutor::new());
    let conductor = fixtures::conductor(Arc::clone(&executor), 3);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let run = conductor
        .run_batch_with(fixtures::diamond(), RunOptions::new().cancel(cancel))
        .await
        .unwrap();

    assert!(run.results.iter().all(|r| r.is_cancelled()));
    assert_eq!(run.summary.cancelled, 4);
    assert!(executor.calls().is_empty());
    assert!(run
        .tasks
        .iter()
        .all(|t| matches!(t.status, TaskStatus::Failed { .. })));
}

/// Test: Deadline
/// Given a chain whose first task takes two seconds
/// When the batch has a one-second deadline
/// Then the first task finishes and the rest are cancelled
#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_remaining_groups() {
    let executor = Arc::new(MockExecutor::new().delay("A", Duration::from_secs(2)));
    let conductor = fixtures::conductor(Arc::clone(&executor), 3);

    let run = conductor
        .run_batch_with(
            fixtures::chain(),
            RunOptions::new()
                .mode(OrchestrationMode::Flat)
                .deadline(Duration::from_secs(1)),
        )
        .await
        .unwrap();

    assert!(run.results[0].is_success());
    assert!(run.results[1].is_cancelled());
    assert!(run.results[2].is_cancelled());
    assert!(!executor.was_called("B"));
    assert_eq!(run.summary.succeeded, 1);
    assert_eq!(run.summary.cancelled, 2);
}

/// Test: Deadline not reached
/// Given a fast batch and a generous deadline
/// When the batch runs
/// Then nothing is cancelled
#[tokio::test(start_paused = true)]
async fn test_deadline_not_reached() {
    let executor = Arc::new(MockExecutor::new());
    let run = fixtures::conductor(executor, 3)
        .run_batch_with(
            fixtures::diamond(),
            RunOptions::new().deadline(Duration::from_secs(60)),
        )
        .await
        .unwrap();
    assert!(run.summary.all_succeeded());
}

/// Test: Cancellation during backoff
/// Given a task waiting out a retry delay
/// When the run is cancelled
/// Then no further attempt is made and the earlier error is kept
#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_backoff() {
    let executor = Arc::new(
        MockExecutor::new().script("A", vec![Step::Transient("rate limit".to_string())]),
    );
    let conductor = Conductor::new(AgentRegistry::builtin(), executor.clone())
        .unwrap()
        .with_policy(RetryPolicy {
            max_retries: 3,
            base_delay_ms: 10_000,
            max_delay_ms: 10_000,
            jitter: 0.0,
        });

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let run = conductor
        .run_batch_with(fixtures::chain(), RunOptions::new().cancel(cancel))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(executor.attempts("A"), 1);

    let a = &run.results[0];
    assert_eq!(a.failure, Some(FailureKind::Cancelled));
    assert_eq!(a.attempts, 1);
    assert_eq!(a.errors.first().map(String::as_str), Some("rate limit"));
    assert!(run.results[1..].iter().all(|r| r.is_cancelled()));
}

/// Test: In-flight siblings finish
/// Given two slow siblings and one fast one
/// When the run is cancelled while they are in flight
/// Then all three still complete
#[tokio::test(start_paused = true)]
async fn test_in_flight_attempts_finish() {
    let executor = Arc::new(
        MockExecutor::new()
            .delay("t0", Duration::from_secs(5))
            .delay("t1", Duration::from_secs(5)),
    );
    let conductor = fixtures::conductor(Arc::clone(&executor), 0);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let run = conductor
        .run_batch_with(fixtures::independent(3), RunOptions::new().cancel(cancel))
        .await
        .unwrap();

    assert!(run.summary.all_succeeded());
}
