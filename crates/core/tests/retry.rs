//! Retry controller properties over scripted executors.

mod common;

use common::*;
use pdca_core::executor::{ExecutorError, MockExecutor, StageRequest};
use pdca_core::retry::{run_with_retry, RetryPolicy};
use pdca_protocol::stage_models::Stage;
use pdca_protocol::workflow_models::FailureCategory;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn request() -> StageRequest {
    StageRequest::new(Stage::Verify, r#"{"original_request":"x"}"#.to_string())
}

#[tokio::test(start_paused = true)]
async fn test_fewer_transient_failures_than_retries_succeed() {
    let max_retries = 3;
    for k in 0..max_retries {
        let executor = flaky_executor(k as usize);
        let policy = RetryPolicy::new(max_retries, Duration::from_secs(120));

        let outcome = run_with_retry(
            &executor,
            &request(),
            &policy,
            &CancellationToken::new(),
            |_| {},
        )
        .await;

        assert!(outcome.is_ok(), "k = {k}");
        assert_eq!(outcome.attempts, k + 1, "k = {k}");
        assert_eq!(executor.calls(), (k + 1) as usize, "k = {k}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_transient_failures_exhaust_retries() {
    for max_retries in [0, 1, 2, 4] {
        let executor = flaky_executor(100);
        let policy = RetryPolicy::new(max_retries, Duration::from_secs(120));
        let mut retries = 0;

        let outcome = run_with_retry(
            &executor,
            &request(),
            &policy,
            &CancellationToken::new(),
            |_| retries += 1,
        )
        .await;

        let failure = outcome.into_result().unwrap_err();
        assert_eq!(failure.category, FailureCategory::RetryExhausted);
        assert!(failure.recoverable);
        assert_eq!(executor.calls(), (max_retries + 1) as usize);
        assert_eq!(retries, max_retries);
    }
}

#[tokio::test(start_paused = true)]
async fn test_non_recoverable_failures_are_never_retried() {
    let errors = [
        ExecutorError::MaxTurnsExceeded("turn budget".to_string()),
        ExecutorError::NotAvailable("binary missing".to_string()),
        ExecutorError::Execution("EACCES: permission denied".to_string()),
    ];

    for error in errors {
        let executor = MockExecutor::failing(error.clone());

        let outcome = run_with_retry(
            &executor,
            &request(),
            &RetryPolicy::new(5, Duration::from_secs(120)),
            &CancellationToken::new(),
            |_| panic!("no retry expected for {error}"),
        )
        .await;

        assert!(!outcome.is_ok());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(executor.calls(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_backoff_schedule_is_capped() {
    let executor = flaky_executor(100);
    let policy = RetryPolicy::new(5, Duration::from_secs(120));
    let mut delays = Vec::new();

    let outcome = run_with_retry(
        &executor,
        &request(),
        &policy,
        &CancellationToken::new(),
        |notice| delays.push(notice.delay.as_millis()),
    )
    .await;

    assert_eq!(delays, vec![1000, 2000, 4000, 5000, 5000]);
    assert!(outcome.total_time >= Duration::from_millis(17_000));
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_attempts_are_retried() {
    let executor = MockExecutor::success().with_delay(Duration::from_secs(300));
    let policy = RetryPolicy::new(1, Duration::from_secs(10));

    let outcome = run_with_retry(
        &executor,
        &request(),
        &policy,
        &CancellationToken::new(),
        |notice| assert!(matches!(notice.error, ExecutorError::Timeout(_))),
    )
    .await;

    let failure = outcome.into_result().unwrap_err();
    assert_eq!(failure.category, FailureCategory::RetryExhausted);
    assert!(failure.message.contains("Timeout"));
    assert_eq!(executor.calls(), 2);
}
