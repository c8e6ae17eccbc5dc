//! Retry controller with capped exponential backoff.
//!
//! Wraps a single task-executor call: enforces the per-attempt timeout,
//! classifies failures, retries the recoverable ones and reports every
//! outcome as a value. Nothing here panics or propagates with `?`; the
//! orchestrator's control flow stays linear.

use crate::executor::base::{ExecutorError, StageRequest, TaskExecutor};
use crate::failure::{classify, is_fatal};
use pdca_protocol::workflow_models::FailureCategory;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt (0 = no retries).
    pub max_retries: u32,

    /// Timeout for each individual attempt.
    pub attempt_timeout: Duration,

    /// Delay after the first failed attempt; doubles after each failure.
    pub initial_delay: Duration,

    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            attempt_timeout: Duration::from_secs(120),
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, attempt_timeout: Duration) -> Self {
        Self {
            max_retries,
            attempt_timeout,
            ..Default::default()
        }
    }

    /// Create a policy with no retries (fail fast).
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retrying after the failed attempt with index `attempt`
    /// (zero-based): `min(initial * 2^attempt, max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Terminal failure of a retried stage call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{category}: {message}")]
pub struct StageFailure {
    pub category: FailureCategory,
    /// The classifier's verdict for `category`.
    ///
    /// A fatal message (see [`is_fatal`]) keeps this flag as classified;
    /// the call is still not retried, and the orchestrator stops the run on
    /// the message itself.
    pub recoverable: bool,
    pub message: String,
    /// Attempts made before giving up.
    pub attempts: u32,
}

impl StageFailure {
    fn cancelled(attempts: u32) -> Self {
        Self {
            category: FailureCategory::Cancelled,
            recoverable: false,
            message: "run cancelled".to_string(),
            attempts,
        }
    }
}

/// A retry that is about to happen, reported before the backoff sleep.
#[derive(Debug, Clone)]
pub struct RetryNotice {
    /// Zero-based index of the attempt that failed.
    pub attempt: u32,
    pub delay: Duration,
    pub error: ExecutorError,
}

/// Result of a retried call.
#[derive(Debug)]
pub struct RetryOutcome {
    pub result: Result<serde_json::Value, StageFailure>,

    /// Number of times the executor was invoked.
    pub attempts: u32,

    /// Total time spent, including delays.
    pub total_time: Duration,
}

impl RetryOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<serde_json::Value, StageFailure> {
        self.result
    }
}

/// Invoke `executor` with bounded retries.
///
/// - A non-recoverable failure returns immediately. So does one whose
///   message is fatal, with its recoverable flag left as classified.
/// - A recoverable failure is retried after `delay_for_attempt` until
///   `max_retries` retries have been spent, then surfaces as
///   `RetryExhausted` carrying the last error.
/// - An attempt that does not settle within `attempt_timeout` counts as a
///   recoverable `Timeout` failure.
/// - Cancellation ends the call at once with `Cancelled`; it is never retried.
pub async fn run_with_retry<F>(
    executor: &dyn TaskExecutor,
    request: &StageRequest,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut on_retry: F,
) -> RetryOutcome
where
    F: FnMut(&RetryNotice),
{
    let start = Instant::now();
    let max_attempts = policy.max_retries.saturating_add(1);
    let mut attempt: u32 = 0;

    let finish = |result, attempts| RetryOutcome {
        result,
        attempts,
        total_time: start.elapsed(),
    };

    loop {
        if cancel.is_cancelled() {
            return finish(Err(StageFailure::cancelled(attempt)), attempt);
        }

        let mut attempt_request = request.clone();
        attempt_request.attempt = attempt;
        attempt_request.timeout = policy.attempt_timeout;
        let attempt_token = cancel.child_token();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExecutorError::Cancelled("run cancelled".to_string())),
            settled = tokio::time::timeout(
                policy.attempt_timeout,
                executor.execute(&attempt_request, attempt_token.clone()),
            ) => match settled {
                Ok(result) => result,
                Err(_) => {
                    attempt_token.cancel();
                    Err(ExecutorError::Timeout(policy.attempt_timeout))
                }
            },
        };
        let attempts = attempt + 1;

        let error = match result {
            Ok(output) => return finish(Ok(output), attempts),
            Err(error) => error,
        };

        let classification = classify(&error);
        let message = error.to_string();
        if !classification.recoverable || is_fatal(&message) {
            tracing::debug!(
                stage = %request.stage,
                category = %classification.category,
                "non-recoverable or fatal executor failure, not retrying"
            );
            let failure = StageFailure {
                category: classification.category,
                recoverable: classification.recoverable,
                message,
                attempts,
            };
            return finish(Err(failure), attempts);
        }

        if attempts >= max_attempts {
            let failure = StageFailure {
                category: FailureCategory::RetryExhausted,
                recoverable: true,
                message: format!("{attempts} attempt(s) failed; last error: {error}"),
                attempts,
            };
            return finish(Err(failure), attempts);
        }

        let delay = policy.delay_for_attempt(attempt);
        tracing::warn!(
            stage = %request.stage,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "recoverable executor failure, retrying"
        );
        on_retry(&RetryNotice {
            attempt,
            delay,
            error,
        });

        tokio::select! {
            _ = cancel.cancelled() => {
                return finish(Err(StageFailure::cancelled(attempts)), attempts);
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}
