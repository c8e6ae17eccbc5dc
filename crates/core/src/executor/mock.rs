//! Scripted executor for tests and dry runs.

use crate::executor::base::{ExecutorError, StageRequest, TaskExecutor};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Outcome = Result<serde_json::Value, ExecutorError>;

/// An executor that replays a queue of outcomes.
///
/// Once the queue is drained every further call returns the fallback
/// outcome. Clones share the queue, the call counter and the recorded
/// inputs, so a test can keep a handle after handing a clone to a registry.
#[derive(Clone)]
pub struct MockExecutor {
    available: bool,
    script: Arc<Mutex<VecDeque<Outcome>>>,
    fallback: Outcome,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    inputs: Arc<Mutex<Vec<String>>>,
}

impl MockExecutor {
    pub fn new(available: bool, script: Vec<Outcome>) -> Self {
        Self {
            available,
            script: Arc::new(Mutex::new(script.into())),
            fallback: Ok(serde_json::json!({ "status": "ok" })),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always succeeds with `{"status": "ok"}`.
    pub fn success() -> Self {
        Self::new(true, Vec::new())
    }

    /// Always succeeds with the given payload.
    pub fn returning(output: serde_json::Value) -> Self {
        Self::success().with_fallback(Ok(output))
    }

    /// Always fails with the given error.
    pub fn failing(error: ExecutorError) -> Self {
        Self::success().with_fallback(Err(error))
    }

    pub fn unavailable() -> Self {
        Self::new(false, Vec::new())
    }

    pub fn with_fallback(mut self, fallback: Outcome) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sleep before settling each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times `execute` has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every input received so far, in call order.
    pub fn inputs(&self) -> Vec<String> {
        self.inputs
            .lock()
            .map(|inputs| inputs.clone())
            .unwrap_or_default()
    }

    fn next_outcome(&self) -> Outcome {
        match self.script.lock() {
            Ok(mut script) => script.pop_front().unwrap_or_else(|| self.fallback.clone()),
            Err(_) => self.fallback.clone(),
        }
    }
}

#[async_trait]
impl TaskExecutor for MockExecutor {
    async fn check_availability(&self) -> bool {
        self.available
    }

    async fn execute(
        &self,
        request: &StageRequest,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value, ExecutorError> {
        if !self.available {
            return Err(ExecutorError::NotAvailable(
                "Mock executor not available".to_string(),
            ));
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut inputs) = self.inputs.lock() {
            inputs.push(request.input.clone());
        }

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ExecutorError::Cancelled("mock executor cancelled".to_string()));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.next_outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdca_protocol::stage_models::Stage;

    fn request() -> StageRequest {
        StageRequest::new(Stage::Build, "{}".to_string())
    }

    #[tokio::test]
    async fn test_mock_executor_success() {
        let executor = MockExecutor::success();
        assert!(executor.check_availability().await);

        let output = executor
            .execute(&request(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output["status"], "ok");
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_executor_unavailable() {
        let executor = MockExecutor::unavailable();
        assert!(!executor.check_availability().await);

        let result = executor.execute(&request(), CancellationToken::new()).await;
        assert!(matches!(result, Err(ExecutorError::NotAvailable(_))));
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_mock_executor_replays_script_then_fallback() {
        let executor = MockExecutor::new(
            true,
            vec![
                Err(ExecutorError::ToolInvocation("grep crashed".to_string())),
                Ok(serde_json::json!({ "n": 1 })),
            ],
        );
        let handle = executor.clone();

        let first = executor.execute(&request(), CancellationToken::new()).await;
        let second = executor.execute(&request(), CancellationToken::new()).await;
        let third = executor.execute(&request(), CancellationToken::new()).await;

        assert!(matches!(first, Err(ExecutorError::ToolInvocation(_))));
        assert_eq!(second.unwrap()["n"], 1);
        assert_eq!(third.unwrap()["status"], "ok");
        assert_eq!(handle.calls(), 3);
        assert_eq!(handle.inputs().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_executor_delay_is_cancellable() {
        let executor = MockExecutor::success().with_delay(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = executor.execute(&request(), cancel).await;
        assert!(matches!(result, Err(ExecutorError::Cancelled(_))));
    }
}
