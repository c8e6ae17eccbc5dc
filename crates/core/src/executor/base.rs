//! Base TaskExecutor trait and supporting types.

use async_trait::async_trait;
use pdca_protocol::stage_models::Stage;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Everything an executor needs to perform one attempt of a stage.
#[derive(Debug, Clone)]
pub struct StageRequest {
    /// The run this request belongs to.
    pub run_id: Uuid,

    pub stage: Stage,

    pub step_id: String,

    /// The registry name the request was dispatched under.
    pub executor_name: String,

    /// Zero-based attempt index within the current retry sequence.
    pub attempt: u32,

    /// The per-attempt timeout the caller enforces.
    pub timeout: Duration,

    /// Serialized stage input (JSON).
    pub input: String,
}

impl StageRequest {
    /// Create a request for the first attempt with the default timeout.
    pub fn new(stage: Stage, input: String) -> Self {
        Self {
            run_id: Uuid::nil(),
            stage,
            step_id: format!("adhoc-{stage}"),
            executor_name: String::new(),
            attempt: 0,
            timeout: Duration::from_secs(120),
            input,
        }
    }

    pub fn with_run(mut self, run_id: Uuid, step_id: String) -> Self {
        self.run_id = run_id;
        self.step_id = step_id;
        self
    }

    pub fn with_executor_name(mut self, name: String) -> Self {
        self.executor_name = name;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Failures a task executor can report.
///
/// The variant names are the categories the failure classifier recognises;
/// `Execution` carries free text that is matched by name instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("MaxTurnsExceeded: {0}")]
    MaxTurnsExceeded(String),
    #[error("GuardrailViolation: {0}")]
    GuardrailViolation(String),
    #[error("ToolInvocationError: {0}")]
    ToolInvocation(String),
    #[error("Timeout: attempt did not settle within {0:?}")]
    Timeout(Duration),
    #[error("Cancelled: {0}")]
    Cancelled(String),
    #[error("Executor not available: {0}")]
    NotAvailable(String),
    #[error("Invalid executor output: {0}")]
    InvalidOutput(String),
    #[error("Execution failed: {0}")]
    Execution(String),
}

/// The seam between the orchestrator and whatever performs a stage.
///
/// Implementations must return promptly once `cancel` fires; the caller
/// enforces the per-attempt timeout and may drop the future at any time.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn check_availability(&self) -> bool;

    async fn execute(
        &self,
        request: &StageRequest,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value, ExecutorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoExecutor {
        available: bool,
    }

    #[async_trait]
    impl TaskExecutor for EchoExecutor {
        async fn check_availability(&self) -> bool {
            self.available
        }

        async fn execute(
            &self,
            request: &StageRequest,
            cancel: CancellationToken,
        ) -> Result<serde_json::Value, ExecutorError> {
            if !self.available {
                return Err(ExecutorError::NotAvailable("echo".to_string()));
            }
            if cancel.is_cancelled() {
                return Err(ExecutorError::Cancelled("before start".to_string()));
            }
            Ok(serde_json::json!({ "echo": request.input }))
        }
    }

    #[tokio::test]
    async fn test_executor_check_availability() {
        assert!(EchoExecutor { available: true }.check_availability().await);
        assert!(!EchoExecutor { available: false }.check_availability().await);
    }

    #[tokio::test]
    async fn test_executor_execute_success() {
        let executor = EchoExecutor { available: true };
        let request = StageRequest::new(Stage::Build, "hello".to_string());

        let output = executor
            .execute(&request, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output["echo"], "hello");
    }

    #[tokio::test]
    async fn test_executor_observes_cancellation() {
        let executor = EchoExecutor { available: true };
        let request = StageRequest::new(Stage::Build, "hello".to_string());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = executor.execute(&request, cancel).await;
        assert!(matches!(result, Err(ExecutorError::Cancelled(_))));
    }

    #[test]
    fn test_stage_request_builder() {
        let run_id = Uuid::new_v4();
        let request = StageRequest::new(Stage::Verify, "{}".to_string())
            .with_run(run_id, "step-3-verify".to_string())
            .with_executor_name("tester".to_string())
            .with_timeout(Duration::from_secs(5));

        assert_eq!(request.run_id, run_id);
        assert_eq!(request.step_id, "step-3-verify");
        assert_eq!(request.executor_name, "tester");
        assert_eq!(request.timeout, Duration::from_secs(5));
        assert_eq!(request.attempt, 0);
    }

    #[test]
    fn test_executor_error_display_names_category() {
        let error = ExecutorError::MaxTurnsExceeded("50 turns".to_string());
        assert_eq!(error.to_string(), "MaxTurnsExceeded: 50 turns");
    }
}
