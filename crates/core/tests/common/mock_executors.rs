//! Scripted executors and approval handlers for deterministic testing.

use async_trait::async_trait;
use pdca_core::approval::{ApprovalHandler, ApprovalRequest};
use pdca_core::executor::{ExecutorError, MockExecutor};
use pdca_core::state::context::ProjectContext;
use pdca_protocol::workflow_models::{RunStatus, StepStatus};
use serde_json::json;
use std::sync::Mutex;

/// A verification executor reporting `failed` counts in order, then zero.
#[allow(dead_code)]
pub fn verifier_reporting(failed_counts: &[u64]) -> MockExecutor {
    let script = failed_counts
        .iter()
        .map(|failed| Ok(json!({ "failed": failed, "passed": 10 })))
        .collect();
    MockExecutor::new(true, script).with_fallback(Ok(json!({ "failed": 0, "passed": 10 })))
}

/// Fails `times` times with a transient tool error, then succeeds.
#[allow(dead_code)]
pub fn flaky_executor(times: usize) -> MockExecutor {
    let script = (0..times)
        .map(|_| Err(ExecutorError::ToolInvocation("tool crashed".to_string())))
        .collect();
    MockExecutor::new(true, script)
}

/// What the approval handler saw while the run was suspended.
#[derive(Debug, Clone)]
pub struct ApprovalObservation {
    pub step_id: String,
    pub run_status: RunStatus,
    pub step_status: Option<StepStatus>,
    pub pending: usize,
}

/// Records every request it decides and answers with a fixed value.
#[allow(dead_code)]
pub struct RecordingApproval {
    answer: bool,
    seen: Mutex<Vec<ApprovalObservation>>,
}

#[allow(dead_code)]
impl RecordingApproval {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn observations(&self) -> Vec<ApprovalObservation> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApprovalHandler for RecordingApproval {
    async fn decide(&self, request: &ApprovalRequest, snapshot: &ProjectContext) -> bool {
        self.seen.lock().unwrap().push(ApprovalObservation {
            step_id: request.step_id.clone(),
            run_status: snapshot.status,
            step_status: snapshot.step(&request.step_id).map(|step| step.status),
            pending: snapshot.pending_approvals.len(),
        });
        self.answer
    }
}

/// An approval handler that never answers.
#[allow(dead_code)]
pub struct UnansweredApproval;

#[async_trait]
impl ApprovalHandler for UnansweredApproval {
    async fn decide(&self, _request: &ApprovalRequest, _snapshot: &ProjectContext) -> bool {
        std::future::pending::<bool>().await
    }
}
