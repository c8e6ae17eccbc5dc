//! Runtime workflow state models.
//!
//! This module defines the records that make up a run's progress: step and
//! run statuses, the step record itself, the error log, pending approvals
//! and the per-execution audit trail.

use crate::stage_models::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

/// Lifecycle status of a single workflow step.
///
/// Transitions are strictly `Pending -> InProgress -> {Completed | Failed}`;
/// a rewind puts an already finished step back to `InProgress`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Lifecycle status of a whole run.
///
/// The status progresses through these states during normal execution:
/// Pending -> InProgress -> Completed
///
/// Special states:
/// - RequiresApproval: at least one approval is pending
/// - Failed: execution stopped before every step completed
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Run has been created but not started yet.
    Pending,

    /// Run is actively executing.
    InProgress,

    /// Run is suspended until every pending approval is resolved.
    RequiresApproval,

    /// Every step completed.
    Completed,

    /// Run stopped early or finished with incomplete steps.
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// Closed set of failure categories known to the failure classifier.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
pub enum FailureCategory {
    /// The executor ran out of turns or steps.
    MaxTurnsExceeded,
    /// The executor's output tripped a guardrail.
    GuardrailViolation,
    /// A tool invoked by the executor failed.
    ToolInvocationError,
    /// The attempt did not settle within its timeout.
    Timeout,
    /// The run was cancelled while the attempt was in flight.
    Cancelled,
    /// The named executor is missing or reports itself unavailable.
    ExecutorUnavailable,
    /// The executor produced output that could not be used.
    InvalidOutput,
    /// Every allowed attempt failed with a recoverable error.
    RetryExhausted,
    /// A human declined the step's approval request.
    ApprovalDeclined,
    /// The stage's own payload reported a quality failure that could not be reworked.
    QualityFailure,
    /// Anything not recognised.
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::MaxTurnsExceeded => "MaxTurnsExceeded",
            FailureCategory::GuardrailViolation => "GuardrailViolation",
            FailureCategory::ToolInvocationError => "ToolInvocationError",
            FailureCategory::Timeout => "Timeout",
            FailureCategory::Cancelled => "Cancelled",
            FailureCategory::ExecutorUnavailable => "ExecutorUnavailable",
            FailureCategory::InvalidOutput => "InvalidOutput",
            FailureCategory::RetryExhausted => "RetryExhausted",
            FailureCategory::ApprovalDeclined => "ApprovalDeclined",
            FailureCategory::QualityFailure => "QualityFailure",
            FailureCategory::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled occurrence of a stage within a run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct WorkflowStep {
    /// Unique within the run.
    pub id: String,

    pub stage: Stage,

    pub status: StepStatus,

    /// Name of the executor that performs this step.
    pub executor_name: String,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Opaque stage output, recorded only when the step completes.
    #[ts(type = "unknown")]
    pub result: Option<serde_json::Value>,

    pub error: Option<String>,

    pub requires_approval: bool,

    /// `Some(true)` once approved; `None` while no decision has been made.
    pub approved: Option<bool>,

    /// How many times the step has been started (rewinds re-run steps).
    pub executions: u32,
}

impl WorkflowStep {
    pub fn is_finished(&self) -> bool {
        matches!(self.status, StepStatus::Completed | StepStatus::Failed)
    }
}

/// One entry of a run's append-only error log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct ErrorEntry {
    pub stage: Stage,
    pub message: String,
    pub category: Option<FailureCategory>,
    pub timestamp: DateTime<Utc>,
}

/// An approval request that has not been resolved yet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct PendingApproval {
    pub step_id: String,
    pub message: String,
    #[ts(type = "unknown")]
    pub payload: serde_json::Value,
    pub requested_at: DateTime<Utc>,
}

/// Audit record of one execution of a step.
///
/// Rewinds re-run existing steps in place; this record keeps every
/// execution visible after the step's result has been overwritten.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct StageExecution {
    pub step_id: String,
    pub stage: Stage,
    /// Iteration count of the run when the execution started.
    pub iteration: u32,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
