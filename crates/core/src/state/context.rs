//! Project state for a single pipeline run.
//!
//! `ProjectContext` is plain data plus the mutation operations the
//! orchestrator drives it through. It enforces its own structural
//! invariants (cursor bounds, approval/status coupling, monotonic
//! `updated_at`) but makes no control decisions: whether to keep
//! iterating is the orchestrator's call.

use chrono::{DateTime, Utc};
use pdca_protocol::stage_models::{Stage, StageSpec};
use pdca_protocol::workflow_models::{
    ErrorEntry, FailureCategory, PendingApproval, RunStatus, StageExecution, StepStatus,
    WorkflowStep,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Default rework budget for contexts created without one.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("step id '{0}' already exists in this run")]
    DuplicateStepId(String),
}

/// The aggregate record of one pipeline execution.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectContext {
    pub id: Uuid,

    pub pipeline_name: String,

    /// The request that started the run. Never modified.
    pub original_request: String,

    pub status: RunStatus,

    pub steps: Vec<WorkflowStep>,

    /// Index of the current step; `0 <= cursor <= steps.len()`.
    pub cursor: usize,

    /// Latest opaque output per stage.
    pub results: BTreeMap<Stage, serde_json::Value>,

    /// Append-only, chronological.
    pub errors: Vec<ErrorEntry>,

    pub iteration_count: u32,

    pub max_iterations: u32,

    /// Free-form accumulation lists keyed by artifact kind.
    pub artifacts: BTreeMap<String, Vec<serde_json::Value>>,

    pub pending_approvals: Vec<PendingApproval>,

    /// One record per step execution, including re-runs after a rewind.
    pub history: Vec<StageExecution>,

    /// Human-readable progress log.
    pub logs: Vec<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ProjectContext {
    /// Create a fresh run in `Pending` status with no steps.
    pub fn create(original_request: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            pipeline_name: String::new(),
            original_request: original_request.into(),
            status: RunStatus::Pending,
            steps: Vec::new(),
            cursor: 0,
            results: BTreeMap::new(),
            errors: Vec::new(),
            iteration_count: 0,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            artifacts: BTreeMap::new(),
            pending_approvals: Vec::new(),
            history: Vec::new(),
            logs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = name.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Bump `updated_at`, never moving it backwards.
    fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Append a pending step for `spec` with a generated id.
    pub fn add_step(&mut self, spec: &StageSpec) -> Result<String, StateError> {
        let id = format!("step-{}-{}", self.steps.len() + 1, spec.stage);
        self.add_step_with_id(id, spec)
    }

    /// Append a pending step with a caller-chosen id.
    pub fn add_step_with_id(
        &mut self,
        id: impl Into<String>,
        spec: &StageSpec,
    ) -> Result<String, StateError> {
        let id = id.into();
        if self.step(&id).is_some() {
            return Err(StateError::DuplicateStepId(id));
        }

        self.steps.push(WorkflowStep {
            id: id.clone(),
            stage: spec.stage,
            status: StepStatus::Pending,
            executor_name: spec.executor_name.clone(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            requires_approval: spec.requires_approval,
            approved: None,
            executions: 0,
        });
        self.touch();
        Ok(id)
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|step| step.id == step_id)
    }

    /// The step under the cursor, or `None` once the cursor is past the end.
    pub fn current_step(&self) -> Option<&WorkflowStep> {
        self.steps.get(self.cursor)
    }

    pub fn has_more_steps(&self) -> bool {
        self.cursor < self.steps.len()
    }

    /// Set a step's status.
    ///
    /// - `InProgress` stamps `started_at`, clears the previous error and
    ///   opens a new history record.
    /// - `Completed` stamps `completed_at` and records `result`; this is
    ///   the only place a step's result is written.
    /// - `Failed` stamps `completed_at` and records `error`.
    ///
    /// An unknown `step_id` is logged and ignored. Returns whether the
    /// step was found.
    pub fn update_step_status(
        &mut self,
        step_id: &str,
        status: StepStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> bool {
        let iteration = self.iteration_count;
        let now = Utc::now();

        let Some(step) = self.steps.iter_mut().find(|step| step.id == step_id) else {
            tracing::warn!(run_id = %self.id, step_id, ?status, "status update for unknown step ignored");
            return false;
        };

        step.status = status;
        match status {
            StepStatus::Pending => {}
            StepStatus::InProgress => {
                step.started_at = Some(now);
                step.completed_at = None;
                step.error = None;
                step.executions += 1;
                self.history.push(StageExecution {
                    step_id: step.id.clone(),
                    stage: step.stage,
                    iteration,
                    status,
                    started_at: now,
                    completed_at: None,
                });
            }
            StepStatus::Completed | StepStatus::Failed => {
                step.completed_at = Some(now);
                if status == StepStatus::Completed {
                    if let Some(result) = result {
                        step.result = Some(result);
                    }
                }
                if error.is_some() {
                    step.error = error;
                }
                if let Some(record) = self
                    .history
                    .iter_mut()
                    .rev()
                    .find(|record| record.step_id == step_id)
                {
                    record.status = status;
                    record.completed_at = Some(now);
                }
            }
        }

        self.touch();
        true
    }

    /// Store the latest output of `stage`.
    pub fn store_result(&mut self, stage: Stage, result: serde_json::Value) {
        self.results.insert(stage, result);
        self.touch();
    }

    pub fn result(&self, stage: Stage) -> Option<&serde_json::Value> {
        self.results.get(&stage)
    }

    /// Move the cursor forward one step unless it is already on the last
    /// step. Returns whether it moved.
    pub fn advance_cursor(&mut self) -> bool {
        if self.cursor + 1 < self.steps.len() {
            self.cursor += 1;
            self.touch();
            true
        } else {
            false
        }
    }

    /// Point the cursor at the first step for `stage`.
    ///
    /// Returns the new cursor, or `None` (cursor unchanged) if the run has
    /// no step for `stage`.
    pub fn rewind_cursor_to(&mut self, stage: Stage) -> Option<usize> {
        let index = self.steps.iter().position(|step| step.stage == stage)?;
        self.cursor = index;
        self.touch();
        Some(index)
    }

    /// Append to the error log. Does not change `status`.
    pub fn record_error(
        &mut self,
        stage: Stage,
        message: impl Into<String>,
        category: Option<FailureCategory>,
    ) {
        self.errors.push(ErrorEntry {
            stage,
            message: message.into(),
            category,
            timestamp: Utc::now(),
        });
        self.touch();
    }

    /// Returns the new iteration count.
    pub fn increment_iteration(&mut self) -> u32 {
        self.iteration_count += 1;
        self.touch();
        self.iteration_count
    }

    pub fn iteration_budget_remaining(&self) -> bool {
        self.iteration_count < self.max_iterations
    }

    /// Suspend on `step_id` until [`resolve_approval`](Self::resolve_approval).
    pub fn request_approval(
        &mut self,
        step_id: impl Into<String>,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) {
        self.pending_approvals.push(PendingApproval {
            step_id: step_id.into(),
            message: message.into(),
            payload,
            requested_at: Utc::now(),
        });
        self.status = RunStatus::RequiresApproval;
        self.touch();
    }

    /// Record the decision for `step_id` and drop its pending entry.
    ///
    /// Returns to `InProgress` once nothing is pending. Returns whether a
    /// pending approval was found.
    pub fn resolve_approval(&mut self, step_id: &str, approved: bool) -> bool {
        let before = self.pending_approvals.len();
        self.pending_approvals
            .retain(|pending| pending.step_id != step_id);
        let found = self.pending_approvals.len() != before;

        if let Some(step) = self.steps.iter_mut().find(|step| step.id == step_id) {
            step.approved = Some(approved);
        }

        if self.pending_approvals.is_empty() && self.status == RunStatus::RequiresApproval {
            self.status = RunStatus::InProgress;
        }

        self.touch();
        found
    }

    pub fn set_status(&mut self, status: RunStatus) {
        self.status = status;
        self.touch();
    }

    pub fn add_artifact(&mut self, kind: impl Into<String>, value: serde_json::Value) {
        self.artifacts.entry(kind.into()).or_default().push(value);
        self.touch();
    }

    /// Append every entry of a stage output's `artifacts` object.
    ///
    /// `{"artifacts": {"files": ["a.rs", "b.rs"]}}` appends two values to
    /// the `files` list; a non-array value is appended as a single entry.
    pub fn absorb_artifacts(&mut self, output: &serde_json::Value) -> usize {
        let Some(artifacts) = output.get("artifacts").and_then(|a| a.as_object()) else {
            return 0;
        };

        let mut added = 0;
        for (kind, values) in artifacts {
            match values {
                serde_json::Value::Array(items) => {
                    for item in items {
                        self.add_artifact(kind.clone(), item.clone());
                        added += 1;
                    }
                }
                other => {
                    self.add_artifact(kind.clone(), other.clone());
                    added += 1;
                }
            }
        }
        added
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(message.into());
        self.touch();
    }

    pub fn all_steps_completed(&self) -> bool {
        !self.steps.is_empty()
            && self
                .steps
                .iter()
                .all(|step| step.status == StepStatus::Completed)
    }

    /// How many times `stage` has been executed in this run.
    pub fn executions_of(&self, stage: Stage) -> usize {
        self.history
            .iter()
            .filter(|record| record.stage == stage)
            .count()
    }

    /// A read-only copy for observers.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}
