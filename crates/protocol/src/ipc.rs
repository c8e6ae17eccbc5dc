//! Progress reporting protocol.
//!
//! This module defines the events the orchestrator emits while a run
//! executes. Observers (a terminal front end, a web client, a test) receive
//! them over an asynchronous channel and never mutate the run themselves.
//!
//! Communication is one-way: a closed or lagging observer never affects the
//! run that produces the events.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::stage_models::Stage;
use crate::workflow_models::{FailureCategory, RunStatus};

/// Events sent from the orchestrator to progress observers.
///
/// Uses tagged enum serialization for TypeScript compatibility:
/// ```json
/// {
///   "type": "stepCompleted",
///   "payload": {
///     "run_id": "uuid-here",
///     "step_id": "step-2-build",
///     "stage": "build"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// A new run has been started.
    RunStarted {
        #[ts(type = "string")]
        run_id: Uuid,
        pipeline_name: String,
    },

    /// A run's status has changed.
    RunStatusUpdate {
        #[ts(type = "string")]
        run_id: Uuid,
        status: RunStatus,
        cursor: usize,
    },

    /// A step has been marked in progress.
    StepStarted {
        #[ts(type = "string")]
        run_id: Uuid,
        step_id: String,
        stage: Stage,
        iteration: u32,
    },

    /// A step produced a result.
    StepCompleted {
        #[ts(type = "string")]
        run_id: Uuid,
        step_id: String,
        stage: Stage,
    },

    /// A step failed.
    StepFailed {
        #[ts(type = "string")]
        run_id: Uuid,
        step_id: String,
        stage: Stage,
        category: FailureCategory,
        error: String,
    },

    /// An executor attempt failed and another one is scheduled.
    RetryScheduled {
        #[ts(type = "string")]
        run_id: Uuid,
        stage: Stage,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },

    /// A step is waiting for an approval decision.
    ApprovalRequested {
        #[ts(type = "string")]
        run_id: Uuid,
        step_id: String,
        message: String,
    },

    /// An approval decision has been made.
    ApprovalResolved {
        #[ts(type = "string")]
        run_id: Uuid,
        step_id: String,
        approved: bool,
    },

    /// A quality failure rewound the run for another iteration.
    IterationStarted {
        #[ts(type = "string")]
        run_id: Uuid,
        iteration: u32,
        rework_stage: Stage,
    },

    /// A run has produced new log output.
    RunLogChunk {
        #[ts(type = "string")]
        run_id: Uuid,
        content: String,
    },

    /// Every step of the run completed.
    RunCompleted {
        #[ts(type = "string")]
        run_id: Uuid,
    },

    /// The run ended without completing every step.
    RunFailed {
        #[ts(type = "string")]
        run_id: Uuid,
        /// Stage of the step the run stopped at, if any.
        stage: Option<Stage>,
        error: String,
    },
}

impl Event {
    /// The run this event belongs to.
    pub fn run_id(&self) -> Uuid {
        match self {
            Event::RunStarted { run_id, .. }
            | Event::RunStatusUpdate { run_id, .. }
            | Event::StepStarted { run_id, .. }
            | Event::StepCompleted { run_id, .. }
            | Event::StepFailed { run_id, .. }
            | Event::RetryScheduled { run_id, .. }
            | Event::ApprovalRequested { run_id, .. }
            | Event::ApprovalResolved { run_id, .. }
            | Event::IterationStarted { run_id, .. }
            | Event::RunLogChunk { run_id, .. }
            | Event::RunCompleted { run_id }
            | Event::RunFailed { run_id, .. } => *run_id,
        }
    }

    /// Whether this event ends a run's event stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::RunCompleted { .. } | Event::RunFailed { .. })
    }
}
