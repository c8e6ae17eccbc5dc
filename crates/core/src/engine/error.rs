use crate::state::context::StateError;
use pdca_protocol::stage_models::Stage;
use thiserror::Error;

/// Contract violations detected before a run starts.
///
/// Failures that happen while a run executes are never returned as errors;
/// they end up in the run's error log and status instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("pipeline '{0}' has no stages")]
    EmptyPipeline(String),

    #[error("pipeline '{pipeline}' lists stage '{stage}' more than once")]
    DuplicateStage { pipeline: String, stage: Stage },

    #[error("pipeline '{pipeline}' lists stage '{stage}' after '{previous}'")]
    StagesOutOfOrder {
        pipeline: String,
        stage: Stage,
        previous: Stage,
    },

    #[error("pipeline '{pipeline}' reworks at '{stage}', which is not one of its stages")]
    ReworkStageMissing { pipeline: String, stage: Stage },

    #[error(
        "pipeline '{pipeline}' reworks at '{stage}', which does not come before quality stage '{quality_stage}'"
    )]
    ReworkNotBeforeQualityStage {
        pipeline: String,
        stage: Stage,
        quality_stage: Stage,
    },

    #[error("pipeline '{pipeline}' uses executor '{executor}', which is not registered")]
    UnknownExecutor { pipeline: String, executor: String },

    #[error("pipeline '{pipeline}' allows {value} iterations; the limit is {limit}")]
    MaxIterationsOutOfRange {
        pipeline: String,
        value: u32,
        limit: u32,
    },

    #[error(transparent)]
    State(#[from] StateError),
}
