//! Pipeline definition models for `.pdca/pipelines/*.yaml`.
//!
//! This module defines the fixed set of pipeline stages and the structure
//! of pipeline definition files that schedule them.

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

/// A phase of the pipeline.
///
/// The set is fixed and totally ordered: the declaration order below is the
/// stage order used when assembling stage inputs.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TS,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Capture and normalize the incoming request.
    Intake,
    /// Gather background material.
    Research,
    /// Produce an architecture or plan.
    Design,
    /// Implement the plan.
    Build,
    /// Run checks against the build output.
    Verify,
    /// Review the verified output.
    Review,
    /// Prepare a release.
    Release,
    /// Publish the release.
    Publish,
}

impl Stage {
    /// Every stage, in stage order.
    pub const ALL: [Stage; 8] = [
        Stage::Intake,
        Stage::Research,
        Stage::Design,
        Stage::Build,
        Stage::Verify,
        Stage::Review,
        Stage::Release,
        Stage::Publish,
    ];

    /// The identifier used in configuration files and stage inputs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::Research => "research",
            Stage::Design => "design",
            Stage::Build => "build",
            Stage::Verify => "verify",
            Stage::Review => "review",
            Stage::Release => "release",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled stage in a pipeline definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case")]
pub struct StageSpec {
    /// The stage this entry schedules.
    pub stage: Stage,

    /// Name of the task executor that performs the stage.
    ///
    /// Must match the `name` of an executor defined in
    /// `.pdca/executors/*.md` (or one registered programmatically).
    #[serde(rename = "executor")]
    pub executor_name: String,

    /// Whether the stage result must be approved before the run moves on.
    #[serde(default)]
    pub requires_approval: bool,
}

impl StageSpec {
    pub fn new(stage: Stage, executor_name: impl Into<String>) -> Self {
        Self {
            stage,
            executor_name: executor_name.into(),
            requires_approval: false,
        }
    }

    /// Mark the stage as gated behind an approval decision.
    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }
}

/// Defines a full pipeline: its stages, rework target and iteration budget.
///
/// # Example
///
/// ```yaml
/// name: feature-delivery
/// rework-stage: build
/// max-iterations: 2
/// stages:
///   - stage: design
///     executor: architect
///     requires-approval: true
///   - stage: build
///     executor: developer
///   - stage: verify
///     executor: tester
///   - stage: review
///     executor: reviewer
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, TS)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineDefinition {
    /// Unique name identifying this pipeline.
    pub name: String,

    /// Stages to execute, in order.
    pub stages: Vec<StageSpec>,

    /// The stage the cursor returns to when a quality failure is reported.
    pub rework_stage: Stage,

    /// Maximum number of rework iterations.
    ///
    /// Falls back to the global `max_iterations` setting when absent.
    #[serde(default)]
    pub max_iterations: Option<u32>,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>, stages: Vec<StageSpec>, rework_stage: Stage) -> Self {
        Self {
            name: name.into(),
            stages,
            rework_stage,
            max_iterations: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Names of all executors referenced by the pipeline, without duplicates.
    pub fn executor_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for spec in &self.stages {
            if !names.contains(&spec.executor_name) {
                names.push(spec.executor_name.clone());
            }
        }
        names
    }
}
