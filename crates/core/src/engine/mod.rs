//! Workflow orchestration.
//!
//! The WorkflowOrchestrator drives one run's steps strictly in order. Each
//! stage is delegated to its task executor through the retry controller;
//! gated steps suspend on the approval gate; a verification or review
//! payload that reports a quality failure rewinds the run to the pipeline's
//! rework stage until the iteration budget is spent.

pub mod error;

pub use error::OrchestratorError;

use crate::approval::{ApprovalGate, ApprovalHandler, ApprovalPolicy, ApprovalRequest};
use crate::config::models::AppConfig;
use crate::executor::base::StageRequest;
use crate::executor::registry::ExecutorRegistry;
use crate::failure::{classify, is_fatal};
use crate::input::serialize_stage_input;
use crate::quality::QualitySignals;
use crate::retry::{run_with_retry, RetryNotice, RetryPolicy, StageFailure};
use crate::state::context::{ProjectContext, DEFAULT_MAX_ITERATIONS};
use crate::state::lifecycle::{
    complete_run, emit, fail_run, log_to_run, resolve_approval, start_run, suspend_for_approval,
};
use pdca_protocol::config_models::GlobalConfig;
use pdca_protocol::ipc::Event;
use pdca_protocol::stage_models::PipelineDefinition;
use pdca_protocol::workflow_models::{FailureCategory, StepStatus, WorkflowStep};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Upper bound on a pipeline's rework budget.
pub const MAX_ITERATIONS_LIMIT: u32 = 100;

/// The PDCA pipeline controller.
///
/// Holds only configuration; every run's state lives in the
/// `ProjectContext` it is handed, so one orchestrator can drive any number
/// of concurrent runs.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    registry: ExecutorRegistry,
    retry_policy: RetryPolicy,
    approval_gate: ApprovalGate,
    quality: QualitySignals,
    /// Standing instructions per executor name.
    instructions: HashMap<String, String>,
    default_max_iterations: u32,
}

impl WorkflowOrchestrator {
    /// Create an orchestrator with default retry, approval and quality
    /// settings.
    ///
    /// # Arguments
    ///
    /// * `registry` - Executors available to pipeline stages
    pub fn new(registry: ExecutorRegistry) -> Self {
        Self {
            registry,
            retry_policy: RetryPolicy::default(),
            approval_gate: ApprovalGate::default(),
            quality: QualitySignals::default(),
            instructions: HashMap::new(),
            default_max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Create an orchestrator configured from `.pdca/config.toml` settings.
    pub fn from_config(registry: ExecutorRegistry, config: &GlobalConfig) -> Self {
        Self::new(registry)
            .with_retry_policy(RetryPolicy::new(
                config.max_retries,
                Duration::from_secs(config.attempt_timeout_secs),
            ))
            .with_approval_policy(ApprovalPolicy {
                auto_approve: config.auto_approve,
                fail_open: config.fail_open_approval,
            })
            .with_default_max_iterations(config.max_iterations)
    }

    /// Wire a project's loaded configuration: one subprocess executor per
    /// definition, each with its standing instructions.
    ///
    /// # Errors
    ///
    /// Returns an error if an executor definition cannot be turned into an
    /// executor.
    pub fn from_app_config(config: &AppConfig, root: &Path) -> anyhow::Result<Self> {
        let registry = ExecutorRegistry::from_definitions(&config.executors, root)?;
        let orchestrator = config
            .executors
            .iter()
            .filter(|definition| !definition.instructions.is_empty())
            .fold(Self::from_config(registry, &config.global), |orchestrator, definition| {
                orchestrator.with_instructions(&definition.name, &definition.instructions)
            });
        Ok(orchestrator)
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_approval_gate(mut self, gate: ApprovalGate) -> Self {
        self.approval_gate = gate;
        self
    }

    /// Replace the approval policy, keeping any installed handler.
    pub fn with_approval_policy(mut self, policy: ApprovalPolicy) -> Self {
        let gate = ApprovalGate::new(policy);
        self.approval_gate = match self.approval_gate.handler() {
            Some(handler) => gate.with_handler(handler),
            None => gate,
        };
        self
    }

    pub fn with_approval_handler(mut self, handler: Arc<dyn ApprovalHandler>) -> Self {
        self.approval_gate = self.approval_gate.with_handler(handler);
        self
    }

    pub fn with_quality_signals(mut self, quality: QualitySignals) -> Self {
        self.quality = quality;
        self
    }

    /// Rework budget for pipelines that don't set `max-iterations`.
    pub fn with_default_max_iterations(mut self, max_iterations: u32) -> Self {
        self.default_max_iterations = max_iterations;
        self
    }

    /// Attach standing instructions to every input sent to `executor_name`.
    pub fn with_instructions(
        mut self,
        executor_name: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        self.instructions
            .insert(executor_name.into(), instructions.into());
        self
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Check a pipeline definition against this orchestrator's registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline has no stages, repeats a stage,
    /// lists stages out of stage order, reworks at a stage it doesn't
    /// contain or that doesn't precede its verification and review stages,
    /// names an unregistered executor, or sets `max-iterations` above
    /// [`MAX_ITERATIONS_LIMIT`].
    pub fn validate(&self, definition: &PipelineDefinition) -> Result<(), OrchestratorError> {
        let pipeline = definition.name.clone();

        if definition.stages.is_empty() {
            return Err(OrchestratorError::EmptyPipeline(pipeline));
        }

        let mut seen = HashSet::new();
        for spec in &definition.stages {
            if !seen.insert(spec.stage) {
                return Err(OrchestratorError::DuplicateStage {
                    pipeline,
                    stage: spec.stage,
                });
            }
        }

        // Stage inputs are assembled in stage order, so steps must follow it.
        for pair in definition.stages.windows(2) {
            if pair[1].stage < pair[0].stage {
                return Err(OrchestratorError::StagesOutOfOrder {
                    pipeline,
                    stage: pair[1].stage,
                    previous: pair[0].stage,
                });
            }
        }

        let rework_stage = definition.rework_stage;
        if !seen.contains(&rework_stage) {
            return Err(OrchestratorError::ReworkStageMissing {
                pipeline,
                stage: rework_stage,
            });
        }

        // A rewind must move the cursor back past every stage that can ask for it.
        for quality_stage in [self.quality.verification_stage, self.quality.review_stage] {
            if seen.contains(&quality_stage) && rework_stage >= quality_stage {
                return Err(OrchestratorError::ReworkNotBeforeQualityStage {
                    pipeline,
                    stage: rework_stage,
                    quality_stage,
                });
            }
        }

        if let Some(value) = definition.max_iterations {
            if value > MAX_ITERATIONS_LIMIT {
                return Err(OrchestratorError::MaxIterationsOutOfRange {
                    pipeline,
                    value,
                    limit: MAX_ITERATIONS_LIMIT,
                });
            }
        }

        for executor in definition.executor_names() {
            if !self.registry.has_executor(&executor) {
                return Err(OrchestratorError::UnknownExecutor { pipeline, executor });
            }
        }

        Ok(())
    }

    /// Validate `definition` and create a `Pending` run with one step per
    /// stage.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn initialize(
        &self,
        definition: &PipelineDefinition,
        request: &str,
    ) -> Result<ProjectContext, OrchestratorError> {
        self.validate(definition)?;

        let max_iterations = definition
            .max_iterations
            .unwrap_or(self.default_max_iterations);
        let mut context = ProjectContext::create(request)
            .with_pipeline_name(definition.name.as_str())
            .with_max_iterations(max_iterations);

        for spec in &definition.stages {
            context.add_step(spec)?;
        }

        Ok(context)
    }

    /// Create a run for `request` and execute it to completion.
    ///
    /// # Arguments
    ///
    /// * `definition` - The pipeline to execute
    /// * `request` - The original request that starts the run
    /// * `events_tx` - Channel for progress events
    ///
    /// # Returns
    ///
    /// The finalized run, `Completed` or `Failed`.
    ///
    /// # Progress events
    ///
    /// Every event is sent with `try_send`: when the channel is full the
    /// event is dropped (and logged), so an observer that stops reading
    /// never stalls the run. Size the channel for the events you must not
    /// miss; the returned context is always complete.
    ///
    /// # Errors
    ///
    /// Only for a malformed pipeline definition. Failures during the run are
    /// reported through the returned context.
    pub async fn execute_workflow(
        &self,
        definition: &PipelineDefinition,
        request: &str,
        events_tx: Sender<Event>,
    ) -> Result<ProjectContext, OrchestratorError> {
        let context = self.initialize(definition, request)?;
        let cancel = CancellationToken::new();
        Ok(self
            .run(definition, context, &events_tx, &cancel, None)
            .await)
    }

    /// Execute an initialized run.
    ///
    /// Nothing escapes this loop: every failure becomes a step/run status
    /// plus an error-log entry. `snapshots`, when given, receives a copy of
    /// the context after every state change.
    ///
    /// # Arguments
    ///
    /// * `definition` - The pipeline the run was initialized from
    /// * `context` - A run created by [`initialize`](Self::initialize)
    /// * `events_tx` - Channel for progress events
    /// * `cancel` - Cancels the in-flight executor call and stops the run
    /// * `snapshots` - Optional read-only view for observers
    pub async fn run(
        &self,
        definition: &PipelineDefinition,
        mut context: ProjectContext,
        events_tx: &Sender<Event>,
        cancel: &CancellationToken,
        snapshots: Option<&watch::Sender<ProjectContext>>,
    ) -> ProjectContext {
        let publish = |context: &ProjectContext| {
            if let Some(snapshots) = snapshots {
                snapshots.send_replace(context.snapshot());
            }
        };

        tracing::info!(
            run_id = %context.id,
            pipeline = context.pipeline_name.as_str(),
            steps = context.steps.len(),
            "starting run"
        );
        emit(
            events_tx,
            Event::RunStarted {
                run_id: context.id,
                pipeline_name: context.pipeline_name.clone(),
            },
        );
        start_run(&mut context, events_tx).await;
        publish(&context);

        // `Some(reason)` when the loop stopped early.
        let halt: Option<String> = loop {
            let Some(step) = context.current_step().cloned() else {
                break None;
            };

            if cancel.is_cancelled() {
                context.record_error(step.stage, "run cancelled", Some(FailureCategory::Cancelled));
                break Some(format!("run cancelled before {} ({})", step.stage, step.id));
            }

            context.update_step_status(&step.id, StepStatus::InProgress, None, None);
            emit(
                events_tx,
                Event::StepStarted {
                    run_id: context.id,
                    step_id: step.id.clone(),
                    stage: step.stage,
                    iteration: context.iteration_count,
                },
            );
            log_to_run(
                &mut context,
                events_tx,
                format!("Executing {} with {}", step.stage, step.executor_name),
            )
            .await;
            publish(&context);

            let (result, retries) = self.execute_step(&context, &step, events_tx, cancel).await;
            for notice in retries {
                log_to_run(
                    &mut context,
                    events_tx,
                    format!(
                        "{} attempt {} failed ({}), retrying in {}ms",
                        step.stage,
                        notice.attempt + 1,
                        notice.error,
                        notice.delay.as_millis()
                    ),
                )
                .await;
            }

            let output = match result {
                Ok(output) => output,
                Err(failure) => {
                    self.record_step_failure(&mut context, &step, &failure, events_tx)
                        .await;
                    publish(&context);

                    if is_fatal(&failure.message) {
                        break Some(format!(
                            "fatal error in {} ({}): {}",
                            step.stage, step.id, failure.message
                        ));
                    }
                    if !failure.recoverable {
                        break Some(format!("{} ({}) failed: {failure}", step.stage, step.id));
                    }
                    // Recoverable after retries: later stages still run,
                    // finalize reports the run as failed.
                    if context.advance_cursor() {
                        continue;
                    }
                    break None;
                }
            };

            context.absorb_artifacts(&output);
            context.store_result(step.stage, output.clone());

            let already_approved = context
                .step(&step.id)
                .and_then(|current| current.approved)
                .unwrap_or(false);
            if step.requires_approval && !already_approved {
                let message = format!("Approve the {} output of step {}?", step.stage, step.id);
                suspend_for_approval(
                    &mut context,
                    events_tx,
                    &step.id,
                    message.clone(),
                    output.clone(),
                )
                .await;
                publish(&context);

                let request = ApprovalRequest {
                    run_id: context.id,
                    step_id: step.id.clone(),
                    stage: step.stage,
                    message,
                    payload: output.clone(),
                };
                let decision = tokio::select! {
                    _ = cancel.cancelled() => None,
                    approved = self.approval_gate.await_decision(&request, &context) => Some(approved),
                };
                let approved = decision.unwrap_or(false);
                resolve_approval(&mut context, events_tx, &step.id, approved).await;

                if !approved {
                    let failure = match decision {
                        Some(_) => StageFailure {
                            category: FailureCategory::ApprovalDeclined,
                            recoverable: false,
                            message: "approval declined".to_string(),
                            attempts: 0,
                        },
                        None => StageFailure {
                            category: FailureCategory::Cancelled,
                            recoverable: false,
                            message: "run cancelled".to_string(),
                            attempts: 0,
                        },
                    };
                    self.record_step_failure(&mut context, &step, &failure, events_tx)
                        .await;
                    publish(&context);
                    break Some(format!(
                        "{} for {} ({})",
                        failure.message, step.stage, step.id
                    ));
                }

                log_to_run(
                    &mut context,
                    events_tx,
                    format!("Approval granted for {}", step.id),
                )
                .await;
            }

            context.update_step_status(&step.id, StepStatus::Completed, Some(output.clone()), None);
            emit(
                events_tx,
                Event::StepCompleted {
                    run_id: context.id,
                    step_id: step.id.clone(),
                    stage: step.stage,
                },
            );
            publish(&context);

            if self.quality.needs_rework(step.stage, &output) {
                if !context.iteration_budget_remaining() {
                    let message = format!(
                        "{} still reports a quality failure after {} iteration(s); iteration budget exhausted",
                        step.stage, context.iteration_count
                    );
                    context.record_error(
                        step.stage,
                        message.clone(),
                        Some(FailureCategory::QualityFailure),
                    );
                    log_to_run(&mut context, events_tx, message.clone()).await;
                    break Some(message);
                }

                let iteration = context.increment_iteration();
                let rework_stage = definition.rework_stage;
                if context.rewind_cursor_to(rework_stage).is_none() {
                    break Some(format!("rework stage {rework_stage} is not part of this run"));
                }
                emit(
                    events_tx,
                    Event::IterationStarted {
                        run_id: context.id,
                        iteration,
                        rework_stage,
                    },
                );
                log_to_run(
                    &mut context,
                    events_tx,
                    format!(
                        "{} reported a quality failure; starting iteration {iteration} at {rework_stage}",
                        step.stage
                    ),
                )
                .await;
                publish(&context);
                continue;
            }

            if !context.advance_cursor() {
                break None;
            }
        };

        match halt {
            None if context.all_steps_completed() => {
                complete_run(&mut context, events_tx).await;
            }
            None => {
                let unfinished = context
                    .steps
                    .iter()
                    .filter(|step| step.status != StepStatus::Completed)
                    .map(|step| format!("{} ({:?})", step.id, step.status))
                    .collect::<Vec<_>>()
                    .join(", ");
                fail_run(
                    &mut context,
                    events_tx,
                    format!("run finished with unfinished steps: {unfinished}"),
                )
                .await;
            }
            Some(reason) => {
                fail_run(&mut context, events_tx, reason).await;
            }
        }

        tracing::info!(
            run_id = %context.id,
            status = ?context.status,
            iterations = context.iteration_count,
            errors = context.errors.len(),
            "run finished"
        );
        publish(&context);
        context
    }

    /// Resolve the step's executor and run it through the retry controller.
    ///
    /// Retry notices are collected and returned so the caller can log them
    /// against the run; the `RetryScheduled` events go out immediately.
    async fn execute_step(
        &self,
        context: &ProjectContext,
        step: &WorkflowStep,
        events_tx: &Sender<Event>,
        cancel: &CancellationToken,
    ) -> (Result<Value, StageFailure>, Vec<RetryNotice>) {
        let executor = match self.registry.resolve(&step.executor_name).await {
            Ok(executor) => executor,
            Err(error) => {
                let classification = classify(&error);
                let failure = StageFailure {
                    category: classification.category,
                    recoverable: classification.recoverable,
                    message: error.to_string(),
                    attempts: 0,
                };
                return (Err(failure), Vec::new());
            }
        };

        let instructions = self
            .instructions
            .get(&step.executor_name)
            .map(String::as_str)
            .unwrap_or_default();
        let request = StageRequest::new(
            step.stage,
            serialize_stage_input(context, step.stage, instructions),
        )
        .with_run(context.id, step.id.clone())
        .with_executor_name(step.executor_name.clone());

        let run_id = context.id;
        let stage = step.stage;
        let mut notices = Vec::new();
        let outcome = run_with_retry(
            executor.as_ref(),
            &request,
            &self.retry_policy,
            cancel,
            |notice| {
                emit(
                    events_tx,
                    Event::RetryScheduled {
                        run_id,
                        stage,
                        attempt: notice.attempt,
                        delay_ms: u64::try_from(notice.delay.as_millis()).unwrap_or(u64::MAX),
                        error: notice.error.to_string(),
                    },
                );
                notices.push(notice.clone());
            },
        )
        .await;

        tracing::debug!(
            %run_id,
            %stage,
            attempts = outcome.attempts,
            elapsed_ms = outcome.total_time.as_millis(),
            ok = outcome.is_ok(),
            "stage call settled"
        );
        (outcome.into_result(), notices)
    }

    async fn record_step_failure(
        &self,
        context: &mut ProjectContext,
        step: &WorkflowStep,
        failure: &StageFailure,
        events_tx: &Sender<Event>,
    ) {
        tracing::warn!(
            run_id = %context.id,
            step_id = step.id.as_str(),
            category = %failure.category,
            recoverable = failure.recoverable,
            "step failed: {}",
            failure.message
        );
        context.update_step_status(
            &step.id,
            StepStatus::Failed,
            None,
            Some(failure.message.clone()),
        );
        context.record_error(step.stage, failure.message.clone(), Some(failure.category));
        emit(
            events_tx,
            Event::StepFailed {
                run_id: context.id,
                step_id: step.id.clone(),
                stage: step.stage,
                category: failure.category,
                error: failure.message.clone(),
            },
        );
        log_to_run(
            context,
            events_tx,
            format!("{} failed: {failure}", step.stage),
        )
        .await;
    }
}
