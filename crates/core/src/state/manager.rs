//! Registry of concurrently executing runs.
//!
//! The RunManager starts each run on its own tokio task, hands out the run
//! id before execution begins, and exposes read-only snapshots that the
//! orchestrator publishes through a `watch` channel. Each run's context is
//! owned by its task; the manager never mutates it.

use crate::engine::{OrchestratorError, WorkflowOrchestrator};
use crate::state::context::ProjectContext;
use anyhow::{anyhow, Result};
use pdca_protocol::ipc::Event;
use pdca_protocol::stage_models::PipelineDefinition;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct RunHandle {
    cancel: CancellationToken,
    snapshots: watch::Receiver<ProjectContext>,
    /// Taken by the first caller of `wait_for`.
    task: Option<JoinHandle<ProjectContext>>,
}

/// Manages all runs started through it.
pub struct RunManager {
    runs: Arc<Mutex<HashMap<Uuid, RunHandle>>>,

    orchestrator: Arc<WorkflowOrchestrator>,

    /// Channel for progress events of every run.
    events_tx: mpsc::Sender<Event>,
}

impl RunManager {
    /// Create a new RunManager.
    ///
    /// # Arguments
    ///
    /// * `orchestrator` - Drives every run started through this manager
    /// * `events_tx` - Channel for progress events; must be drained
    pub fn new(orchestrator: WorkflowOrchestrator, events_tx: mpsc::Sender<Event>) -> Self {
        Self {
            runs: Arc::new(Mutex::new(HashMap::new())),
            orchestrator: Arc::new(orchestrator),
            events_tx,
        }
    }

    /// Start executing a pipeline in the background.
    ///
    /// The run is created and registered before its task is spawned, so the
    /// returned id can be queried immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline definition is invalid; nothing is
    /// started in that case.
    pub async fn start_run(
        &self,
        definition: PipelineDefinition,
        request: &str,
    ) -> Result<Uuid, OrchestratorError> {
        let context = self.orchestrator.initialize(&definition, request)?;
        let run_id = context.id;

        let (snapshot_tx, snapshots) = watch::channel(context.snapshot());
        let cancel = CancellationToken::new();

        // Hold the lock across the spawn so the handle is registered before
        // anyone can look the run up.
        let mut runs = self.runs.lock().await;

        let orchestrator = Arc::clone(&self.orchestrator);
        let events_tx = self.events_tx.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            orchestrator
                .run(
                    &definition,
                    context,
                    &events_tx,
                    &task_cancel,
                    Some(&snapshot_tx),
                )
                .await
        });

        runs.insert(
            run_id,
            RunHandle {
                cancel,
                snapshots,
                task: Some(task),
            },
        );
        tracing::debug!(%run_id, "run registered");

        Ok(run_id)
    }

    /// The latest published snapshot of a run.
    pub async fn get_run(&self, run_id: Uuid) -> Option<ProjectContext> {
        let runs = self.runs.lock().await;
        runs.get(&run_id)
            .map(|handle| handle.snapshots.borrow().clone())
    }

    /// A receiver that observes every snapshot the run publishes.
    pub async fn subscribe(&self, run_id: Uuid) -> Option<watch::Receiver<ProjectContext>> {
        let runs = self.runs.lock().await;
        runs.get(&run_id).map(|handle| handle.snapshots.clone())
    }

    /// Snapshots of every registered run.
    pub async fn list_runs(&self) -> Vec<ProjectContext> {
        let runs = self.runs.lock().await;
        runs.values()
            .map(|handle| handle.snapshots.borrow().clone())
            .collect()
    }

    /// Get the number of registered runs.
    pub async fn run_count(&self) -> usize {
        self.runs.lock().await.len()
    }

    /// Cancel a run.
    ///
    /// The in-flight executor call is cancelled and the run ends `Failed`
    /// with a `Cancelled` error entry. Cancelling a finished run is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is not found.
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<()> {
        let runs = self.runs.lock().await;
        let handle = runs
            .get(&run_id)
            .ok_or_else(|| anyhow!("Run {run_id} not found"))?;
        tracing::info!(%run_id, "cancelling run");
        handle.cancel.cancel();
        Ok(())
    }

    /// Wait for a run to finish and return its final state.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is not found or its task panicked.
    pub async fn wait_for(&self, run_id: Uuid) -> Result<ProjectContext> {
        let (task, mut snapshots) = {
            let mut runs = self.runs.lock().await;
            let handle = runs
                .get_mut(&run_id)
                .ok_or_else(|| anyhow!("Run {run_id} not found"))?;
            (handle.task.take(), handle.snapshots.clone())
        };

        if let Some(task) = task {
            return task
                .await
                .map_err(|e| anyhow!("Run {run_id} task failed: {e}"));
        }

        // Another caller owns the task; follow the snapshots instead.
        let finished = snapshots
            .wait_for(|context| context.status.is_terminal())
            .await
            .map_err(|e| anyhow!("Run {run_id} stopped publishing: {e}"))?;
        Ok(finished.clone())
    }
}
