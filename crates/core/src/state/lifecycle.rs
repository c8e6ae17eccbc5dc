//! Run lifecycle transitions.
//!
//! This module provides functions that move a `ProjectContext` between run
//! statuses and emit the matching progress events. Events are delivered
//! with [`emit`]: a full or closed channel drops the event and never
//! blocks the run.

use crate::state::context::ProjectContext;
use pdca_protocol::ipc::Event;
use pdca_protocol::workflow_models::RunStatus;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

/// Deliver a progress event without waiting for the observer.
///
/// A full channel drops the event with a warning; a closed one drops it
/// silently.
pub fn emit(events_tx: &Sender<Event>, event: Event) {
    if let Err(TrySendError::Full(event)) = events_tx.try_send(event) {
        tracing::warn!(
            run_id = %event.run_id(),
            "progress channel full, dropping event"
        );
    }
}

fn emit_status(context: &ProjectContext, events_tx: &Sender<Event>) {
    emit(
        events_tx,
        Event::RunStatusUpdate {
            run_id: context.id,
            status: context.status,
            cursor: context.cursor,
        },
    );
}

/// Transition the run to InProgress and emit event.
pub async fn start_run(context: &mut ProjectContext, events_tx: &Sender<Event>) {
    context.set_status(RunStatus::InProgress);
    emit_status(context, events_tx);
}

/// Register a pending approval (status becomes RequiresApproval) and emit events.
pub async fn suspend_for_approval(
    context: &mut ProjectContext,
    events_tx: &Sender<Event>,
    step_id: &str,
    message: String,
    payload: serde_json::Value,
) {
    context.request_approval(step_id, message.clone(), payload);
    emit_status(context, events_tx);
    emit(
        events_tx,
        Event::ApprovalRequested {
            run_id: context.id,
            step_id: step_id.to_string(),
            message,
        },
    );
}

/// Resolve a pending approval and emit events.
///
/// The run returns to InProgress once no approval is pending.
pub async fn resolve_approval(
    context: &mut ProjectContext,
    events_tx: &Sender<Event>,
    step_id: &str,
    approved: bool,
) {
    context.resolve_approval(step_id, approved);
    emit(
        events_tx,
        Event::ApprovalResolved {
            run_id: context.id,
            step_id: step_id.to_string(),
            approved,
        },
    );
    emit_status(context, events_tx);
}

/// Mark the run as completed and emit event.
pub async fn complete_run(context: &mut ProjectContext, events_tx: &Sender<Event>) {
    context.set_status(RunStatus::Completed);
    emit_status(context, events_tx);
    emit(events_tx, Event::RunCompleted { run_id: context.id });
}

/// Mark the run as failed and emit error event.
///
/// The reported stage is the one under the cursor, i.e. where the run stopped.
pub async fn fail_run(context: &mut ProjectContext, events_tx: &Sender<Event>, error: String) {
    context.set_status(RunStatus::Failed);
    emit_status(context, events_tx);
    emit(
        events_tx,
        Event::RunFailed {
            run_id: context.id,
            stage: context.current_step().map(|step| step.stage),
            error,
        },
    );
}

/// Append a log message to the run and emit event.
pub async fn log_to_run(context: &mut ProjectContext, events_tx: &Sender<Event>, message: String) {
    context.log(message.clone());
    emit(
        events_tx,
        Event::RunLogChunk {
            run_id: context.id,
            content: message,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdca_protocol::stage_models::{Stage, StageSpec};
    use tokio::sync::mpsc;

    fn context() -> ProjectContext {
        let mut context = ProjectContext::create("ship it");
        context
            .add_step(&StageSpec::new(Stage::Build, "developer").with_approval())
            .unwrap();
        context
    }

    #[tokio::test]
    async fn test_emit_drops_events_when_channel_is_full() {
        let context = context();
        let (tx, mut rx) = mpsc::channel(1);

        emit(&tx, Event::RunCompleted { run_id: context.id });
        emit(
            &tx,
            Event::RunLogChunk {
                run_id: context.id,
                content: "dropped".to_string(),
            },
        );

        assert!(matches!(rx.try_recv(), Ok(Event::RunCompleted { .. })));
        assert!(rx.try_recv().is_err());

        drop(rx);
        emit(&tx, Event::RunCompleted { run_id: context.id });
    }

    #[tokio::test]
    async fn test_start_run() {
        let mut context = context();
        let (tx, mut rx) = mpsc::channel(10);

        start_run(&mut context, &tx).await;

        assert_eq!(context.status, RunStatus::InProgress);
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            Event::RunStatusUpdate {
                status: RunStatus::InProgress,
                cursor: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_suspend_and_resolve_approval() {
        let mut context = context();
        let (tx, mut rx) = mpsc::channel(10);
        start_run(&mut context, &tx).await;
        let _ = rx.recv().await;

        suspend_for_approval(
            &mut context,
            &tx,
            "step-1-build",
            "approve?".to_string(),
            serde_json::json!({}),
        )
        .await;
        assert_eq!(context.status, RunStatus::RequiresApproval);

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(
            event1,
            Event::RunStatusUpdate {
                status: RunStatus::RequiresApproval,
                ..
            }
        ));
        let event2 = rx.recv().await.unwrap();
        assert!(matches!(event2, Event::ApprovalRequested { step_id, .. } if step_id == "step-1-build"));

        resolve_approval(&mut context, &tx, "step-1-build", true).await;
        assert_eq!(context.status, RunStatus::InProgress);
        assert!(context.pending_approvals.is_empty());

        let event3 = rx.recv().await.unwrap();
        assert!(matches!(event3, Event::ApprovalResolved { approved: true, .. }));
    }

    #[tokio::test]
    async fn test_complete_run() {
        let mut context = context();
        let (tx, mut rx) = mpsc::channel(10);

        complete_run(&mut context, &tx).await;

        assert_eq!(context.status, RunStatus::Completed);

        // Should receive two events: StatusUpdate and Completed
        let event1 = rx.recv().await.unwrap();
        assert!(matches!(
            event1,
            Event::RunStatusUpdate {
                status: RunStatus::Completed,
                ..
            }
        ));
        let event2 = rx.recv().await.unwrap();
        assert!(matches!(event2, Event::RunCompleted { .. }));
    }

    #[tokio::test]
    async fn test_fail_run_reports_stage() {
        let mut context = context();
        let (tx, mut rx) = mpsc::channel(10);

        fail_run(&mut context, &tx, "Test error".to_string()).await;

        assert_eq!(context.status, RunStatus::Failed);
        let _ = rx.recv().await;
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            Event::RunFailed { stage: Some(Stage::Build), error, .. } if error == "Test error"
        ));
    }

    #[tokio::test]
    async fn test_log_to_run() {
        let mut context = context();
        let (tx, mut rx) = mpsc::channel(10);

        log_to_run(&mut context, &tx, "Test log message".to_string()).await;

        assert_eq!(context.logs, vec!["Test log message".to_string()]);
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            Event::RunLogChunk { content, .. } if content == "Test log message"
        ));
    }

    #[tokio::test]
    async fn test_closed_channel_does_not_affect_run() {
        let mut context = context();
        let (tx, rx) = mpsc::channel(10);
        drop(rx);

        start_run(&mut context, &tx).await;
        log_to_run(&mut context, &tx, "nobody listening".to_string()).await;
        complete_run(&mut context, &tx).await;

        assert_eq!(context.status, RunStatus::Completed);
        assert_eq!(context.logs.len(), 1);
    }
}
