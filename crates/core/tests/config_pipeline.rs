//! A configured project driven end to end through subprocess executors.

mod common;

use common::*;
use pdca_core::config::loader::load_config;
use pdca_core::engine::WorkflowOrchestrator;
use pdca_core::state::manager::RunManager;
use pdca_protocol::stage_models::Stage;
use pdca_protocol::workflow_models::RunStatus;
use serde_json::json;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_configured_project_runs_to_completion() {
    // Given: a .pdca/ project with shell executors and auto-approval
    let project = create_test_project().expect("Failed to create test project");
    let config = load_config(project.path())
        .await
        .expect("Failed to load config");
    assert_eq!(config.executors.len(), 2);
    assert!(config.global.auto_approve);

    let definition = config
        .find_pipeline("shell-delivery")
        .cloned()
        .expect("pipeline should be loaded");
    let orchestrator = WorkflowOrchestrator::from_app_config(&config, project.path())
        .expect("Failed to wire executors");

    // When
    let (tx, mut rx) = mpsc::channel(1000);
    let context = orchestrator
        .execute_workflow(&definition, "add a main", tx)
        .await
        .expect("pipeline should be valid");

    // Then
    assert_eq!(context.status, RunStatus::Completed, "errors: {:?}", context.errors);
    assert_eq!(context.result(Stage::Build), Some(&json!({"files": ["main.rs"]})));
    assert_eq!(
        context.result(Stage::Verify),
        Some(&json!({"failed": 0, "passed": 4}))
    );
    assert_eq!(context.steps[0].approved, Some(true));
    assert_eq!(context.max_iterations, 1);
    assert_event_sequence(&drain_events(&mut rx));
}

#[tokio::test]
async fn test_configured_project_through_run_manager() {
    let project = create_test_project().expect("Failed to create test project");
    let config = load_config(project.path())
        .await
        .expect("Failed to load config");
    let definition = config
        .find_pipeline("shell-delivery")
        .cloned()
        .expect("pipeline should be loaded");
    let orchestrator = WorkflowOrchestrator::from_app_config(&config, project.path())
        .expect("Failed to wire executors");

    let (tx, _rx) = mpsc::channel(1000);
    let manager = RunManager::new(orchestrator, tx);
    let run_id = manager
        .start_run(definition, "add a main")
        .await
        .expect("run should start");

    let finished = manager.wait_for(run_id).await.expect("run should finish");
    assert_eq!(finished.id, run_id);
    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(
        manager.get_run(run_id).await.map(|context| context.status),
        Some(RunStatus::Completed)
    );
}
