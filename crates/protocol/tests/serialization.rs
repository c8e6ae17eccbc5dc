use pdca_protocol::*;
use serde_json;
use serde_yaml;

#[test]
fn test_pipeline_definition_deserialization_from_yaml() {
    let yaml_str = r#"
name: feature-delivery
rework-stage: build
max-iterations: 2
stages:
  - stage: design
    executor: architect
    requires-approval: true
  - stage: build
    executor: developer
  - stage: verify
    executor: tester
  - stage: review
    executor: reviewer
"#;

    let pipeline: PipelineDefinition =
        serde_yaml::from_str(yaml_str).expect("Failed to deserialize PipelineDefinition");

    assert_eq!(pipeline.name, "feature-delivery");
    assert_eq!(pipeline.rework_stage, Stage::Build);
    assert_eq!(pipeline.max_iterations, Some(2));
    assert_eq!(pipeline.stages.len(), 4);

    assert_eq!(pipeline.stages[0].stage, Stage::Design);
    assert_eq!(pipeline.stages[0].executor_name, "architect");
    assert!(pipeline.stages[0].requires_approval);
    // requires-approval defaults to false
    assert!(!pipeline.stages[1].requires_approval);
    assert_eq!(
        pipeline.executor_names(),
        vec!["architect", "developer", "tester", "reviewer"]
    );
}

#[test]
fn test_pipeline_definition_rejects_unknown_stage() {
    let yaml_str = r#"
name: broken
rework-stage: build
stages:
  - stage: deploy-to-mars
    executor: rocket
"#;

    let result: Result<PipelineDefinition, _> = serde_yaml::from_str(yaml_str);
    assert!(result.is_err());
}

#[test]
fn test_stage_ordering_follows_declaration() {
    assert!(Stage::Intake < Stage::Research);
    assert!(Stage::Design < Stage::Build);
    assert!(Stage::Build < Stage::Verify);
    assert!(Stage::Review < Stage::Publish);

    let mut shuffled = vec![Stage::Review, Stage::Intake, Stage::Verify, Stage::Build];
    shuffled.sort();
    assert_eq!(
        shuffled,
        vec![Stage::Intake, Stage::Build, Stage::Verify, Stage::Review]
    );
    assert_eq!(Stage::ALL.len(), 8);
}

#[test]
fn test_stage_serialization() {
    let json = serde_json::to_value(Stage::Verify).expect("Failed to serialize Stage");
    assert_eq!(json, "verify");
    assert_eq!(Stage::Verify.to_string(), "verify");
}

#[test]
fn test_run_status_serialization() {
    let status = RunStatus::RequiresApproval;
    let json = serde_json::to_value(status).expect("Failed to serialize RunStatus");

    assert_eq!(json, "REQUIRES_APPROVAL");

    let deserialized: RunStatus =
        serde_json::from_value(json).expect("Failed to deserialize RunStatus");
    assert_eq!(deserialized, RunStatus::RequiresApproval);
    assert!(!deserialized.is_terminal());
    assert!(RunStatus::Failed.is_terminal());
}

#[test]
fn test_workflow_step_serialization() {
    let step = WorkflowStep {
        id: "step-1-build".to_string(),
        stage: Stage::Build,
        status: StepStatus::Completed,
        executor_name: "developer".to_string(),
        started_at: Some(chrono::Utc::now()),
        completed_at: Some(chrono::Utc::now()),
        result: Some(serde_json::json!({"files": ["src/lib.rs"]})),
        error: None,
        requires_approval: false,
        approved: None,
        executions: 1,
    };

    let json = serde_json::to_string(&step).expect("Failed to serialize WorkflowStep");
    let deserialized: WorkflowStep =
        serde_json::from_str(&json).expect("Failed to deserialize WorkflowStep");

    assert_eq!(deserialized, step);
    assert!(deserialized.is_finished());
}

#[test]
fn test_global_config_defaults_from_empty_object() {
    let config: GlobalConfig = serde_json::from_str("{}").expect("Failed to deserialize");

    assert_eq!(config, GlobalConfig::default());
    assert!(!config.auto_approve);
    assert!(!config.fail_open_approval);
    assert_eq!(config.max_retries, 2);
    assert_eq!(config.attempt_timeout_secs, 120);
    assert_eq!(config.max_iterations, 3);
}

#[test]
fn test_executor_definition_serialization() {
    let definition = ExecutorDefinition {
        name: "developer".to_string(),
        command: "claude".to_string(),
        args: vec!["-p".to_string()],
        working_dir: None,
        instructions: "Implement the design".to_string(),
    };

    let json = serde_json::to_string(&definition).expect("Failed to serialize ExecutorDefinition");
    let deserialized: ExecutorDefinition =
        serde_json::from_str(&json).expect("Failed to deserialize ExecutorDefinition");

    assert_eq!(deserialized.name, definition.name);
    assert_eq!(deserialized.args, definition.args);
    // instructions come from the Markdown body, not the front matter
    assert_eq!(deserialized.instructions, "");
}

#[test]
fn test_event_enum_serialization() {
    use uuid::Uuid;

    let run_id = Uuid::new_v4();
    let event = Event::RunStarted {
        run_id,
        pipeline_name: "feature-delivery".to_string(),
    };

    let json = serde_json::to_value(&event).expect("Failed to serialize Event");
    assert_eq!(json["type"], "runStarted");
    assert!(json["payload"].is_object());
    assert_eq!(event.run_id(), run_id);
    assert!(!event.is_terminal());

    let failed = Event::StepFailed {
        run_id,
        step_id: "step-2-design".to_string(),
        stage: Stage::Design,
        category: FailureCategory::MaxTurnsExceeded,
        error: "turn budget exhausted".to_string(),
    };
    let json = serde_json::to_value(&failed).expect("Failed to serialize Event");
    assert_eq!(json["type"], "stepFailed");
    assert_eq!(json["payload"]["category"], "MaxTurnsExceeded");
    assert_eq!(json["payload"]["stage"], "design");

    let done = Event::RunCompleted { run_id };
    assert!(done.is_terminal());
}
