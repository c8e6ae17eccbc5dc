//! Test fixtures for pipelines, registries and project directories.

use pdca_core::executor::{ExecutorRegistry, MockExecutor};
use pdca_protocol::stage_models::{PipelineDefinition, Stage, StageSpec};
use std::sync::Arc;
use tempfile::TempDir;

/// `[build, verify]`, reworking at build.
#[allow(dead_code)]
pub fn build_verify_pipeline(max_iterations: u32) -> PipelineDefinition {
    PipelineDefinition::new(
        "build-verify",
        vec![
            StageSpec::new(Stage::Build, "builder"),
            StageSpec::new(Stage::Verify, "verifier"),
        ],
        Stage::Build,
    )
    .with_max_iterations(max_iterations)
}

/// `[design (gated), build, verify, review]`, reworking at build.
#[allow(dead_code)]
pub fn delivery_pipeline() -> PipelineDefinition {
    PipelineDefinition::new(
        "delivery",
        vec![
            StageSpec::new(Stage::Design, "architect").with_approval(),
            StageSpec::new(Stage::Build, "builder"),
            StageSpec::new(Stage::Verify, "verifier"),
            StageSpec::new(Stage::Review, "reviewer"),
        ],
        Stage::Build,
    )
}

/// A registry with one mock per name.
#[allow(dead_code)]
pub fn registry_with(executors: &[(&str, &MockExecutor)]) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    for (name, executor) in executors {
        registry.register(*name, Arc::new((*executor).clone()));
    }
    registry
}

/// A temporary project with a `.pdca/` directory whose executors are shell
/// one-liners.
///
/// Returns a TempDir that must be kept alive for the test duration.
#[allow(dead_code)]
pub fn create_test_project() -> std::io::Result<TempDir> {
    let temp_dir = tempfile::tempdir()?;
    let pdca_dir = temp_dir.path().join(".pdca");

    std::fs::create_dir_all(pdca_dir.join("executors"))?;
    std::fs::create_dir_all(pdca_dir.join("pipelines"))?;

    std::fs::write(
        pdca_dir.join("config.toml"),
        "auto_approve = true\nmax_retries = 0\nattempt_timeout_secs = 30\n",
    )?;

    let builder_md = r#"---
name: builder
command: sh
args:
  - "-c"
  - 'cat > /dev/null; echo "{\"files\": [\"main.rs\"]}"'
---

Build what the design describes."#;
    std::fs::write(pdca_dir.join("executors/builder.md"), builder_md)?;

    let verifier_md = r#"---
name: verifier
command: sh
args:
  - "-c"
  - 'cat > /dev/null; echo "{\"failed\": 0, \"passed\": 4}"'
---
"#;
    std::fs::write(pdca_dir.join("executors/verifier.md"), verifier_md)?;

    let pipeline_yaml = r#"name: shell-delivery
rework-stage: build
max-iterations: 1
stages:
  - stage: build
    executor: builder
    requires-approval: true
  - stage: verify
    executor: verifier
"#;
    std::fs::write(pdca_dir.join("pipelines/shell-delivery.yaml"), pipeline_yaml)?;

    Ok(temp_dir)
}
