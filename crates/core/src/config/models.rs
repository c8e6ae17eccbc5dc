//! Configuration models that aggregate all settings.

use pdca_protocol::config_models::{ExecutorDefinition, GlobalConfig};
use pdca_protocol::stage_models::PipelineDefinition;

/// Unified configuration loaded from the `.pdca/` directory.
///
/// - `config.toml`: Global settings
/// - `executors/*.md`: Executor definitions
/// - `pipelines/*.yaml`: Pipeline definitions
///
/// # Example
///
/// ```rust,no_run
/// use pdca_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} executors and {} pipelines",
///          config.executors.len(),
///          config.pipelines.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Global settings from `config.toml`.
    pub global: GlobalConfig,

    /// All executor definitions loaded from `executors/*.md`.
    pub executors: Vec<ExecutorDefinition>,

    /// All pipeline definitions loaded from `pipelines/*.yaml`.
    pub pipelines: Vec<PipelineDefinition>,
}

impl AppConfig {
    pub fn find_pipeline(&self, name: &str) -> Option<&PipelineDefinition> {
        self.pipelines.iter().find(|pipeline| pipeline.name == name)
    }

    pub fn find_executor(&self, name: &str) -> Option<&ExecutorDefinition> {
        self.executors.iter().find(|executor| executor.name == name)
    }
}
