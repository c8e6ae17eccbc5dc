//! Executor registry for dispatching stages by executor name.
//!
//! The `ExecutorRegistry` is responsible for:
//! - Registering task executors under the names pipelines refer to
//! - Looking up executors by name
//! - Providing fallback logic when an executor is unavailable

use crate::executor::base::{ExecutorError, TaskExecutor};
use crate::executor::command::CommandExecutor;
use anyhow::{Context, Result};
use pdca_protocol::config_models::ExecutorDefinition;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Maps executor names to task executor instances.
///
/// The registry is injected into the orchestrator at construction; there is
/// no process-wide executor instance.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn TaskExecutor>>,
    fallback_executor_name: Option<String>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry of subprocess executors from configuration.
    ///
    /// Executors without a `working-dir` run in `root`.
    pub fn from_definitions(definitions: &[ExecutorDefinition], root: &Path) -> Result<Self> {
        let mut registry = Self::new();
        for definition in definitions {
            let executor = CommandExecutor::from_definition(definition, root)
                .with_context(|| format!("Failed to create executor '{}'", definition.name))?;
            registry.register(definition.name.clone(), Arc::new(executor));
        }
        Ok(registry)
    }

    /// Register an executor, replacing any previous one with the same name.
    pub fn register(&mut self, name: impl Into<String>, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(name.into(), executor);
    }

    pub fn with_executor(mut self, name: impl Into<String>, executor: Arc<dyn TaskExecutor>) -> Self {
        self.register(name, executor);
        self
    }

    /// Set the executor to use when the requested one is unavailable.
    pub fn with_fallback(mut self, executor_name: String) -> Self {
        self.fallback_executor_name = Some(executor_name);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(name).cloned()
    }

    /// Pick the executor that should serve `name`.
    ///
    /// 1. Look up the requested executor
    /// 2. Check if it's available
    /// 3. If unavailable and a fallback is configured, try the fallback
    pub async fn resolve(&self, name: &str) -> Result<Arc<dyn TaskExecutor>, ExecutorError> {
        let Some(executor) = self.get(name) else {
            return Err(ExecutorError::NotAvailable(format!(
                "Executor '{name}' not found in registry"
            )));
        };

        if executor.check_availability().await {
            return Ok(executor);
        }

        if let Some(ref fallback_name) = self.fallback_executor_name {
            if fallback_name != name {
                if let Some(fallback) = self.get(fallback_name) {
                    if fallback.check_availability().await {
                        tracing::warn!(
                            executor = name,
                            fallback = fallback_name.as_str(),
                            "executor unavailable, using fallback"
                        );
                        return Ok(fallback);
                    }
                }
            }
        }

        Err(ExecutorError::NotAvailable(format!(
            "Executor '{name}' is not available and no fallback succeeded"
        )))
    }

    /// List all registered executor names, sorted.
    pub fn list_executors(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_executor(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }
}
