//! Configuration file loader for the `.pdca/` directory structure.
//!
//! This module loads every configuration file under `.pdca/`:
//! - `config.toml`: Global settings
//! - `executors/*.md`: Executor definitions with YAML front matter
//! - `pipelines/*.yaml`: Pipeline definitions

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::models::AppConfig;
use gray_matter::engine::YAML;
use gray_matter::Matter;
use pdca_protocol::config_models::{ExecutorDefinition, GlobalConfig};
use pdca_protocol::stage_models::PipelineDefinition;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the configuration directory under a project root.
pub const CONFIG_DIR: &str = ".pdca";

/// Loads all configuration from the `.pdca/` directory.
///
/// # Arguments
///
/// * `root` - Root directory containing the `.pdca/` folder
///
/// # Returns
///
/// An `AppConfig` containing all loaded configuration. Missing directories
/// or files fall back to defaults rather than an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - Files exist but cannot be read
/// - Files have invalid syntax (TOML, YAML, or Markdown front matter)
/// - Two files define the same executor or pipeline name
///
/// # Example
///
/// ```rust,no_run
/// use pdca_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} executors", config.executors.len());
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<AppConfig> {
    let config_dir = root.join(CONFIG_DIR);

    if !config_dir.exists() {
        tracing::debug!(path = %config_dir.display(), "no configuration directory, using defaults");
        return Ok(AppConfig::default());
    }

    let global = load_global_config(&config_dir)?;
    let executors = load_executors(&config_dir)?;
    let pipelines = load_pipelines(&config_dir)?;

    tracing::debug!(
        executors = executors.len(),
        pipelines = pipelines.len(),
        "configuration loaded"
    );

    Ok(AppConfig {
        global,
        executors,
        pipelines,
    })
}

/// Loads global configuration from `config.toml`.
fn load_global_config(config_dir: &Path) -> ConfigResult<GlobalConfig> {
    let config_path = config_dir.join("config.toml");

    if !config_path.exists() {
        return Ok(GlobalConfig::default());
    }

    let content = read_file(&config_path)?;

    toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: config_path,
        source,
    })
}

/// Files directly inside `dir` with one of `extensions`, sorted by name.
fn files_with_extension(dir: &Path, extensions: &[&str]) -> ConfigResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| ConfigError::DirectoryWalk {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.contains(&ext));
        if matches && entry.file_type().is_file() {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

fn read_file(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads all executor definitions from `executors/*.md`.
fn load_executors(config_dir: &Path) -> ConfigResult<Vec<ExecutorDefinition>> {
    let matter = Matter::<YAML>::new();
    let mut names = HashSet::new();
    let mut executors = Vec::new();

    for path in files_with_extension(&config_dir.join("executors"), &["md"])? {
        let content = read_file(&path)?;
        let result = matter.parse(&content);

        let mut executor: ExecutorDefinition = result
            .data
            .ok_or_else(|| ConfigError::MarkdownParse {
                path: path.clone(),
                reason: "Missing YAML front matter".to_string(),
            })?
            .deserialize()
            .map_err(|e| ConfigError::MarkdownParse {
                path: path.clone(),
                reason: format!("Failed to deserialize front matter: {e}"),
            })?;

        if !names.insert(executor.name.clone()) {
            return Err(ConfigError::DuplicateName {
                kind: "executor",
                name: executor.name,
                path,
            });
        }

        // The body carries the executor's standing instructions.
        executor.instructions = result.content.trim().to_string();
        executors.push(executor);
    }

    Ok(executors)
}

/// Loads all pipeline definitions from `pipelines/*.yaml`.
fn load_pipelines(config_dir: &Path) -> ConfigResult<Vec<PipelineDefinition>> {
    let mut names = HashSet::new();
    let mut pipelines = Vec::new();

    for path in files_with_extension(&config_dir.join("pipelines"), &["yaml", "yml"])? {
        let content = read_file(&path)?;

        let pipeline: PipelineDefinition =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlParse {
                path: path.clone(),
                source,
            })?;

        if !names.insert(pipeline.name.clone()) {
            return Err(ConfigError::DuplicateName {
                kind: "pipeline",
                name: pipeline.name,
                path,
            });
        }

        pipelines.push(pipeline);
    }

    Ok(pipelines)
}
