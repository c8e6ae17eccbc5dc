//! Configuration models for `.pdca/config.toml` and `.pdca/executors/*.md`.

use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

/// Represents global settings from `.pdca/config.toml`.
///
/// Every field has a default, so an empty or missing file is valid.
///
/// # Example
///
/// ```toml
/// # .pdca/config.toml
/// auto_approve = false
/// max_retries = 2
/// attempt_timeout_secs = 120
/// max_iterations = 3
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct GlobalConfig {
    /// Approve every gated step without asking.
    #[serde(default)]
    pub auto_approve: bool,

    /// Approve gated steps when no approval handler is installed.
    ///
    /// Off by default: without a handler, approvals are declined unless
    /// this or `auto_approve` is set.
    #[serde(default)]
    pub fail_open_approval: bool,

    /// Retries allowed per stage execution after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Timeout applied to each executor attempt, in seconds.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Default rework budget for pipelines that don't set their own.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_retries() -> u32 {
    2
}

fn default_attempt_timeout_secs() -> u64 {
    120
}

fn default_max_iterations() -> u32 {
    3
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            auto_approve: false,
            fail_open_approval: false,
            max_retries: default_max_retries(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// A subprocess-backed task executor defined in `.pdca/executors/*.md`.
///
/// The YAML front matter holds the metadata; the Markdown body holds the
/// standing instructions that are sent with every stage input.
///
/// # Example
///
/// ```markdown
/// ---
/// name: developer
/// command: claude
/// args: ["-p", "--output-format", "json"]
/// ---
///
/// You implement the approved design. Respond with a JSON object.
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "kebab-case")]
pub struct ExecutorDefinition {
    /// Unique identifier referenced by pipeline stages.
    pub name: String,

    /// Program to spawn.
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the process; defaults to the project root.
    #[serde(default)]
    pub working_dir: Option<String>,

    /// The Markdown body of the definition file.
    #[serde(skip)]
    pub instructions: String,
}
