//! Subprocess-backed task executor.
//!
//! Spawns an external command per attempt, writes the stage input to its
//! stdin and reads its stdout as JSON Lines / NDJSON. The last JSON value
//! printed is the stage output.

use crate::executor::base::{ExecutorError, StageRequest, TaskExecutor};
use anyhow::{bail, Result};
use async_trait::async_trait;
use pdca_protocol::config_models::ExecutorDefinition;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_stream::wrappers::SplitStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Runs a stage by spawning `command args...` in `working_dir`.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    command: String,
    args: Vec<String>,
    working_dir: PathBuf,
}

impl CommandExecutor {
    pub fn new(command: String, args: Vec<String>, working_dir: PathBuf) -> Self {
        Self {
            command,
            args,
            working_dir,
        }
    }

    /// Create an executor from its `.pdca/executors/*.md` definition.
    ///
    /// A relative `working-dir` is resolved against `root`.
    pub fn from_definition(definition: &ExecutorDefinition, root: &Path) -> Result<Self> {
        if definition.command.trim().is_empty() {
            bail!("executor '{}' has an empty command", definition.name);
        }

        let working_dir = match &definition.working_dir {
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        };

        Ok(Self::new(
            definition.command.clone(),
            definition.args.clone(),
            working_dir,
        ))
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    async fn run(
        &self,
        request: &StageRequest,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ExecutorError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        cmd.current_dir(&self.working_dir);
        cmd.env("PDCA_STAGE", request.stage.as_str());
        cmd.env("PDCA_ATTEMPT", request.attempt.to_string());
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Dropping the child on cancellation or timeout must not leak the process.
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ExecutorError::Execution(format!(
                "Failed to spawn command '{}': {}",
                self.command, e
            ))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let input = request.input.clone();
            tokio::spawn(async move {
                let _ = stdin.write_all(input.as_bytes()).await;
                let _ = stdin.shutdown().await;
            });
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutorError::Execution("Failed to capture stdout".to_string()))?;
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(read_all(stderr)));

        let last_value = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ExecutorError::Cancelled(format!("command '{}' cancelled", self.command)));
            }
            value = last_json_line(stdout) => value,
        };

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ExecutorError::Cancelled(format!("command '{}' cancelled", self.command)));
            }
            status = child.wait() => status.map_err(|e| {
                ExecutorError::Execution(format!("Failed to wait for '{}': {}", self.command, e))
            })?,
        };

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            let detail = if stderr.trim().is_empty() {
                status.to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(ExecutorError::Execution(format!(
                "command '{}' failed: {}",
                self.command, detail
            )));
        }

        last_value.ok_or_else(|| {
            ExecutorError::InvalidOutput(format!(
                "command '{}' printed no JSON output",
                self.command
            ))
        })
    }
}

/// Read stdout line by line and keep the last line that parses as JSON.
///
/// Lines that are not UTF-8 or not JSON are skipped; stdout is always
/// drained to the end so the child never blocks on a full pipe.
async fn last_json_line<R>(reader: R) -> Option<serde_json::Value>
where
    R: AsyncRead + Unpin,
{
    let mut segments = SplitStream::new(BufReader::new(reader).split(b'\n'));
    let mut last = None;

    while let Some(segment) = segments.next().await {
        let bytes = match segment {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(error = %e, "stdout closed with an error");
                break;
            }
        };
        let Ok(text) = String::from_utf8(bytes) else {
            tracing::debug!("skipping non-UTF-8 output line");
            continue;
        };
        let line = text.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) => last = Some(value),
            Err(e) => tracing::debug!(error = %e, line, "skipping non-JSON output line"),
        }
    }

    last
}

async fn read_all<R>(mut reader: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = String::new();
    let _ = reader.read_to_string(&mut buf).await;
    buf
}

#[async_trait]
impl TaskExecutor for CommandExecutor {
    async fn check_availability(&self) -> bool {
        which::which(&self.command).is_ok()
    }

    async fn execute(
        &self,
        request: &StageRequest,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value, ExecutorError> {
        tracing::debug!(
            command = self.command.as_str(),
            stage = %request.stage,
            attempt = request.attempt,
            "spawning executor command"
        );
        self.run(request, &cancel).await
    }
}
