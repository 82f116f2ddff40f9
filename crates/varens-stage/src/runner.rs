//! External step execution.

use std::fs::File;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{IoContext, StageError, StageResult};
use crate::step::StepSpec;

/// Result of a step execution.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Step name.
    pub step_name: String,

    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Captured stdout (empty when redirected to a file).
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,
}

impl StepResult {
    /// Whether this step passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Turn a failed exit into `StageError::ToolFailed`.
    pub fn ensure_success(self, spec: &StepSpec) -> StageResult<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(StageError::ToolFailed {
                step: spec.name.clone(),
                command: spec.display_command(),
                exit_code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }
}

/// Capability to run an external step.
///
/// Merge and consensus logic only ever talk to this trait, so tests can
/// substitute `fakes::ScriptedExecutor` and never spawn a process.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run the step and report how it exited. Non-zero exits are not errors
    /// at this level; spawn failures and timeouts are.
    async fn execute(&self, spec: &StepSpec) -> StageResult<StepResult>;
}

/// Execute `spec` and fail on a non-zero exit.
pub async fn run_step(executor: &dyn StepExecutor, spec: &StepSpec) -> StageResult<StepResult> {
    debug!(step = %spec.name, command = %spec.display_command(), "running step");
    let result = executor.execute(spec).await?;
    if !result.passed() {
        warn!(
            step = %spec.name,
            exit_code = result.exit_code,
            "step failed"
        );
    }
    result.ensure_success(spec)
}

/// Runs steps as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl StepExecutor for ProcessExecutor {
    async fn execute(&self, spec: &StepSpec) -> StageResult<StepResult> {
        let start = Instant::now();

        let Some((exe, args)) = spec.command.split_first() else {
            return Err(StageError::EmptyCommand {
                step: spec.name.clone(),
            });
        };

        let mut command = Command::new(exe);
        command.args(args).stderr(Stdio::piped()).kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        match &spec.stdout_to {
            Some(path) => {
                let file = File::create(path).at(path)?;
                command.stdout(Stdio::from(file));
            }
            None => {
                command.stdout(Stdio::piped());
            }
        }

        let child = command.spawn().at(exe)?;

        let output = if spec.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(spec.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| StageError::Timeout {
                step: spec.name.clone(),
                timeout_secs: spec.timeout_secs,
            })?
            .at(exe)?
        } else {
            child.wait_with_output().await.at(exe)?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        Ok(StepResult {
            step_name: spec.name.clone(),
            exit_code,
            stdout,
            stderr,
            duration_ms,
            success: output.status.success(),
        })
    }
}
