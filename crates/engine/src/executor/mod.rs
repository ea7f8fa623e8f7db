//! Step execution: the runner seam and single/polling step helpers.
//!
//! Runners are synchronous: each call blocks until the external command exits.
//! The async lifecycle driver calls into this module one step at a time.

pub mod az_runner;
pub mod dry_run;
pub mod polling;

use std::time::Duration;

use batchai_types::{StepResult, StepStatus};
use tracing::{debug, warn};

use crate::commands::AzInvocation;
use crate::error::ExternalCommandError;
use crate::plan::LifecycleStep;

pub use az_runner::AzCliRunner;
pub use dry_run::DryRunRunner;
pub use polling::{JobState, run_polling_step, run_polling_step_with_observer};

/// What a finished external command reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }
}

/// Executes a single `az` invocation.
///
/// Implementations return `Err` for spawn failures and non-zero exits; the
/// error carries the external stderr verbatim.
pub trait CommandRunner {
    fn run(&self, invocation: &AzInvocation) -> Result<CommandOutput, ExternalCommandError>;
}

/// Execute a step once using the provided runner.
///
/// Returns a `StepResult` with `attempts = 1`; failures record the error text
/// in `error` and a log line.
pub fn run_step_with(step: &LifecycleStep, runner: &dyn CommandRunner) -> StepResult {
    let id = step.id();
    let mut result = StepResult {
        id: id.clone(),
        attempts: 1,
        ..Default::default()
    };

    debug!(step_id = %id, command = %step.invocation, "running step");
    match runner.run(&step.invocation) {
        Ok(output) => {
            result.status = StepStatus::Succeeded;
            result.output = output.stdout;
            result.logs.push(format!("step '{id}' executed in {} ms", output.duration.as_millis()));
        }
        Err(error) => {
            warn!(step_id = %id, error = %error, "step failed");
            result.status = StepStatus::Failed;
            result.logs.push(format!("step '{id}' failed: {error}"));
            result.error = Some(
                error
                    .stderr()
                    .filter(|stderr| !stderr.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string()),
            );
        }
    }
    result
}
