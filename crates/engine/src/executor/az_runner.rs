//! Runner that spawns the Azure CLI.

use std::io;
use std::process::Stdio;
use std::time::Instant;

use batchai_util::block_on_future;
use tokio::process::Command;
use tracing::{debug, info};

use super::{CommandOutput, CommandRunner};
use crate::commands::{AzInvocation, OutputMode};
use crate::error::ExternalCommandError;

/// Spawns each invocation with `tokio::process` and waits for it to exit.
///
/// Must be called from a multi-threaded Tokio runtime or from outside any
/// runtime (see [`block_on_future`]).
#[derive(Debug, Clone, Default)]
pub struct AzCliRunner {
    program_override: Option<String>,
}

impl AzCliRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `program` instead of the invocation's own program (e.g. a wrapper
    /// script or an `az` outside `PATH`).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program_override: Some(program.into()),
        }
    }
}

impl CommandRunner for AzCliRunner {
    fn run(&self, invocation: &AzInvocation) -> Result<CommandOutput, ExternalCommandError> {
        let program = self.program_override.clone().unwrap_or_else(|| invocation.program.clone());
        if program.trim().is_empty() {
            return Err(ExternalCommandError::EmptyCommand);
        }
        let rendered = invocation.display();
        info!(command = %rendered, "running az command");

        let mut command = Command::new(&program);
        command.args(&invocation.args).stdin(Stdio::null()).kill_on_drop(true);
        match invocation.output {
            OutputMode::Capture => command.stdout(Stdio::piped()).stderr(Stdio::piped()),
            OutputMode::Inherit => command.stdout(Stdio::inherit()).stderr(Stdio::inherit()),
        };

        let started_at = Instant::now();
        let spawned = block_on_future(async move { Ok(command.output().await) }).map_err(|error| ExternalCommandError::Spawn {
            command: rendered.clone(),
            source: io::Error::other(error.to_string()),
        })?;
        let output = spawned.map_err(|source| ExternalCommandError::Spawn {
            command: rendered.clone(),
            source,
        })?;
        let duration = started_at.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let Some(exit_code) = output.status.code() else {
            return Err(ExternalCommandError::Terminated { command: rendered });
        };
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        debug!(command = %rendered, exit_code, duration_ms, "az command exited");

        if exit_code != 0 {
            return Err(ExternalCommandError::NonZeroExit {
                command: rendered,
                code: exit_code,
                stderr,
            });
        }

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
            duration,
        })
    }
}
