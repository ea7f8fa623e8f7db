//! Runner that records commands instead of executing them.

use std::sync::Mutex;

use tracing::info;

use super::{CommandOutput, CommandRunner};
use crate::commands::AzInvocation;
use crate::error::ExternalCommandError;

/// Answer given to job state queries, so waiting plans finish.
const DRY_RUN_JOB_STATE: &str = "succeeded";

/// Logs every invocation and reports success without spawning anything.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    recorded: Mutex<Vec<String>>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered commands seen so far, in order.
    pub fn recorded(&self) -> Vec<String> {
        self.recorded.lock().map(|recorded| recorded.clone()).unwrap_or_default()
    }
}

impl CommandRunner for DryRunRunner {
    fn run(&self, invocation: &AzInvocation) -> Result<CommandOutput, ExternalCommandError> {
        if invocation.program.trim().is_empty() {
            return Err(ExternalCommandError::EmptyCommand);
        }
        let rendered = invocation.display();
        info!(command = %rendered, "dry run: command not executed");
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.push(rendered);
        }

        let stdout = if invocation.args.iter().any(|arg| arg == "executionState") {
            format!("{DRY_RUN_JOB_STATE}\n")
        } else {
            String::new()
        };
        Ok(CommandOutput::success(stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::AzInvocation;

    #[test]
    fn records_commands_in_order() {
        let runner = DryRunRunner::new();
        runner.run(&AzInvocation::az(["group", "list"])).expect("dry run");
        runner.run(&AzInvocation::az(["group", "delete", "--name", "rg", "-y"])).expect("dry run");
        assert_eq!(runner.recorded(), vec!["az group list", "az group delete --name rg -y"]);
    }

    #[test]
    fn state_queries_report_finished_jobs() {
        let runner = DryRunRunner::new();
        let output = runner
            .run(&AzInvocation::az(["batchai", "job", "show", "--query", "executionState", "-o", "tsv"]))
            .expect("dry run");
        assert_eq!(output.stdout.trim(), "succeeded");
    }
}
