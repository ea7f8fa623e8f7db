//! Catalog of the `az` invocations used by the experiment lifecycle.
//!
//! Each function returns the exact argument vector for one tutorial step. No
//! shell is involved when these run, so arguments are passed as-is; quoting only
//! happens when an invocation is displayed.

use std::fmt;
use std::path::Path;

use batchai_util::{redact_sensitive, render_shell_words};
use serde::Serialize;

use crate::config::ExperimentConfig;

/// Program every invocation runs.
pub const AZ_PROGRAM: &str = "az";

/// Share directory the scripts are uploaded into.
pub const SCRIPTS_SHARE_PATH: &str = "scripts";

/// File-share directory holding job stdout/stderr.
pub const STDOUTERR_DIRECTORY_ID: &str = "stdouterr";

/// How the child's standard streams are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// stdout and stderr are collected into the step result.
    Capture,
    /// The child writes straight to the operator's terminal.
    Inherit,
}

/// One external command: program, ordered arguments, output handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AzInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub output: OutputMode,
}

impl AzInvocation {
    pub fn az<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: AZ_PROGRAM.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            output: OutputMode::Capture,
        }
    }

    pub fn inherit_output(mut self) -> Self {
        self.output = OutputMode::Inherit;
        self
    }

    /// Program and arguments as one vector.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Shell-quoted rendering with secrets masked, for logs and dry runs.
    pub fn display(&self) -> String {
        redact_sensitive(&render_shell_words(&self.argv()))
    }
}

impl fmt::Display for AzInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

pub fn experiment_create(config: &ExperimentConfig) -> AzInvocation {
    let experiment = config.experiment_name();
    AzInvocation::az([
        "batchai",
        "experiment",
        "create",
        "-n",
        experiment.as_str(),
        "-g",
        config.group_name.as_str(),
        "-w",
        config.workspace.as_str(),
    ])
}

pub fn storage_upload(config: &ExperimentConfig, source: &Path) -> AzInvocation {
    let source = source.display().to_string();
    AzInvocation::az([
        "storage",
        "file",
        "upload",
        "--share-name",
        config.file_share_name.as_str(),
        "--source",
        source.as_str(),
        "--path",
        SCRIPTS_SHARE_PATH,
    ])
}

pub fn cluster_list(config: &ExperimentConfig) -> AzInvocation {
    AzInvocation::az(["batchai", "cluster", "list", "-w", config.workspace.as_str(), "-o", "table"])
}

pub fn job_create(config: &ExperimentConfig, descriptor_path: &Path) -> AzInvocation {
    let experiment = config.experiment_name();
    let job = config.job_name();
    let descriptor = descriptor_path.display().to_string();
    AzInvocation::az([
        "batchai",
        "job",
        "create",
        "-n",
        job.as_str(),
        "--cluster",
        config.cluster_name.as_str(),
        "-w",
        config.workspace.as_str(),
        "-e",
        experiment.as_str(),
        "-f",
        descriptor.as_str(),
    ])
}

pub fn job_list(config: &ExperimentConfig) -> AzInvocation {
    let experiment = config.experiment_name();
    AzInvocation::az(["batchai", "job", "list", "-w", config.workspace.as_str(), "-e", experiment.as_str(), "-o", "table"])
}

/// Prints the bare execution state (`queued`, `running`, ...).
pub fn job_show_state(config: &ExperimentConfig) -> AzInvocation {
    let experiment = config.experiment_name();
    let job = config.job_name();
    AzInvocation::az([
        "batchai",
        "job",
        "show",
        "-n",
        job.as_str(),
        "-w",
        config.workspace.as_str(),
        "-e",
        experiment.as_str(),
        "--query",
        "executionState",
        "-o",
        "tsv",
    ])
}

pub fn job_file_list(config: &ExperimentConfig) -> AzInvocation {
    let experiment = config.experiment_name();
    let job = config.job_name();
    AzInvocation::az([
        "batchai",
        "job",
        "file",
        "list",
        "-w",
        config.workspace.as_str(),
        "-e",
        experiment.as_str(),
        "--j",
        job.as_str(),
        "--output-directory-id",
        STDOUTERR_DIRECTORY_ID,
    ])
}

/// Streams `file_name` (e.g. `stdout.txt`) straight to the terminal.
pub fn job_file_stream(config: &ExperimentConfig, file_name: &str) -> AzInvocation {
    let experiment = config.experiment_name();
    let job = config.job_name();
    AzInvocation::az([
        "batchai",
        "job",
        "file",
        "stream",
        "-w",
        config.workspace.as_str(),
        "-e",
        experiment.as_str(),
        "--j",
        job.as_str(),
        "--output-directory-id",
        STDOUTERR_DIRECTORY_ID,
        "-f",
        file_name,
    ])
    .inherit_output()
}

pub fn job_delete(config: &ExperimentConfig) -> AzInvocation {
    let experiment = config.experiment_name();
    let job = config.job_name();
    AzInvocation::az([
        "batchai",
        "job",
        "delete",
        "-w",
        config.workspace.as_str(),
        "-e",
        experiment.as_str(),
        "--name",
        job.as_str(),
        "-y",
    ])
}

/// Clears a CLI default such as `group` or `location`.
pub fn reset_default(name: &str) -> AzInvocation {
    AzInvocation::az(["configure".to_string(), "--defaults".to_string(), format!("{name}=")])
}

pub fn cluster_delete(config: &ExperimentConfig) -> AzInvocation {
    AzInvocation::az([
        "batchai",
        "cluster",
        "delete",
        "-w",
        config.workspace.as_str(),
        "--name",
        config.cluster_name.as_str(),
        "-g",
        config.group_name.as_str(),
        "-y",
    ])
}

pub fn experiment_delete(config: &ExperimentConfig) -> AzInvocation {
    let experiment = config.experiment_name();
    AzInvocation::az([
        "batchai",
        "experiment",
        "delete",
        "-w",
        config.workspace.as_str(),
        "--name",
        experiment.as_str(),
        "-g",
        config.group_name.as_str(),
        "-y",
    ])
}

pub fn workspace_delete(config: &ExperimentConfig) -> AzInvocation {
    AzInvocation::az(["batchai", "workspace", "delete", "-n", config.workspace.as_str(), "-g", config.group_name.as_str(), "-y"])
}

pub fn group_delete(config: &ExperimentConfig) -> AzInvocation {
    AzInvocation::az(["group", "delete", "--name", config.group_name.as_str(), "-y"])
}
