//! Error types shared across the engine.

use std::io;
use std::path::PathBuf;

use batchai_types::LifecyclePhase;
use thiserror::Error;

pub use crate::config::ConfigurationError;
pub use crate::descriptor::SchemaError;

/// Failure of an external `az` invocation.
#[derive(Debug, Error)]
pub enum ExternalCommandError {
    /// The process ran and exited unsuccessfully. `stderr` is kept verbatim.
    #[error("`{command}` exited with status {code}: {stderr}")]
    NonZeroExit { command: String, code: i32, stderr: String },

    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The process was killed by a signal before it reported an exit code.
    #[error("`{command}` was terminated before exiting")]
    Terminated { command: String },

    #[error("refusing to run an empty command")]
    EmptyCommand,
}

impl ExternalCommandError {
    /// Verbatim stderr of a non-zero exit, if there is one.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { stderr, .. } => Some(stderr.as_str()),
            _ => None,
        }
    }
}

/// Failure of a lifecycle run as a whole.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("step '{step_id}' ({phase}) cannot follow a {previous} step")]
    PhaseOrder {
        step_id: String,
        phase: &'static str,
        previous: &'static str,
    },

    #[error("step '{step_id}' failed: {message}")]
    StepFailed { step_id: String, message: String },

    #[error("destructive step '{step_id}' was declined")]
    Declined { step_id: String },

    #[error("run canceled before step '{step_id}'")]
    Canceled { step_id: String },
}

impl LifecycleError {
    pub(crate) fn phase_order(step_id: &str, phase: LifecyclePhase, previous: LifecyclePhase) -> Self {
        Self::PhaseOrder {
            step_id: step_id.to_string(),
            phase: phase.as_str(),
            previous: previous.as_str(),
        }
    }
}

/// Umbrella error for library entry points.
#[derive(Debug, Error)]
pub enum BatchAiError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    ExternalCommand(#[from] ExternalCommandError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid job descriptor JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl BatchAiError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
