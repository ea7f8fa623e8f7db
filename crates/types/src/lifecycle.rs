//! Types describing an experiment lifecycle run: per-step outcomes, the overall
//! run status, control commands, and the event stream emitted by the driver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse ordering bucket for lifecycle steps.
///
/// Plans must visit phases in non-decreasing order: scripts are uploaded before
/// the job is submitted, the job is submitted before it is polled, and resources
/// are only deleted at the end.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Setup,
    Upload,
    Submit,
    Monitor,
    Teardown,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Upload => "upload",
            Self::Submit => "submit",
            Self::Monitor => "monitor",
            Self::Teardown => "teardown",
        }
    }
}

/// Status of an executed step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step did not run (halted run, declined confirmation, cancellation).
    Skipped,
    /// External command exited successfully.
    Succeeded,
    /// External command could not be spawned or exited non-zero.
    Failed,
}

/// Result of running a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Step identifier, e.g. `job.create`.
    pub id: String,
    /// Final status of this step execution.
    pub status: StepStatus,
    /// Captured stdout of the last attempt (empty for pass-through steps).
    pub output: String,
    /// Log lines captured while running the step.
    pub logs: Vec<String>,
    /// Number of command invocations; greater than one only for polling steps.
    pub attempts: u32,
    /// Verbatim failure detail, usually the external command's stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn skipped(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: StepStatus::Skipped,
            logs: vec![reason.into()],
            ..Default::default()
        }
    }
}

impl Default for StepResult {
    fn default() -> Self {
        Self {
            id: String::new(),
            status: StepStatus::Skipped,
            output: String::new(),
            logs: vec![],
            attempts: 0,
            error: None,
        }
    }
}

/// Overall status of a lifecycle run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    CancelRequested,
    Succeeded,
    Failed,
    /// The operator declined a destructive step.
    Declined,
    Canceled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Declined | Self::Canceled)
    }
}

/// Commands the operator can send to a running lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunControl {
    Cancel,
}

/// Events emitted while a lifecycle plan executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    RunStarted {
        at: DateTime<Utc>,
        step_count: usize,
    },
    StepStarted {
        index: usize,
        step_id: String,
        phase: LifecyclePhase,
        command: String,
        started_at: DateTime<Utc>,
    },
    /// Emitted for every poll of a repeating step.
    StepAttempt {
        step_id: String,
        attempt: u32,
        observed: Option<String>,
    },
    StepFinished {
        step_id: String,
        status: StepStatus,
        output: String,
        logs: Vec<String>,
        attempts: u32,
        duration_ms: u64,
    },
    RunStatusChanged {
        status: RunStatus,
        message: Option<String>,
    },
    RunCompleted {
        status: RunStatus,
        finished_at: DateTime<Utc>,
        error: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered_from_setup_to_teardown() {
        let mut phases = vec![
            LifecyclePhase::Teardown,
            LifecyclePhase::Upload,
            LifecyclePhase::Monitor,
            LifecyclePhase::Setup,
            LifecyclePhase::Submit,
        ];
        phases.sort();
        assert_eq!(
            phases,
            vec![
                LifecyclePhase::Setup,
                LifecyclePhase::Upload,
                LifecyclePhase::Submit,
                LifecyclePhase::Monitor,
                LifecyclePhase::Teardown,
            ]
        );
    }

    #[test]
    fn events_serialize_with_event_tag() {
        let event = LifecycleEvent::RunStatusChanged {
            status: RunStatus::Declined,
            message: None,
        };
        let value = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(value["event"], "run_status_changed");
        assert_eq!(value["status"], "declined");
    }

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Canceled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::CancelRequested.is_terminal());
    }
}
