//! Asynchronous lifecycle driver that streams events and responds to cancel
//! requests.
//!
//! Steps run strictly one after another. The first failure, declined
//! confirmation, or cancellation halts the run; every remaining step is then
//! reported as skipped so the event stream always covers the whole plan.

use std::{sync::Arc, time::Instant};

use batchai_types::{LifecycleEvent, RunControl, RunStatus, StepResult, StepStatus};
use chrono::Utc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tracing::{info, warn};

use super::Confirmation;
use crate::error::LifecycleError;
use crate::executor::{self, CommandRunner};
use crate::plan::{LifecycleStep, Plan};

/// Outcome of a lifecycle run.
#[derive(Debug)]
pub struct LifecycleReport {
    pub status: RunStatus,
    pub steps: Vec<StepResult>,
    /// Why the run halted, when it did.
    pub failure: Option<LifecycleError>,
}

impl LifecycleReport {
    pub fn step(&self, id: &str) -> Option<&StepResult> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// `Ok` with the step results when the run succeeded.
    pub fn into_result(self) -> Result<Vec<StepResult>, LifecycleError> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self.steps),
        }
    }
}

/// Drives `plan` to completion while emitting lifecycle events.
///
/// Plans that visit phases out of order are rejected before any command runs.
pub async fn drive_lifecycle(
    plan: Plan,
    runner: Arc<dyn CommandRunner + Send + Sync>,
    confirmation: Arc<dyn Confirmation + Send + Sync>,
    mut control_rx: UnboundedReceiver<RunControl>,
    event_tx: UnboundedSender<LifecycleEvent>,
) -> Result<LifecycleReport, LifecycleError> {
    if let Err(error) = plan.validate_phase_order() {
        let message = error.to_string();
        let _ = event_tx.send(LifecycleEvent::RunStatusChanged {
            status: RunStatus::Failed,
            message: Some(message.clone()),
        });
        let _ = event_tx.send(LifecycleEvent::RunCompleted {
            status: RunStatus::Failed,
            finished_at: Utc::now(),
            error: Some(message),
        });
        return Err(error);
    }

    let _ = event_tx.send(LifecycleEvent::RunStarted {
        at: Utc::now(),
        step_count: plan.len(),
    });
    let mut control_state = ControlState::new();
    control_state.emit_status(&event_tx, RunStatus::Running, None);
    info!(steps = plan.len(), "lifecycle run started");

    let mut results = Vec::with_capacity(plan.len());
    let mut failure: Option<LifecycleError> = None;
    let mut halted_status: Option<RunStatus> = None;

    for (index, step) in plan.steps.iter().enumerate() {
        let step_id = step.id();

        if halted_status.is_none() {
            drain_pending_commands(&mut control_state, &mut control_rx, &event_tx);
            if control_state.cancel_requested {
                failure = Some(LifecycleError::Canceled { step_id: step_id.clone() });
                halted_status = Some(RunStatus::Canceled);
            }
        }

        if let Some(status) = halted_status {
            let skipped = StepResult::skipped(step_id.clone(), format!("step '{step_id}' skipped: run {}", halt_reason(status)));
            emit_step_finished(&event_tx, &skipped, 0);
            results.push(skipped);
            continue;
        }

        if step.is_destructive() && !confirmation.confirm(step) {
            warn!(step_id = %step_id, "destructive step declined");
            let declined = StepResult::skipped(step_id.clone(), format!("step '{step_id}' declined by operator"));
            emit_step_finished(&event_tx, &declined, 0);
            results.push(declined);
            control_state.emit_status(&event_tx, RunStatus::Declined, Some(format!("declined '{step_id}'")));
            failure = Some(LifecycleError::Declined { step_id });
            halted_status = Some(RunStatus::Declined);
            continue;
        }

        let _ = event_tx.send(LifecycleEvent::StepStarted {
            index,
            step_id: step_id.clone(),
            phase: step.phase(),
            command: step.invocation.display(),
            started_at: Utc::now(),
        });

        let started_at = Instant::now();
        let result = execute_step(step, runner.as_ref(), &mut control_state, &mut control_rx, &event_tx);
        let duration_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        emit_step_finished(&event_tx, &result, duration_ms);

        match result.status {
            StepStatus::Succeeded => {}
            StepStatus::Failed => {
                let message = result
                    .error
                    .clone()
                    .unwrap_or_else(|| result.logs.last().cloned().unwrap_or_default());
                failure = Some(LifecycleError::StepFailed {
                    step_id: step_id.clone(),
                    message,
                });
                halted_status = Some(RunStatus::Failed);
            }
            StepStatus::Skipped => {
                failure = Some(LifecycleError::Canceled { step_id: step_id.clone() });
                halted_status = Some(RunStatus::Canceled);
            }
        }
        results.push(result);

        // let the signal and printer tasks observe progress between steps
        tokio::task::yield_now().await;
    }

    let status = halted_status.unwrap_or(RunStatus::Succeeded);
    let _ = event_tx.send(LifecycleEvent::RunCompleted {
        status,
        finished_at: Utc::now(),
        error: failure.as_ref().map(ToString::to_string),
    });
    info!(status = ?status, "lifecycle run completed");

    Ok(LifecycleReport {
        status,
        steps: results,
        failure,
    })
}

fn execute_step(
    step: &LifecycleStep,
    runner: &dyn CommandRunner,
    control_state: &mut ControlState,
    control_rx: &mut UnboundedReceiver<RunControl>,
    event_tx: &UnboundedSender<LifecycleEvent>,
) -> StepResult {
    if step.poll.is_none() {
        return executor::run_step_with(step, runner);
    }

    let step_id = step.id();
    executor::run_polling_step_with_observer(step, runner, |attempt, observed| {
        let _ = event_tx.send(LifecycleEvent::StepAttempt {
            step_id: step_id.clone(),
            attempt,
            observed: observed.map(str::to_string),
        });
        drain_pending_commands(control_state, control_rx, event_tx);
        !control_state.cancel_requested
    })
}

fn halt_reason(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Declined => "halted after a declined step",
        RunStatus::Canceled => "canceled",
        _ => "halted after a failed step",
    }
}

fn emit_step_finished(event_tx: &UnboundedSender<LifecycleEvent>, result: &StepResult, duration_ms: u64) {
    let _ = event_tx.send(LifecycleEvent::StepFinished {
        step_id: result.id.clone(),
        status: result.status,
        output: result.output.clone(),
        logs: result.logs.clone(),
        attempts: result.attempts,
        duration_ms,
    });
}

fn drain_pending_commands(
    control_state: &mut ControlState,
    control_rx: &mut UnboundedReceiver<RunControl>,
    event_tx: &UnboundedSender<LifecycleEvent>,
) {
    loop {
        match control_rx.try_recv() {
            Ok(command) => control_state.process_command(command, event_tx),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
}

struct ControlState {
    cancel_requested: bool,
}

impl ControlState {
    fn new() -> Self {
        Self { cancel_requested: false }
    }

    fn process_command(&mut self, command: RunControl, event_tx: &UnboundedSender<LifecycleEvent>) {
        match command {
            RunControl::Cancel => {
                if !self.cancel_requested {
                    self.cancel_requested = true;
                    self.emit_status(event_tx, RunStatus::CancelRequested, Some("stopping after the current step".to_string()));
                }
            }
        }
    }

    fn emit_status(&mut self, event_tx: &UnboundedSender<LifecycleEvent>, status: RunStatus, message: Option<String>) {
        let _ = event_tx.send(LifecycleEvent::RunStatusChanged { status, message });
    }
}
