//! Polling the job's execution state until it finishes.

use std::{thread, time::Duration};

use batchai_types::{StepResult, StepStatus};
use tracing::{info, warn};

use super::{CommandRunner, run_step_with};
use crate::plan::{LifecycleStep, PollSpec};

/// Batch AI job execution states as printed by `--query executionState -o tsv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Terminating,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "terminating" => Some(Self::Terminating),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Poll a step until the job is terminal.
///
/// A failed command attempt is terminal and exits immediately.
pub fn run_polling_step(step: &LifecycleStep, runner: &dyn CommandRunner) -> StepResult {
    run_polling_step_with_observer(step, runner, |_, _| true)
}

/// Poll a step and notify `observer` after each attempt with the attempt
/// number and the observed state text. Returning `false` stops polling and
/// marks the step skipped.
pub fn run_polling_step_with_observer<F>(step: &LifecycleStep, runner: &dyn CommandRunner, mut observer: F) -> StepResult
where
    F: FnMut(u32, Option<&str>) -> bool,
{
    let poll = step.poll.unwrap_or_default();
    let max_attempts = poll.max_attempts.max(1);
    let step_id = step.id();
    info!(step_id = %step_id, max_attempts, interval_secs = poll.interval.as_secs(), "polling step started");

    let mut attempts = 0u32;
    let result = loop {
        attempts += 1;
        let mut attempt = run_step_with(step, runner);
        attempt.attempts = attempts;

        if matches!(attempt.status, StepStatus::Failed) {
            observer(attempts, None);
            break attempt;
        }

        let observed = attempt.output.trim().to_string();
        let keep_going = observer(attempts, Some(observed.as_str()));

        match JobState::parse(&observed) {
            Some(JobState::Succeeded) => {
                attempt.logs.push(format!("job reached state '{observed}'"));
                break attempt;
            }
            Some(JobState::Failed) => {
                attempt.status = StepStatus::Failed;
                attempt.logs.push("job reached state 'failed'".to_string());
                attempt.error = Some(format!("job finished in state '{observed}'"));
                break attempt;
            }
            Some(_) => {}
            None => warn!(step_id = %step_id, observed = %observed, "unrecognized job state"),
        }

        if !keep_going {
            attempt.status = StepStatus::Skipped;
            attempt.logs.push(format!("polling stopped after {attempts} attempts"));
            break attempt;
        }

        if attempts >= max_attempts {
            attempt.status = StepStatus::Failed;
            attempt.logs.push(format!("poll guard tripped at {attempts} attempts; stopping"));
            attempt.error = Some(format!("job still '{observed}' after {attempts} polls"));
            warn!(step_id = %step_id, attempts, "poll guard tripped");
            break attempt;
        }

        sleep_between_attempts(poll);
    };

    match result.status {
        StepStatus::Succeeded => info!(step_id = %step_id, attempts = result.attempts, "polling step succeeded"),
        StepStatus::Failed => warn!(step_id = %step_id, attempts = result.attempts, "polling step failed"),
        StepStatus::Skipped => info!(step_id = %step_id, attempts = result.attempts, "polling step stopped"),
    }
    result
}

fn sleep_between_attempts(poll: PollSpec) {
    if poll.interval > Duration::ZERO {
        thread::sleep(poll.interval);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;
    use crate::commands::AzInvocation;
    use crate::error::ExternalCommandError;
    use crate::executor::CommandOutput;
    use crate::plan::StepKind;

    struct ScriptedRunner {
        states: RefCell<VecDeque<&'static str>>,
    }

    impl ScriptedRunner {
        fn new(states: &[&'static str]) -> Self {
            Self {
                states: RefCell::new(states.iter().copied().collect()),
            }
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, invocation: &AzInvocation) -> Result<CommandOutput, ExternalCommandError> {
            match self.states.borrow_mut().pop_front() {
                Some("error") | None => Err(ExternalCommandError::NonZeroExit {
                    command: invocation.display(),
                    code: 1,
                    stderr: "ERROR: job not found".into(),
                }),
                Some(state) => Ok(CommandOutput::success(format!("{state}\n"))),
            }
        }
    }

    fn wait_step(max_attempts: u32) -> LifecycleStep {
        LifecycleStep::new(StepKind::JobWait, AzInvocation::az(["batchai", "job", "show"]))
            .polling(PollSpec::new(Duration::ZERO, max_attempts))
    }

    #[test]
    fn stops_when_job_succeeds() {
        let runner = ScriptedRunner::new(&["queued", "running", "succeeded"]);
        let mut seen = Vec::new();
        let result = run_polling_step_with_observer(&wait_step(10), &runner, |attempt, observed| {
            seen.push((attempt, observed.map(str::to_string)));
            true
        });

        assert_eq!(result.status, StepStatus::Succeeded);
        assert_eq!(result.attempts, 3);
        assert_eq!(seen.last(), Some(&(3, Some("succeeded".to_string()))));
    }

    #[test]
    fn failed_job_fails_the_step() {
        let runner = ScriptedRunner::new(&["running", "failed"]);
        let result = run_polling_step(&wait_step(10), &runner);
        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.error.as_deref(), Some("job finished in state 'failed'"));
    }

    #[test]
    fn guard_trips_at_max_attempts() {
        let runner = ScriptedRunner::new(&["running", "running", "running"]);
        let result = run_polling_step(&wait_step(2), &runner);
        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.attempts, 2);
        assert!(result.logs.iter().any(|line| line.contains("poll guard tripped")));
    }

    #[test]
    fn command_failure_stops_immediately() {
        let runner = ScriptedRunner::new(&["error"]);
        let result = run_polling_step(&wait_step(5), &runner);
        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.error.as_deref(), Some("ERROR: job not found"));
    }

    #[test]
    fn observer_can_stop_polling() {
        let runner = ScriptedRunner::new(&["queued", "queued"]);
        let result = run_polling_step_with_observer(&wait_step(5), &runner, |_, _| false);
        assert_eq!(result.status, StepStatus::Skipped);
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn parses_states_case_insensitively() {
        assert_eq!(JobState::parse("Running\n"), Some(JobState::Running));
        assert!(JobState::parse("succeeded").is_some_and(|state| state.is_terminal()));
        assert_eq!(JobState::parse("unknown"), None);
    }
}
