//! Operator consent for destructive steps.

use crate::plan::LifecycleStep;

/// Asked once before every destructive step runs.
pub trait Confirmation {
    /// Returns `true` when the operator allows `step` to run.
    fn confirm(&self, step: &LifecycleStep) -> bool;
}

/// Consent given up front (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirmation for AssumeYes {
    fn confirm(&self, _step: &LifecycleStep) -> bool {
        true
    }
}

/// Refuses every destructive step.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDecline;

impl Confirmation for AlwaysDecline {
    fn confirm(&self, _step: &LifecycleStep) -> bool {
        false
    }
}
