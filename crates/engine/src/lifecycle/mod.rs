//! Sequential execution of lifecycle plans with events, confirmation, and
//! cancellation.

pub mod confirmation;
pub mod driver;

pub use confirmation::{AlwaysDecline, AssumeYes, Confirmation};
pub use driver::{LifecycleReport, drive_lifecycle};
