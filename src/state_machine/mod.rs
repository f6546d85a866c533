mod attempt;
mod policy;
mod state;

pub use attempt::{AttemptLog, AttemptRecord, OutcomeKind, Resolution, StopCause};
pub use policy::{RetryPolicy, Stage};
pub use state::{FailureReason, TaskMachine, TaskOutcome, TaskState};
