//! Incident state: the status machine, task results, and the per-run record.

pub mod incident;
pub mod machine;
pub mod types;

pub use incident::{IncidentSnapshot, IncidentState, MitigationRecord, StateError};
pub use machine::{IllegalTransition, IncidentStatus, StatusMachine, TransitionRecord};
pub use types::{FailureKind, TaskFailure, TaskOutcome, TaskResult};
