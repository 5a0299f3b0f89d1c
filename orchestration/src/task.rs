//! The `AnalysisTask` capability and its inputs/outputs.
//!
//! Every evidence domain (detective, diagnostics, historical) and every
//! single-step planner (remediation, communication, postmortem) is a value
//! implementing this one trait; the workflow selects them by registration.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::state::{FailureKind, IncidentSnapshot, TaskFailure};

/// Names of the built-in task roles.
pub mod names {
    pub const DETECTIVE: &str = "detective";
    pub const DIAGNOSTICS: &str = "diagnostics";
    pub const HISTORICAL: &str = "historical";
    pub const REMEDIATION: &str = "remediation";
    pub const COMMUNICATION: &str = "communication";
    pub const POSTMORTEM: &str = "postmortem";
}

/// Everything a task gets for one run.
#[derive(Clone)]
pub struct TaskContext {
    /// State as of batch start.
    pub snapshot: Arc<IncidentSnapshot>,
    /// Cancelled when the batch deadline expires.
    pub cancel: CancellationToken,
}

impl TaskContext {
    pub fn new(snapshot: Arc<IncidentSnapshot>, cancel: CancellationToken) -> Self {
        Self { snapshot, cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Scored output of a successful task.
#[derive(Debug, Clone)]
pub struct TaskOutput {
    /// Task-specific certainty in [0, 1].
    pub confidence: f64,
    pub payload: serde_json::Value,
}

impl TaskOutput {
    pub fn new(confidence: f64, payload: serde_json::Value) -> Self {
        Self {
            confidence,
            payload,
        }
    }
}

/// Expected, domain-level task failures.
///
/// Panics are programming faults; the executor captures those separately.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Upstream API or AI service unavailable.
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    /// Output could not be parsed.
    #[error("parse failure: {0}")]
    Parse(String),

    /// Output parsed but is unusable.
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// The task noticed cancellation and stopped early.
    #[error("cancelled")]
    Cancelled,
}

impl TaskError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Upstream(_) => FailureKind::Upstream,
            Self::Parse(_) => FailureKind::Parse,
            Self::InvalidOutput(_) => FailureKind::InvalidOutput,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }

    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<TaskError> for TaskFailure {
    fn from(err: TaskError) -> Self {
        TaskFailure::new(err.kind(), err.to_string())
    }
}

/// One unit of analysis work.
#[async_trait]
pub trait AnalysisTask: Send + Sync {
    /// Unique name; the key under which the result is recorded.
    fn name(&self) -> &str;

    /// Analyze the incident.
    ///
    /// Return `Err` for expected failures (upstream down, unparsable output);
    /// never panic for those.
    async fn analyze(&self, ctx: TaskContext) -> Result<TaskOutput, TaskError>;
}

/// Shared handle to a registered task.
pub type SharedTask = Arc<dyn AnalysisTask>;
