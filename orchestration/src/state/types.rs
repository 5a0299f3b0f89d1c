//! Task results as recorded in `IncidentState::phase_results`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a task produced no confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Per-task timeout or batch deadline exceeded.
    Timeout,
    /// An upstream API or AI service was unavailable or returned an error.
    Upstream,
    /// Output could not be parsed into a score.
    Parse,
    /// Output was structurally wrong (e.g. confidence outside [0, 1]).
    InvalidOutput,
    /// The task panicked; captured by the executor.
    Panicked,
    /// The task observed cancellation and stopped.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Upstream => write!(f, "UPSTREAM"),
            Self::Parse => write!(f, "PARSE"),
            Self::InvalidOutput => write!(f, "INVALID_OUTPUT"),
            Self::Panicked => write!(f, "PANICKED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded {
        confidence: f64,
        /// Evidence or plan data; never interpreted by the core.
        payload: serde_json::Value,
    },
    Failed {
        error: TaskFailure,
    },
}

/// Result of exactly one task run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_name: String,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
    pub elapsed_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    /// A successful result.
    ///
    /// A non-finite confidence or one outside [0, 1] is recorded as an
    /// `InvalidOutput` failure instead.
    pub fn succeeded(
        task_name: impl Into<String>,
        confidence: f64,
        payload: serde_json::Value,
        elapsed_ms: u64,
    ) -> Self {
        let outcome = if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
            TaskOutcome::Succeeded {
                confidence,
                payload,
            }
        } else {
            TaskOutcome::Failed {
                error: TaskFailure::new(
                    FailureKind::InvalidOutput,
                    format!("confidence {confidence} outside [0, 1]"),
                ),
            }
        };
        Self {
            task_name: task_name.into(),
            outcome,
            elapsed_ms,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(task_name: impl Into<String>, error: TaskFailure, elapsed_ms: u64) -> Self {
        Self {
            task_name: task_name.into(),
            outcome: TaskOutcome::Failed { error },
            elapsed_ms,
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Succeeded { .. })
    }

    /// `None` for failed results.
    pub fn confidence(&self) -> Option<f64> {
        match &self.outcome {
            TaskOutcome::Succeeded { confidence, .. } => Some(*confidence),
            TaskOutcome::Failed { .. } => None,
        }
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            TaskOutcome::Succeeded { payload, .. } => Some(payload),
            TaskOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&TaskFailure> {
        match &self.outcome {
            TaskOutcome::Succeeded { .. } => None,
            TaskOutcome::Failed { error } => Some(error),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error().map(|e| e.kind)
    }
}
