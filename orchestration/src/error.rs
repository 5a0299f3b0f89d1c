//! Workflow error taxonomy and its coarse classification.
//!
//! Task-level failures (`TaskError`, see `crate::task`) never surface here:
//! the executor records them as failed `TaskResult`s. Everything in this
//! module aborts the run into `Errored`.
//!
//! | Kind              | Raised by                          |
//! |-------------------|------------------------------------|
//! | InvalidIncident   | state construction                 |
//! | Configuration     | config validation, batch assembly  |
//! | IllegalTransition | status machine guard               |
//! | State             | duplicate result, double set       |
//! | RemediationFault  | remediation executor `Err`         |
//! | Internal          | anything else                      |

use std::fmt;

use thiserror::Error;

use crate::state::{IllegalTransition, StateError};

/// Coarse classification, mostly for logs and exit reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidIncident,
    Configuration,
    IllegalTransition,
    State,
    RemediationFault,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIncident => write!(f, "invalid_incident"),
            Self::Configuration => write!(f, "configuration"),
            Self::IllegalTransition => write!(f, "illegal_transition"),
            Self::State => write!(f, "state"),
            Self::RemediationFault => write!(f, "remediation_fault"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Unified error type for the orchestration core.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The incident report could not be turned into an `IncidentState`.
    #[error("Invalid incident: {0}")]
    InvalidIncident(String),

    /// Configuration is invalid or a batch was assembled incorrectly.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error(transparent)]
    State(#[from] StateError),

    /// The remediation executor itself broke (not a failed mitigation).
    #[error("Remediation executor fault: {0}")]
    RemediationFault(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIncident(_) => ErrorKind::InvalidIncident,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::IllegalTransition(_) => ErrorKind::IllegalTransition,
            Self::State(_) => ErrorKind::State,
            Self::RemediationFault(_) => ErrorKind::RemediationFault,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Result alias used across the core.
pub type WorkflowResult<T> = Result<T, WorkflowError>;
