//! Outbound collaborators: remediation execution and notification delivery.
//!
//! Both are traits so the workflow can be driven by real HTTP clients, the
//! simulated executor, or `mockall` mocks in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decision::EscalationReason;
use crate::error::WorkflowError;
use crate::incident::{IncidentFacts, Severity};
use crate::state::IncidentStatus;

/// The plan the remediation planner produced, handed to the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationPlan {
    pub incident_id: String,
    pub facts: IncidentFacts,
    pub confidence: f64,
    /// 1-based; the workflow bumps it before each retry.
    pub attempt: u32,
    /// Planner payload: analysis text, actions, rollback flag.
    pub payload: serde_json::Value,
}

/// What one execution attempt reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub succeeded: bool,
    pub details: serde_json::Value,
}

impl ExecutionOutcome {
    pub fn success(details: serde_json::Value) -> Self {
        Self {
            succeeded: true,
            details,
        }
    }

    pub fn failure(details: serde_json::Value) -> Self {
        Self {
            succeeded: false,
            details,
        }
    }
}

/// The executor itself broke; distinct from a mitigation that did not work.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct RemediationFault(pub String);

impl RemediationFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<RemediationFault> for WorkflowError {
    fn from(fault: RemediationFault) -> Self {
        WorkflowError::RemediationFault(fault.0)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemediationExecutor: Send + Sync {
    /// Apply the plan once.
    async fn execute(&self, plan: &RemediationPlan) -> Result<ExecutionOutcome, RemediationFault>;

    /// Confirm the incident is actually mitigated after an attempt.
    async fn verify(
        &self,
        _plan: &RemediationPlan,
        outcome: &ExecutionOutcome,
    ) -> Result<bool, RemediationFault> {
        Ok(outcome.succeeded)
    }

    /// Whether a failed attempt may be retried.
    fn is_retryable(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ResolutionReport,
    EscalationReport,
}

/// Final report sent to humans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub incident_id: String,
    pub kind: NotificationKind,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<EscalationReason>,
    /// Communication plan, when the planner produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAck {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<NotificationAck, NotifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_converts_to_workflow_error() {
        let err: WorkflowError = RemediationFault::new("kubectl not found").into();
        assert!(matches!(err, WorkflowError::RemediationFault(ref m) if m == "kubectl not found"));
    }

    #[test]
    fn notification_serializes_without_empty_fields() {
        let n = Notification {
            incident_id: "INC-1".into(),
            kind: NotificationKind::ResolutionReport,
            severity: Severity::P2,
            status: IncidentStatus::Resolved,
            summary: "resolved".into(),
            escalation_reason: None,
            plan: None,
        };
        let v = serde_json::to_value(&n).unwrap();
        assert_eq!(v["kind"], "resolution_report");
        assert!(v.get("plan").is_none());
        assert!(v.get("escalation_reason").is_none());
    }
}
