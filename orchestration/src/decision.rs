//! Decision gate: auto-remediate or escalate to a human.
//!
//! Rules are evaluated in order; the first match wins.
//!
//! | # | Condition                                   | Decision                          |
//! |---|---------------------------------------------|-----------------------------------|
//! | 1 | severity is P0                              | Escalate (CriticalSeverity)       |
//! | 2 | overall confidence undefined / below bar    | Escalate (NoConfidentAnalysis / LowOverallConfidence) |
//! | 3 | remediation confidence undefined / below bar| Escalate (NoRemediationPlan / LowRemediationConfidence) |
//! | 4 | otherwise                                   | AutoRemediate                     |
//!
//! Threshold comparisons are inclusive: a confidence equal to its
//! threshold passes.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::incident::Severity;

/// Why an incident was handed to a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EscalationReason {
    CriticalSeverity,
    NoConfidentAnalysis,
    LowOverallConfidence { confidence: f64, threshold: f64 },
    NoRemediationPlan,
    LowRemediationConfidence { confidence: f64, threshold: f64 },
    MitigationFailed { attempts: u32, last_error: String },
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CriticalSeverity => write!(f, "critical severity (P0) requires human oversight"),
            Self::NoConfidentAnalysis => write!(f, "no confident analysis"),
            Self::LowOverallConfidence {
                confidence,
                threshold,
            } => write!(
                f,
                "confidence below threshold (overall {confidence:.2} < {threshold:.2})"
            ),
            Self::NoRemediationPlan => write!(f, "no remediation plan"),
            Self::LowRemediationConfidence {
                confidence,
                threshold,
            } => write!(
                f,
                "confidence below threshold (remediation {confidence:.2} < {threshold:.2})"
            ),
            Self::MitigationFailed {
                attempts,
                last_error,
            } => write!(
                f,
                "mitigation failed after {attempts} attempt(s): {last_error}"
            ),
        }
    }
}

/// Outcome of the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    AutoRemediate,
    Escalate { reason: EscalationReason },
}

impl Decision {
    pub fn is_auto_remediate(&self) -> bool {
        matches!(self, Self::AutoRemediate)
    }

    pub fn escalation_reason(&self) -> Option<&EscalationReason> {
        match self {
            Self::AutoRemediate => None,
            Self::Escalate { reason } => Some(reason),
        }
    }

    fn escalate(reason: EscalationReason) -> Self {
        Self::Escalate { reason }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AutoRemediate => write!(f, "auto-remediate"),
            Self::Escalate { reason } => write!(f, "escalate: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionThresholds {
    /// Minimum overall analysis confidence.
    pub overall: f64,
    /// Minimum remediation plan confidence.
    pub remediation: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            overall: 0.6,
            remediation: 0.7,
        }
    }
}

/// Pure decision function over confidences and severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionGate {
    thresholds: DecisionThresholds,
}

impl DecisionGate {
    pub fn new(thresholds: DecisionThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> DecisionThresholds {
        self.thresholds
    }

    pub fn decide(
        &self,
        overall: Option<f64>,
        remediation: Option<f64>,
        severity: Severity,
    ) -> Decision {
        let decision = self.evaluate(overall, remediation, severity);
        info!(
            severity = %severity,
            overall = ?overall,
            remediation = ?remediation,
            decision = %decision,
            "Decision gate evaluated"
        );
        decision
    }

    fn evaluate(&self, overall: Option<f64>, remediation: Option<f64>, severity: Severity) -> Decision {
        if severity.is_critical() {
            return Decision::escalate(EscalationReason::CriticalSeverity);
        }

        let Some(overall) = overall else {
            return Decision::escalate(EscalationReason::NoConfidentAnalysis);
        };
        if overall < self.thresholds.overall {
            return Decision::escalate(EscalationReason::LowOverallConfidence {
                confidence: overall,
                threshold: self.thresholds.overall,
            });
        }

        let Some(remediation) = remediation else {
            return Decision::escalate(EscalationReason::NoRemediationPlan);
        };
        if remediation < self.thresholds.remediation {
            return Decision::escalate(EscalationReason::LowRemediationConfidence {
                confidence: remediation,
                threshold: self.thresholds.remediation,
            });
        }

        Decision::AutoRemediate
    }
}
