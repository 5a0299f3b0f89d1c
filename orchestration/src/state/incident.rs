//! `IncidentState`: the single mutable record owned by one workflow run.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::machine::{IllegalTransition, IncidentStatus, StatusMachine, TransitionRecord};
use super::types::TaskResult;
use crate::decision::EscalationReason;
use crate::error::WorkflowError;
use crate::incident::{IncidentFacts, IncidentReport, Severity};

/// Violations of the state's write-once / insert-only rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Task result '{0}' already recorded")]
    DuplicateResult(String),

    #[error("{0} already set")]
    AlreadySet(&'static str),
}

/// What happened while mitigating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitigationRecord {
    pub attempts: u32,
    pub succeeded: bool,
    /// Details reported by the executor for the last attempt.
    pub details: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Read-only copy of the state handed to tasks.
///
/// Taken once per batch, so no task sees another's result from the same batch.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentSnapshot {
    pub facts: IncidentFacts,
    pub status: IncidentStatus,
    pub phase_results: HashMap<String, TaskResult>,
    pub overall_confidence: Option<f64>,
    pub remediation_confidence: Option<f64>,
    pub mitigation: Option<MitigationRecord>,
    pub taken_at: DateTime<Utc>,
}

impl IncidentSnapshot {
    pub fn result(&self, task_name: &str) -> Option<&TaskResult> {
        self.phase_results.get(task_name)
    }

    /// Successful results sorted by task name, for stable prompt assembly.
    pub fn successful_results(&self) -> Vec<&TaskResult> {
        let mut results: Vec<&TaskResult> = self
            .phase_results
            .values()
            .filter(|r| r.is_success())
            .collect();
        results.sort_by(|a, b| a.task_name.cmp(&b.task_name));
        results
    }
}

/// Full state of one incident run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentState {
    facts: IncidentFacts,
    phase_results: HashMap<String, TaskResult>,
    overall_confidence: Option<f64>,
    remediation_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    escalation_reason: Option<EscalationReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resolution_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resolution_time_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mitigation: Option<MitigationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fault: Option<String>,
    machine: StatusMachine,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl IncidentState {
    /// Allocate state for a new incident in `Created`.
    ///
    /// # Errors
    ///
    /// `InvalidIncident` when the report fails validation.
    pub fn new(report: &IncidentReport) -> Result<Self, WorkflowError> {
        let facts = IncidentFacts::from_report(report)?;
        Ok(Self::with_facts(facts))
    }

    /// State for a report that could not be accepted: already `Errored`,
    /// carrying whatever facts came in and the fault.
    pub fn rejected(report: &IncidentReport, fault: &WorkflowError) -> Self {
        let mut state = Self::with_facts(IncidentFacts::lossy(report));
        let marked = state.mark_errored(fault);
        debug_assert!(marked.is_ok(), "Created must be able to reach Errored");
        state
    }

    fn with_facts(facts: IncidentFacts) -> Self {
        let now = Utc::now();
        Self {
            facts,
            phase_results: HashMap::new(),
            overall_confidence: None,
            remediation_confidence: None,
            escalation_reason: None,
            resolution_method: None,
            resolution_time_minutes: None,
            mitigation: None,
            fault: None,
            machine: StatusMachine::new(now),
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn facts(&self) -> &IncidentFacts {
        &self.facts
    }

    pub fn incident_id(&self) -> &str {
        &self.facts.incident_id
    }

    pub fn severity(&self) -> Severity {
        self.facts.severity
    }

    pub fn status(&self) -> IncidentStatus {
        self.machine.current()
    }

    pub fn phase_results(&self) -> &HashMap<String, TaskResult> {
        &self.phase_results
    }

    pub fn result(&self, task_name: &str) -> Option<&TaskResult> {
        self.phase_results.get(task_name)
    }

    pub fn overall_confidence(&self) -> Option<f64> {
        self.overall_confidence
    }

    pub fn remediation_confidence(&self) -> Option<f64> {
        self.remediation_confidence
    }

    pub fn escalation_reason(&self) -> Option<&EscalationReason> {
        self.escalation_reason.as_ref()
    }

    pub fn resolution_method(&self) -> Option<&str> {
        self.resolution_method.as_deref()
    }

    pub fn resolution_time_minutes(&self) -> Option<i64> {
        self.resolution_time_minutes
    }

    pub fn mitigation(&self) -> Option<&MitigationRecord> {
        self.mitigation.as_ref()
    }

    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        self.machine.transitions()
    }

    pub fn status_path(&self) -> String {
        self.machine.summary()
    }

    pub fn is_terminal(&self) -> bool {
        self.machine.is_terminal()
    }

    pub fn snapshot(&self) -> Arc<IncidentSnapshot> {
        Arc::new(IncidentSnapshot {
            facts: self.facts.clone(),
            status: self.status(),
            phase_results: self.phase_results.clone(),
            overall_confidence: self.overall_confidence,
            remediation_confidence: self.remediation_confidence,
            mitigation: self.mitigation.clone(),
            taken_at: Utc::now(),
        })
    }

    // ── Mutation ──────────────────────────────────────────────────────────

    /// Insert a batch of results all-or-nothing.
    ///
    /// # Errors
    ///
    /// `DuplicateResult` if any name is already present or repeated in the
    /// batch; nothing is inserted in that case.
    pub fn merge_results(
        &mut self,
        results: impl IntoIterator<Item = TaskResult>,
    ) -> Result<(), StateError> {
        let results: Vec<TaskResult> = results.into_iter().collect();
        let mut seen = std::collections::HashSet::new();
        for r in &results {
            if self.phase_results.contains_key(&r.task_name) || !seen.insert(r.task_name.as_str())
            {
                return Err(StateError::DuplicateResult(r.task_name.clone()));
            }
        }
        for r in results {
            self.phase_results.insert(r.task_name.clone(), r);
        }
        self.touch();
        Ok(())
    }

    pub fn set_overall_confidence(&mut self, confidence: f64) -> Result<(), StateError> {
        if self.overall_confidence.is_some() {
            return Err(StateError::AlreadySet("overall_confidence"));
        }
        self.overall_confidence = Some(confidence);
        self.touch();
        Ok(())
    }

    pub fn set_remediation_confidence(&mut self, confidence: f64) -> Result<(), StateError> {
        if self.remediation_confidence.is_some() {
            return Err(StateError::AlreadySet("remediation_confidence"));
        }
        self.remediation_confidence = Some(confidence);
        self.touch();
        Ok(())
    }

    pub fn record_mitigation(&mut self, record: MitigationRecord) {
        self.mitigation = Some(record);
        self.touch();
    }

    /// Move to `to`, stamping `resolved_at` on reaching a terminal status.
    pub fn advance(
        &mut self,
        to: IncidentStatus,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        self.machine.advance(to, reason)?;
        self.touch();
        if to.is_terminal() {
            self.resolved_at = Some(self.updated_at);
        }
        Ok(())
    }

    pub fn mark_resolved(&mut self, method: &str) -> Result<(), IllegalTransition> {
        self.advance(IncidentStatus::Resolved, Some(method))?;
        self.resolution_method = Some(method.to_string());
        self.resolution_time_minutes = self
            .resolved_at
            .map(|at| (at - self.created_at).num_minutes());
        Ok(())
    }

    pub fn mark_escalating(&mut self, reason: EscalationReason) -> Result<(), IllegalTransition> {
        self.advance(IncidentStatus::Escalating, Some(&reason.to_string()))?;
        self.escalation_reason = Some(reason);
        Ok(())
    }

    pub fn mark_escalated(&mut self) -> Result<(), IllegalTransition> {
        self.advance(IncidentStatus::Escalated, None)
    }

    pub fn mark_errored(&mut self, fault: &WorkflowError) -> Result<(), IllegalTransition> {
        let message = fault.to_string();
        self.advance(IncidentStatus::Errored, Some(&message))?;
        self.fault = Some(message);
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
