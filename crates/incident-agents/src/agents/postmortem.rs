//! Postmortem: documents a resolved incident.

use std::sync::Arc;

use async_trait::async_trait;
use incident_orchestration::task::names;
use incident_orchestration::{
    AnalysisTask, IncidentSnapshot, IncidentStatus, TaskContext, TaskError, TaskOutput,
    AUTO_RESOLUTION_METHOD,
};
use serde_json::json;

use super::{combine_analyses, consult};
use crate::llm::{AgentRole, Analyst};
use crate::scoring::ScoreKind;

const ANALYSIS_EXCERPT_CHARS: usize = 200;

pub struct PostmortemTask {
    analyst: Arc<dyn Analyst>,
}

impl PostmortemTask {
    pub fn new(analyst: Arc<dyn Analyst>) -> Self {
        Self { analyst }
    }
}

#[async_trait]
impl AnalysisTask for PostmortemTask {
    fn name(&self) -> &str {
        names::POSTMORTEM
    }

    async fn analyze(&self, ctx: TaskContext) -> Result<TaskOutput, TaskError> {
        let prompt = build_prompt(&ctx.snapshot);
        let (analysis, confidence) = consult(
            self.analyst.as_ref(),
            AgentRole::Postmortem,
            ScoreKind::Confidence,
            &prompt,
            &ctx,
        )
        .await?;

        Ok(TaskOutput::new(
            confidence,
            json!({
                "analysis": analysis,
                "resolution_summary": resolution_summary(&ctx.snapshot),
            }),
        ))
    }
}

fn resolution_summary(snapshot: &IncidentSnapshot) -> String {
    match (snapshot.status, &snapshot.mitigation) {
        (IncidentStatus::Resolved, Some(m)) => format!(
            "Incident resolved via {AUTO_RESOLUTION_METHOD} after {} attempt(s)",
            m.attempts
        ),
        (IncidentStatus::Resolved, None) => {
            format!("Incident resolved via {AUTO_RESOLUTION_METHOD}")
        }
        (status, _) => format!("Incident not resolved automatically (status: {status})"),
    }
}

fn build_prompt(snapshot: &IncidentSnapshot) -> String {
    let facts = &snapshot.facts;
    format!(
        "POST-MORTEM ANALYSIS - {id}\n\
         \n\
         INCIDENT SUMMARY:\n\
         - Service: {service}\n\
         - Type: {kind}\n\
         - Severity: {severity}\n\
         - Success: {success}\n\
         \n\
         RESOLUTION SUMMARY:\n\
         {resolution}\n\
         \n\
         ALL AGENT ANALYSES:\n\
         {analyses}\n\
         \n\
         As a post-mortem expert, provide:\n\
         1. DOCUMENTATION CONFIDENCE (0.0-1.0): Confidence in analysis completeness\n\
         2. ROOT CAUSE SUMMARY: Final root cause determination\n\
         3. LESSONS LEARNED: Key insights from this incident\n\
         4. PREVENTION MEASURES: How to prevent similar incidents\n\
         5. PROCESS IMPROVEMENTS: How to improve incident response\n\
         6. TIMELINE ANALYSIS: Key events and decision points\n\
         7. RECOMMENDATIONS: Specific actionable recommendations\n\
         \n\
         Include a specific documentation confidence score.",
        id = facts.incident_id,
        service = facts.affected_service,
        kind = facts.incident_type,
        severity = facts.severity,
        success = snapshot.status == IncidentStatus::Resolved,
        resolution = resolution_summary(snapshot),
        analyses = combine_analyses(snapshot, ANALYSIS_EXCERPT_CHARS),
    )
}
