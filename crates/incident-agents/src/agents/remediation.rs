//! Remediation planner: turns the combined analyses into a scored plan.

use std::sync::Arc;

use async_trait::async_trait;
use incident_orchestration::task::names;
use incident_orchestration::{AnalysisTask, IncidentSnapshot, TaskContext, TaskError, TaskOutput};
use serde_json::json;

use super::{combine_analyses, consult};
use crate::llm::{AgentRole, Analyst};
use crate::remediation::runbook;
use crate::scoring::ScoreKind;

const ANALYSIS_EXCERPT_CHARS: usize = 300;

pub struct RemediationTask {
    analyst: Arc<dyn Analyst>,
}

impl RemediationTask {
    pub fn new(analyst: Arc<dyn Analyst>) -> Self {
        Self { analyst }
    }
}

#[async_trait]
impl AnalysisTask for RemediationTask {
    fn name(&self) -> &str {
        names::REMEDIATION
    }

    async fn analyze(&self, ctx: TaskContext) -> Result<TaskOutput, TaskError> {
        let prompt = build_prompt(&ctx.snapshot);
        let (analysis, confidence) = consult(
            self.analyst.as_ref(),
            AgentRole::Remediation,
            ScoreKind::Remediation,
            &prompt,
            &ctx,
        )
        .await?;

        Ok(TaskOutput::new(
            confidence,
            json!({
                "analysis": analysis,
                "actions": runbook(&ctx.snapshot.facts.incident_type),
                "rollback_available": true,
            }),
        ))
    }
}

fn build_prompt(snapshot: &IncidentSnapshot) -> String {
    let facts = &snapshot.facts;
    format!(
        "AUTO-REMEDIATION PLANNING - {id}\n\
         \n\
         INCIDENT SUMMARY:\n\
         - Service: {service}\n\
         - Type: {kind}\n\
         - Severity: {severity}\n\
         - Overall Confidence: {overall:.2}\n\
         \n\
         COMBINED AGENT ANALYSES:\n\
         {analyses}\n\
         \n\
         SAFETY REQUIREMENTS:\n\
         - Only recommend actions with >80% success rate\n\
         - All actions must be reversible\n\
         - Provide detailed rollback procedures\n\
         - Never risk production stability\n\
         - Conservative approach for P0/P1 incidents\n\
         \n\
         As a senior auto-remediation engineer, provide:\n\
         1. REMEDIATION CONFIDENCE (0.0-1.0): Confidence in auto-remediation\n\
         2. RECOMMENDED ACTIONS: Step-by-step remediation plan\n\
         3. SAFETY ASSESSMENT: Risk level of each action (LOW/MEDIUM/HIGH)\n\
         4. ROLLBACK PLAN: Detailed rollback procedures\n\
         5. SUCCESS PROBABILITY: Estimated success rate\n\
         6. EXECUTION TIME: Expected time to complete\n\
         7. MONITORING PLAN: How to verify success\n\
         \n\
         Be conservative - if unsure, recommend human intervention.",
        id = facts.incident_id,
        service = facts.affected_service,
        kind = facts.incident_type,
        severity = facts.severity,
        overall = snapshot.overall_confidence.unwrap_or_default(),
        analyses = combine_analyses(snapshot, ANALYSIS_EXCERPT_CHARS),
    )
}
