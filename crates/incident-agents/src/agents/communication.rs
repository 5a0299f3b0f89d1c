//! Communication planner: who to tell, and what.

use std::sync::Arc;

use async_trait::async_trait;
use incident_orchestration::task::names;
use incident_orchestration::{AnalysisTask, IncidentSnapshot, TaskContext, TaskError, TaskOutput};
use serde_json::json;

use super::{combine_analyses, consult};
use crate::llm::{AgentRole, Analyst};
use crate::scoring::ScoreKind;

const ANALYSIS_EXCERPT_CHARS: usize = 200;

pub struct CommunicationTask {
    analyst: Arc<dyn Analyst>,
}

impl CommunicationTask {
    pub fn new(analyst: Arc<dyn Analyst>) -> Self {
        Self { analyst }
    }
}

#[async_trait]
impl AnalysisTask for CommunicationTask {
    fn name(&self) -> &str {
        names::COMMUNICATION
    }

    async fn analyze(&self, ctx: TaskContext) -> Result<TaskOutput, TaskError> {
        let prompt = build_prompt(&ctx.snapshot);
        let (analysis, confidence) = consult(
            self.analyst.as_ref(),
            AgentRole::Communication,
            ScoreKind::Confidence,
            &prompt,
            &ctx,
        )
        .await?;

        Ok(TaskOutput::new(
            confidence,
            json!({
                "analysis": analysis,
                "audience": audience(&ctx.snapshot),
            }),
        ))
    }
}

/// Stakeholder groups by severity.
fn audience(snapshot: &IncidentSnapshot) -> Vec<&'static str> {
    let mut groups = vec!["on-call engineers", "service owners"];
    if snapshot.facts.severity <= incident_orchestration::Severity::P1 {
        groups.push("engineering leadership");
        groups.push("customer support");
    }
    groups
}

fn build_prompt(snapshot: &IncidentSnapshot) -> String {
    let facts = &snapshot.facts;
    format!(
        "STAKEHOLDER COMMUNICATION - {id}\n\
         \n\
         INCIDENT SUMMARY:\n\
         - Service: {service}\n\
         - Type: {kind}\n\
         - Severity: {severity}\n\
         - Status: {status}\n\
         - Overall Confidence: {overall}\n\
         \n\
         ALL AGENT ANALYSES:\n\
         {analyses}\n\
         \n\
         As a communication expert, provide:\n\
         1. COMMUNICATION CONFIDENCE (0.0-1.0): Confidence in messaging strategy\n\
         2. STAKEHOLDER NOTIFICATIONS: Who should be notified?\n\
         3. MESSAGE CONTENT: What should be communicated?\n\
         4. ESCALATION STRATEGY: When to escalate communications?\n\
         5. FOLLOW-UP PLAN: What follow-up communications are needed?\n\
         6. TRANSPARENCY LEVEL: How much detail to share?\n\
         \n\
         Include a specific communication confidence score.",
        id = facts.incident_id,
        service = facts.affected_service,
        kind = facts.incident_type,
        severity = facts.severity,
        status = snapshot.status,
        overall = snapshot
            .overall_confidence
            .map(|c| format!("{c:.2}"))
            .unwrap_or_else(|| "Unknown".to_string()),
        analyses = combine_analyses(snapshot, ANALYSIS_EXCERPT_CHARS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing;
    use crate::llm::MockAnalyst;

    #[tokio::test]
    async fn communication_plan_is_scored() {
        let mut analyst = MockAnalyst::new();
        analyst
            .expect_complete()
            .withf(|role, prompt| {
                *role == AgentRole::Communication
                    && prompt.contains("STAKEHOLDER COMMUNICATION - INC-TEST-1")
                    && prompt.contains("DIAGNOSTICS ANALYSIS")
            })
            .returning(|_, _| Ok("Communication confidence: 0.9. Notify #payments.".into()));

        let task = CommunicationTask::new(Arc::new(analyst));
        let state = testing::analyzed_state();
        let output = task.analyze(testing::context(&state)).await.unwrap();

        assert_eq!(task.name(), "communication");
        assert_eq!(output.confidence, 0.9);
        assert_eq!(output.payload["audience"].as_array().unwrap().len(), 2);
    }
}
