//! Detective: logs and metrics for the affected service.

use std::sync::Arc;

use async_trait::async_trait;
use incident_orchestration::task::names;
use incident_orchestration::{AnalysisTask, IncidentFacts, TaskContext, TaskError, TaskOutput};
use serde_json::{json, Value};

use super::{consult, show};
use crate::data_sources::{investigation_data, DataSource, InvestigationData};
use crate::llm::{AgentRole, Analyst};
use crate::scoring::ScoreKind;

pub struct DetectiveTask {
    analyst: Arc<dyn Analyst>,
    data_source: Arc<dyn DataSource>,
}

impl DetectiveTask {
    pub fn new(analyst: Arc<dyn Analyst>, data_source: Arc<dyn DataSource>) -> Self {
        Self {
            analyst,
            data_source,
        }
    }
}

#[async_trait]
impl AnalysisTask for DetectiveTask {
    fn name(&self) -> &str {
        names::DETECTIVE
    }

    async fn analyze(&self, ctx: TaskContext) -> Result<TaskOutput, TaskError> {
        let facts = &ctx.snapshot.facts;
        let data = investigation_data(self.data_source.as_ref(), &facts.affected_service).await;
        let prompt = build_prompt(facts, &data);

        let (analysis, confidence) = consult(
            self.analyst.as_ref(),
            AgentRole::Detective,
            ScoreKind::Confidence,
            &prompt,
            &ctx,
        )
        .await?;

        Ok(TaskOutput::new(
            confidence,
            json!({
                "analysis": analysis,
                "investigation_data": data,
            }),
        ))
    }
}

pub(crate) fn build_prompt(facts: &IncidentFacts, data: &InvestigationData) -> String {
    format!(
        "INCIDENT INVESTIGATION - {id}\n\
         \n\
         BASIC INCIDENT DATA:\n\
         - Service: {service}\n\
         - Type: {kind}\n\
         - Severity: {severity}\n\
         - Description: {description}\n\
         - Symptoms: {symptoms}\n\
         \n\
         INVESTIGATION DATA GATHERED:\n\
         {data}\n\
         \n\
         As a senior incident detective, provide:\n\
         1. CONFIDENCE SCORE (0.0-1.0): How confident are you this is a genuine incident?\n\
         2. ROOT CAUSE ANALYSIS: What is the most likely root cause?\n\
         3. SEVERITY ASSESSMENT: Is the current severity appropriate?\n\
         4. IMPACT ANALYSIS: What systems/users are affected?\n\
         5. URGENCY LEVEL: How quickly must this be resolved?\n\
         6. KEY EVIDENCE: What evidence supports your conclusions?\n\
         \n\
         Be decisive and provide specific confidence scores.",
        id = facts.incident_id,
        service = facts.affected_service,
        kind = facts.incident_type,
        severity = facts.severity,
        description = facts.description,
        symptoms = facts.symptoms.join(", "),
        data = format_investigation(data),
    )
}

fn format_investigation(data: &InvestigationData) -> String {
    let mut lines = Vec::new();

    if data.logs.is_available() {
        let logs = &data.logs.data;
        let summary = logs.get("summary");
        let count = |key: &str| summary.and_then(|s| s.get(key)).and_then(Value::as_u64);
        lines.push("LOGS ANALYSIS:".to_string());
        lines.push(format!(
            "- Total logs: {}",
            logs.get("total_logs").and_then(Value::as_u64).unwrap_or(0)
        ));
        lines.push(format!("- Error count: {}", count("error_count").unwrap_or(0)));
        lines.push(format!("- Warning count: {}", count("warning_count").unwrap_or(0)));

        if let Some(errors) = logs.get("top_errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                lines.push("- Top errors:".to_string());
                for error in errors.iter().take(2) {
                    lines.push(format!(
                        "  • {}: {} occurrences",
                        show(error.get("message")),
                        error.get("count").and_then(Value::as_u64).unwrap_or(0)
                    ));
                }
            }
        }
    }

    if data.metrics.is_available() {
        let metrics = &data.metrics;
        lines.push("METRICS ANALYSIS:".to_string());
        lines.push(format!("- Service health: {}", show(metrics.get("health_score"))));
        lines.push(format!("- CPU usage: {}", show(metrics.get("cpu_usage"))));
        lines.push(format!("- Memory usage: {}", show(metrics.get("memory_usage"))));
        lines.push(format!("- Request rate: {}", show(metrics.get("request_rate"))));
    }

    if lines.is_empty() {
        "No investigation data available".to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing;
    use crate::data_sources::{Evidence, MockDataSource};
    use crate::llm::MockAnalyst;

    fn data_source() -> MockDataSource {
        let mut source = MockDataSource::new();
        source
            .expect_service_logs()
            .withf(|service| service == "payment-service")
            .returning(|_| {
                Evidence::full(
                    "logs",
                    json!({
                        "total_logs": 1200,
                        "summary": { "error_count": 340, "warning_count": 55 },
                        "top_errors": [
                            { "message": "Connection timeout to payment-db", "count": 210 },
                            { "message": "Pool exhausted", "count": 90 },
                            { "message": "Slow query", "count": 40 },
                        ],
                    }),
                )
            });
        source
            .expect_service_metrics()
            .returning(|_| Evidence::unavailable("metrics", "HTTP 503"));
        source
    }

    #[tokio::test]
    async fn analyzes_with_gathered_evidence() {
        let mut analyst = MockAnalyst::new();
        analyst
            .expect_complete()
            .withf(|role, prompt| {
                *role == AgentRole::Detective
                    && prompt.contains("INCIDENT INVESTIGATION - INC-TEST-1")
                    && prompt.contains("- Error count: 340")
                    && prompt.contains("Connection timeout to payment-db: 210 occurrences")
                    && !prompt.contains("Slow query")
                    && !prompt.contains("METRICS ANALYSIS")
            })
            .returning(|_, _| Ok("Root cause: pool exhaustion. Confidence score: 0.82".into()));

        let task = DetectiveTask::new(Arc::new(analyst), Arc::new(data_source()));
        let state = testing::state();
        let output = task.analyze(testing::context(&state)).await.unwrap();

        assert_eq!(task.name(), "detective");
        assert_eq!(output.confidence, 0.82);
        assert_eq!(
            output.payload["investigation_data"]["metrics"]["level"],
            "unavailable"
        );
    }

    #[tokio::test]
    async fn unscored_answer_is_a_parse_failure() {
        let mut analyst = MockAnalyst::new();
        analyst
            .expect_complete()
            .returning(|_, _| Ok("Restart the pods.".into()));

        let task = DetectiveTask::new(Arc::new(analyst), Arc::new(data_source()));
        let state = testing::state();
        let err = task.analyze(testing::context(&state)).await.unwrap_err();
        assert!(matches!(err, TaskError::Parse(_)));
    }

    #[test]
    fn empty_evidence_is_called_out() {
        let data = InvestigationData {
            logs: Evidence::unavailable("logs", "down"),
            metrics: Evidence::unavailable("metrics", "down"),
        };
        assert_eq!(format_investigation(&data), "No investigation data available");
    }
}
