//! Historical: similar past incidents and paging history.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use incident_orchestration::task::names;
use incident_orchestration::{AnalysisTask, IncidentFacts, TaskContext, TaskError, TaskOutput};
use serde_json::{json, Value};

use super::{consult, show};
use crate::data_sources::{historical_data, DataSource, HistoricalData};
use crate::llm::{AgentRole, Analyst};
use crate::scoring::ScoreKind;

const LISTED_PER_SECTION: usize = 3;

pub struct HistoricalTask {
    analyst: Arc<dyn Analyst>,
    data_source: Arc<dyn DataSource>,
}

impl HistoricalTask {
    pub fn new(analyst: Arc<dyn Analyst>, data_source: Arc<dyn DataSource>) -> Self {
        Self {
            analyst,
            data_source,
        }
    }
}

#[async_trait]
impl AnalysisTask for HistoricalTask {
    fn name(&self) -> &str {
        names::HISTORICAL
    }

    async fn analyze(&self, ctx: TaskContext) -> Result<TaskOutput, TaskError> {
        let facts = &ctx.snapshot.facts;
        let data = historical_data(
            self.data_source.as_ref(),
            &facts.incident_type,
            &facts.affected_service,
        )
        .await;
        let prompt = build_prompt(facts, &data);

        let (analysis, pattern_confidence) = consult(
            self.analyst.as_ref(),
            AgentRole::Historical,
            ScoreKind::Pattern,
            &prompt,
            &ctx,
        )
        .await?;

        Ok(TaskOutput::new(
            pattern_confidence,
            json!({
                "analysis": analysis,
                "historical_data": data,
            }),
        ))
    }
}

fn build_prompt(facts: &IncidentFacts, data: &HistoricalData) -> String {
    format!(
        "HISTORICAL PATTERN ANALYSIS - {id}\n\
         \n\
         CURRENT INCIDENT:\n\
         - Service: {service}\n\
         - Type: {kind}\n\
         - Severity: {severity}\n\
         - Symptoms: {symptoms}\n\
         \n\
         HISTORICAL DATA:\n\
         {data}\n\
         \n\
         As a senior historical analysis specialist, provide:\n\
         1. PATTERN MATCH CONFIDENCE (0.0-1.0): How similar are historical incidents?\n\
         2. SIMILAR INCIDENTS: List of most relevant past incidents\n\
         3. SOLUTION SUCCESS RATES: Historical success rates for each solution\n\
         4. RECOMMENDED SOLUTION: Best solution based on history\n\
         5. RISK ASSESSMENT: Risks of recommended solutions\n\
         6. TIME TO RESOLUTION: Expected resolution time\n\
         7. LESSONS LEARNED: Key insights from past incidents\n\
         \n\
         Focus on actionable recommendations with success probabilities.",
        id = facts.incident_id,
        service = facts.affected_service,
        kind = facts.incident_type,
        severity = facts.severity,
        symptoms = facts.symptoms.join(", "),
        data = format_history(data),
    )
}

fn format_history(data: &HistoricalData) -> String {
    let mut lines = Vec::new();

    if data.similar_incidents.is_available() {
        lines.push("SIMILAR INCIDENTS:".to_string());
        let incidents = data
            .similar_incidents
            .get("similar_incidents")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if incidents.is_empty() {
            lines.push("- No similar incidents found".to_string());
        } else {
            lines.push(format!("- Found {} similar incidents", incidents.len()));
            for (i, incident) in incidents.iter().take(LISTED_PER_SECTION).enumerate() {
                let summary = incident
                    .get("summary")
                    .map(|v| show(Some(v)))
                    .unwrap_or_else(|| format!("Incident {}", i + 1));
                lines.push(format!("  • {summary}"));
                lines.push(format!("    Resolution: {}", show(incident.get("resolution"))));
                lines.push(format!("    Success: {}", show(incident.get("success_rate"))));
            }
        }
    } else {
        lines.push("SIMILAR INCIDENTS: Data unavailable".to_string());
    }

    if data.pagerduty_history.is_available() {
        lines.push("PAGERDUTY HISTORY:".to_string());
        let incidents = data
            .pagerduty_history
            .get("incidents")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if incidents.is_empty() {
            lines.push("- No historical incidents found".to_string());
        } else {
            lines.push(format!("- Historical incidents: {}", incidents.len()));

            let mut by_service: BTreeMap<String, usize> = BTreeMap::new();
            for incident in incidents {
                *by_service.entry(show(incident.get("service"))).or_default() += 1;
            }
            lines.push("- By service:".to_string());
            for (service, count) in by_service.iter().take(LISTED_PER_SECTION) {
                lines.push(format!("  • {service}: {count} incidents"));
            }
        }
    } else {
        lines.push("PAGERDUTY HISTORY: Data unavailable".to_string());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing;
    use crate::data_sources::{Evidence, MockDataSource};
    use crate::llm::MockAnalyst;

    #[test]
    fn history_lists_incidents_and_groups_pages() {
        let data = HistoricalData {
            similar_incidents: Evidence::full(
                "similar_incidents",
                json!({ "similar_incidents": [
                    { "summary": "DB pool exhausted", "resolution": "Raised pool size", "success_rate": 0.9 },
                    { "resolution": "Restarted pods" },
                ]}),
            ),
            pagerduty_history: Evidence::full(
                "pagerduty_history",
                json!({ "incidents": [
                    { "service": "payment-service" },
                    { "service": "payment-service" },
                    { "service": "auth-service" },
                ]}),
            ),
        };
        let text = format_history(&data);
        assert!(text.contains("- Found 2 similar incidents"));
        assert!(text.contains("  • DB pool exhausted"));
        assert!(text.contains("  • Incident 2"));
        assert!(text.contains("    Success: 0.9"));
        assert!(text.contains("  • payment-service: 2 incidents"));
        assert!(text.contains("  • auth-service: 1 incidents"));
    }

    #[test]
    fn missing_history_is_marked_unavailable() {
        let data = HistoricalData {
            similar_incidents: Evidence::unavailable("similar_incidents", "down"),
            pagerduty_history: Evidence::unavailable("pagerduty_history", "down"),
        };
        let text = format_history(&data);
        assert!(text.contains("SIMILAR INCIDENTS: Data unavailable"));
        assert!(text.contains("PAGERDUTY HISTORY: Data unavailable"));
    }

    #[tokio::test]
    async fn queries_by_type_and_service() {
        let mut source = MockDataSource::new();
        source
            .expect_similar_incidents()
            .withf(|kind, service| kind == "database_timeout" && service == "payment-service")
            .returning(|_, _| Evidence::full("similar_incidents", json!({ "similar_incidents": [] })));
        source
            .expect_pagerduty_history()
            .returning(|| Evidence::full("pagerduty_history", json!({ "incidents": [] })));

        let mut analyst = MockAnalyst::new();
        analyst
            .expect_complete()
            .withf(|role, _| *role == AgentRole::Historical)
            .returning(|_, _| Ok("Pattern match confidence: 0.3 (no close matches)".into()));

        let task = HistoricalTask::new(Arc::new(analyst), Arc::new(source));
        let state = testing::state();
        let output = task.analyze(testing::context(&state)).await.unwrap();
        assert_eq!(task.name(), "historical");
        assert_eq!(output.confidence, 0.3);
    }
}
