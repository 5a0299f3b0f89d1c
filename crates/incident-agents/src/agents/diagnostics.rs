//! Diagnostics: cluster pod status and active alerts.

use std::sync::Arc;

use async_trait::async_trait;
use incident_orchestration::task::names;
use incident_orchestration::{AnalysisTask, IncidentSnapshot, TaskContext, TaskError, TaskOutput};
use serde_json::{json, Value};

use super::{consult, show};
use crate::data_sources::{system_health, DataSource, SystemHealth};
use crate::llm::{AgentRole, Analyst};
use crate::scoring::ScoreKind;

const LISTED_PER_SECTION: usize = 3;

pub struct DiagnosticsTask {
    analyst: Arc<dyn Analyst>,
    data_source: Arc<dyn DataSource>,
}

impl DiagnosticsTask {
    pub fn new(analyst: Arc<dyn Analyst>, data_source: Arc<dyn DataSource>) -> Self {
        Self {
            analyst,
            data_source,
        }
    }
}

#[async_trait]
impl AnalysisTask for DiagnosticsTask {
    fn name(&self) -> &str {
        names::DIAGNOSTICS
    }

    async fn analyze(&self, ctx: TaskContext) -> Result<TaskOutput, TaskError> {
        let health = system_health(self.data_source.as_ref()).await;
        let prompt = build_prompt(&ctx.snapshot, &health);

        let (analysis, health_score) = consult(
            self.analyst.as_ref(),
            AgentRole::Diagnostics,
            ScoreKind::Health,
            &prompt,
            &ctx,
        )
        .await?;

        Ok(TaskOutput::new(
            health_score,
            json!({
                "analysis": analysis,
                "system_data": health,
            }),
        ))
    }
}

fn build_prompt(snapshot: &IncidentSnapshot, health: &SystemHealth) -> String {
    let facts = &snapshot.facts;
    format!(
        "SYSTEM DIAGNOSTICS - {id}\n\
         \n\
         INCIDENT CONTEXT:\n\
         - Service: {service}\n\
         - Type: {kind}\n\
         - Current Status: {status}\n\
         \n\
         SYSTEM DATA COLLECTED:\n\
         {data}\n\
         \n\
         As a senior system diagnostics engineer, provide:\n\
         1. SYSTEM HEALTH SCORE (0.0-1.0): Overall system health\n\
         2. RESOURCE ANALYSIS: CPU, memory, disk, network status\n\
         3. COMPONENT HEALTH: Status of all system components\n\
         4. BOTTLENECK IDENTIFICATION: Where are the constraints?\n\
         5. STABILITY ASSESSMENT: How stable is the system?\n\
         6. INFRASTRUCTURE vs APPLICATION: Root cause location\n\
         7. SCALING RECOMMENDATIONS: Should we scale resources?\n\
         \n\
         Provide specific technical recommendations.",
        id = facts.incident_id,
        service = facts.affected_service,
        kind = facts.incident_type,
        status = snapshot.status,
        data = format_system(health),
    )
}

fn format_system(health: &SystemHealth) -> String {
    let mut lines = Vec::new();

    if health.kubernetes.is_available() {
        lines.push("KUBERNETES STATUS:".to_string());
        let pods = health
            .kubernetes
            .get("pods")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if !pods.is_empty() {
            let is_running = |p: &Value| p.get("status").and_then(Value::as_str) == Some("Running");
            let running = pods.iter().filter(|p| is_running(p)).count();
            lines.push(format!("- Pods: {running}/{} running", pods.len()));

            let problems: Vec<&Value> = pods.iter().filter(|p| !is_running(p)).collect();
            if !problems.is_empty() {
                lines.push("- Problem pods:".to_string());
                for pod in problems.iter().take(LISTED_PER_SECTION) {
                    lines.push(format!(
                        "  • {}: {}",
                        show(pod.get("name")),
                        show(pod.get("status"))
                    ));
                }
            }
        }
    }

    if health.alerts.is_available() {
        lines.push("PROMETHEUS ALERTS:".to_string());
        let alerts = health
            .alerts
            .get("alerts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if alerts.is_empty() {
            lines.push("- No active alerts".to_string());
        } else {
            lines.push(format!("- Active alerts: {}", alerts.len()));
            for alert in alerts.iter().take(LISTED_PER_SECTION) {
                lines.push(format!(
                    "  • {}: {}",
                    show(alert.get("alertname")),
                    show(alert.get("severity"))
                ));
            }
        }
    }

    if lines.is_empty() {
        "No system data available".to_string()
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

    fn health() -> SystemHealth {
        SystemHealth {
            kubernetes: Evidence::full(
                "kubernetes",
                json!({ "pods": [
                    { "name": "payment-7f9c", "status": "Running" },
                    { "name": "payment-2b1d", "status": "CrashLoopBackOff" },
                    { "name": "payment-9e0a", "status": "Running" },
                ]}),
            ),
            alerts: Evidence::full("alerts", json!({ "alerts": [] })),
        }
    }

    #[test]
    fn pods_and_alerts_are_summarized() {
        let text = format_system(&health());
        assert!(text.contains("- Pods: 2/3 running"));
        assert!(text.contains("  • payment-2b1d: CrashLoopBackOff"));
        assert!(text.contains("- No active alerts"));
    }

    #[tokio::test]
    async fn health_score_becomes_confidence() {
        let mut source = MockDataSource::new();
        source.expect_pods().returning(|| health().kubernetes);
        source
            .expect_alerts()
            .returning(|| Evidence::unavailable("alerts", "HTTP 500"));

        let mut analyst = MockAnalyst::new();
        analyst
            .expect_complete()
            .withf(|role, prompt| {
                *role == AgentRole::Diagnostics
                    && prompt.contains("Current Status: Created")
                    && !prompt.contains("PROMETHEUS ALERTS")
            })
            .returning(|_, _| Ok("System health score: 0.4, one pod crash looping.".into()));

        let task = DiagnosticsTask::new(Arc::new(analyst), Arc::new(source));
        let state = testing::state();
        let output = task.analyze(testing::context(&state)).await.unwrap();
        assert_eq!(output.confidence, 0.4);
        assert_eq!(output.payload["system_data"]["alerts"]["level"], "unavailable");
    }
}
