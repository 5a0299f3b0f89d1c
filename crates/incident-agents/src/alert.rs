//! Turning free-text alerts and generated incidents into `IncidentReport`s.

use anyhow::{anyhow, Context, Result};
use incident_orchestration::{IncidentReport, Severity};
use serde_json::Value;

const KNOWN_SERVICES: [&str; 5] = ["payment", "auth", "user", "order", "notification"];

/// Keyword → incident type, first match wins.
const TYPE_KEYWORDS: [(&[&str], &str); 6] = [
    (&["database", "timeout"], "database_timeout"),
    (&["memory", "leak"], "memory_leak"),
    (&["crash", "down"], "service_crash"),
    (&["cpu", "high"], "high_cpu"),
    (&["network", "connection"], "network_issue"),
    (&["disk", "space"], "disk_full"),
];

pub const UNKNOWN_SERVICE: &str = "unknown-service";
pub const UNKNOWN_TYPE: &str = "unknown_issue";

pub fn extract_service(alert: &str) -> String {
    let lower = alert.to_lowercase();
    KNOWN_SERVICES
        .iter()
        .find(|s| lower.contains(*s))
        .map(|s| format!("{s}-service"))
        .unwrap_or_else(|| UNKNOWN_SERVICE.to_string())
}

pub fn extract_type(alert: &str) -> &'static str {
    let lower = alert.to_lowercase();
    TYPE_KEYWORDS
        .iter()
        .find(|(words, _)| words.iter().any(|w| lower.contains(w)))
        .map(|(_, t)| *t)
        .unwrap_or(UNKNOWN_TYPE)
}

/// Overrides from the command line; `None` means derive from the text.
#[derive(Debug, Clone, Default)]
pub struct AlertOverrides {
    pub severity: Option<Severity>,
    pub service: Option<String>,
    pub incident_type: Option<String>,
}

/// Build a report from alert text. Severity defaults to P2.
pub fn report_from_alert(alert: &str, overrides: &AlertOverrides) -> IncidentReport {
    let service = overrides
        .service
        .clone()
        .unwrap_or_else(|| extract_service(alert));
    let incident_type = overrides
        .incident_type
        .clone()
        .unwrap_or_else(|| extract_type(alert).to_string());
    let severity = overrides.severity.unwrap_or(Severity::P2);

    IncidentReport::new(service, incident_type, severity, alert)
        .with_symptoms(vec![alert.trim().to_string()])
}

/// Build a report from a `/chaos/generate-incident` response.
pub fn report_from_generated(incident: &Value) -> Result<IncidentReport> {
    let field = |key: &str| {
        incident
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("generated incident is missing '{key}'"))
    };

    let severity: Severity = field("severity")?
        .parse()
        .context("generated incident has an unknown severity")?;
    let symptoms = incident
        .get("symptoms")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|s| s.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(IncidentReport::new(
        field("service")?,
        field("type")?,
        severity,
        field("description")?,
    )
    .with_id(field("incident_id")?)
    .with_symptoms(symptoms))
}

/// The four built-in demo scenarios.
pub fn demo_alerts() -> [(&'static str, &'static str); 4] {
    [
        (
            "Database Timeout",
            "Payment API experiencing database connection timeouts and high error rates",
        ),
        (
            "Memory Leak",
            "Auth Service showing memory leak patterns and degraded performance",
        ),
        (
            "Network Issues",
            "Load balancer reporting uneven traffic distribution and connection failures",
        ),
        (
            "Service Crash",
            "Order service crashed with high CPU usage and memory exhaustion",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn service_extraction() {
        assert_eq!(extract_service("Payment API timeouts"), "payment-service");
        assert_eq!(extract_service("AUTH latency"), "auth-service");
        assert_eq!(extract_service("Load balancer flapping"), UNKNOWN_SERVICE);
    }

    #[test]
    fn type_extraction_follows_keyword_order() {
        assert_eq!(extract_type("database connection timeouts"), "database_timeout");
        assert_eq!(extract_type("memory leak in worker"), "memory_leak");
        // memory_leak is checked before service_crash.
        assert_eq!(extract_type("Order service crashed with high CPU usage and memory exhaustion"), "memory_leak");
        assert_eq!(extract_type("node is down"), "service_crash");
        assert_eq!(extract_type("cpu saturated"), "high_cpu");
        assert_eq!(extract_type("uneven traffic and connection failures"), "network_issue");
        assert_eq!(extract_type("no space left on device"), "disk_full");
        assert_eq!(extract_type("something odd"), UNKNOWN_TYPE);
    }

    #[test]
    fn alert_report_defaults_and_overrides() {
        let report = report_from_alert("Payment API database timeouts", &AlertOverrides::default());
        assert_eq!(report.service, "payment-service");
        assert_eq!(report.incident_type, "database_timeout");
        assert_eq!(report.severity, Severity::P2);
        assert_eq!(report.symptoms, vec!["Payment API database timeouts".to_string()]);

        let overrides = AlertOverrides {
            severity: Some(Severity::P0),
            service: Some("billing".into()),
            incident_type: None,
        };
        let report = report_from_alert("Payment API database timeouts", &overrides);
        assert_eq!(report.service, "billing");
        assert_eq!(report.severity, Severity::P0);
    }

    #[test]
    fn generated_incident_parsing() {
        let incident = json!({
            "incident_id": "INC-4821",
            "type": "memory_leak",
            "service": "user-service",
            "severity": "P1",
            "description": "Gradual memory growth",
            "symptoms": ["OOMKilled pods", "GC pauses"],
        });
        let report = report_from_generated(&incident).unwrap();
        assert_eq!(report.incident_id.as_deref(), Some("INC-4821"));
        assert_eq!(report.severity, Severity::P1);
        assert_eq!(report.symptoms.len(), 2);

        assert!(report_from_generated(&json!({ "type": "x" })).is_err());
    }
}
