//! DevOps data sources behind the mock API: logs, metrics, pods, alerts,
//! incident history, Slack, and chaos incident generation.
//!
//! # Degraded mode
//!
//! ```text
//! GET /prometheus/metrics/{svc}
//!   ├─ 2xx JSON → Evidence { level: Full, data }
//!   └─ error    → Evidence { level: Unavailable, warning }
//! ```
//!
//! A missing upstream never fails an analysis task on its own; the task
//! reports what it could gather and the analyst works with less.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// How much of a data source was reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    Full,
    Unavailable,
}

/// One item of gathered evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub source: String,
    pub level: DegradationLevel,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub collected_at: DateTime<Utc>,
}

impl Evidence {
    pub fn full(source: &str, data: Value) -> Self {
        Self {
            source: source.to_string(),
            level: DegradationLevel::Full,
            data,
            warning: None,
            collected_at: Utc::now(),
        }
    }

    pub fn unavailable(source: &str, warning: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            level: DegradationLevel::Unavailable,
            data: Value::Null,
            warning: Some(warning.into()),
            collected_at: Utc::now(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.level == DegradationLevel::Full
    }

    /// Field lookup that yields `None` for unavailable evidence.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.is_available().then(|| self.data.get(key)).flatten()
    }
}

/// Read-only telemetry and history queries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn service_logs(&self, service: &str) -> Evidence;
    async fn service_metrics(&self, service: &str) -> Evidence;
    async fn pods(&self) -> Evidence;
    async fn alerts(&self) -> Evidence;
    async fn similar_incidents(&self, incident_type: &str, service: &str) -> Evidence;
    async fn pagerduty_history(&self) -> Evidence;
}

#[derive(Debug, Clone, Serialize)]
pub struct InvestigationData {
    pub logs: Evidence,
    pub metrics: Evidence,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub kubernetes: Evidence,
    pub alerts: Evidence,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoricalData {
    pub similar_incidents: Evidence,
    pub pagerduty_history: Evidence,
}

/// Service logs and metrics, fetched concurrently.
pub async fn investigation_data(source: &dyn DataSource, service: &str) -> InvestigationData {
    let (logs, metrics) = tokio::join!(source.service_logs(service), source.service_metrics(service));
    InvestigationData { logs, metrics }
}

/// Pod status and active alerts, fetched concurrently.
pub async fn system_health(source: &dyn DataSource) -> SystemHealth {
    let (kubernetes, alerts) = tokio::join!(source.pods(), source.alerts());
    SystemHealth { kubernetes, alerts }
}

/// Similar incidents and paging history, fetched concurrently.
pub async fn historical_data(
    source: &dyn DataSource,
    incident_type: &str,
    service: &str,
) -> HistoricalData {
    let (similar_incidents, pagerduty_history) = tokio::join!(
        source.similar_incidents(incident_type, service),
        source.pagerduty_history()
    );
    HistoricalData {
        similar_incidents,
        pagerduty_history,
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("{endpoint} returned invalid JSON: {message}")]
    Decode { endpoint: String, message: String },

    #[error("{endpoint} reported failure: {message}")]
    Rejected { endpoint: String, message: String },
}

/// HTTP client for the mock DevOps API server.
#[derive(Clone)]
pub struct MockApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl MockApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build mock API HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        debug!(endpoint, "GET mock API");
        let response = self
            .http
            .get(self.url(endpoint))
            .query(query)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
        decode(endpoint, response).await
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError> {
        debug!(endpoint, "POST mock API");
        let response = self
            .http
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
        decode(endpoint, response).await
    }

    async fn evidence(&self, source: &str, endpoint: &str, query: &[(&str, &str)]) -> Evidence {
        match self.get(endpoint, query).await {
            Ok(data) => Evidence::full(source, data),
            Err(e) => {
                warn!(source, error = %e, "Data source unavailable");
                Evidence::unavailable(source, e.to_string())
            }
        }
    }

    /// Post a message to a Slack channel.
    pub async fn send_slack(
        &self,
        channel: &str,
        message: &str,
        severity: &str,
    ) -> Result<Value, ApiError> {
        let body = json!({
            "channel": channel,
            "message": message,
            "severity": severity,
        });
        self.post("/slack/notify", &body).await
    }

    /// Ask the chaos endpoint for a fresh incident of `scenario` type.
    pub async fn generate_incident(&self, scenario: Option<&str>) -> Result<Value, ApiError> {
        let body = match scenario {
            Some(s) => json!({ "scenario_type": s }),
            None => json!({}),
        };
        self.post("/chaos/generate-incident", &body).await
    }

    /// Mark an incident resolved. Fails when the server reports `success: false`.
    pub async fn resolve_incident(
        &self,
        incident_id: &str,
        method: &str,
        details: Value,
    ) -> Result<Value, ApiError> {
        let endpoint = format!("/chaos/resolve-incident/{incident_id}");
        let body = json!({
            "resolution_method": method,
            "ai_performance_data": details,
        });
        let response = self.post(&endpoint, &body).await?;
        check_success(&endpoint, response)
    }
}

async fn decode(endpoint: &str, response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }
    response.json().await.map_err(|e| ApiError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

/// The mock server signals application errors in-band.
fn check_success(endpoint: &str, response: Value) -> Result<Value, ApiError> {
    if response.get("success").and_then(Value::as_bool) == Some(false) {
        let message = response
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unspecified error")
            .to_string();
        return Err(ApiError::Rejected {
            endpoint: endpoint.to_string(),
            message,
        });
    }
    Ok(response)
}

#[async_trait]
impl DataSource for MockApiClient {
    async fn service_logs(&self, service: &str) -> Evidence {
        self.evidence("logs", &format!("/elasticsearch/logs/{service}"), &[("hours", "1")])
            .await
    }

    async fn service_metrics(&self, service: &str) -> Evidence {
        self.evidence(
            "metrics",
            &format!("/prometheus/metrics/{service}"),
            &[("duration", "1h")],
        )
        .await
    }

    async fn pods(&self) -> Evidence {
        self.evidence("kubernetes", "/kubernetes/pods", &[("namespace", "default")])
            .await
    }

    async fn alerts(&self) -> Evidence {
        self.evidence("alerts", "/prometheus/alerts", &[("state", "active")])
            .await
    }

    async fn similar_incidents(&self, incident_type: &str, service: &str) -> Evidence {
        self.evidence(
            "similar_incidents",
            "/jira/incidents/similar",
            &[("error_type", incident_type), ("service", service)],
        )
        .await
    }

    async fn pagerduty_history(&self) -> Evidence {
        self.evidence(
            "pagerduty_history",
            "/pagerduty/incidents",
            &[("status", "open")],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_evidence_hides_fields() {
        let e = Evidence::unavailable("metrics", "connection refused");
        assert!(!e.is_available());
        assert!(e.get("cpu_usage").is_none());
        assert_eq!(e.warning.as_deref(), Some("connection refused"));

        let e = Evidence::full("metrics", json!({ "cpu_usage": 92.5 }));
        assert_eq!(e.get("cpu_usage"), Some(&json!(92.5)));
    }

    #[test]
    fn in_band_failure_is_rejected() {
        let err = check_success(
            "/chaos/resolve-incident/INC-1",
            json!({ "success": false, "error": "Incident INC-1 not found or already resolved" }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not found"));

        assert!(check_success("/x", json!({ "success": true })).is_ok());
        assert!(check_success("/x", json!({ "status": "sent" })).is_ok());
    }

    #[tokio::test]
    async fn unreachable_server_degrades_instead_of_failing() {
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let client = MockApiClient::new("http://127.0.0.1:9/", Duration::from_millis(500)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9");

        let data = investigation_data(&client, "payment-service").await;
        assert_eq!(data.logs.level, DegradationLevel::Unavailable);
        assert_eq!(data.metrics.level, DegradationLevel::Unavailable);
    }

    #[tokio::test]
    async fn helpers_gather_from_trait() {
        let mut source = MockDataSource::new();
        source
            .expect_pods()
            .returning(|| Evidence::full("kubernetes", json!({ "pods": [] })));
        source
            .expect_alerts()
            .returning(|| Evidence::unavailable("alerts", "503"));

        let health = system_health(&source).await;
        assert!(health.kubernetes.is_available());
        assert!(!health.alerts.is_available());
    }
}
