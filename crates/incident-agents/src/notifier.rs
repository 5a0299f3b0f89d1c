//! Slack delivery through the mock API.

use async_trait::async_trait;
use incident_orchestration::{
    Notification, NotificationAck, NotificationKind, NotificationSender, NotifyError,
};
use serde_json::Value;

use crate::data_sources::{ApiError, MockApiClient};

pub struct SlackNotifier {
    client: MockApiClient,
    channel: String,
}

impl SlackNotifier {
    pub fn new(client: MockApiClient, channel: impl Into<String>) -> Self {
        Self {
            client,
            channel: channel.into(),
        }
    }
}

/// Slack message body for a notification.
pub fn render_message(notification: &Notification) -> String {
    let headline = match notification.kind {
        NotificationKind::ResolutionReport => "✅ Incident resolved",
        NotificationKind::EscalationReport => "🚨 Incident escalated",
    };
    let mut message = format!("{headline}: {}", notification.summary);

    if let Some(plan) = &notification.plan {
        let analysis = plan
            .get("analysis")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(analysis) = analysis {
            message.push_str("\n\n");
            message.push_str(analysis);
        }
    }
    message
}

#[async_trait]
impl NotificationSender for SlackNotifier {
    async fn send(&self, notification: &Notification) -> Result<NotificationAck, NotifyError> {
        let message = render_message(notification);
        let severity = notification.severity.to_string();

        let response = self
            .client
            .send_slack(&self.channel, &message, &severity)
            .await
            .map_err(|e| match e {
                ApiError::Transport { .. } | ApiError::Status { .. } => {
                    NotifyError::Unavailable(e.to_string())
                }
                ApiError::Decode { .. } | ApiError::Rejected { .. } => {
                    NotifyError::Rejected(e.to_string())
                }
            })?;

        let message_id = ["message_id", "ts"]
            .iter()
            .find_map(|key| response.get(*key))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });

        Ok(NotificationAck {
            channel: self.channel.clone(),
            message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use incident_orchestration::{EscalationReason, IncidentStatus, Severity};
    use serde_json::json;
    use std::time::Duration;

    fn escalation() -> Notification {
        Notification {
            incident_id: "INC-7".into(),
            kind: NotificationKind::EscalationReport,
            severity: Severity::P0,
            status: IncidentStatus::Escalated,
            summary: "P0 INC-7 on auth-service escalated: critical severity".into(),
            escalation_reason: Some(EscalationReason::CriticalSeverity),
            plan: Some(json!({ "analysis": "Page the on-call DBA.\n" })),
        }
    }

    #[test]
    fn message_includes_plan_analysis() {
        let message = render_message(&escalation());
        assert!(message.starts_with("🚨 Incident escalated: P0 INC-7"));
        assert!(message.ends_with("Page the on-call DBA."));

        let mut bare = escalation();
        bare.plan = None;
        assert!(!render_message(&bare).contains('\n'));
    }

    #[tokio::test]
    async fn unreachable_slack_is_unavailable() {
        let client = MockApiClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let notifier = SlackNotifier::new(client, "#incidents");
        let err = notifier.send(&escalation()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Unavailable(_)));
    }
}
