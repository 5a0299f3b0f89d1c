//! Responder configuration: AI endpoint, mock DevOps API, notification channel.

use std::time::Duration;

use anyhow::{Context, Result};
use incident_orchestration::{WorkflowConfig, WorkflowError, WorkflowResult};
use rig::providers::openai;

/// Gemini's OpenAI-compatible endpoint.
pub const DEFAULT_AI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_MOCK_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_CHANNEL: &str = "#incidents";

#[derive(Debug, Clone)]
pub struct ResponderConfig {
    pub ai_base_url: String,
    pub api_key: String,
    pub model: String,
    pub mock_api_base_url: String,
    /// Timeout for each mock API call.
    pub data_source_timeout: Duration,
    pub log_level: String,
    pub channel: String,
    /// Retries for transient AI endpoint errors.
    pub ai_max_retries: u32,
    pub workflow: WorkflowConfig,
}

impl ResponderConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let workflow = WorkflowConfig::from_lookup(&lookup)?;
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let timeout_secs: u64 = get("DATA_SOURCE_TIMEOUT_SECS", "10")
            .trim()
            .parse()
            .context("DATA_SOURCE_TIMEOUT_SECS must be a whole number of seconds")?;
        let ai_max_retries: u32 = get("AI_MAX_RETRIES", "2")
            .trim()
            .parse()
            .context("AI_MAX_RETRIES must be a non-negative integer")?;

        Ok(Self {
            ai_base_url: get("AI_BASE_URL", DEFAULT_AI_BASE_URL),
            api_key: get("GEMINI_API_KEY", ""),
            model: get("GEMINI_MODEL", DEFAULT_MODEL),
            mock_api_base_url: get("MOCK_API_BASE_URL", DEFAULT_MOCK_API_BASE_URL),
            data_source_timeout: Duration::from_secs(timeout_secs),
            log_level: get("LOG_LEVEL", "info"),
            channel: get("INCIDENT_CHANNEL", DEFAULT_CHANNEL),
            ai_max_retries,
            workflow,
        })
    }

    pub fn validate(&self) -> WorkflowResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(WorkflowError::config(
                "GEMINI_API_KEY is required. Set the GEMINI_API_KEY environment variable.",
            ));
        }
        if self.data_source_timeout.is_zero() {
            return Err(WorkflowError::config(
                "DATA_SOURCE_TIMEOUT_SECS must be non-zero",
            ));
        }
        self.workflow.validate()
    }

    /// Build the OpenAI-compatible completions client for the AI endpoint.
    pub fn ai_client(&self) -> Result<openai::CompletionsClient> {
        openai::CompletionsClient::builder()
            .api_key(&self.api_key)
            .base_url(&self.ai_base_url)
            .build()
            .context("Failed to build AI completions client")
    }

    /// Human-readable configuration, API key masked.
    pub fn status_lines(&self) -> Vec<String> {
        let wf = &self.workflow;
        vec![
            format!("AI endpoint:            {}", self.ai_base_url),
            format!("Model:                  {}", self.model),
            format!("API key:                {}", mask_secret(&self.api_key)),
            format!("Mock API:               {}", self.mock_api_base_url),
            format!(
                "Data source timeout:    {}s",
                self.data_source_timeout.as_secs()
            ),
            format!("Notification channel:   {}", self.channel),
            format!("Log level:              {}", self.log_level),
            format!(
                "Auto-remediation bar:   {:.2}",
                wf.auto_remediation_confidence_threshold
            ),
            format!(
                "Remediation bar:        {:.2}",
                wf.remediation_confidence_threshold
            ),
            format!("Max mitigation attempts: {}", wf.max_retries),
            format!("Task timeout:           {}s", wf.per_task_timeout.as_secs()),
            format!("Batch deadline:         {}s", wf.batch_deadline.as_secs()),
            format!("Mitigation timeout:     {}s", wf.mitigation_timeout.as_secs()),
            format!("Max parallel incidents: {}", wf.max_parallel_incidents),
        ]
    }
}

fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => "(not set)".to_string(),
        n if n <= 8 => "*".repeat(n),
        n => format!(
            "{}{}{}",
            chars[..4].iter().collect::<String>(),
            "*".repeat(n - 8),
            chars[n - 4..].iter().collect::<String>()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ResponderConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.mock_api_base_url, DEFAULT_MOCK_API_BASE_URL);
        assert_eq!(config.channel, "#incidents");
        assert_eq!(config.data_source_timeout, Duration::from_secs(10));
        assert_eq!(config.workflow, WorkflowConfig::default());
    }

    #[test]
    fn missing_api_key_fails_validation() {
        let config = ResponderConfig::from_lookup(lookup(&[])).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, WorkflowError::Configuration(_)));
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let config =
            ResponderConfig::from_lookup(lookup(&[("GEMINI_API_KEY", "abcdefghijkl")])).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn workflow_settings_flow_through() {
        let config = ResponderConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "k"),
            ("AUTO_REMEDIATION_THRESHOLD", "0.8"),
            ("MOCK_API_BASE_URL", "http://mock:9000"),
        ]))
        .unwrap();
        assert_eq!(config.workflow.auto_remediation_confidence_threshold, 0.8);
        assert_eq!(config.mock_api_base_url, "http://mock:9000");
    }

    #[test]
    fn bad_timeout_is_rejected() {
        assert!(
            ResponderConfig::from_lookup(lookup(&[("DATA_SOURCE_TIMEOUT_SECS", "soon")])).is_err()
        );
    }

    #[test]
    fn status_masks_key() {
        let config =
            ResponderConfig::from_lookup(lookup(&[("GEMINI_API_KEY", "AIzaSECRETSECRET1234")]))
                .unwrap();
        let status = config.status_lines().join("\n");
        assert!(status.contains("AIza"));
        assert!(status.contains("1234"));
        assert!(!status.contains("SECRETSECRET"));
        assert_eq!(mask_secret(""), "(not set)");
    }
}
