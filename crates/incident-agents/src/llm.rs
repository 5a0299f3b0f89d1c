//! AI analyst seam: one rig agent per role over an OpenAI-compatible endpoint.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use tracing::{debug, warn};

use crate::config::ResponderConfig;

pub type OaiAgent = Agent<openai::completion::CompletionModel>;

/// The six analyst personas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Detective,
    Diagnostics,
    Historical,
    Remediation,
    Communication,
    Postmortem,
}

impl AgentRole {
    pub const ALL: [AgentRole; 6] = [
        Self::Detective,
        Self::Diagnostics,
        Self::Historical,
        Self::Remediation,
        Self::Communication,
        Self::Postmortem,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Detective => "detective",
            Self::Diagnostics => "diagnostics",
            Self::Historical => "historical",
            Self::Remediation => "remediation",
            Self::Communication => "communication",
            Self::Postmortem => "postmortem",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Detective => "Senior Incident Detective",
            Self::Diagnostics => "Senior System Diagnostics Engineer",
            Self::Historical => "Senior Historical Analysis Specialist",
            Self::Remediation => "Senior Auto-Remediation Engineer",
            Self::Communication => "Senior Communication Coordinator",
            Self::Postmortem => "Senior Post-Mortem Analyst",
        }
    }

    fn goal(self) -> &'static str {
        match self {
            Self::Detective => "Detect and analyze incidents from logs and metrics.",
            Self::Diagnostics => "Assess system health from infrastructure state and alerts.",
            Self::Historical => "Find similar past incidents and the fixes that worked.",
            Self::Remediation => {
                "Plan safe, reversible remediation. When unsure, recommend human intervention."
            }
            Self::Communication => "Plan clear stakeholder notifications.",
            Self::Postmortem => "Write complete, actionable post-mortems.",
        }
    }

    /// Lower for precision-critical roles, higher for prose.
    pub fn temperature(self) -> f64 {
        match self {
            Self::Detective => 0.1,
            Self::Diagnostics => 0.05,
            Self::Historical => 0.2,
            Self::Remediation => 0.0,
            Self::Communication => 0.3,
            Self::Postmortem => 0.2,
        }
    }

    pub fn max_tokens(self) -> u64 {
        match self {
            Self::Detective => 1500,
            Self::Diagnostics => 1200,
            Self::Historical => 1800,
            Self::Remediation => 1000,
            Self::Communication => 800,
            Self::Postmortem => 2048,
        }
    }

    pub fn preamble(self) -> String {
        format!(
            "You are a {}. {}\n\
             Always state an explicit numeric score between 0.0 and 1.0 where asked.",
            self.title(),
            self.goal()
        )
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Text completion for one role.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Analyst: Send + Sync {
    async fn complete(&self, role: AgentRole, prompt: &str) -> Result<String>;
}

/// `Analyst` backed by rig agents.
pub struct RigAnalyst {
    agents: HashMap<AgentRole, OaiAgent>,
    max_retries: u32,
}

impl RigAnalyst {
    pub fn new(config: &ResponderConfig) -> Result<Self> {
        let client = config.ai_client()?;
        let agents = AgentRole::ALL
            .iter()
            .map(|role| (*role, build_agent(&client, &config.model, *role)))
            .collect();
        Ok(Self {
            agents,
            max_retries: config.ai_max_retries,
        })
    }
}

fn build_agent(client: &openai::CompletionsClient, model: &str, role: AgentRole) -> OaiAgent {
    client
        .agent(model)
        .name(role.name())
        .preamble(&role.preamble())
        .temperature(role.temperature())
        .max_tokens(role.max_tokens())
        .build()
}

#[async_trait]
impl Analyst for RigAnalyst {
    async fn complete(&self, role: AgentRole, prompt: &str) -> Result<String> {
        let agent = self
            .agents
            .get(&role)
            .ok_or_else(|| anyhow!("no agent configured for role {role}"))?;

        debug!(role = %role, prompt_chars = prompt.len(), "Prompting analyst");
        let response = prompt_with_retry(agent, prompt, self.max_retries)
            .await
            .with_context(|| format!("{role} analyst request failed"))?;

        let response = response.trim();
        if response.is_empty() {
            return Err(anyhow!("{role} analyst returned an empty response"));
        }
        debug!(role = %role, response_chars = response.len(), "Analyst responded");
        Ok(response.to_string())
    }
}

/// Prompt with exponential backoff for transient HTTP errors: 2s, 4s, 8s, ...
async fn prompt_with_retry(
    agent: &OaiAgent,
    prompt: &str,
    max_retries: u32,
) -> Result<String, rig::completion::PromptError> {
    let mut attempt = 0;
    loop {
        match agent.prompt(prompt).await {
            Ok(response) => return Ok(response),
            Err(e) => {
                let message = e.to_string();
                if attempt >= max_retries || !is_transient_error(&message) {
                    return Err(e);
                }
                attempt += 1;
                let backoff = Duration::from_secs(2u64.pow(attempt));
                warn!(
                    attempt,
                    max_retries,
                    backoff_secs = backoff.as_secs(),
                    error = %message,
                    "Transient AI error, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

fn is_transient_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    message.contains("429")
        || message.contains("502")
        || message.contains("503")
        || lower.contains("connection")
        || lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("error sending request")
        || lower.contains("reset by peer")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_has_distinct_name() {
        let names: std::collections::HashSet<_> = AgentRole::ALL.iter().map(|r| r.name()).collect();
        assert_eq!(names.len(), AgentRole::ALL.len());
    }

    #[test]
    fn remediation_is_deterministic() {
        assert_eq!(AgentRole::Remediation.temperature(), 0.0);
        assert!(AgentRole::Communication.temperature() > AgentRole::Detective.temperature());
        assert!(AgentRole::Remediation
            .preamble()
            .contains("Senior Auto-Remediation Engineer"));
    }

    #[test]
    fn transient_classification() {
        assert!(is_transient_error("HTTP 503 Service Unavailable"));
        assert!(is_transient_error("error sending request for url"));
        assert!(is_transient_error("Rate limited: 429"));
        assert!(!is_transient_error("invalid API key"));
    }

    #[tokio::test]
    async fn rig_analyst_builds_agents_for_all_roles() {
        let config = ResponderConfig::from_lookup(|key| match key {
            "GEMINI_API_KEY" => Some("test-key".into()),
            _ => None,
        })
        .unwrap();
        let analyst = RigAnalyst::new(&config).unwrap();
        assert_eq!(analyst.agents.len(), 6);
    }
}
