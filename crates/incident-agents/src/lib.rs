//! AI-backed incident responders.
//!
//! Plugs six LLM analysts into the `incident_orchestration` workflow:
//! - `agents`: detective, diagnostics, historical (parallel evidence) and the
//!   remediation, communication, postmortem planners
//! - `data_sources`: logs, metrics, pods, alerts and history from the mock
//!   DevOps API, degrading to partial evidence when an upstream is down
//! - `remediation`: runbook execution, simulated, or confirmed via the API for
//!   incidents the API generated
//! - `notifier`: Slack delivery of the final report
//! - `alert`: free-text alert → `IncidentReport`
//!
//! The `incident-responder` binary wires these together.

pub mod agents;
pub mod alert;
pub mod config;
pub mod data_sources;
pub mod llm;
pub mod notifier;
pub mod remediation;
pub mod scoring;

use std::sync::Arc;

use anyhow::Result;
use incident_orchestration::{IncidentWorkflow, NotificationSender, RemediationExecutor};

pub use agents::AgentSet;
pub use config::ResponderConfig;
pub use data_sources::{DataSource, MockApiClient};
pub use llm::{AgentRole, Analyst, RigAnalyst};
pub use notifier::SlackNotifier;
pub use remediation::{
    executor_for, IncidentOrigin, MockApiRemediationExecutor, SimulatedRemediationExecutor,
};

/// Assemble a workflow from an agent set and outbound collaborators.
///
/// # Errors
///
/// Propagates the builder's configuration errors.
pub fn build_workflow(
    config: &ResponderConfig,
    agents: &AgentSet,
    executor: Arc<dyn RemediationExecutor>,
    notifier: Arc<dyn NotificationSender>,
) -> Result<IncidentWorkflow> {
    let workflow = IncidentWorkflow::builder()
        .config(config.workflow.clone())
        .analysis_tasks(agents.analysis_tasks())
        .remediation_planner(agents.remediation_planner())
        .communication_planner(agents.communication_planner())
        .postmortem(agents.postmortem())
        .remediation_executor(executor)
        .notifier(notifier)
        .build()?;
    Ok(workflow)
}
