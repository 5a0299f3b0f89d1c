//! The six analysis tasks, each an `AnalysisTask` over an `Analyst` and a
//! `DataSource`.
//!
//! `AgentSet` builds them all from shared handles, the way the workflow
//! builder wants them: three evidence tasks plus three single-step planners.

pub mod communication;
pub mod detective;
pub mod diagnostics;
pub mod historical;
pub mod postmortem;
pub mod remediation;

use std::sync::Arc;

use incident_orchestration::{IncidentSnapshot, SharedTask, TaskContext, TaskError};
use serde_json::Value;
use tracing::debug;

use crate::data_sources::DataSource;
use crate::llm::{AgentRole, Analyst};
use crate::scoring::{extract_score, ScoreKind};

pub use communication::CommunicationTask;
pub use detective::DetectiveTask;
pub use diagnostics::DiagnosticsTask;
pub use historical::HistoricalTask;
pub use postmortem::PostmortemTask;
pub use remediation::RemediationTask;

/// Handles shared by every task.
#[derive(Clone)]
pub struct AgentSet {
    pub analyst: Arc<dyn Analyst>,
    pub data_source: Arc<dyn DataSource>,
}

impl AgentSet {
    pub fn new(analyst: Arc<dyn Analyst>, data_source: Arc<dyn DataSource>) -> Self {
        Self {
            analyst,
            data_source,
        }
    }

    /// Detective, diagnostics, historical.
    pub fn analysis_tasks(&self) -> Vec<SharedTask> {
        vec![
            Arc::new(DetectiveTask::new(
                self.analyst.clone(),
                self.data_source.clone(),
            )),
            Arc::new(DiagnosticsTask::new(
                self.analyst.clone(),
                self.data_source.clone(),
            )),
            Arc::new(HistoricalTask::new(
                self.analyst.clone(),
                self.data_source.clone(),
            )),
        ]
    }

    pub fn remediation_planner(&self) -> SharedTask {
        Arc::new(RemediationTask::new(self.analyst.clone()))
    }

    pub fn communication_planner(&self) -> SharedTask {
        Arc::new(CommunicationTask::new(self.analyst.clone()))
    }

    pub fn postmortem(&self) -> SharedTask {
        Arc::new(PostmortemTask::new(self.analyst.clone()))
    }
}

/// Ask `role` about `prompt` and pull a `kind` score out of the answer.
///
/// Stops early with `Cancelled` if the batch deadline fires mid-request.
pub(crate) async fn consult(
    analyst: &dyn Analyst,
    role: AgentRole,
    kind: ScoreKind,
    prompt: &str,
    ctx: &TaskContext,
) -> Result<(String, f64), TaskError> {
    if ctx.is_cancelled() {
        return Err(TaskError::Cancelled);
    }

    let analysis = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(TaskError::Cancelled),
        response = analyst.complete(role, prompt) => {
            response.map_err(|e| TaskError::upstream(format!("{e:#}")))?
        }
    };

    let score = extract_score(kind, &analysis)?;
    debug!(role = %role, score, "Analysis scored");
    Ok((analysis, score))
}

/// First `limit` chars of `text`.
pub(crate) fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Earlier analyses from the snapshot, each cut to `limit` chars, in task
/// name order.
pub(crate) fn combine_analyses(snapshot: &IncidentSnapshot, limit: usize) -> String {
    let mut names: Vec<&String> = snapshot.phase_results.keys().collect();
    names.sort();

    let sections: Vec<String> = names
        .into_iter()
        .filter_map(|name| {
            let analysis = snapshot
                .phase_results
                .get(name)?
                .payload()?
                .get("analysis")?
                .as_str()?;
            Some(format!(
                "\n{} ANALYSIS:\n{}...",
                name.to_uppercase(),
                truncate(analysis, limit)
            ))
        })
        .collect();

    if sections.is_empty() {
        "No previous analyses available".to_string()
    } else {
        sections.join("\n")
    }
}

/// Display a JSON field for a prompt; strings lose their quotes.
pub(crate) fn show(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "Unknown".to_string(),
        Some(other) => other.to_string(),
    }
}
