//! Incident Orchestration Core
//!
//! This library provides:
//! - A guarded incident status machine (`state`)
//! - Concurrent execution of independent analysis tasks with per-task
//!   timeouts, a batch deadline, and panic capture (`executor`)
//! - Confidence aggregation and the auto-remediate / escalate gate
//!   (`aggregator`, `decision`)
//! - The end-to-end `IncidentWorkflow` driving analysis, planning,
//!   mitigation with retries, postmortem, and notification (`workflow`)
//!
//! # Extension points
//!
//! - [`AnalysisTask`]: one evidence domain or planner
//! - [`RemediationExecutor`]: applies a remediation plan
//! - [`NotificationSender`]: delivers the final report
//!
//! # Usage
//!
//! ```ignore
//! let workflow = IncidentWorkflow::builder()
//!     .config(WorkflowConfig::from_env()?)
//!     .analysis_tasks([detective, diagnostics, historical])
//!     .remediation_planner(remediation)
//!     .communication_planner(communication)
//!     .postmortem(postmortem)
//!     .remediation_executor(executor)
//!     .notifier(notifier)
//!     .build()?;
//!
//! let run = workflow.run(report).await;
//! println!("{}", run.state.status_path());
//! ```

pub mod aggregator;
pub mod collaborators;
pub mod config;
pub mod decision;
pub mod error;
pub mod executor;
pub mod incident;
pub mod metrics;
pub mod state;
pub mod task;
pub mod workflow;

pub use aggregator::{aggregate, AggregateSummary};
pub use collaborators::{
    ExecutionOutcome, Notification, NotificationAck, NotificationKind, NotificationSender,
    NotifyError, RemediationExecutor, RemediationFault, RemediationPlan,
};
pub use config::WorkflowConfig;
pub use decision::{Decision, DecisionGate, DecisionThresholds, EscalationReason};
pub use error::{ErrorKind, WorkflowError, WorkflowResult};
pub use executor::{BatchReport, ParallelExecutor};
pub use incident::{IncidentFacts, IncidentReport, Severity};
pub use metrics::{MetricsSnapshot, WorkflowMetrics};
pub use state::{
    FailureKind, IncidentSnapshot, IncidentState, IncidentStatus, MitigationRecord, TaskFailure,
    TaskResult,
};
pub use task::{AnalysisTask, SharedTask, TaskContext, TaskError, TaskOutput};
pub use workflow::{IncidentWorkflow, WorkflowBuilder, WorkflowRun, AUTO_RESOLUTION_METHOD};
