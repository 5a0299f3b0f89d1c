//! `IncidentWorkflow`: drives one incident from report to terminal status.
//!
//! ```text
//! Created ─► Analyzing ─► (plan remediation, plan communication)
//!               │                     │
//!               │ nothing succeeded   ▼
//!               │                 Deciding ─► Mitigating ─► Resolved ─► postmortem
//!               ▼                     │            │
//!           Escalating ◄──────────────┴────────────┘
//!               │
//!               ▼   (final notification in every branch)
//!           Escalated
//! ```
//!
//! Any `WorkflowError` escaping a step moves the run to `Errored` and is
//! returned in `WorkflowRun::fault`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

use crate::aggregator::AggregateSummary;
use crate::collaborators::{
    ExecutionOutcome, Notification, NotificationKind, NotificationSender, RemediationExecutor,
    RemediationFault, RemediationPlan,
};
use crate::config::WorkflowConfig;
use crate::decision::{Decision, DecisionGate, EscalationReason};
use crate::error::{WorkflowError, WorkflowResult};
use crate::executor::ParallelExecutor;
use crate::incident::IncidentReport;
use crate::metrics::{MetricsSnapshot, WorkflowMetrics};
use crate::state::{IncidentState, IncidentStatus, MitigationRecord};
use crate::task::SharedTask;

/// Recorded as `resolution_method` when mitigation succeeds.
pub const AUTO_RESOLUTION_METHOD: &str = "auto-remediation";

/// Everything one run produced.
#[derive(Debug)]
pub struct WorkflowRun {
    pub state: IncidentState,
    /// `None` when the run never reached the gate.
    pub decision: Option<Decision>,
    pub fault: Option<WorkflowError>,
    pub analysis_elapsed: Duration,
    pub total_elapsed: Duration,
}

impl WorkflowRun {
    pub fn status(&self) -> IncidentStatus {
        self.state.status()
    }

    /// 0 for Resolved or Escalated, 1 for Errored.
    pub fn exit_code(&self) -> i32 {
        match self.status() {
            IncidentStatus::Errored => 1,
            _ if self.fault.is_some() => 1,
            _ => 0,
        }
    }
}

#[derive(Default)]
struct Progress {
    decision: Option<Decision>,
    analysis_elapsed: Duration,
}

pub struct IncidentWorkflow {
    config: WorkflowConfig,
    executor: ParallelExecutor,
    gate: DecisionGate,
    analysis_tasks: Vec<SharedTask>,
    remediation_planner: SharedTask,
    communication_planner: SharedTask,
    postmortem: SharedTask,
    remediation: Arc<dyn RemediationExecutor>,
    notifier: Arc<dyn NotificationSender>,
    metrics: WorkflowMetrics,
}

impl IncidentWorkflow {
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::default()
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Process one incident. Never panics and never returns early without
    /// a terminal state.
    pub async fn run(&self, report: IncidentReport) -> WorkflowRun {
        let started = Instant::now();

        let mut state = match IncidentState::new(&report) {
            Ok(state) => state,
            Err(e) => {
                error!(service = %report.service, error = %e, "Incident rejected");
                let state = IncidentState::rejected(&report, &e);
                self.metrics.record(state.status(), started.elapsed());
                return WorkflowRun {
                    state,
                    decision: None,
                    fault: Some(e),
                    analysis_elapsed: Duration::ZERO,
                    total_elapsed: started.elapsed(),
                };
            }
        };

        let incident_id = state.incident_id().to_string();
        info!(
            incident_id = %incident_id,
            service = %state.facts().affected_service,
            incident_type = %state.facts().incident_type,
            severity = %state.severity(),
            "Processing incident"
        );

        let mut progress = Progress::default();
        let outcome = self
            .drive(&mut state, &mut progress)
            .instrument(info_span!("incident", incident_id = %incident_id))
            .await;

        let fault = match outcome {
            Ok(()) => None,
            Err(e) => {
                error!(incident_id = %incident_id, kind = %e.kind(), error = %e, "Workflow fault");
                if !state.is_terminal() {
                    if let Err(t) = state.mark_errored(&e) {
                        error!(incident_id = %incident_id, error = %t, "Could not record fault");
                    }
                }
                Some(e)
            }
        };

        let total_elapsed = started.elapsed();
        self.metrics.record(state.status(), total_elapsed);
        info!(
            incident_id = %incident_id,
            status = %state.status(),
            path = %state.status_path(),
            elapsed_ms = total_elapsed.as_millis() as u64,
            "Incident processing finished"
        );

        WorkflowRun {
            state,
            decision: progress.decision,
            fault,
            analysis_elapsed: progress.analysis_elapsed,
            total_elapsed,
        }
    }

    /// Process many incidents concurrently, at most `max_parallel` at once.
    ///
    /// Runs come back in input order.
    pub async fn run_all(
        self: &Arc<Self>,
        reports: Vec<IncidentReport>,
        max_parallel: usize,
    ) -> Vec<WorkflowRun> {
        let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
        let mut join_set = JoinSet::new();

        for (idx, report) in reports.iter().cloned().enumerate() {
            let workflow = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                // The semaphore is never closed, so a permit always arrives.
                let _permit = semaphore.acquire_owned().await.ok();
                (idx, workflow.run(report).await)
            });
        }

        let mut runs: Vec<Option<WorkflowRun>> = reports.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, run)) => runs[idx] = Some(run),
                Err(e) => warn!(error = %e, "incident run aborted"),
            }
        }

        runs.into_iter()
            .zip(reports.iter())
            .map(|(run, report)| {
                run.unwrap_or_else(|| {
                    let fault = WorkflowError::Internal(anyhow::anyhow!("incident run aborted"));
                    WorkflowRun {
                        state: IncidentState::rejected(report, &fault),
                        decision: None,
                        fault: Some(fault),
                        analysis_elapsed: Duration::ZERO,
                        total_elapsed: Duration::ZERO,
                    }
                })
            })
            .collect()
    }

    async fn drive(&self, state: &mut IncidentState, progress: &mut Progress) -> WorkflowResult<()> {
        // ── Analysis ──────────────────────────────────────────────────────
        state.advance(IncidentStatus::Analyzing, None)?;
        let analysis_started = Instant::now();
        let batch = self.executor.run_batch(&self.analysis_tasks, state).await?;
        progress.analysis_elapsed = analysis_started.elapsed();

        let summary = AggregateSummary::from_results(&batch.results);
        info!(
            incident_id = %state.incident_id(),
            confidence = ?summary.mean,
            aggregate = %summary,
            elapsed_ms = progress.analysis_elapsed.as_millis() as u64,
            "Analysis phase complete"
        );

        let Some(overall) = summary.mean else {
            state.mark_escalating(EscalationReason::NoConfidentAnalysis)?;
            self.notify(state, None).await;
            state.mark_escalated()?;
            return Ok(());
        };
        state.set_overall_confidence(overall)?;

        // ── Planning ──────────────────────────────────────────────────────
        let planned = self.executor.run_one(&self.remediation_planner, state).await?;
        match planned.confidence() {
            Some(confidence) => state.set_remediation_confidence(confidence)?,
            None => warn!(
                incident_id = %state.incident_id(),
                task = %planned.task_name,
                error = %planned.error().map(|e| e.to_string()).unwrap_or_default(),
                "Remediation planning failed"
            ),
        }

        let communication = self
            .executor
            .run_one(&self.communication_planner, state)
            .await?;
        if let Some(err) = communication.error() {
            warn!(
                incident_id = %state.incident_id(),
                task = %communication.task_name,
                error = %err,
                "Communication planning failed, notifying without a plan"
            );
        }
        let communication_plan = communication.payload().cloned();

        // ── Decision ──────────────────────────────────────────────────────
        state.advance(IncidentStatus::Deciding, None)?;
        let decision = self.gate.decide(
            state.overall_confidence(),
            state.remediation_confidence(),
            state.severity(),
        );
        progress.decision = Some(decision.clone());

        match decision {
            Decision::Escalate { reason } => state.mark_escalating(reason)?,
            Decision::AutoRemediate => {
                state.advance(IncidentStatus::Mitigating, None)?;
                let plan = RemediationPlan {
                    incident_id: state.incident_id().to_string(),
                    facts: state.facts().clone(),
                    confidence: state.remediation_confidence().unwrap_or_default(),
                    attempt: 1,
                    payload: planned.payload().cloned().unwrap_or_default(),
                };
                let record = self.mitigate(plan).await?;
                let succeeded = record.succeeded;
                let attempts = record.attempts;
                let last_error = record.last_error.clone().unwrap_or_default();
                state.record_mitigation(record);

                if succeeded {
                    state.mark_resolved(AUTO_RESOLUTION_METHOD)?;
                    info!(
                        incident_id = %state.incident_id(),
                        attempts,
                        "Incident auto-remediated"
                    );
                    self.run_postmortem(state).await;
                } else {
                    state.mark_escalating(EscalationReason::MitigationFailed {
                        attempts,
                        last_error,
                    })?;
                }
            }
        }

        // ── Report ────────────────────────────────────────────────────────
        self.notify(state, communication_plan).await;
        if state.status() == IncidentStatus::Escalating {
            state.mark_escalated()?;
        }
        Ok(())
    }

    /// Execute and verify the plan, retrying failed attempts.
    ///
    /// Returns `Err` only when the executor itself faults.
    async fn mitigate(&self, mut plan: RemediationPlan) -> WorkflowResult<MitigationRecord> {
        let max_attempts = if self.remediation.is_retryable() {
            self.config.max_retries
        } else {
            1
        };
        let mut details = serde_json::Value::Null;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            plan.attempt = attempt;
            info!(
                incident_id = %plan.incident_id,
                attempt,
                max_attempts,
                "Executing remediation"
            );
            match tokio::time::timeout(self.config.mitigation_timeout, self.attempt(&plan)).await {
                Err(_) => {
                    let message = format!(
                        "attempt timed out after {}s",
                        self.config.mitigation_timeout.as_secs()
                    );
                    warn!(incident_id = %plan.incident_id, attempt, "{message}");
                    last_error = Some(message);
                }
                Ok(Err(fault)) => return Err(fault.into()),
                Ok(Ok((outcome, true))) => {
                    return Ok(MitigationRecord {
                        attempts: attempt,
                        succeeded: true,
                        details: outcome.details,
                        last_error: None,
                    });
                }
                Ok(Ok((outcome, false))) => {
                    let message = failure_message(&outcome);
                    warn!(
                        incident_id = %plan.incident_id,
                        attempt,
                        error = %message,
                        "Remediation attempt failed"
                    );
                    details = outcome.details;
                    last_error = Some(message);
                }
            }
        }

        Ok(MitigationRecord {
            attempts: max_attempts,
            succeeded: false,
            details,
            last_error,
        })
    }

    async fn attempt(
        &self,
        plan: &RemediationPlan,
    ) -> Result<(ExecutionOutcome, bool), RemediationFault> {
        let outcome = self.remediation.execute(plan).await?;
        let verified = outcome.succeeded && self.remediation.verify(plan, &outcome).await?;
        Ok((outcome, verified))
    }

    async fn run_postmortem(&self, state: &mut IncidentState) {
        match self.executor.run_one(&self.postmortem, state).await {
            Ok(result) if result.is_success() => {
                info!(incident_id = %state.incident_id(), "Postmortem recorded");
            }
            Ok(result) => warn!(
                incident_id = %state.incident_id(),
                error = %result.error().map(|e| e.to_string()).unwrap_or_default(),
                "Postmortem failed"
            ),
            Err(e) => warn!(incident_id = %state.incident_id(), error = %e, "Postmortem not recorded"),
        }
    }

    /// Send the final report. Delivery failures never change the outcome.
    async fn notify(&self, state: &IncidentState, plan: Option<serde_json::Value>) {
        let facts = state.facts();
        let (kind, summary) = match state.status() {
            IncidentStatus::Resolved => (
                NotificationKind::ResolutionReport,
                format!(
                    "{} {} on {} resolved automatically after {} attempt(s)",
                    facts.severity,
                    facts.incident_id,
                    facts.affected_service,
                    state.mitigation().map(|m| m.attempts).unwrap_or_default()
                ),
            ),
            _ => (
                NotificationKind::EscalationReport,
                format!(
                    "{} {} on {} escalated: {}",
                    facts.severity,
                    facts.incident_id,
                    facts.affected_service,
                    state
                        .escalation_reason()
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "unspecified".into())
                ),
            ),
        };

        let notification = Notification {
            incident_id: facts.incident_id.clone(),
            kind,
            severity: facts.severity,
            status: state.status(),
            summary,
            escalation_reason: state.escalation_reason().cloned(),
            plan,
        };

        match self.notifier.send(&notification).await {
            Ok(ack) => info!(
                incident_id = %facts.incident_id,
                channel = %ack.channel,
                "Notification sent"
            ),
            Err(e) => warn!(
                incident_id = %facts.incident_id,
                error = %e,
                "Notification failed"
            ),
        }
    }
}

fn failure_message(outcome: &ExecutionOutcome) -> String {
    if outcome.succeeded {
        return "verification failed".into();
    }
    outcome
        .details
        .get("error")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| "execution reported failure".into())
}

/// Assembles an `IncidentWorkflow`.
#[derive(Default)]
pub struct WorkflowBuilder {
    config: Option<WorkflowConfig>,
    analysis_tasks: Vec<SharedTask>,
    remediation_planner: Option<SharedTask>,
    communication_planner: Option<SharedTask>,
    postmortem: Option<SharedTask>,
    remediation: Option<Arc<dyn RemediationExecutor>>,
    notifier: Option<Arc<dyn NotificationSender>>,
}

impl WorkflowBuilder {
    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn analysis_task(mut self, task: SharedTask) -> Self {
        self.analysis_tasks.push(task);
        self
    }

    pub fn analysis_tasks(mut self, tasks: impl IntoIterator<Item = SharedTask>) -> Self {
        self.analysis_tasks.extend(tasks);
        self
    }

    pub fn remediation_planner(mut self, task: SharedTask) -> Self {
        self.remediation_planner = Some(task);
        self
    }

    pub fn communication_planner(mut self, task: SharedTask) -> Self {
        self.communication_planner = Some(task);
        self
    }

    pub fn postmortem(mut self, task: SharedTask) -> Self {
        self.postmortem = Some(task);
        self
    }

    pub fn remediation_executor(mut self, executor: Arc<dyn RemediationExecutor>) -> Self {
        self.remediation = Some(executor);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationSender>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// # Errors
    ///
    /// `Configuration` when the config is invalid, a collaborator is
    /// missing, or two tasks share a name.
    pub fn build(self) -> WorkflowResult<IncidentWorkflow> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        if self.analysis_tasks.is_empty() {
            return Err(WorkflowError::config("at least one analysis task is required"));
        }
        let remediation_planner = required(self.remediation_planner, "remediation planner")?;
        let communication_planner =
            required(self.communication_planner, "communication planner")?;
        let postmortem = required(self.postmortem, "postmortem task")?;
        let remediation = required(self.remediation, "remediation executor")?;
        let notifier = required(self.notifier, "notification sender")?;

        let mut names = std::collections::HashSet::new();
        for task in self
            .analysis_tasks
            .iter()
            .chain([&remediation_planner, &communication_planner, &postmortem])
        {
            if !names.insert(task.name().to_string()) {
                return Err(WorkflowError::config(format!(
                    "task name '{}' registered twice",
                    task.name()
                )));
            }
        }

        Ok(IncidentWorkflow {
            executor: ParallelExecutor::from_config(&config),
            gate: DecisionGate::new(config.thresholds()),
            config,
            analysis_tasks: self.analysis_tasks,
            remediation_planner,
            communication_planner,
            postmortem,
            remediation,
            notifier,
            metrics: WorkflowMetrics::new(),
        })
    }
}

fn required<T>(value: Option<T>, what: &str) -> WorkflowResult<T> {
    value.ok_or_else(|| WorkflowError::config(format!("{what} is required")))
}
