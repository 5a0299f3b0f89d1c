//! End-to-end workflow tests with scripted tasks and in-memory collaborators.
//!
//! Tests verify:
//! - A confident P2 incident is auto-remediated and gets a postmortem
//! - The same incident at P0 is escalated without a postmortem
//! - A batch where every analysis task fails escalates and still notifies
//! - A hung analysis task is cut off by the batch deadline
//! - A task that never observes cancellation is aborted at the deadline
//! - Concurrent runs keep independent state

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use incident_orchestration::{
    AnalysisTask, EscalationReason, ExecutionOutcome, FailureKind, IncidentReport,
    IncidentStatus, IncidentWorkflow, Notification, NotificationAck, NotificationKind,
    NotificationSender, NotifyError, RemediationExecutor, RemediationFault, RemediationPlan,
    Severity, SharedTask, TaskContext, TaskError, TaskOutput, WorkflowConfig,
};
use serde_json::json;

// ── Fakes ──────────────────────────────────────────────────────────

enum Script {
    Confidence(f64),
    Fail,
    Hang,
    /// Sleeps far past any deadline without watching the cancel token.
    IgnoreCancel,
}

struct ScriptedTask {
    name: &'static str,
    script: Script,
    calls: AtomicU32,
}

#[async_trait]
impl AnalysisTask for ScriptedTask {
    fn name(&self) -> &str {
        self.name
    }

    async fn analyze(&self, ctx: TaskContext) -> Result<TaskOutput, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::Confidence(c) => Ok(TaskOutput::new(
                c,
                json!({
                    "task": self.name,
                    "service": ctx.snapshot.facts.affected_service,
                }),
            )),
            Script::Fail => Err(TaskError::upstream("mock API returned 503")),
            Script::Hang => {
                ctx.cancel.cancelled().await;
                Err(TaskError::Cancelled)
            }
            Script::IgnoreCancel => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok(TaskOutput::new(0.99, json!({ "task": self.name })))
            }
        }
    }
}

fn task(name: &'static str, script: Script) -> Arc<ScriptedTask> {
    Arc::new(ScriptedTask {
        name,
        script,
        calls: AtomicU32::new(0),
    })
}

#[derive(Default)]
struct RecordingExecutor {
    attempts: AtomicU32,
    plans: Mutex<Vec<RemediationPlan>>,
}

#[async_trait]
impl RemediationExecutor for RecordingExecutor {
    async fn execute(&self, plan: &RemediationPlan) -> Result<ExecutionOutcome, RemediationFault> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.plans.lock().unwrap().push(plan.clone());
        Ok(ExecutionOutcome::success(json!({ "actions_executed": 3 })))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<NotificationAck, NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            return Err(NotifyError::Unavailable("connection refused".into()));
        }
        Ok(NotificationAck {
            channel: "#incidents".into(),
            message_id: Some(format!("msg-{}", notification.incident_id)),
        })
    }
}

struct Harness {
    workflow: Arc<IncidentWorkflow>,
    executor: Arc<RecordingExecutor>,
    notifier: Arc<RecordingNotifier>,
    postmortem: Arc<ScriptedTask>,
}

fn harness(analysis: Vec<Arc<ScriptedTask>>, config: WorkflowConfig) -> Harness {
    let executor = Arc::new(RecordingExecutor::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let postmortem = task("postmortem", Script::Confidence(0.9));

    let workflow = IncidentWorkflow::builder()
        .config(config)
        .analysis_tasks(analysis.into_iter().map(|t| t as SharedTask))
        .remediation_planner(task("remediation", Script::Confidence(0.70)))
        .communication_planner(task("communication", Script::Confidence(0.8)))
        .postmortem(postmortem.clone())
        .remediation_executor(executor.clone())
        .notifier(notifier.clone())
        .build()
        .unwrap();

    Harness {
        workflow: Arc::new(workflow),
        executor,
        notifier,
        postmortem,
    }
}

fn confident_analysis() -> Vec<Arc<ScriptedTask>> {
    vec![
        task("detective", Script::Confidence(0.85)),
        task("diagnostics", Script::Confidence(0.65)),
        task("historical", Script::Confidence(0.75)),
    ]
}

fn payment_incident(severity: Severity) -> IncidentReport {
    IncidentReport::new(
        "payment-service",
        "database_timeout",
        severity,
        "Payment API experiencing database connection timeouts",
    )
    .with_symptoms(vec![
        "high latency".into(),
        "connection pool exhausted".into(),
    ])
}

// ── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn confident_p2_incident_is_auto_remediated() {
    let h = harness(confident_analysis(), WorkflowConfig::default());

    let run = h.workflow.run(payment_incident(Severity::P2)).await;

    assert_eq!(run.status(), IncidentStatus::Resolved);
    assert!(run.fault.is_none());
    assert_eq!(run.exit_code(), 0);
    let overall = run.state.overall_confidence().unwrap();
    assert!((overall - 0.75).abs() < 1e-9);
    assert_eq!(run.state.remediation_confidence(), Some(0.70));
    assert!(run.state.resolved_at().is_some());
    assert!(run.state.resolution_time_minutes().is_some());
    assert!(run.state.result("postmortem").unwrap().is_success());
    assert_eq!(
        run.state.status_path(),
        "Created → Analyzing → Deciding → Mitigating → Resolved"
    );

    assert_eq!(h.executor.attempts.load(Ordering::SeqCst), 1);
    let plans = h.executor.plans.lock().unwrap();
    assert_eq!(plans[0].facts.affected_service, "payment-service");
    assert_eq!(plans[0].confidence, 0.70);

    let sent = h.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::ResolutionReport);
    assert!(sent[0].plan.is_some());
}

#[tokio::test]
async fn p0_incident_is_escalated_without_postmortem() {
    let h = harness(confident_analysis(), WorkflowConfig::default());

    let run = h.workflow.run(payment_incident(Severity::P0)).await;

    assert_eq!(run.status(), IncidentStatus::Escalated);
    assert_eq!(
        run.state.escalation_reason(),
        Some(&EscalationReason::CriticalSeverity)
    );
    assert!(run.state.result("postmortem").is_none());
    assert_eq!(h.postmortem.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.executor.attempts.load(Ordering::SeqCst), 0);
    assert!(run.state.resolved_at().is_some());

    let sent = h.notifier.sent.lock().unwrap();
    assert_eq!(sent[0].kind, NotificationKind::EscalationReport);
    assert!(sent[0].summary.contains("critical severity"));
}

#[tokio::test]
async fn all_failed_analysis_escalates_and_notifies() {
    let analysis = vec![
        task("detective", Script::Fail),
        task("diagnostics", Script::Fail),
        task("historical", Script::Fail),
    ];
    let h = harness(analysis, WorkflowConfig::default());

    let run = h.workflow.run(payment_incident(Severity::P3)).await;

    assert_eq!(run.status(), IncidentStatus::Escalated);
    assert_eq!(run.state.overall_confidence(), None);
    assert_eq!(
        run.state.escalation_reason(),
        Some(&EscalationReason::NoConfidentAnalysis)
    );
    assert!(run.decision.is_none());
    assert_eq!(run.state.phase_results().len(), 3);
    assert!(run
        .state
        .phase_results()
        .values()
        .all(|r| r.failure_kind() == Some(FailureKind::Upstream)));
    assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn notifier_outage_keeps_resolution() {
    let executor = Arc::new(RecordingExecutor::default());
    let notifier = Arc::new(RecordingNotifier {
        fail: true,
        ..Default::default()
    });
    let workflow = IncidentWorkflow::builder()
        .analysis_tasks(confident_analysis().into_iter().map(|t| t as SharedTask))
        .remediation_planner(task("remediation", Script::Confidence(0.9)))
        .communication_planner(task("communication", Script::Fail))
        .postmortem(task("postmortem", Script::Fail))
        .remediation_executor(executor)
        .notifier(notifier.clone())
        .build()
        .unwrap();

    let run = workflow.run(payment_incident(Severity::P1)).await;

    assert_eq!(run.status(), IncidentStatus::Resolved);
    assert!(run.fault.is_none());
    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].plan.is_none());
}

#[tokio::test(start_paused = true)]
async fn hung_analysis_task_is_cut_off_at_deadline() {
    let analysis = vec![
        task("detective", Script::Confidence(0.85)),
        task("diagnostics", Script::Confidence(0.65)),
        task("historical", Script::Hang),
    ];
    let config = WorkflowConfig {
        per_task_timeout: Duration::from_secs(30),
        batch_deadline: Duration::from_secs(45),
        ..WorkflowConfig::default()
    };
    let h = harness(analysis, config);

    let run = h.workflow.run(payment_incident(Severity::P2)).await;

    let historical = run.state.result("historical").unwrap();
    assert_eq!(historical.failure_kind(), Some(FailureKind::Timeout));
    assert_eq!(run.state.result("detective").unwrap().confidence(), Some(0.85));
    assert_eq!(run.state.result("diagnostics").unwrap().confidence(), Some(0.65));
    assert!(run.analysis_elapsed <= Duration::from_secs(45) + Duration::from_millis(100));
    // (0.85 + 0.65) / 2 clears the 0.6 bar.
    assert_eq!(run.status(), IncidentStatus::Resolved);
}

#[tokio::test(start_paused = true)]
async fn cancel_ignoring_task_is_aborted_at_deadline() {
    let analysis = vec![
        task("detective", Script::Confidence(0.85)),
        task("diagnostics", Script::IgnoreCancel),
        task("historical", Script::Confidence(0.75)),
    ];
    let config = WorkflowConfig {
        per_task_timeout: Duration::from_secs(45),
        batch_deadline: Duration::from_secs(45),
        ..WorkflowConfig::default()
    };
    let h = harness(analysis, config);

    let run = h.workflow.run(payment_incident(Severity::P2)).await;

    let diagnostics = run.state.result("diagnostics").unwrap();
    assert_eq!(diagnostics.failure_kind(), Some(FailureKind::Timeout));
    assert!(run.analysis_elapsed <= Duration::from_secs(45) + Duration::from_millis(100));
    // The 0.99 the stuck task would have reported never lands.
    let overall = run.state.overall_confidence().unwrap();
    assert!((overall - 0.8).abs() < 1e-9);
    assert_eq!(run.status(), IncidentStatus::Resolved);
    assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_runs_keep_independent_state() {
    let h = harness(confident_analysis(), WorkflowConfig::default());
    let reports = vec![
        payment_incident(Severity::P2).with_id("INC-A"),
        payment_incident(Severity::P0).with_id("INC-B"),
        IncidentReport::new("", "unknown", Severity::P3, "missing service"),
        payment_incident(Severity::P3).with_id("INC-D"),
    ];

    let runs = h.workflow.run_all(reports, 2).await;

    let statuses: Vec<_> = runs.iter().map(|r| r.status()).collect();
    assert_eq!(
        statuses,
        vec![
            IncidentStatus::Resolved,
            IncidentStatus::Escalated,
            IncidentStatus::Errored,
            IncidentStatus::Resolved,
        ]
    );
    assert_eq!(runs[0].state.incident_id(), "INC-A");
    assert_eq!(runs[3].state.incident_id(), "INC-D");

    let metrics = h.workflow.metrics();
    assert_eq!(metrics.total_incidents, 4);
    assert_eq!(metrics.auto_remediated, 2);
    assert_eq!(metrics.escalated, 1);
    assert_eq!(metrics.errored, 1);
}
