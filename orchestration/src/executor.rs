//! Parallel executor: JoinSet fan-out with per-task capture.
//!
//! ```text
//! snapshot = state.snapshot()                 (one per batch)
//! JoinSet::spawn(timeout(task.analyze(ctx)))  × N
//! join_next() until empty or batch deadline
//! deadline → cancel token, abort_all, pending = TIMEOUT
//! state.merge_results(all)                    (single writer)
//! ```
//!
//! ## Partial failure policy
//!
//! A task error, timeout, or panic becomes a failed `TaskResult` for that
//! task only. The batch itself fails only when it was assembled wrongly
//! (duplicate names) or the merge violates the state's insert-only rule.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;
use crate::error::{WorkflowError, WorkflowResult};
use crate::state::{FailureKind, IncidentSnapshot, IncidentState, TaskFailure, TaskResult};
use crate::task::{SharedTask, TaskContext};

/// What one batch produced.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub results: HashMap<String, TaskResult>,
    pub elapsed: Duration,
    /// Whether the batch deadline cut the batch short.
    pub deadline_hit: bool,
}

impl BatchReport {
    fn empty() -> Self {
        Self {
            results: HashMap::new(),
            elapsed: Duration::ZERO,
            deadline_hit: false,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn get(&self, task_name: &str) -> Option<&TaskResult> {
        self.results.get(task_name)
    }
}

/// Runs batches of analysis tasks concurrently.
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    per_task_timeout: Duration,
    batch_deadline: Duration,
}

impl ParallelExecutor {
    pub fn new(per_task_timeout: Duration, batch_deadline: Duration) -> Self {
        Self {
            per_task_timeout,
            batch_deadline,
        }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(config.per_task_timeout, config.batch_deadline)
    }

    pub fn per_task_timeout(&self) -> Duration {
        self.per_task_timeout
    }

    pub fn batch_deadline(&self) -> Duration {
        self.batch_deadline
    }

    /// Run `tasks` against a snapshot of `state` and merge every result.
    ///
    /// # Errors
    ///
    /// `Configuration` on duplicate task names, `State` if a result name is
    /// already recorded in `state`.
    pub async fn run_batch(
        &self,
        tasks: &[SharedTask],
        state: &mut IncidentState,
    ) -> WorkflowResult<BatchReport> {
        let report = self.execute(tasks, state.snapshot()).await?;
        state.merge_results(report.results.values().cloned())?;
        Ok(report)
    }

    /// Run a single task with the same isolation as a batch and record it.
    pub async fn run_one(
        &self,
        task: &SharedTask,
        state: &mut IncidentState,
    ) -> WorkflowResult<TaskResult> {
        let name = task.name().to_string();
        let mut report = self.run_batch(std::slice::from_ref(task), state).await?;
        report
            .results
            .remove(&name)
            .ok_or_else(|| WorkflowError::Internal(anyhow::anyhow!("no result for task '{name}'")))
    }

    /// Run `tasks` concurrently against `snapshot` without touching any state.
    pub async fn execute(
        &self,
        tasks: &[SharedTask],
        snapshot: Arc<IncidentSnapshot>,
    ) -> WorkflowResult<BatchReport> {
        let mut pending: HashSet<String> = HashSet::with_capacity(tasks.len());
        for task in tasks {
            if !pending.insert(task.name().to_string()) {
                return Err(WorkflowError::config(format!(
                    "duplicate task name '{}' in batch",
                    task.name()
                )));
            }
        }
        if tasks.is_empty() {
            return Ok(BatchReport::empty());
        }

        let incident_id = snapshot.facts.incident_id.clone();
        info!(
            incident_id = %incident_id,
            tasks = tasks.len(),
            per_task_timeout_ms = self.per_task_timeout.as_millis() as u64,
            batch_deadline_ms = self.batch_deadline.as_millis() as u64,
            "Starting task batch"
        );

        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.batch_deadline;
        let cancel = CancellationToken::new();
        let mut join_set: JoinSet<TaskResult> = JoinSet::new();

        for task in tasks {
            let ctx = TaskContext::new(Arc::clone(&snapshot), cancel.child_token());
            join_set.spawn(run_isolated(Arc::clone(task), ctx, self.per_task_timeout));
        }

        let mut results = HashMap::with_capacity(tasks.len());
        let mut deadline_hit = false;

        loop {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok(result))) => {
                    pending.remove(&result.task_name);
                    match result.error() {
                        None => debug!(
                            incident_id = %incident_id,
                            task = %result.task_name,
                            confidence = result.confidence().unwrap_or_default(),
                            elapsed_ms = result.elapsed_ms,
                            "task succeeded"
                        ),
                        Some(err) => warn!(
                            incident_id = %incident_id,
                            task = %result.task_name,
                            kind = %err.kind,
                            error = %err.message,
                            elapsed_ms = result.elapsed_ms,
                            "task failed"
                        ),
                    }
                    results.insert(result.task_name.clone(), result);
                }
                Ok(Some(Err(e))) => {
                    // Only reachable if the runtime tore the task down.
                    warn!(incident_id = %incident_id, error = %e, "task join failed");
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    cancel.cancel();
                    join_set.abort_all();
                    break;
                }
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        for name in pending {
            let failure = if deadline_hit {
                TaskFailure::timeout(format!(
                    "batch deadline of {}ms exceeded",
                    self.batch_deadline.as_millis()
                ))
            } else {
                TaskFailure::new(
                    FailureKind::Panicked,
                    "task terminated without reporting a result",
                )
            };
            warn!(
                incident_id = %incident_id,
                task = %name,
                kind = %failure.kind,
                "task recorded as failed"
            );
            results.insert(name.clone(), TaskResult::failed(name, failure, elapsed_ms));
        }

        let report = BatchReport {
            results,
            elapsed: started.elapsed(),
            deadline_hit,
        };
        info!(
            incident_id = %incident_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            deadline_hit,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Task batch complete"
        );
        Ok(report)
    }
}

/// Run one task with timeout, cancellation, and panic capture.
async fn run_isolated(task: SharedTask, ctx: TaskContext, per_task_timeout: Duration) -> TaskResult {
    let name = task.name().to_string();
    let start = Instant::now();
    let cancel = ctx.cancel.clone();
    let work = AssertUnwindSafe(task.analyze(ctx)).catch_unwind();

    let outcome = tokio::select! {
        res = tokio::time::timeout(per_task_timeout, work) => Some(res),
        _ = cancel.cancelled() => None,
    };
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match outcome {
        None => TaskResult::failed(
            name,
            TaskFailure::timeout("cancelled at batch deadline"),
            elapsed_ms,
        ),
        Some(Err(_)) => TaskResult::failed(
            name,
            TaskFailure::timeout(format!(
                "no result within {}ms",
                per_task_timeout.as_millis()
            )),
            elapsed_ms,
        ),
        Some(Ok(Err(panic))) => TaskResult::failed(
            name,
            TaskFailure::new(FailureKind::Panicked, panic_message(panic.as_ref())),
            elapsed_ms,
        ),
        Some(Ok(Ok(Err(err)))) => TaskResult::failed(name, err.into(), elapsed_ms),
        Some(Ok(Ok(Ok(output)))) => {
            TaskResult::succeeded(name, output.confidence, output.payload, elapsed_ms)
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("task panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("task panicked: {s}")
    } else {
        "task panicked".to_string()
    }
}
