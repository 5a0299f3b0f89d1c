//! Cumulative counters across every incident one workflow has processed.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::state::IncidentStatus;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_incidents: u64,
    pub auto_remediated: u64,
    pub escalated: u64,
    pub errored: u64,
    /// Auto-remediated share of all processed incidents, in [0, 1].
    pub success_rate: f64,
    pub average_resolution_secs: f64,
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    auto_remediated: u64,
    escalated: u64,
    errored: u64,
    total_elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct WorkflowMetrics {
    inner: Mutex<Counters>,
}

impl WorkflowMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished run by its terminal status.
    pub fn record(&self, status: IncidentStatus, elapsed: Duration) {
        let mut c = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        c.total += 1;
        c.total_elapsed += elapsed;
        match status {
            IncidentStatus::Resolved => c.auto_remediated += 1,
            IncidentStatus::Escalated => c.escalated += 1,
            IncidentStatus::Errored => c.errored += 1,
            _ => {}
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if c.total == 0 {
            return MetricsSnapshot::default();
        }
        MetricsSnapshot {
            total_incidents: c.total,
            auto_remediated: c.auto_remediated,
            escalated: c.escalated,
            errored: c.errored,
            success_rate: c.auto_remediated as f64 / c.total as f64,
            average_resolution_secs: c.total_elapsed.as_secs_f64() / c.total as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot() {
        assert_eq!(WorkflowMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn counts_by_terminal_status() {
        let metrics = WorkflowMetrics::new();
        metrics.record(IncidentStatus::Resolved, Duration::from_secs(4));
        metrics.record(IncidentStatus::Escalated, Duration::from_secs(2));
        metrics.record(IncidentStatus::Resolved, Duration::from_secs(6));
        metrics.record(IncidentStatus::Errored, Duration::from_secs(0));

        let snap = metrics.snapshot();
        assert_eq!(snap.total_incidents, 4);
        assert_eq!(snap.auto_remediated, 2);
        assert_eq!(snap.escalated, 1);
        assert_eq!(snap.errored, 1);
        assert!((snap.success_rate - 0.5).abs() < 1e-9);
        assert!((snap.average_resolution_secs - 3.0).abs() < 1e-9);
    }
}
