//! Incident status machine: explicit statuses and legal transition guards.
//!
//! Every run starts at `Created` and ends at `Resolved`, `Escalated` or
//! `Errored`. `advance()` validates each edge and appends it to the
//! transition log so a run can be audited after the fact.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of one incident run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    /// State allocated, nothing run yet.
    Created,
    /// Parallel analysis and sequential planning in progress.
    Analyzing,
    /// Decision gate evaluating the aggregated confidence.
    Deciding,
    /// Remediation plan executing.
    Mitigating,
    /// Handing off to a human; escalation report being sent.
    Escalating,
    /// Mitigated automatically. Terminal.
    Resolved,
    /// Handed to a human. Terminal.
    Escalated,
    /// Unrecoverable fault. Terminal.
    Errored,
}

impl IncidentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Escalated | Self::Errored)
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Analyzing => write!(f, "Analyzing"),
            Self::Deciding => write!(f, "Deciding"),
            Self::Mitigating => write!(f, "Mitigating"),
            Self::Escalating => write!(f, "Escalating"),
            Self::Resolved => write!(f, "Resolved"),
            Self::Escalated => write!(f, "Escalated"),
            Self::Errored => write!(f, "Errored"),
        }
    }
}

/// Legal edges of the status graph:
/// ```text
/// Created    → Analyzing
/// Analyzing  → Deciding | Escalating
/// Deciding   → Mitigating | Escalating
/// Mitigating → Resolved | Escalating
/// Escalating → Escalated
/// ```
/// plus `→ Errored` from every non-terminal status. The graph is acyclic.
fn is_legal_transition(from: IncidentStatus, to: IncidentStatus) -> bool {
    use IncidentStatus::*;

    if to == Errored && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Created, Analyzing)
            // nothing succeeded in the analysis batch
            | (Analyzing, Escalating)
            | (Analyzing, Deciding)
            | (Deciding, Mitigating)
            | (Deciding, Escalating)
            | (Mitigating, Resolved)
            | (Mitigating, Escalating)
            | (Escalating, Escalated)
    )
}

/// A single recorded status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: IncidentStatus,
    pub to: IncidentStatus,
    /// Milliseconds since the machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: IncidentStatus,
    pub to: IncidentStatus,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal status transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Tracks the current status and the full transition log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMachine {
    current: IncidentStatus,
    started_at: DateTime<Utc>,
    transitions: Vec<TransitionRecord>,
}

impl StatusMachine {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            current: IncidentStatus::Created,
            started_at,
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> IncidentStatus {
        self.current
    }

    /// Attempt to move to `to`.
    ///
    /// Returns `Err(IllegalTransition)` if the edge is not in the graph;
    /// the machine is left unchanged in that case.
    pub fn advance(
        &mut self,
        to: IncidentStatus,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let elapsed_ms = (Utc::now() - self.started_at).num_milliseconds().max(0) as u64;

        tracing::debug!(
            from = %self.current,
            to = %to,
            elapsed_ms,
            "Status transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            elapsed_ms,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// `Created → … → <current>` for log lines.
    pub fn summary(&self) -> String {
        let path: Vec<String> = std::iter::once(IncidentStatus::Created)
            .chain(self.transitions.iter().map(|t| t.to))
            .map(|s| s.to_string())
            .collect();
        path.join(" → ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use IncidentStatus::*;

    fn machine() -> StatusMachine {
        StatusMachine::new(Utc::now())
    }

    #[test]
    fn happy_path_to_resolved() {
        let mut sm = machine();
        for to in [Analyzing, Deciding, Mitigating, Resolved] {
            sm.advance(to, None).unwrap();
        }
        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 4);
        assert_eq!(
            sm.summary(),
            "Created → Analyzing → Deciding → Mitigating → Resolved"
        );
    }

    #[test]
    fn mitigation_failure_path() {
        let mut sm = machine();
        for to in [Analyzing, Deciding, Mitigating, Escalating, Escalated] {
            sm.advance(to, None).unwrap();
        }
        assert_eq!(sm.current(), Escalated);
    }

    #[test]
    fn no_confident_analysis_skips_deciding() {
        let mut sm = machine();
        sm.advance(Analyzing, None).unwrap();
        sm.advance(Escalating, Some("no confident analysis"))
            .unwrap();
        sm.advance(Escalated, None).unwrap();
        assert_eq!(
            sm.transitions()[1].reason.as_deref(),
            Some("no confident analysis")
        );
    }

    #[test]
    fn errored_reachable_from_every_non_terminal() {
        for path in [
            vec![],
            vec![Analyzing],
            vec![Analyzing, Deciding],
            vec![Analyzing, Deciding, Mitigating],
            vec![Analyzing, Deciding, Escalating],
        ] {
            let mut sm = machine();
            for to in path {
                sm.advance(to, None).unwrap();
            }
            sm.advance(Errored, Some("fault")).unwrap();
            assert_eq!(sm.current(), Errored);
        }
    }

    #[test]
    fn terminal_states_are_final() {
        let mut sm = machine();
        for to in [Analyzing, Deciding, Mitigating, Resolved] {
            sm.advance(to, None).unwrap();
        }
        let err = sm.advance(Errored, None).unwrap_err();
        assert_eq!(err.from, Resolved);
        assert!(sm.advance(Escalating, None).is_err());
        assert_eq!(sm.current(), Resolved);
    }

    #[test]
    fn no_reentry_or_skipping() {
        let mut sm = machine();
        assert!(sm.advance(Created, None).is_err());
        assert!(sm.advance(Deciding, None).is_err());
        sm.advance(Analyzing, None).unwrap();
        assert!(sm.advance(Analyzing, None).is_err());
        assert!(sm.advance(Mitigating, None).is_err());
        assert!(sm.advance(Resolved, None).is_err());
    }

    #[test]
    fn serializes_screaming_snake_case() {
        let json = serde_json::to_string(&Escalating).unwrap();
        assert_eq!(json, "\"ESCALATING\"");
    }
}
