//! Incident facts: severity tiers, the raw report, and the immutable facts
//! derived from it at state creation.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// Criticality tier. P0 is the highest and is never auto-remediated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    P0,
    P1,
    P2,
    P3,
}

impl Severity {
    pub fn is_critical(self) -> bool {
        self == Self::P0
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::P0 => write!(f, "P0"),
            Self::P1 => write!(f, "P1"),
            Self::P2 => write!(f, "P2"),
            Self::P3 => write!(f, "P3"),
        }
    }
}

impl FromStr for Severity {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "P0" => Ok(Self::P0),
            "P1" => Ok(Self::P1),
            "P2" => Ok(Self::P2),
            "P3" => Ok(Self::P3),
            other => Err(WorkflowError::InvalidIncident(format!(
                "unknown severity '{other}' (expected P0-P3)"
            ))),
        }
    }
}

/// Raw incident input handed to the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentReport {
    /// Caller-supplied identifier; generated when absent or blank.
    #[serde(default)]
    pub incident_id: Option<String>,
    pub service: String,
    pub incident_type: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub symptoms: Vec<String>,
}

impl IncidentReport {
    pub fn new(
        service: impl Into<String>,
        incident_type: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            incident_id: None,
            service: service.into(),
            incident_type: incident_type.into(),
            severity,
            description: description.into(),
            symptoms: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.incident_id = Some(id.into());
        self
    }

    pub fn with_symptoms(mut self, symptoms: Vec<String>) -> Self {
        self.symptoms = symptoms;
        self
    }
}

/// Immutable incident facts, fixed at state creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentFacts {
    pub incident_id: String,
    pub affected_service: String,
    pub incident_type: String,
    pub severity: Severity,
    pub description: String,
    pub symptoms: Vec<String>,
}

impl IncidentFacts {
    /// Validate a report and fix its facts.
    ///
    /// # Errors
    ///
    /// `InvalidIncident` when the service or description is blank.
    pub fn from_report(report: &IncidentReport) -> Result<Self, WorkflowError> {
        if report.service.trim().is_empty() {
            return Err(WorkflowError::InvalidIncident(
                "affected service must not be empty".to_string(),
            ));
        }
        if report.description.trim().is_empty() {
            return Err(WorkflowError::InvalidIncident(
                "description must not be empty".to_string(),
            ));
        }
        Ok(Self::lossy(report))
    }

    /// Facts copied as-is, without validation. Used to describe a report
    /// that was rejected so the errored state still names what came in.
    pub fn lossy(report: &IncidentReport) -> Self {
        let incident_id = match report.incident_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => generate_incident_id(),
        };
        let incident_type = if report.incident_type.trim().is_empty() {
            "unknown".to_string()
        } else {
            report.incident_type.trim().to_string()
        };
        Self {
            incident_id,
            affected_service: report.service.trim().to_string(),
            incident_type,
            severity: report.severity,
            description: report.description.trim().to_string(),
            symptoms: report.symptoms.clone(),
        }
    }
}

/// `INC-<YYYYMMDD>-<8 uppercase hex chars>`.
pub fn generate_incident_id() -> String {
    let date = Utc::now().format("%Y%m%d");
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("INC-{date}-{}", random[..8].to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("p0".parse::<Severity>().unwrap(), Severity::P0);
        assert_eq!(" P3 ".parse::<Severity>().unwrap(), Severity::P3);
        assert!("P4".parse::<Severity>().is_err());
        assert!(Severity::P0.is_critical());
        assert!(!Severity::P1.is_critical());
    }

    #[test]
    fn generated_id_shape() {
        let id = generate_incident_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "INC");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn caller_id_is_kept() {
        let report = IncidentReport::new("payment-service", "database_timeout", Severity::P2, "x")
            .with_id("INC-CUSTOM-1");
        let facts = IncidentFacts::from_report(&report).unwrap();
        assert_eq!(facts.incident_id, "INC-CUSTOM-1");
    }

    #[test]
    fn blank_service_rejected() {
        let report = IncidentReport::new("  ", "database_timeout", Severity::P2, "timeouts");
        let err = IncidentFacts::from_report(&report).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidIncident(_)));
    }

    #[test]
    fn blank_type_defaults_to_unknown() {
        let report = IncidentReport::new("auth-service", "", Severity::P3, "slow logins");
        let facts = IncidentFacts::from_report(&report).unwrap();
        assert_eq!(facts.incident_type, "unknown");
    }
}
