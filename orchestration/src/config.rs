//! Workflow configuration, read once from the environment.
//!
//! | Field                                   | Env var                            | Default |
//! |-----------------------------------------|------------------------------------|---------|
//! | `auto_remediation_confidence_threshold` | `AUTO_REMEDIATION_THRESHOLD`       | 0.6     |
//! | `remediation_confidence_threshold`      | `REMEDIATION_CONFIDENCE_THRESHOLD` | 0.7     |
//! | `max_retries`                           | `MAX_RETRIES`                      | 3       |
//! | `per_task_timeout`                      | `TASK_TIMEOUT_SECS`                | 30 s    |
//! | `batch_deadline`                        | `BATCH_DEADLINE_SECS`              | 90 s    |
//! | `mitigation_timeout`                    | `MITIGATION_TIMEOUT_SECS`          | 120 s   |
//! | `max_parallel_incidents`                | `MAX_PARALLEL_INCIDENTS`           | 5       |

use std::str::FromStr;
use std::time::Duration;

use crate::decision::DecisionThresholds;
use crate::error::{WorkflowError, WorkflowResult};

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowConfig {
    pub auto_remediation_confidence_threshold: f64,
    pub remediation_confidence_threshold: f64,
    /// Total mitigation attempts, including the first.
    pub max_retries: u32,
    pub per_task_timeout: Duration,
    pub batch_deadline: Duration,
    pub mitigation_timeout: Duration,
    pub max_parallel_incidents: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            auto_remediation_confidence_threshold: 0.6,
            remediation_confidence_threshold: 0.7,
            max_retries: 3,
            per_task_timeout: Duration::from_secs(30),
            batch_deadline: Duration::from_secs(90),
            mitigation_timeout: Duration::from_secs(120),
            max_parallel_incidents: 5,
        }
    }
}

impl WorkflowConfig {
    /// Load from process environment. Unset variables take their defaults.
    pub fn from_env() -> Result<Self, WorkflowError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            auto_remediation_confidence_threshold: parse_or(
                &lookup,
                "AUTO_REMEDIATION_THRESHOLD",
                defaults.auto_remediation_confidence_threshold,
            )?,
            remediation_confidence_threshold: parse_or(
                &lookup,
                "REMEDIATION_CONFIDENCE_THRESHOLD",
                defaults.remediation_confidence_threshold,
            )?,
            max_retries: parse_or(&lookup, "MAX_RETRIES", defaults.max_retries)?,
            per_task_timeout: secs_or(&lookup, "TASK_TIMEOUT_SECS", defaults.per_task_timeout)?,
            batch_deadline: secs_or(&lookup, "BATCH_DEADLINE_SECS", defaults.batch_deadline)?,
            mitigation_timeout: secs_or(
                &lookup,
                "MITIGATION_TIMEOUT_SECS",
                defaults.mitigation_timeout,
            )?,
            max_parallel_incidents: parse_or(
                &lookup,
                "MAX_PARALLEL_INCIDENTS",
                defaults.max_parallel_incidents,
            )?,
        };
        Ok(config)
    }

    /// Check ranges and cross-field constraints.
    pub fn validate(&self) -> WorkflowResult<()> {
        for (name, value) in [
            (
                "auto_remediation_confidence_threshold",
                self.auto_remediation_confidence_threshold,
            ),
            (
                "remediation_confidence_threshold",
                self.remediation_confidence_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(WorkflowError::config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.max_retries == 0 {
            return Err(WorkflowError::config("max_retries must be at least 1"));
        }
        for (name, value) in [
            ("per_task_timeout", self.per_task_timeout),
            ("batch_deadline", self.batch_deadline),
            ("mitigation_timeout", self.mitigation_timeout),
        ] {
            if value.is_zero() {
                return Err(WorkflowError::config(format!("{name} must be non-zero")));
            }
        }
        if self.batch_deadline < self.per_task_timeout {
            return Err(WorkflowError::config(format!(
                "batch_deadline ({}s) must not be shorter than per_task_timeout ({}s)",
                self.batch_deadline.as_secs(),
                self.per_task_timeout.as_secs()
            )));
        }
        if self.max_parallel_incidents == 0 {
            return Err(WorkflowError::config(
                "max_parallel_incidents must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> DecisionThresholds {
        DecisionThresholds {
            overall: self.auto_remediation_confidence_threshold,
            remediation: self.remediation_confidence_threshold,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, WorkflowError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| WorkflowError::config(format!("{key}={raw:?} is not valid: {e}"))),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, WorkflowError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = WorkflowConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, WorkflowConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds(), DecisionThresholds::default());
    }

    #[test]
    fn env_overrides() {
        let config = WorkflowConfig::from_lookup(lookup(&[
            ("AUTO_REMEDIATION_THRESHOLD", "0.75"),
            ("MAX_RETRIES", "5"),
            ("TASK_TIMEOUT_SECS", "10"),
            ("MAX_PARALLEL_INCIDENTS", " 2 "),
        ]))
        .unwrap();
        assert_eq!(config.auto_remediation_confidence_threshold, 0.75);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.per_task_timeout, Duration::from_secs(10));
        assert_eq!(config.max_parallel_incidents, 2);
    }

    #[test]
    fn unparsable_value_is_configuration_error() {
        let err = WorkflowConfig::from_lookup(lookup(&[("MAX_RETRIES", "many")])).unwrap_err();
        assert!(matches!(err, WorkflowError::Configuration(_)));
        assert!(err.to_string().contains("MAX_RETRIES"));
    }

    #[test]
    fn validate_rejects_bad_ranges() {
        let mut config = WorkflowConfig {
            auto_remediation_confidence_threshold: 1.5,
            ..WorkflowConfig::default()
        };
        assert!(config.validate().is_err());

        config = WorkflowConfig {
            max_retries: 0,
            ..WorkflowConfig::default()
        };
        assert!(config.validate().is_err());

        config = WorkflowConfig {
            batch_deadline: Duration::from_secs(10),
            ..WorkflowConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, WorkflowError::Configuration(_)));
        assert!(err.to_string().contains("batch_deadline"));

        config = WorkflowConfig {
            mitigation_timeout: Duration::ZERO,
            ..WorkflowConfig::default()
        };
        assert!(config.validate().is_err());

        config = WorkflowConfig {
            max_parallel_incidents: 0,
            ..WorkflowConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
