//! Confidence aggregation over a phase's task results.

use std::collections::HashMap;
use std::fmt;

use crate::state::TaskResult;

/// Unweighted mean of successful confidences, `None` when nothing succeeded.
///
/// Summation follows task-name order so the result does not depend on map
/// iteration order.
pub fn aggregate(results: &HashMap<String, TaskResult>) -> Option<f64> {
    AggregateSummary::from_results(results).mean
}

/// Aggregate plus contributor counts, for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSummary {
    pub mean: Option<f64>,
    pub contributing: usize,
    pub failed: usize,
}

impl AggregateSummary {
    pub fn from_results(results: &HashMap<String, TaskResult>) -> Self {
        let mut names: Vec<&String> = results.keys().collect();
        names.sort();

        let mut sum = 0.0;
        let mut contributing = 0usize;
        for name in names {
            if let Some(confidence) = results[name].confidence() {
                sum += confidence;
                contributing += 1;
            }
        }

        let mean = (contributing > 0).then(|| sum / contributing as f64);
        Self {
            mean,
            contributing,
            failed: results.len() - contributing,
        }
    }
}

impl fmt::Display for AggregateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mean {
            Some(mean) => write!(
                f,
                "{mean:.2} from {} task(s), {} failed",
                self.contributing, self.failed
            ),
            None => write!(f, "undefined, all {} task(s) failed", self.failed),
        }
    }
}
