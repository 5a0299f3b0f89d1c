//! Score extraction from free-text analyst responses.
//!
//! Patterns are tried in order against the lowercased text; within a
//! pattern every match is tried left to right. Values above 1.0 are read as
//! percentages. The first value that lands in [0.1, 1.0] wins.

use std::sync::LazyLock;

use incident_orchestration::TaskError;
use regex::Regex;

/// Which score an analyst response is expected to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    Confidence,
    Health,
    Pattern,
    Remediation,
}

/// Remediation text that flags risk but gives no number.
pub const RISKY_REMEDIATION_SCORE: f64 = 0.45;
const RISK_WORDS: [&str; 4] = ["risky", "dangerous", "uncertain", "complex"];

const MIN_SCORE: f64 = 0.1;
const MAX_SCORE: f64 = 1.0;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("score pattern should compile"))
        .collect()
}

static CONFIDENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"confidence.*?score.*?(\d+\.?\d*)",
        r"confidence.*?(\d+\.?\d*)",
        r"(\d+\.?\d*).*?confidence",
        r"(0\.[0-9]+)",
        r"([0-9]+)%",
    ])
});

static HEALTH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"health.*?score.*?(\d+\.?\d*)",
        r"system.*?health.*?(\d+\.?\d*)",
        r"health.*?(\d+\.?\d*)",
        r"(0\.[0-9]+)",
        r"([0-9]+)%",
    ])
});

static PATTERN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"pattern.*?confidence.*?(\d+\.?\d*)",
        r"match.*?confidence.*?(\d+\.?\d*)",
        r"confidence.*?(\d+\.?\d*)",
        r"(0\.[0-9]+)",
        r"([0-9]+)%",
    ])
});

static REMEDIATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"remediation.*?confidence.*?(\d+\.?\d*)",
        r"auto.*?confidence.*?(\d+\.?\d*)",
        r"confidence.*?(\d+\.?\d*)",
        r"(0\.[0-9]+)",
        r"([0-9]+)%",
    ])
});

impl ScoreKind {
    fn patterns(self) -> &'static [Regex] {
        match self {
            Self::Confidence => &CONFIDENCE_PATTERNS,
            Self::Health => &HEALTH_PATTERNS,
            Self::Pattern => &PATTERN_PATTERNS,
            Self::Remediation => &REMEDIATION_PATTERNS,
        }
    }
}

/// Extract a score of `kind` from `text`.
///
/// # Errors
///
/// `TaskError::Parse` when no usable score is present.
pub fn extract_score(kind: ScoreKind, text: &str) -> Result<f64, TaskError> {
    let lower = text.to_lowercase();

    for pattern in kind.patterns() {
        for caps in pattern.captures_iter(&lower) {
            let Some(raw) = caps.get(1) else { continue };
            let Ok(mut value) = raw.as_str().parse::<f64>() else {
                continue;
            };
            if value > MAX_SCORE {
                value /= 100.0;
            }
            if (MIN_SCORE..=MAX_SCORE).contains(&value) {
                return Ok(value);
            }
        }
    }

    if kind == ScoreKind::Remediation && RISK_WORDS.iter().any(|w| lower.contains(w)) {
        return Ok(RISKY_REMEDIATION_SCORE);
    }

    Err(TaskError::Parse(format!(
        "no {kind:?} score in analyst response ({} chars)",
        text.len()
    )))
}
