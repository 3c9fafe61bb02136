//! Severity classification policy.
//!
//! The rule table is external configuration, evaluated as ordered rules
//! with first match winning. The compiled-in default implements:
//!
//! | impacted | avg confidence | severity |
//! |----------|----------------|----------|
//! | ≥ 3      | < 60           | critical |
//! | ≥ 2      | < 70           | high     |
//! | ≥ 2      | ≥ 70           | medium   |
//! | = 1      | < 70           | medium   |
//! | (else)   |                | low      |
//!
//! An empty impacted set never reaches the table; the engine short-circuits
//! that to `Severity::None`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Qualitative alert level for a tech stream's blocking impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// One ordered classification rule.
///
/// A rule matches when the impacted-stream count is within
/// `[min_impacted, max_impacted]` and the average confidence is within
/// `[min_confidence, max_confidence)`. Unset bounds do not constrain.
/// Confidence bounds never match when no average is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityRule {
    pub min_impacted: u32,
    #[serde(default)]
    pub max_impacted: Option<u32>,
    #[serde(default)]
    pub min_confidence: Option<f64>,
    #[serde(default)]
    pub max_confidence: Option<f64>,
    pub severity: Severity,
}

impl SeverityRule {
    fn matches(&self, impacted: u32, avg_confidence: Option<f64>) -> bool {
        if impacted < self.min_impacted {
            return false;
        }
        if self.max_impacted.is_some_and(|max| impacted > max) {
            return false;
        }
        if self.min_confidence.is_some() || self.max_confidence.is_some() {
            let Some(confidence) = avg_confidence else {
                return false;
            };
            if self.min_confidence.is_some_and(|min| confidence < min) {
                return false;
            }
            if self.max_confidence.is_some_and(|max| confidence >= max) {
                return false;
            }
        }
        true
    }
}

/// Ordered rule table with a fallback severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityRuleTable {
    pub rules: Vec<SeverityRule>,
    pub fallback: Severity,
}

impl SeverityRuleTable {
    /// The compiled-in default policy.
    pub fn default_policy() -> Self {
        let rule = |min_impacted, max_impacted, max_confidence, min_confidence, severity| {
            SeverityRule {
                min_impacted,
                max_impacted,
                min_confidence,
                max_confidence,
                severity,
            }
        };
        SeverityRuleTable {
            rules: vec![
                rule(3, None, Some(60.0), None, Severity::Critical),
                rule(2, None, Some(70.0), None, Severity::High),
                rule(2, None, None, Some(70.0), Severity::Medium),
                rule(1, Some(1), Some(70.0), None, Severity::Medium),
            ],
            fallback: Severity::Low,
        }
    }

    /// Classifies a non-empty impact. First matching rule wins; the
    /// fallback applies when nothing matches.
    pub fn classify(&self, impacted: u32, avg_confidence: Option<f64>) -> Severity {
        self.rules
            .iter()
            .find(|rule| rule.matches(impacted, avg_confidence))
            .map(|rule| rule.severity)
            .unwrap_or(self.fallback)
    }
}

impl Default for SeverityRuleTable {
    fn default() -> Self {
        Self::default_policy()
    }
}
