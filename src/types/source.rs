//! Webhook source taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The provider category a queued payload came from.
///
/// This is a closed enum: normalizer selection dispatches on it at compile
/// time rather than on a free-form source string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Issue-tracker webhooks (ticket lifecycle and status transitions).
    IssueTracker,
    /// Source-control webhooks (pull request lifecycle and reviews).
    SourceControl,
    /// Deployment notifications from the release pipeline.
    Deployment,
    /// Incident notifications from the on-call/alerting system.
    Incident,
}

impl SourceKind {
    /// All sources, in dispatch order.
    pub const ALL: [SourceKind; 4] = [
        SourceKind::IssueTracker,
        SourceKind::SourceControl,
        SourceKind::Deployment,
        SourceKind::Incident,
    ];

    /// The URL path segment used by the intake endpoint for this source.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::IssueTracker => "issue-tracker",
            SourceKind::SourceControl => "source-control",
            SourceKind::Deployment => "deployment",
            SourceKind::Incident => "incident",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issue-tracker" => Ok(SourceKind::IssueTracker),
            "source-control" => Ok(SourceKind::SourceControl),
            "deployment" => Ok(SourceKind::Deployment),
            "incident" => Ok(SourceKind::Incident),
            other => Err(UnknownSource(other.to_string())),
        }
    }
}

/// Error returned when parsing an unrecognized source path segment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown webhook source: {0}")]
pub struct UnknownSource(pub String);
