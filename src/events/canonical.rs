//! Typed canonical events.
//!
//! # Subject keys
//!
//! Each event identifies its subject with a formatted key, used together
//! with the event-type tag and timestamp for idempotent inserts:
//!
//! - work item: `ticket:<key>`
//! - pull request: `pr:<owner>/<repo>:<number>`
//! - deploy: `deploy:<stream>:<environment>:<version>`
//! - incident: `incident:<id>`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{PipelineStage, PrNumber, RepoId, StreamId, TicketKey};

/// Identity of a canonical event for deduplication purposes.
///
/// Two deliveries that resolve to the same key describe the same logical
/// occurrence; the second insert is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub subject: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.subject,
            self.event_type,
            self.timestamp.to_rfc3339()
        )
    }
}

/// A normalized, deduplicated delivery-pipeline event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CanonicalEvent {
    WorkItem(WorkItemEvent),
    Pr(PrEvent),
    Deploy(DeployEvent),
    Incident(IncidentEvent),
}

impl CanonicalEvent {
    /// The deduplication key for this event.
    pub fn key(&self) -> EventKey {
        match self {
            CanonicalEvent::WorkItem(e) => EventKey {
                subject: format!("ticket:{}", e.ticket),
                event_type: e.kind.as_str().to_string(),
                timestamp: e.timestamp,
            },
            CanonicalEvent::Pr(e) => EventKey {
                subject: format!("pr:{}:{}", e.repo, e.number.0),
                event_type: e.kind.as_str().to_string(),
                timestamp: e.timestamp,
            },
            CanonicalEvent::Deploy(e) => EventKey {
                subject: format!("deploy:{}:{}:{}", e.stream, e.environment, e.version),
                event_type: "deployed".to_string(),
                timestamp: e.deployed_at,
            },
            CanonicalEvent::Incident(e) => EventKey {
                subject: format!("incident:{}", e.incident_id),
                event_type: e.phase.as_str().to_string(),
                timestamp: e.timestamp,
            },
        }
    }

    /// The canonical timestamp of the event (retention cutoff column).
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CanonicalEvent::WorkItem(e) => e.timestamp,
            CanonicalEvent::Pr(e) => e.timestamp,
            CanonicalEvent::Deploy(e) => e.deployed_at,
            CanonicalEvent::Incident(e) => e.timestamp,
        }
    }
}

/// What happened to a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemEventKind {
    Created,
    StatusTransitioned,
    Blocked,
    Unblocked,
}

impl WorkItemEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemEventKind::Created => "created",
            WorkItemEventKind::StatusTransitioned => "status_transitioned",
            WorkItemEventKind::Blocked => "blocked",
            WorkItemEventKind::Unblocked => "unblocked",
        }
    }
}

/// A ticket lifecycle event.
///
/// Status transitions carry both the raw provider status strings and the
/// resolved pipeline stages. Unmapped statuses leave the stage `None`;
/// the event is still recorded so data-quality reporting can surface it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemEvent {
    pub ticket: TicketKey,
    pub kind: WorkItemEventKind,
    pub timestamp: DateTime<Utc>,

    /// Delivery stream the ticket belongs to, when attributable.
    pub stream: Option<StreamId>,

    /// Raw provider status names for transitions.
    pub from_status: Option<String>,
    pub to_status: Option<String>,

    /// Resolved pipeline stages for transitions (None when unmapped).
    pub from_stage: Option<PipelineStage>,
    pub to_stage: Option<PipelineStage>,

    /// For blocked events: the tech stream blamed for the blockage.
    pub blamed_stream: Option<StreamId>,
}

impl WorkItemEvent {
    /// True when this transition lands the ticket in a terminal stage.
    pub fn is_terminal_transition(&self) -> bool {
        self.kind == WorkItemEventKind::StatusTransitioned
            && self.to_stage.is_some_and(|s| s.is_terminal())
    }
}

/// What happened to a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrEventKind {
    Opened,
    ReviewSubmitted,
    Approved,
    Merged,
    Closed,
}

impl PrEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrEventKind::Opened => "opened",
            PrEventKind::ReviewSubmitted => "review_submitted",
            PrEventKind::Approved => "approved",
            PrEventKind::Merged => "merged",
            PrEventKind::Closed => "closed",
        }
    }
}

/// Code-churn figures attached to PR lifecycle events when the provider
/// supplies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChurn {
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
}

/// A pull request lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrEvent {
    pub repo: RepoId,
    pub number: PrNumber,
    pub kind: PrEventKind,
    pub timestamp: DateTime<Utc>,

    pub author: Option<String>,

    /// For review events: who submitted the review.
    pub reviewer: Option<String>,

    pub churn: Option<CodeChurn>,

    /// Tech stream attribution, when the repo maps to one.
    pub stream: Option<StreamId>,
}

/// A deployment notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployEvent {
    pub stream: StreamId,
    pub environment: String,
    pub version: String,
    pub deployed_at: DateTime<Utc>,
}

impl DeployEvent {
    /// Only production deploys participate in incident correlation.
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Subject key, shared with [`CanonicalEvent::key`].
    pub fn subject_key(&self) -> String {
        format!("deploy:{}:{}:{}", self.stream, self.environment, self.version)
    }
}

/// Incident lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentPhase {
    Triggered,
    Resolved,
}

impl IncidentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentPhase::Triggered => "triggered",
            IncidentPhase::Resolved => "resolved",
        }
    }
}

/// An incident notification.
///
/// `timestamp` is the phase timestamp (trigger time or resolution time);
/// `occurred_at` is always the original occurrence time, carried on both
/// phases so the resolved event can drive backward deploy correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentEvent {
    pub incident_id: String,
    pub stream: StreamId,
    pub severity: Option<String>,
    pub phase: IncidentPhase,
    pub timestamp: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    #[test]
    fn work_item_key_includes_subject_type_and_timestamp() {
        let event = CanonicalEvent::WorkItem(WorkItemEvent {
            ticket: TicketKey::new("X-1"),
            kind: WorkItemEventKind::StatusTransitioned,
            timestamp: ts(1_700_000_000),
            stream: None,
            from_status: Some("In Progress".into()),
            to_status: Some("In Review".into()),
            from_stage: Some(PipelineStage::Dev),
            to_stage: Some(PipelineStage::CodeReview),
            blamed_stream: None,
        });

        let key = event.key();
        assert_eq!(key.subject, "ticket:X-1");
        assert_eq!(key.event_type, "status_transitioned");
        assert_eq!(key.timestamp, ts(1_700_000_000));
    }

    #[test]
    fn identical_occurrences_share_a_key() {
        let make = || {
            CanonicalEvent::Pr(PrEvent {
                repo: RepoId::new("acme", "billing"),
                number: PrNumber(12),
                kind: PrEventKind::Merged,
                timestamp: ts(1_700_000_100),
                author: Some("dana".into()),
                reviewer: None,
                churn: None,
                stream: None,
            })
        };
        assert_eq!(make().key(), make().key());
    }

    #[test]
    fn terminal_transition_detection() {
        let mut event = WorkItemEvent {
            ticket: TicketKey::new("X-2"),
            kind: WorkItemEventKind::StatusTransitioned,
            timestamp: ts(0),
            stream: None,
            from_status: None,
            to_status: None,
            from_stage: Some(PipelineStage::Qa),
            to_stage: Some(PipelineStage::Done),
            blamed_stream: None,
        };
        assert!(event.is_terminal_transition());

        event.to_stage = Some(PipelineStage::Qa);
        assert!(!event.is_terminal_transition());

        event.to_stage = None;
        assert!(!event.is_terminal_transition());
    }

    #[test]
    fn production_deploy_detection() {
        let deploy = DeployEvent {
            stream: StreamId::new("payments"),
            environment: "production".into(),
            version: "v1.4.0".into(),
            deployed_at: ts(0),
        };
        assert!(deploy.is_production());

        let staging = DeployEvent {
            environment: "staging".into(),
            ..deploy
        };
        assert!(!staging.is_production());
    }
}
