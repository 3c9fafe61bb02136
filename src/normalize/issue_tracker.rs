//! Issue-tracker payload normalization.
//!
//! Expected payload shape (provider-agnostic, tracker-style):
//!
//! ```json
//! {
//!     "event": "issue_updated",
//!     "timestamp": "2026-03-02T10:15:00Z",
//!     "issue": { "key": "PAY-142", "stream": "payments" },
//!     "changelog": {
//!         "items": [ { "field": "status", "from": "In Progress", "to": "In Review" } ]
//!     },
//!     "blamed_stream": "platform"
//! }
//! ```
//!
//! Event taxonomy:
//!
//! - `issue_created` → [`WorkItemEventKind::Created`]
//! - `issue_updated` with a status changelog item → `StatusTransitioned`
//! - `issue_blocked` / `issue_unblocked` → `Blocked` / `Unblocked`
//! - anything else → ignored (`Ok(empty)`)
//!
//! Status transitions resolve from/to pipeline stages through the stage
//! mapping; unmapped statuses are recorded with a `None` stage.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::events::{CanonicalEvent, WorkItemEvent, WorkItemEventKind};
use crate::stages::StageMappingSource;
use crate::types::{StreamId, TicketKey};

use super::NormalizeError;

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    event: Option<String>,
    timestamp: DateTime<Utc>,
    issue: RawIssue,
    #[serde(default)]
    changelog: Option<RawChangelog>,
    #[serde(default)]
    blamed_stream: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    key: String,
    #[serde(default)]
    stream: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChangelog {
    #[serde(default)]
    items: Vec<RawChangeItem>,
}

#[derive(Debug, Deserialize)]
struct RawChangeItem {
    field: String,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
}

/// Normalizes one issue-tracker delivery.
pub fn normalize_issue_tracker(
    raw_type: Option<&str>,
    payload: &serde_json::Value,
    stages: &dyn StageMappingSource,
) -> Result<Vec<CanonicalEvent>, NormalizeError> {
    let raw: RawPayload = serde_json::from_value(payload.clone())?;

    let event_type = match raw_type.or(raw.event.as_deref()) {
        Some(t) => t,
        None => return Err(NormalizeError::MissingField("event")),
    };

    if raw.issue.key.is_empty() {
        return Err(NormalizeError::MissingField("issue.key"));
    }
    let ticket = TicketKey::new(&raw.issue.key);
    let stream = raw.issue.stream.as_deref().map(StreamId::new);

    let base = WorkItemEvent {
        ticket: ticket.clone(),
        kind: WorkItemEventKind::Created,
        timestamp: raw.timestamp,
        stream,
        from_status: None,
        to_status: None,
        from_stage: None,
        to_stage: None,
        blamed_stream: None,
    };

    let events = match event_type {
        "issue_created" => vec![base],
        "issue_updated" => {
            let project = ticket.project();
            raw.changelog
                .map(|c| c.items)
                .unwrap_or_default()
                .into_iter()
                .filter(|item| item.field == "status")
                .map(|item| {
                    let from_stage = item
                        .from
                        .as_deref()
                        .and_then(|s| stages.resolve(&project, s))
                        .map(|m| m.stage);
                    let to_stage = item
                        .to
                        .as_deref()
                        .and_then(|s| stages.resolve(&project, s))
                        .map(|m| m.stage);
                    WorkItemEvent {
                        kind: WorkItemEventKind::StatusTransitioned,
                        from_status: item.from,
                        to_status: item.to,
                        from_stage,
                        to_stage,
                        ..base.clone()
                    }
                })
                .collect()
        }
        "issue_blocked" => vec![WorkItemEvent {
            kind: WorkItemEventKind::Blocked,
            blamed_stream: raw.blamed_stream.as_deref().map(StreamId::new),
            ..base
        }],
        "issue_unblocked" => vec![WorkItemEvent {
            kind: WorkItemEventKind::Unblocked,
            ..base
        }],
        _ => Vec::new(),
    };

    Ok(events.into_iter().map(CanonicalEvent::WorkItem).collect())
}
