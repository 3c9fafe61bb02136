//! Incident-notification normalization.
//!
//! Expected payload shape:
//!
//! ```json
//! {
//!     "event": "incident_triggered",
//!     "incident": {
//!         "id": "INC-12",
//!         "stream": "payments",
//!         "severity": "sev1",
//!         "occurred_at": "2026-03-02T12:40:00Z",
//!         "resolved_at": null
//!     }
//! }
//! ```
//!
//! `incident_resolved` payloads must carry `resolved_at`; the occurrence
//! time is carried on both phases for backward deploy correlation.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::events::{CanonicalEvent, IncidentEvent, IncidentPhase};
use crate::types::StreamId;

use super::NormalizeError;

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    event: Option<String>,
    incident: RawIncident,
}

#[derive(Debug, Deserialize)]
struct RawIncident {
    id: String,
    stream: String,
    #[serde(default)]
    severity: Option<String>,
    occurred_at: DateTime<Utc>,
    #[serde(default)]
    resolved_at: Option<DateTime<Utc>>,
}

/// Normalizes one incident delivery.
pub fn normalize_incident(
    raw_type: Option<&str>,
    payload: &serde_json::Value,
) -> Result<Vec<CanonicalEvent>, NormalizeError> {
    let raw: RawPayload = serde_json::from_value(payload.clone())?;

    let event_type = match raw_type.or(raw.event.as_deref()) {
        Some(t) => t,
        None => return Err(NormalizeError::MissingField("event")),
    };

    let (phase, timestamp) = match event_type {
        "incident_triggered" => (IncidentPhase::Triggered, raw.incident.occurred_at),
        "incident_resolved" => {
            let resolved_at = raw
                .incident
                .resolved_at
                .ok_or(NormalizeError::MissingField("incident.resolved_at"))?;
            (IncidentPhase::Resolved, resolved_at)
        }
        _ => return Ok(Vec::new()),
    };

    if raw.incident.id.is_empty() {
        return Err(NormalizeError::MissingField("incident.id"));
    }
    if raw.incident.stream.is_empty() {
        return Err(NormalizeError::MissingField("incident.stream"));
    }

    Ok(vec![CanonicalEvent::Incident(IncidentEvent {
        incident_id: raw.incident.id,
        stream: StreamId::new(raw.incident.stream),
        severity: raw.incident.severity,
        phase,
        timestamp,
        occurred_at: raw.incident.occurred_at,
    })])
}
