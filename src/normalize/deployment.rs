//! Deployment-notification normalization.
//!
//! Expected payload shape:
//!
//! ```json
//! {
//!     "event": "deployment_completed",
//!     "stream": "payments",
//!     "environment": "production",
//!     "version": "v1.4.0",
//!     "deployed_at": "2026-03-02T12:00:00Z"
//! }
//! ```
//!
//! Only completed deployments enter the history; started/failed
//! notifications are ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::events::{CanonicalEvent, DeployEvent};
use crate::types::StreamId;

use super::NormalizeError;

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    event: Option<String>,
    stream: String,
    environment: String,
    version: String,
    deployed_at: DateTime<Utc>,
}

/// Normalizes one deployment delivery.
pub fn normalize_deployment(
    raw_type: Option<&str>,
    payload: &serde_json::Value,
) -> Result<Vec<CanonicalEvent>, NormalizeError> {
    let raw: RawPayload = serde_json::from_value(payload.clone())?;

    let event_type = match raw_type.or(raw.event.as_deref()) {
        Some(t) => t,
        None => return Err(NormalizeError::MissingField("event")),
    };
    if event_type != "deployment_completed" {
        return Ok(Vec::new());
    }

    if raw.stream.is_empty() {
        return Err(NormalizeError::MissingField("stream"));
    }
    if raw.version.is_empty() {
        return Err(NormalizeError::MissingField("version"));
    }

    Ok(vec![CanonicalEvent::Deploy(DeployEvent {
        stream: StreamId::new(raw.stream),
        environment: raw.environment,
        version: raw.version,
        deployed_at: raw.deployed_at,
    })])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(event: &str) -> serde_json::Value {
        json!({
            "event": event,
            "stream": "payments",
            "environment": "production",
            "version": "v1.4.0",
            "deployed_at": "2026-03-02T12:00:00Z"
        })
    }

    #[test]
    fn completed_deployment_is_normalized() {
        let events = normalize_deployment(None, &payload("deployment_completed")).unwrap();
        assert_eq!(events.len(), 1);
        let CanonicalEvent::Deploy(deploy) = &events[0] else {
            panic!("expected deploy event");
        };
        assert_eq!(deploy.stream.as_str(), "payments");
        assert!(deploy.is_production());
    }

    #[test]
    fn started_deployment_is_ignored() {
        assert!(normalize_deployment(None, &payload("deployment_started"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn empty_stream_is_malformed() {
        let mut p = payload("deployment_completed");
        p["stream"] = json!("");
        assert!(matches!(
            normalize_deployment(None, &p),
            Err(NormalizeError::MissingField("stream"))
        ));
    }
}
