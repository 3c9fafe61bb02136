//! Provider payload normalization.
//!
//! Each source has a pure mapping from its webhook payload shape to
//! canonical events. Unknown provider event types are ignored
//! (`Ok(empty)`), malformed payloads are typed errors that the dispatcher
//! records on the queue row.
//!
//! The event type is taken from the provider event-type header when the
//! boundary captured one, falling back to the payload's `event` field
//! (`action` for source control).

mod deployment;
mod incident;
mod issue_tracker;
mod source_control;

use std::sync::Arc;

use thiserror::Error;

use crate::events::CanonicalEvent;
use crate::stages::StageMappingSource;
use crate::types::SourceKind;

pub use deployment::normalize_deployment;
pub use incident::normalize_incident;
pub use issue_tracker::normalize_issue_tracker;
pub use source_control::normalize_source_control;

/// Error type for normalization failures.
///
/// These are transient from the queue's perspective: the row is retried and
/// eventually dead-lettered if the payload never parses.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("payload parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field was absent or null.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Field present but with an unusable value.
    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Normalization seam used by the dispatcher.
///
/// Production code uses [`CanonicalNormalizer`]; tests inject fakes to
/// exercise the retry/dead-letter path.
pub trait Normalizer: Send + Sync {
    fn normalize(
        &self,
        source: SourceKind,
        raw_type: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<Vec<CanonicalEvent>, NormalizeError>;
}

/// The real per-source normalizer, dispatching on the closed source enum.
pub struct CanonicalNormalizer {
    stages: Arc<dyn StageMappingSource>,
}

impl CanonicalNormalizer {
    pub fn new(stages: Arc<dyn StageMappingSource>) -> Self {
        CanonicalNormalizer { stages }
    }
}

impl Normalizer for CanonicalNormalizer {
    fn normalize(
        &self,
        source: SourceKind,
        raw_type: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<Vec<CanonicalEvent>, NormalizeError> {
        match source {
            SourceKind::IssueTracker => {
                normalize_issue_tracker(raw_type, payload, self.stages.as_ref())
            }
            SourceKind::SourceControl => normalize_source_control(raw_type, payload),
            SourceKind::Deployment => normalize_deployment(raw_type, payload),
            SourceKind::Incident => normalize_incident(raw_type, payload),
        }
    }
}
