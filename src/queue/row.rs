//! Queue row lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{QueueId, SourceKind};

/// Processing status of a queued webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for a dispatch run.
    Pending,
    /// Claimed by the current dispatch run.
    Processing,
    /// Normalized successfully.
    Completed,
    /// Retries exhausted; requires manual remediation.
    DeadLettered,
}

/// One inbound webhook delivery, as accepted at the boundary.
///
/// Rows are created by `enqueue`, mutated only by the dispatcher, and
/// removed only by the retention sweep. Duplicate deliveries produce
/// duplicate rows; deduplication happens downstream at normalization
/// against the canonical event history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub id: QueueId,
    pub source: SourceKind,

    /// Provider event-type header value, when supplied.
    pub raw_type: Option<String>,

    /// Signature header value, kept for audit; verification already
    /// happened at the boundary.
    pub signature: Option<String>,

    /// The payload as delivered (opaque to the queue).
    pub payload: serde_json::Value,

    pub status: QueueStatus,

    /// Number of failed dispatch attempts so far.
    pub attempt_count: u32,

    /// Message from the most recent failure.
    pub last_error: Option<String>,

    pub enqueued_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl QueuedEvent {
    /// True when the row can be picked up by a dispatch run.
    pub fn is_pending(&self) -> bool {
        self.status == QueueStatus::Pending
    }

    /// True when no further processing will ever happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, QueueStatus::Completed | QueueStatus::DeadLettered)
    }
}
