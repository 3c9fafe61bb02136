//! Query contract over the intake queue table.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{QueueId, SourceKind};

use super::row::{QueueStatus, QueuedEvent};

/// Errors surfaced by queue-store implementations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Backend unavailable or query failed.
    #[error("queue store error: {0}")]
    Backend(String),

    /// Update referenced a row that does not exist.
    #[error("no queued event with id {0}")]
    NotFound(QueueId),
}

/// Result type for queue-store operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Durable mailbox of inbound webhook payloads.
///
/// No uniqueness is enforced here: re-delivered webhooks enqueue fresh rows
/// and are deduped at normalization time.
pub trait QueueStore: Send + Sync {
    /// Appends a new pending row, assigning its id, and returns it.
    ///
    /// Must be a plain durable write: never blocks on downstream processing.
    fn enqueue(
        &self,
        source: SourceKind,
        payload: serde_json::Value,
        raw_type: Option<String>,
        signature: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<QueuedEvent>;

    /// Up to `limit` pending rows, oldest first (FIFO fairness).
    fn pending(&self, limit: usize) -> Result<Vec<QueuedEvent>>;

    /// Persists dispatcher-side mutations of a row.
    fn update(&self, row: &QueuedEvent) -> Result<()>;

    /// Flips `Processing` rows back to `Pending`; returns the count.
    ///
    /// A single dispatcher runs at a time, so any row still marked
    /// `Processing` between runs was stranded by a failed status write.
    /// Called at the start of each drain pass.
    fn requeue_processing(&self) -> Result<usize>;

    /// All dead-lettered rows, oldest first (operator report).
    fn dead_lettered(&self) -> Result<Vec<QueuedEvent>>;

    /// Hard-deletes rows enqueued before `cutoff`; returns the count.
    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// In-memory queue store.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: Vec<QueuedEvent>,
    next_id: u64,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches a row by id (test observability).
    pub fn get(&self, id: QueueId) -> Option<QueuedEvent> {
        let inner = self.inner.lock().expect("queue store poisoned");
        inner.rows.iter().find(|r| r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue store poisoned").rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueueStore for MemoryQueueStore {
    fn enqueue(
        &self,
        source: SourceKind,
        payload: serde_json::Value,
        raw_type: Option<String>,
        signature: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<QueuedEvent> {
        let mut inner = self.inner.lock().expect("queue store poisoned");
        let id = QueueId(inner.next_id);
        inner.next_id += 1;

        let row = QueuedEvent {
            id,
            source,
            raw_type,
            signature,
            payload,
            status: QueueStatus::Pending,
            attempt_count: 0,
            last_error: None,
            enqueued_at: now,
            processed_at: None,
        };
        inner.rows.push(row.clone());
        Ok(row)
    }

    fn pending(&self, limit: usize) -> Result<Vec<QueuedEvent>> {
        let inner = self.inner.lock().expect("queue store poisoned");
        let mut pending: Vec<QueuedEvent> = inner
            .rows
            .iter()
            .filter(|r| r.is_pending())
            .cloned()
            .collect();
        // Oldest first; id breaks ties for rows enqueued in the same instant.
        pending.sort_by_key(|r| (r.enqueued_at, r.id));
        pending.truncate(limit);
        Ok(pending)
    }

    fn update(&self, row: &QueuedEvent) -> Result<()> {
        let mut inner = self.inner.lock().expect("queue store poisoned");
        match inner.rows.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => {
                *existing = row.clone();
                Ok(())
            }
            None => Err(QueueError::NotFound(row.id)),
        }
    }

    fn requeue_processing(&self) -> Result<usize> {
        let mut inner = self.inner.lock().expect("queue store poisoned");
        let mut requeued = 0;
        for row in inner
            .rows
            .iter_mut()
            .filter(|r| r.status == QueueStatus::Processing)
        {
            row.status = QueueStatus::Pending;
            requeued += 1;
        }
        Ok(requeued)
    }

    fn dead_lettered(&self) -> Result<Vec<QueuedEvent>> {
        let inner = self.inner.lock().expect("queue store poisoned");
        let mut rows: Vec<QueuedEvent> = inner
            .rows
            .iter()
            .filter(|r| r.status == QueueStatus::DeadLettered)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.enqueued_at, r.id));
        Ok(rows)
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.inner.lock().expect("queue store poisoned");
        let before = inner.rows.len();
        inner.rows.retain(|r| r.enqueued_at >= cutoff);
        Ok(before - inner.rows.len())
    }
}
