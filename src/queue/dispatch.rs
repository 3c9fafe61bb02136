//! Scheduled dispatch of pending queue rows to normalizers.
//!
//! One `process_pending` call is one drain pass: select pending rows FIFO,
//! normalize each, and record the per-row outcome. Rows are processed
//! sequentially; a failure on one row never aborts the rest of the batch.
//! There is no backoff beyond the schedule interval — failed rows simply
//! stay pending for the next run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::events::EventStore;
use crate::normalize::Normalizer;

use super::row::{QueueStatus, QueuedEvent};
use super::store::{QueueStore, Result};

/// Dispatch attempts before a row is dead-lettered.
pub const MAX_ATTEMPTS: u32 = 3;

/// Aggregate counts from one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Rows that completed normalization.
    pub processed: usize,
    /// Rows that failed and remain pending for the next run.
    pub failed: usize,
    /// Rows that exhausted their retries this run.
    pub dead_lettered: usize,
}

/// Drains the intake queue into the canonical event store.
pub struct Dispatcher {
    queue: Arc<dyn QueueStore>,
    events: Arc<dyn EventStore>,
    normalizer: Arc<dyn Normalizer>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        events: Arc<dyn EventStore>,
        normalizer: Arc<dyn Normalizer>,
    ) -> Self {
        Dispatcher {
            queue,
            events,
            normalizer,
        }
    }

    /// Processes up to `limit` pending rows, oldest first.
    ///
    /// Returns aggregate counts. Only queue-store failures propagate as
    /// errors; normalization failures are captured per row.
    pub fn process_pending(&self, limit: usize, now: DateTime<Utc>) -> Result<DispatchOutcome> {
        // Rows stranded in Processing by a failed status write on an
        // earlier run go back into rotation.
        let stranded = self.queue.requeue_processing()?;
        if stranded > 0 {
            warn!(count = stranded, "requeued rows stranded in processing");
        }

        let pending = self.queue.pending(limit)?;
        let mut outcome = DispatchOutcome::default();

        for mut row in pending {
            row.status = QueueStatus::Processing;
            self.queue.update(&row)?;

            match self.dispatch_row(&row) {
                Ok(inserted) => {
                    row.status = QueueStatus::Completed;
                    row.processed_at = Some(now);
                    row.last_error = None;
                    self.queue.update(&row)?;
                    outcome.processed += 1;
                    debug!(
                        id = %row.id,
                        source = %row.source,
                        inserted,
                        "queue row normalized"
                    );
                }
                Err(message) => {
                    row.attempt_count += 1;
                    row.last_error = Some(message.clone());
                    if row.attempt_count >= MAX_ATTEMPTS {
                        row.status = QueueStatus::DeadLettered;
                        row.processed_at = Some(now);
                        outcome.dead_lettered += 1;
                        warn!(
                            id = %row.id,
                            source = %row.source,
                            attempts = row.attempt_count,
                            error = %message,
                            "queue row dead-lettered"
                        );
                    } else {
                        row.status = QueueStatus::Pending;
                        outcome.failed += 1;
                        debug!(
                            id = %row.id,
                            source = %row.source,
                            attempts = row.attempt_count,
                            error = %message,
                            "queue row failed, will retry"
                        );
                    }
                    self.queue.update(&row)?;
                }
            }
        }

        if outcome != DispatchOutcome::default() {
            info!(
                processed = outcome.processed,
                failed = outcome.failed,
                dead_lettered = outcome.dead_lettered,
                "dispatch run finished"
            );
        }
        Ok(outcome)
    }

    /// Normalizes one row and inserts its events idempotently.
    ///
    /// Returns the number of newly inserted events; the error is the
    /// message recorded on the row.
    fn dispatch_row(&self, row: &QueuedEvent) -> std::result::Result<usize, String> {
        let events = self
            .normalizer
            .normalize(row.source, row.raw_type.as_deref(), &row.payload)
            .map_err(|e| e.to_string())?;

        let mut inserted = 0;
        for event in events {
            if self
                .events
                .insert_if_absent(event)
                .map_err(|e| e.to_string())?
            {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Dead-lettered rows for operator reporting.
    pub fn dead_letter_report(&self) -> Result<Vec<QueuedEvent>> {
        self.queue.dead_lettered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CanonicalEvent, MemoryEventStore, WorkItemEvent, WorkItemEventKind};
    use crate::normalize::NormalizeError;
    use crate::queue::MemoryQueueStore;
    use crate::types::{SourceKind, TicketKey};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ts(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    fn created_event(ticket: &str, at: i64) -> CanonicalEvent {
        CanonicalEvent::WorkItem(WorkItemEvent {
            ticket: TicketKey::new(ticket),
            kind: WorkItemEventKind::Created,
            timestamp: ts(at),
            stream: None,
            from_status: None,
            to_status: None,
            from_stage: None,
            to_stage: None,
            blamed_stream: None,
        })
    }

    /// Normalizer that fails a configurable number of times, then emits a
    /// fixed event.
    struct Flaky {
        failures_remaining: AtomicU32,
        event: CanonicalEvent,
    }

    impl Flaky {
        fn new(failures: u32, event: CanonicalEvent) -> Self {
            Flaky {
                failures_remaining: AtomicU32::new(failures),
                event,
            }
        }
    }

    impl Normalizer for Flaky {
        fn normalize(
            &self,
            _source: SourceKind,
            _raw_type: Option<&str>,
            _payload: &serde_json::Value,
        ) -> std::result::Result<Vec<CanonicalEvent>, NormalizeError> {
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(NormalizeError::MissingField("simulated"));
            }
            Ok(vec![self.event.clone()])
        }
    }

    struct Fixture {
        queue: Arc<MemoryQueueStore>,
        events: Arc<MemoryEventStore>,
        dispatcher: Dispatcher,
    }

    fn fixture(normalizer: Arc<dyn Normalizer>) -> Fixture {
        let queue = Arc::new(MemoryQueueStore::new());
        let events = Arc::new(MemoryEventStore::new());
        let dispatcher = Dispatcher::new(queue.clone(), events.clone(), normalizer);
        Fixture {
            queue,
            events,
            dispatcher,
        }
    }

    fn enqueue_one(queue: &MemoryQueueStore) -> QueuedEvent {
        queue
            .enqueue(
                SourceKind::IssueTracker,
                serde_json::json!({}),
                Some("issue_created".into()),
                None,
                ts(0),
            )
            .unwrap()
    }

    #[test]
    fn successful_row_completes_with_processed_timestamp() {
        let f = fixture(Arc::new(Flaky::new(0, created_event("X-1", 100))));
        let row = enqueue_one(&f.queue);

        let outcome = f.dispatcher.process_pending(10, ts(500)).unwrap();
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.failed, 0);

        let row = f.queue.get(row.id).unwrap();
        assert_eq!(row.status, QueueStatus::Completed);
        assert_eq!(row.processed_at, Some(ts(500)));
        assert_eq!(f.events.len(), 1);
    }

    #[test]
    fn failure_then_success_completes_with_attempt_count() {
        // Fails MAX_ATTEMPTS - 1 times, then succeeds.
        let f = fixture(Arc::new(Flaky::new(
            MAX_ATTEMPTS - 1,
            created_event("X-1", 100),
        )));
        let row = enqueue_one(&f.queue);

        for _ in 0..(MAX_ATTEMPTS - 1) {
            let outcome = f.dispatcher.process_pending(10, ts(500)).unwrap();
            assert_eq!(outcome.failed, 1);
        }

        let outcome = f.dispatcher.process_pending(10, ts(900)).unwrap();
        assert_eq!(outcome.processed, 1);

        let row = f.queue.get(row.id).unwrap();
        assert_eq!(row.status, QueueStatus::Completed);
        assert_eq!(row.attempt_count, MAX_ATTEMPTS - 1);
    }

    #[test]
    fn exhausted_retries_dead_letter_permanently() {
        let f = fixture(Arc::new(Flaky::new(u32::MAX, created_event("X-1", 100))));
        let row = enqueue_one(&f.queue);

        for run in 0..MAX_ATTEMPTS {
            let outcome = f.dispatcher.process_pending(10, ts(500)).unwrap();
            if run == MAX_ATTEMPTS - 1 {
                assert_eq!(outcome.dead_lettered, 1);
            } else {
                assert_eq!(outcome.failed, 1);
            }
        }

        let row = f.queue.get(row.id).unwrap();
        assert_eq!(row.status, QueueStatus::DeadLettered);
        assert_eq!(row.attempt_count, MAX_ATTEMPTS);
        assert!(row.last_error.is_some());

        // Dead-lettered rows are never picked up again.
        let outcome = f.dispatcher.process_pending(10, ts(600)).unwrap();
        assert_eq!(outcome, DispatchOutcome::default());
        assert_eq!(f.queue.get(row.id).unwrap().attempt_count, MAX_ATTEMPTS);

        let report = f.dispatcher.dead_letter_report().unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].id, row.id);
    }

    #[test]
    fn stranded_processing_row_is_recovered_on_the_next_run() {
        let f = fixture(Arc::new(Flaky::new(0, created_event("X-1", 100))));
        let mut row = enqueue_one(&f.queue);

        // A run that died after claiming the row leaves it in Processing,
        // invisible to the pending selection.
        row.status = QueueStatus::Processing;
        f.queue.update(&row).unwrap();
        assert!(f.queue.pending(10).unwrap().is_empty());

        let outcome = f.dispatcher.process_pending(10, ts(500)).unwrap();
        assert_eq!(outcome.processed, 1);
        assert_eq!(f.queue.get(row.id).unwrap().status, QueueStatus::Completed);
    }

    #[test]
    fn one_bad_row_does_not_abort_the_batch() {
        // First delivery fails (flaky budget of 1), rest succeed. FIFO order
        // means the oldest row takes the failure.
        let f = fixture(Arc::new(Flaky::new(1, created_event("X-1", 100))));
        enqueue_one(&f.queue);
        f.queue
            .enqueue(
                SourceKind::IssueTracker,
                serde_json::json!({"second": true}),
                None,
                None,
                ts(10),
            )
            .unwrap();

        let outcome = f.dispatcher.process_pending(10, ts(500)).unwrap();
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.processed, 1);
    }

    #[test]
    fn duplicate_deliveries_insert_one_canonical_event() {
        let f = fixture(Arc::new(Flaky::new(0, created_event("X-1", 100))));
        enqueue_one(&f.queue);
        enqueue_one(&f.queue);

        let outcome = f.dispatcher.process_pending(10, ts(500)).unwrap();
        assert_eq!(outcome.processed, 2);

        // Both rows complete, but the second insert was a no-op.
        assert_eq!(f.events.len(), 1);
    }

    #[test]
    fn limit_leaves_excess_rows_pending() {
        let f = fixture(Arc::new(Flaky::new(0, created_event("X-1", 100))));
        for _ in 0..5 {
            enqueue_one(&f.queue);
        }

        let outcome = f.dispatcher.process_pending(3, ts(500)).unwrap();
        assert_eq!(outcome.processed, 3);

        let remaining = f.queue.pending(10).unwrap();
        assert_eq!(remaining.len(), 2);
    }
}
