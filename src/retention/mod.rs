//! Retention sweep.
//!
//! Each derived and historical table has a horizon in calendar months;
//! the sweep hard-deletes rows older than the horizon. Horizons come from
//! compiled-in defaults, with per-table overrides from external settings
//! merged on top.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::correlate::CorrelationStore;
use crate::events::{EventStore, StoreError};
use crate::forecast::ForecastSnapshotStore;
use crate::queue::{QueueError, QueueStore};

/// The tables the sweep covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionTable {
    QueuedEvents,
    CanonicalEvents,
    ForecastSnapshots,
    CorrelationRecords,
}

impl RetentionTable {
    pub const ALL: [RetentionTable; 4] = [
        RetentionTable::QueuedEvents,
        RetentionTable::CanonicalEvents,
        RetentionTable::ForecastSnapshots,
        RetentionTable::CorrelationRecords,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionTable::QueuedEvents => "queued_events",
            RetentionTable::CanonicalEvents => "canonical_events",
            RetentionTable::ForecastSnapshots => "forecast_snapshots",
            RetentionTable::CorrelationRecords => "correlation_records",
        }
    }

    fn default_months(&self) -> u32 {
        match self {
            RetentionTable::QueuedEvents => 6,
            RetentionTable::CanonicalEvents => 24,
            RetentionTable::ForecastSnapshots => 12,
            RetentionTable::CorrelationRecords => 12,
        }
    }
}

/// Per-table horizons in months.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    months: BTreeMap<RetentionTable, u32>,
}

impl RetentionPolicy {
    /// The compiled-in horizons.
    pub fn defaults() -> Self {
        let months = RetentionTable::ALL
            .iter()
            .map(|t| (*t, t.default_months()))
            .collect();
        RetentionPolicy { months }
    }

    /// Defaults with the given per-table overrides merged on top. Tables
    /// absent from `overrides` keep their default horizon.
    pub fn with_overrides(overrides: &BTreeMap<RetentionTable, u32>) -> Self {
        let mut policy = Self::defaults();
        for (table, months) in overrides {
            policy.months.insert(*table, *months);
        }
        policy
    }

    pub fn months_for(&self, table: RetentionTable) -> u32 {
        self.months
            .get(&table)
            .copied()
            .unwrap_or_else(|| table.default_months())
    }

    /// The deletion cutoff for a table as of `now`. Rows strictly older
    /// than this survive nothing; rows at or after it are kept.
    pub fn cutoff(&self, table: RetentionTable, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_months(Months::new(self.months_for(table)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Errors surfaced by the sweep.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Events(#[from] StoreError),
}

/// Row counts deleted by one sweep run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub queued_events: usize,
    pub canonical_events: usize,
    pub forecast_snapshots: usize,
    pub correlation_records: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.queued_events
            + self.canonical_events
            + self.forecast_snapshots
            + self.correlation_records
    }
}

/// Runs the retention sweep across all covered tables.
pub struct RetentionSweeper {
    queue: Arc<dyn QueueStore>,
    events: Arc<dyn EventStore>,
    forecasts: Arc<dyn ForecastSnapshotStore>,
    correlations: Arc<dyn CorrelationStore>,
    last_run: Mutex<Option<DateTime<Utc>>>,
}

impl RetentionSweeper {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        events: Arc<dyn EventStore>,
        forecasts: Arc<dyn ForecastSnapshotStore>,
        correlations: Arc<dyn CorrelationStore>,
    ) -> Self {
        RetentionSweeper {
            queue,
            events,
            forecasts,
            correlations,
            last_run: Mutex::new(None),
        }
    }

    /// When the sweep last completed, if it has.
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        *self.last_run.lock().expect("retention state poisoned")
    }

    /// Deletes everything older than each table's horizon as of `now`.
    pub fn sweep(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> Result<SweepReport, SweepError> {
        let queued_events = self
            .queue
            .delete_older_than(policy.cutoff(RetentionTable::QueuedEvents, now))?;
        let canonical_events = self
            .events
            .delete_older_than(policy.cutoff(RetentionTable::CanonicalEvents, now))?;
        let forecast_snapshots = self
            .forecasts
            .delete_older_than(policy.cutoff(RetentionTable::ForecastSnapshots, now).date_naive());
        let correlation_records = self
            .correlations
            .delete_older_than(policy.cutoff(RetentionTable::CorrelationRecords, now).date_naive());

        let report = SweepReport {
            queued_events,
            canonical_events,
            forecast_snapshots,
            correlation_records,
        };
        *self.last_run.lock().expect("retention state poisoned") = Some(now);
        info!(
            queued = report.queued_events,
            events = report.canonical_events,
            forecasts = report.forecast_snapshots,
            correlations = report.correlation_records,
            "retention sweep completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::{CorrelationRecord, MemoryCorrelationStore, Severity};
    use crate::events::{CanonicalEvent, MemoryEventStore, WorkItemEvent, WorkItemEventKind};
    use crate::forecast::{ForecastSnapshot, MemoryForecastSnapshotStore};
    use crate::queue::MemoryQueueStore;
    use crate::types::{SourceKind, StreamId, TicketKey};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 16, 12, 0, 0).unwrap()
    }

    fn months_ago(n: u32) -> DateTime<Utc> {
        now().checked_sub_months(Months::new(n)).unwrap()
    }

    fn work_item(at: DateTime<Utc>) -> CanonicalEvent {
        CanonicalEvent::WorkItem(WorkItemEvent {
            ticket: TicketKey::new("X-1"),
            kind: WorkItemEventKind::Created,
            timestamp: at,
            stream: None,
            from_status: None,
            to_status: None,
            from_stage: None,
            to_stage: None,
            blamed_stream: None,
        })
    }

    fn snapshot(at: DateTime<Utc>) -> ForecastSnapshot {
        ForecastSnapshot {
            stream: StreamId::new("payments"),
            date: at.date_naive(),
            sample_count: 10,
            run_count: 1000,
            remaining_scope: 5,
            working_days_remaining: 8,
            confidence_pct: 80.0,
            has_insufficient_data: false,
            p50_completion: None,
            p85_completion: None,
            p95_completion: None,
            histogram: BTreeMap::new(),
        }
    }

    fn correlation(at: DateTime<Utc>) -> CorrelationRecord {
        CorrelationRecord {
            analysis_date: at.date_naive(),
            tech_stream: StreamId::new("platform"),
            block_count: 1,
            impacted_streams: Default::default(),
            avg_confidence_pct: None,
            severity: Severity::None,
        }
    }

    struct Fixture {
        queue: Arc<MemoryQueueStore>,
        events: Arc<MemoryEventStore>,
        forecasts: Arc<MemoryForecastSnapshotStore>,
        correlations: Arc<MemoryCorrelationStore>,
        sweeper: RetentionSweeper,
    }

    fn fixture() -> Fixture {
        let queue = Arc::new(MemoryQueueStore::new());
        let events = Arc::new(MemoryEventStore::new());
        let forecasts = Arc::new(MemoryForecastSnapshotStore::new());
        let correlations = Arc::new(MemoryCorrelationStore::new());
        let sweeper = RetentionSweeper::new(
            queue.clone(),
            events.clone(),
            forecasts.clone(),
            correlations.clone(),
        );
        Fixture {
            queue,
            events,
            forecasts,
            correlations,
            sweeper,
        }
    }

    #[test]
    fn defaults_match_the_documented_horizons() {
        let policy = RetentionPolicy::defaults();
        assert_eq!(policy.months_for(RetentionTable::QueuedEvents), 6);
        assert_eq!(policy.months_for(RetentionTable::CanonicalEvents), 24);
        assert_eq!(policy.months_for(RetentionTable::ForecastSnapshots), 12);
        assert_eq!(policy.months_for(RetentionTable::CorrelationRecords), 12);
    }

    #[test]
    fn overrides_replace_only_the_named_tables() {
        let mut overrides = BTreeMap::new();
        overrides.insert(RetentionTable::QueuedEvents, 1);
        let policy = RetentionPolicy::with_overrides(&overrides);
        assert_eq!(policy.months_for(RetentionTable::QueuedEvents), 1);
        assert_eq!(policy.months_for(RetentionTable::CanonicalEvents), 24);
    }

    #[test]
    fn sweep_prunes_each_table_at_its_own_horizon() {
        let f = fixture();

        // Queue: one row past the 6-month horizon, one within it.
        f.queue
            .enqueue(
                SourceKind::IssueTracker,
                serde_json::json!({}),
                None,
                None,
                months_ago(7),
            )
            .unwrap();
        f.queue
            .enqueue(
                SourceKind::IssueTracker,
                serde_json::json!({}),
                None,
                None,
                months_ago(1),
            )
            .unwrap();

        // Events: 24-month horizon.
        f.events.insert_if_absent(work_item(months_ago(25))).unwrap();
        f.events.insert_if_absent(work_item(months_ago(2))).unwrap();

        // Forecasts and correlations: 12-month horizon.
        f.forecasts.insert_if_absent(snapshot(months_ago(13)));
        f.forecasts.insert_if_absent(snapshot(months_ago(3)));
        f.correlations.upsert(correlation(months_ago(13)));
        f.correlations.upsert(correlation(months_ago(3)));

        let report = f
            .sweeper
            .sweep(&RetentionPolicy::defaults(), now())
            .unwrap();
        assert_eq!(report.queued_events, 1);
        assert_eq!(report.canonical_events, 1);
        assert_eq!(report.forecast_snapshots, 1);
        assert_eq!(report.correlation_records, 1);
        assert_eq!(report.total(), 4);
    }

    #[test]
    fn sweep_records_the_last_run_time() {
        let f = fixture();
        assert!(f.sweeper.last_run().is_none());
        f.sweeper.sweep(&RetentionPolicy::defaults(), now()).unwrap();
        assert_eq!(f.sweeper.last_run(), Some(now()));
    }

    #[test]
    fn shortened_horizon_prunes_more() {
        let f = fixture();
        f.events.insert_if_absent(work_item(months_ago(3))).unwrap();

        let report = f
            .sweeper
            .sweep(&RetentionPolicy::defaults(), now())
            .unwrap();
        assert_eq!(report.canonical_events, 0);

        let mut overrides = BTreeMap::new();
        overrides.insert(RetentionTable::CanonicalEvents, 2);
        let report = f
            .sweeper
            .sweep(&RetentionPolicy::with_overrides(&overrides), now())
            .unwrap();
        assert_eq!(report.canonical_events, 1);
    }
}
