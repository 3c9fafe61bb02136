//! Forecast snapshot table.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::types::StreamId;

use super::ForecastSnapshot;

/// Owns the forecast snapshot table. Rows are immutable once created:
/// `insert_if_absent` keeps the existing row for a (stream, date) pair.
pub trait ForecastSnapshotStore: Send + Sync {
    /// Returns `true` if the snapshot was stored, `false` when a row for
    /// the same (stream, date) already exists.
    fn insert_if_absent(&self, snapshot: ForecastSnapshot) -> bool;

    fn get(&self, stream: &StreamId, date: NaiveDate) -> Option<ForecastSnapshot>;

    /// The most recent snapshot for a stream, if any.
    fn latest(&self, stream: &StreamId) -> Option<ForecastSnapshot>;

    /// Hard-deletes snapshots dated before `cutoff`; returns the count.
    fn delete_older_than(&self, cutoff: NaiveDate) -> usize;
}

/// In-memory snapshot table.
#[derive(Debug, Default)]
pub struct MemoryForecastSnapshotStore {
    rows: Mutex<HashMap<(StreamId, NaiveDate), ForecastSnapshot>>,
}

impl MemoryForecastSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All snapshots for a stream, oldest first (test observability).
    pub fn all(&self, stream: &StreamId) -> Vec<ForecastSnapshot> {
        let rows = self.rows.lock().expect("forecast store poisoned");
        let mut snapshots: Vec<ForecastSnapshot> = rows
            .values()
            .filter(|s| &s.stream == stream)
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| s.date);
        snapshots
    }
}

impl ForecastSnapshotStore for MemoryForecastSnapshotStore {
    fn insert_if_absent(&self, snapshot: ForecastSnapshot) -> bool {
        let mut rows = self.rows.lock().expect("forecast store poisoned");
        let key = (snapshot.stream.clone(), snapshot.date);
        if rows.contains_key(&key) {
            return false;
        }
        rows.insert(key, snapshot);
        true
    }

    fn get(&self, stream: &StreamId, date: NaiveDate) -> Option<ForecastSnapshot> {
        let rows = self.rows.lock().expect("forecast store poisoned");
        rows.get(&(stream.clone(), date)).cloned()
    }

    fn latest(&self, stream: &StreamId) -> Option<ForecastSnapshot> {
        let rows = self.rows.lock().expect("forecast store poisoned");
        rows.values()
            .filter(|s| &s.stream == stream)
            .max_by_key(|s| s.date)
            .cloned()
    }

    fn delete_older_than(&self, cutoff: NaiveDate) -> usize {
        let mut rows = self.rows.lock().expect("forecast store poisoned");
        let before = rows.len();
        rows.retain(|(_, date), _| *date >= cutoff);
        before - rows.len()
    }
}
