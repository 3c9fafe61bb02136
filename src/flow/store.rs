//! Derived flow-metric tables.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{PrNumber, RepoId, TicketKey};

use super::pr::PrCycleRecord;
use super::ticket::CycleRecord;

/// Owns the cycle-record tables. Upserts replace the existing row.
pub trait FlowMetricsStore: Send + Sync {
    fn upsert_cycle(&self, record: CycleRecord);
    fn upsert_pr_cycle(&self, record: PrCycleRecord);
    fn cycle(&self, ticket: &TicketKey) -> Option<CycleRecord>;
    fn pr_cycle(&self, repo: &RepoId, number: PrNumber) -> Option<PrCycleRecord>;
    /// All ticket cycle records (reporting input).
    fn cycles(&self) -> Vec<CycleRecord>;
}

/// In-memory flow-metric tables.
#[derive(Debug, Default)]
pub struct MemoryFlowMetricsStore {
    cycles: Mutex<HashMap<TicketKey, CycleRecord>>,
    pr_cycles: Mutex<HashMap<(RepoId, PrNumber), PrCycleRecord>>,
}

impl MemoryFlowMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowMetricsStore for MemoryFlowMetricsStore {
    fn upsert_cycle(&self, record: CycleRecord) {
        let mut cycles = self.cycles.lock().expect("flow store poisoned");
        cycles.insert(record.ticket.clone(), record);
    }

    fn upsert_pr_cycle(&self, record: PrCycleRecord) {
        let mut pr_cycles = self.pr_cycles.lock().expect("flow store poisoned");
        pr_cycles.insert((record.repo.clone(), record.number), record);
    }

    fn cycle(&self, ticket: &TicketKey) -> Option<CycleRecord> {
        self.cycles
            .lock()
            .expect("flow store poisoned")
            .get(ticket)
            .cloned()
    }

    fn pr_cycle(&self, repo: &RepoId, number: PrNumber) -> Option<PrCycleRecord> {
        self.pr_cycles
            .lock()
            .expect("flow store poisoned")
            .get(&(repo.clone(), number))
            .cloned()
    }

    fn cycles(&self) -> Vec<CycleRecord> {
        let mut records: Vec<CycleRecord> = self
            .cycles
            .lock()
            .expect("flow store poisoned")
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| a.ticket.cmp(&b.ticket));
        records
    }
}
