//! Query contracts for derived correlation data.
//!
//! Correlation records and deploy↔incident links are derived tables: the
//! engines recompute them from canonical history and upsert, so reruns
//! converge instead of duplicating.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::types::StreamId;

use super::blocking::CorrelationRecord;
use super::deploy_incident::DeployIncidentLink;

/// Owns the blocking-correlation record table.
pub trait CorrelationStore: Send + Sync {
    /// Inserts or replaces the record for its (analysis date, tech stream).
    fn upsert(&self, record: CorrelationRecord);

    fn get(&self, date: NaiveDate, tech_stream: &StreamId) -> Option<CorrelationRecord>;

    /// Hard-deletes records analyzed before `cutoff`; returns the count.
    fn delete_older_than(&self, cutoff: NaiveDate) -> usize;
}

/// In-memory correlation record table.
#[derive(Debug, Default)]
pub struct MemoryCorrelationStore {
    rows: Mutex<HashMap<(NaiveDate, StreamId), CorrelationRecord>>,
}

impl MemoryCorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records for one analysis date, ordered by tech stream
    /// (test observability).
    pub fn all_for_date(&self, date: NaiveDate) -> Vec<CorrelationRecord> {
        let rows = self.rows.lock().expect("correlation store poisoned");
        let mut records: Vec<CorrelationRecord> = rows
            .values()
            .filter(|r| r.analysis_date == date)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.tech_stream.cmp(&b.tech_stream));
        records
    }
}

impl CorrelationStore for MemoryCorrelationStore {
    fn upsert(&self, record: CorrelationRecord) {
        let mut rows = self.rows.lock().expect("correlation store poisoned");
        rows.insert((record.analysis_date, record.tech_stream.clone()), record);
    }

    fn get(&self, date: NaiveDate, tech_stream: &StreamId) -> Option<CorrelationRecord> {
        let rows = self.rows.lock().expect("correlation store poisoned");
        rows.get(&(date, tech_stream.clone())).cloned()
    }

    fn delete_older_than(&self, cutoff: NaiveDate) -> usize {
        let mut rows = self.rows.lock().expect("correlation store poisoned");
        let before = rows.len();
        rows.retain(|(date, _), _| *date >= cutoff);
        before - rows.len()
    }
}

/// Owns the deploy↔incident link table.
///
/// Links are keyed by (deploy subject, incident id); upserting the same
/// pair again is a no-op, so forward and backward passes can both claim
/// the same association.
pub trait LinkStore: Send + Sync {
    /// Returns `true` if the link was stored, `false` when the pair is
    /// already linked.
    fn upsert(&self, link: DeployIncidentLink) -> bool;

    /// The link claiming a deploy, if any.
    fn for_deploy(&self, deploy_subject: &str) -> Option<DeployIncidentLink>;

    /// The link claiming an incident, if any.
    fn for_incident(&self, incident_id: &str) -> Option<DeployIncidentLink>;
}

/// In-memory link table.
#[derive(Debug, Default)]
pub struct MemoryLinkStore {
    rows: Mutex<Vec<DeployIncidentLink>>,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().expect("link store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LinkStore for MemoryLinkStore {
    fn upsert(&self, link: DeployIncidentLink) -> bool {
        let mut rows = self.rows.lock().expect("link store poisoned");
        if rows
            .iter()
            .any(|l| l.deploy_subject == link.deploy_subject && l.incident_id == link.incident_id)
        {
            return false;
        }
        rows.push(link);
        true
    }

    fn for_deploy(&self, deploy_subject: &str) -> Option<DeployIncidentLink> {
        let rows = self.rows.lock().expect("link store poisoned");
        rows.iter().find(|l| l.deploy_subject == deploy_subject).cloned()
    }

    fn for_incident(&self, incident_id: &str) -> Option<DeployIncidentLink> {
        let rows = self.rows.lock().expect("link store poisoned");
        rows.iter().find(|l| l.incident_id == incident_id).cloned()
    }
}
