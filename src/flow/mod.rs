//! Flow and cycle-time computation.
//!
//! Derives per-ticket and per-PR duration metrics from the canonical event
//! history. Records are recomputed wholesale from a subject's events and
//! upserted; a rerun replaces the row with the same result.

mod percentile;
mod pr;
mod store;
mod ticket;
mod wip;

use chrono::{DateTime, Utc};

pub use percentile::{p50, p85, p95, percentile};
pub use pr::{compute_pr_cycle, PrCycleRecord};
pub use store::{FlowMetricsStore, MemoryFlowMetricsStore};
pub use ticket::{compute_cycle_record, CycleRecord};
pub use wip::wip_by_stage;

use std::sync::Arc;

use crate::events::EventStore;
use crate::types::{PrNumber, RepoId, TicketKey};

/// Millisecond delta between two instants, in hours.
pub(crate) fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 3.6e6
}

/// Materializes cycle records from the event history into the metrics
/// tables it owns.
pub struct FlowEngine {
    events: Arc<dyn EventStore>,
    metrics: Arc<dyn FlowMetricsStore>,
}

impl FlowEngine {
    pub fn new(events: Arc<dyn EventStore>, metrics: Arc<dyn FlowMetricsStore>) -> Self {
        FlowEngine { events, metrics }
    }

    /// Recomputes the cycle record for one ticket.
    ///
    /// No-op (and no row) while the ticket has not reached a terminal stage.
    pub fn materialize_ticket(&self, ticket: &TicketKey) -> crate::events::Result<()> {
        let events = self.events.work_item_events(ticket)?;
        if let Some(record) = compute_cycle_record(&events) {
            self.metrics.upsert_cycle(record);
        }
        Ok(())
    }

    /// Recomputes the cycle record for one pull request.
    pub fn materialize_pr(&self, repo: &RepoId, number: PrNumber) -> crate::events::Result<()> {
        let events = self.events.pr_events(repo, number)?;
        if let Some(record) = compute_pr_cycle(&events) {
            self.metrics.upsert_pr_cycle(record);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{
        CanonicalEvent, MemoryEventStore, WorkItemEvent, WorkItemEventKind,
    };
    use crate::types::{PipelineStage, StreamId};
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
    }

    fn transition(
        ticket: &str,
        at: u32,
        from: Option<PipelineStage>,
        to: Option<PipelineStage>,
    ) -> CanonicalEvent {
        CanonicalEvent::WorkItem(WorkItemEvent {
            ticket: TicketKey::new(ticket),
            kind: WorkItemEventKind::StatusTransitioned,
            timestamp: ts(at),
            stream: Some(StreamId::new("payments")),
            from_status: None,
            to_status: None,
            from_stage: from,
            to_stage: to,
            blamed_stream: None,
        })
    }

    #[test]
    fn materialize_ticket_skips_open_tickets_and_records_terminal_ones() {
        let events = Arc::new(MemoryEventStore::new());
        let metrics = Arc::new(MemoryFlowMetricsStore::new());
        let engine = FlowEngine::new(events.clone(), metrics.clone());
        let ticket = TicketKey::new("X-1");

        events
            .insert_if_absent(transition(
                "X-1",
                9,
                Some(PipelineStage::Backlog),
                Some(PipelineStage::Dev),
            ))
            .unwrap();
        engine.materialize_ticket(&ticket).unwrap();
        assert!(metrics.cycle(&ticket).is_none());

        events
            .insert_if_absent(transition(
                "X-1",
                12,
                Some(PipelineStage::Dev),
                Some(PipelineStage::Done),
            ))
            .unwrap();
        engine.materialize_ticket(&ticket).unwrap();

        let record = metrics.cycle(&ticket).unwrap();
        assert_eq!(record.final_stage, PipelineStage::Done);
        assert!((record.active_hours - 3.0).abs() < 1e-9);
    }

    #[test]
    fn cycle_table_feeds_percentile_reporting() {
        let events = Arc::new(MemoryEventStore::new());
        let metrics = Arc::new(MemoryFlowMetricsStore::new());
        let engine = FlowEngine::new(events.clone(), metrics.clone());

        // Three completed tickets with cycle times of 2h, 4h, and 6h.
        for (ticket, done_at) in [("X-1", 11), ("X-2", 13), ("X-3", 15)] {
            events
                .insert_if_absent(transition(
                    ticket,
                    9,
                    Some(PipelineStage::Backlog),
                    Some(PipelineStage::Dev),
                ))
                .unwrap();
            events
                .insert_if_absent(transition(
                    ticket,
                    done_at,
                    Some(PipelineStage::Dev),
                    Some(PipelineStage::Done),
                ))
                .unwrap();
            engine.materialize_ticket(&TicketKey::new(ticket)).unwrap();
        }

        let cycles = metrics.cycles();
        assert_eq!(cycles.len(), 3);

        let mut hours: Vec<f64> = cycles.iter().map(|r| r.cycle_time_hours).collect();
        hours.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((p50(&hours).unwrap() - 4.0).abs() < 1e-9);
    }
}
