//! Per-ticket cycle computation.
//!
//! Folds a ticket's transition history into stage durations. Duration in a
//! stage is accumulated from consecutive transition pairs: entering stage S
//! at `t1` and leaving at `t2` adds `t2 − t1` hours to S. Transitions with
//! an unmapped (`None`) target stage contribute no stage time but still
//! close the previous stage's interval.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{WorkItemEvent, WorkItemEventKind};
use crate::types::{PipelineStage, StreamId, TicketKey};

use super::hours_between;

/// Computed flow metrics for one completed ticket.
///
/// Exists only once the ticket has reached a terminal stage; upserted on
/// recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub ticket: TicketKey,
    pub stream: Option<StreamId>,
    pub completed_at: DateTime<Utc>,
    pub final_stage: PipelineStage,

    /// Creation (or earliest known event) to terminal transition.
    pub lead_time_hours: f64,
    /// First entry into an active stage to terminal transition.
    pub cycle_time_hours: f64,
    /// Time spent in active stages.
    pub active_hours: f64,
    /// Lead time not spent in active stages.
    pub wait_hours: f64,
    /// active / lead × 100; zero when lead time is zero.
    pub flow_efficiency_pct: f64,

    /// Hours accumulated per stage.
    pub stage_hours: BTreeMap<PipelineStage, f64>,
}

/// Derives the cycle record from a ticket's events (timestamp-ascending).
///
/// Returns `None` until the ticket reaches a terminal stage. Events after
/// the first terminal transition are ignored (reopened tickets keep their
/// original completion record until a later terminal transition replaces
/// it on recomputation — at which point the fold runs to the new terminal).
pub fn compute_cycle_record(events: &[WorkItemEvent]) -> Option<CycleRecord> {
    let terminal = events.iter().rev().find(|e| e.is_terminal_transition())?;
    let completed_at = terminal.timestamp;
    let final_stage = terminal.to_stage?;

    let ticket = terminal.ticket.clone();
    let stream = events.iter().find_map(|e| e.stream.clone());

    let started_at = events
        .iter()
        .find(|e| e.kind == WorkItemEventKind::Created)
        .map(|e| e.timestamp)
        .or_else(|| events.first().map(|e| e.timestamp))?;

    // Accumulate stage durations from consecutive transitions up to the
    // terminal one.
    let mut stage_hours: BTreeMap<PipelineStage, f64> = BTreeMap::new();
    let mut current: Option<(PipelineStage, DateTime<Utc>)> = None;
    let mut first_active_entry: Option<DateTime<Utc>> = None;

    for event in events
        .iter()
        .filter(|e| e.kind == WorkItemEventKind::StatusTransitioned)
        .take_while(|e| e.timestamp <= completed_at)
    {
        if let Some((stage, entered_at)) = current.take() {
            *stage_hours.entry(stage).or_insert(0.0) += hours_between(entered_at, event.timestamp);
        }
        current = event.to_stage.map(|stage| (stage, event.timestamp));
        if first_active_entry.is_none()
            && event.to_stage.is_some_and(|s| s.is_active_work())
        {
            first_active_entry = Some(event.timestamp);
        }
    }

    let lead_time_hours = hours_between(started_at, completed_at);
    let cycle_time_hours = first_active_entry
        .map(|entry| hours_between(entry, completed_at))
        .unwrap_or(0.0);

    let active_hours: f64 = stage_hours
        .iter()
        .filter(|(stage, _)| stage.is_active_work())
        .map(|(_, hours)| hours)
        .sum();
    let wait_hours = (lead_time_hours - active_hours).max(0.0);
    let flow_efficiency_pct = if lead_time_hours > 0.0 {
        active_hours / lead_time_hours * 100.0
    } else {
        0.0
    };

    Some(CycleRecord {
        ticket,
        stream,
        completed_at,
        final_stage,
        lead_time_hours,
        cycle_time_hours,
        active_hours,
        wait_hours,
        flow_efficiency_pct,
        stage_hours,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
    }

    fn created(at: u32) -> WorkItemEvent {
        WorkItemEvent {
            ticket: TicketKey::new("X-1"),
            kind: WorkItemEventKind::Created,
            timestamp: ts(at),
            stream: Some(StreamId::new("payments")),
            from_status: None,
            to_status: None,
            from_stage: None,
            to_stage: None,
            blamed_stream: None,
        }
    }

    fn transition(at: u32, from: Option<PipelineStage>, to: Option<PipelineStage>) -> WorkItemEvent {
        WorkItemEvent {
            kind: WorkItemEventKind::StatusTransitioned,
            timestamp: ts(at),
            from_stage: from,
            to_stage: to,
            ..created(at)
        }
    }

    #[test]
    fn open_ticket_has_no_record() {
        let events = vec![
            created(8),
            transition(9, Some(PipelineStage::Backlog), Some(PipelineStage::Dev)),
        ];
        assert!(compute_cycle_record(&events).is_none());
    }

    #[test]
    fn stage_durations_come_from_consecutive_pairs() {
        // 08:00 created, 09:00 → dev, 12:00 → code_review, 14:00 → done
        let events = vec![
            created(8),
            transition(9, Some(PipelineStage::Backlog), Some(PipelineStage::Dev)),
            transition(12, Some(PipelineStage::Dev), Some(PipelineStage::CodeReview)),
            transition(14, Some(PipelineStage::CodeReview), Some(PipelineStage::Done)),
        ];
        let record = compute_cycle_record(&events).unwrap();

        assert_eq!(record.stage_hours[&PipelineStage::Dev], 3.0);
        assert_eq!(record.stage_hours[&PipelineStage::CodeReview], 2.0);
        assert_eq!(record.lead_time_hours, 6.0);
        assert_eq!(record.cycle_time_hours, 5.0);
        assert_eq!(record.active_hours, 5.0);
        assert_eq!(record.wait_hours, 1.0);
        assert!((record.flow_efficiency_pct - 5.0 / 6.0 * 100.0).abs() < 1e-9);
        assert_eq!(record.final_stage, PipelineStage::Done);
        assert_eq!(record.completed_at, ts(14));
    }

    #[test]
    fn waiting_stages_do_not_count_as_active() {
        // 2h in backlog (wait), 2h in dev (active), then done.
        let events = vec![
            transition(8, None, Some(PipelineStage::Backlog)),
            transition(10, Some(PipelineStage::Backlog), Some(PipelineStage::Dev)),
            transition(12, Some(PipelineStage::Dev), Some(PipelineStage::Done)),
        ];
        let record = compute_cycle_record(&events).unwrap();
        assert_eq!(record.active_hours, 2.0);
        assert_eq!(record.wait_hours, 2.0);
        assert_eq!(record.flow_efficiency_pct, 50.0);
    }

    #[test]
    fn unmapped_stage_closes_previous_interval_without_accruing() {
        let events = vec![
            transition(8, None, Some(PipelineStage::Dev)),
            transition(10, Some(PipelineStage::Dev), None), // unmapped status
            transition(13, None, Some(PipelineStage::Done)),
        ];
        let record = compute_cycle_record(&events).unwrap();
        assert_eq!(record.stage_hours[&PipelineStage::Dev], 2.0);
        assert!(!record.stage_hours.contains_key(&PipelineStage::Done));
    }

    #[test]
    fn cancelled_is_terminal_too() {
        let events = vec![
            created(8),
            transition(9, Some(PipelineStage::Backlog), Some(PipelineStage::Cancelled)),
        ];
        let record = compute_cycle_record(&events).unwrap();
        assert_eq!(record.final_stage, PipelineStage::Cancelled);
        assert_eq!(record.cycle_time_hours, 0.0);
    }

    #[test]
    fn recomputation_is_stable() {
        let events = vec![
            created(8),
            transition(9, Some(PipelineStage::Backlog), Some(PipelineStage::Dev)),
            transition(14, Some(PipelineStage::Dev), Some(PipelineStage::Done)),
        ];
        assert_eq!(
            compute_cycle_record(&events),
            compute_cycle_record(&events)
        );
    }
}
