//! Work-in-progress counts by pipeline stage.

use std::collections::{BTreeMap, HashMap};

use crate::events::{WorkItemEvent, WorkItemEventKind};
use crate::types::{PipelineStage, TicketKey};

/// Counts tickets currently in each non-terminal stage.
///
/// A ticket's current stage is the target of its latest transition; tickets
/// whose latest transition is terminal, or whose latest target stage is
/// unmapped, are excluded.
pub fn wip_by_stage(events: &[WorkItemEvent]) -> BTreeMap<PipelineStage, usize> {
    let mut latest: HashMap<&TicketKey, &WorkItemEvent> = HashMap::new();
    for event in events
        .iter()
        .filter(|e| e.kind == WorkItemEventKind::StatusTransitioned)
    {
        let entry = latest.entry(&event.ticket).or_insert(event);
        if event.timestamp >= entry.timestamp {
            *entry = event;
        }
    }

    let mut counts = BTreeMap::new();
    for event in latest.values() {
        if let Some(stage) = event.to_stage {
            if !stage.is_terminal() {
                *counts.entry(stage).or_insert(0) += 1;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
    }

    fn transition(ticket: &str, at: u32, to: Option<PipelineStage>) -> WorkItemEvent {
        WorkItemEvent {
            ticket: TicketKey::new(ticket),
            kind: WorkItemEventKind::StatusTransitioned,
            timestamp: ts(at),
            stream: None,
            from_status: None,
            to_status: None,
            from_stage: None,
            to_stage: to,
            blamed_stream: None,
        }
    }

    #[test]
    fn counts_latest_stage_per_ticket() {
        let events = vec![
            transition("X-1", 9, Some(PipelineStage::Dev)),
            transition("X-1", 11, Some(PipelineStage::CodeReview)),
            transition("X-2", 10, Some(PipelineStage::Dev)),
            transition("X-3", 10, Some(PipelineStage::Done)), // completed: excluded
            transition("X-4", 10, None),                      // unmapped: excluded
        ];
        let wip = wip_by_stage(&events);

        assert_eq!(wip.get(&PipelineStage::Dev), Some(&1));
        assert_eq!(wip.get(&PipelineStage::CodeReview), Some(&1));
        assert_eq!(wip.get(&PipelineStage::Done), None);
        assert_eq!(wip.values().sum::<usize>(), 2);
    }

    #[test]
    fn empty_history_is_empty_wip() {
        assert!(wip_by_stage(&[]).is_empty());
    }
}
