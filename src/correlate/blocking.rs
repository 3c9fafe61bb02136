//! Cross-stream blocking correlation.
//!
//! For each tech stream blamed in recent blocked events, aggregates how
//! many delivery streams it impacted and classifies the severity of that
//! impact using the configured rule table and the impacted streams'
//! sprint confidence.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::events::EventStore;
use crate::forecast::ForecastSnapshotStore;
use crate::types::StreamId;

use super::severity::{Severity, SeverityRuleTable};
use super::store::CorrelationStore;

/// Trailing window for blocking aggregation, in days.
pub const BLOCKING_WINDOW_DAYS: i64 = 14;

/// One materialized correlation row, upserted per (analysis date, tech
/// stream) each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub analysis_date: NaiveDate,
    pub tech_stream: StreamId,

    /// Blocked events blaming this stream within the window.
    pub block_count: u32,
    /// Delivery streams owning the blocked tickets.
    pub impacted_streams: BTreeSet<StreamId>,
    /// Average sprint confidence across impacted streams that have a
    /// forecast snapshot; `None` when none do.
    pub avg_confidence_pct: Option<f64>,
    pub severity: Severity,
}

/// Materializes correlation records from the event history.
pub struct BlockingCorrelationEngine {
    events: Arc<dyn EventStore>,
    forecasts: Arc<dyn ForecastSnapshotStore>,
    records: Arc<dyn CorrelationStore>,
}

impl BlockingCorrelationEngine {
    pub fn new(
        events: Arc<dyn EventStore>,
        forecasts: Arc<dyn ForecastSnapshotStore>,
        records: Arc<dyn CorrelationStore>,
    ) -> Self {
        BlockingCorrelationEngine {
            events,
            forecasts,
            records,
        }
    }

    /// Runs the aggregation as of `now`, upserting one record per blamed
    /// tech stream. Reruns for the same date overwrite with the same
    /// result.
    pub fn materialize(
        &self,
        rules: &SeverityRuleTable,
        now: DateTime<Utc>,
    ) -> crate::events::Result<Vec<CorrelationRecord>> {
        let window_start = now - Duration::days(BLOCKING_WINDOW_DAYS);
        let blocked = self.events.blocked_events_between(window_start, now)?;

        // Group blame attributions by tech stream. Blocked events for
        // tickets with no delivery stream still count, but impact nothing.
        let mut per_stream: BTreeMap<StreamId, (u32, BTreeSet<StreamId>)> = BTreeMap::new();
        for event in blocked {
            let Some(blamed) = event.blamed_stream.clone() else {
                continue;
            };
            let entry = per_stream.entry(blamed).or_default();
            entry.0 += 1;
            if let Some(delivery) = event.stream.clone() {
                entry.1.insert(delivery);
            }
        }

        let analysis_date = now.date_naive();
        let mut records = Vec::with_capacity(per_stream.len());
        for (tech_stream, (block_count, impacted_streams)) in per_stream {
            let avg_confidence_pct = average_confidence(
                self.forecasts.as_ref(),
                &impacted_streams,
            );
            let severity = if impacted_streams.is_empty() {
                Severity::None
            } else {
                rules.classify(impacted_streams.len() as u32, avg_confidence_pct)
            };

            let record = CorrelationRecord {
                analysis_date,
                tech_stream: tech_stream.clone(),
                block_count,
                impacted_streams,
                avg_confidence_pct,
                severity,
            };
            debug!(
                tech_stream = %tech_stream,
                block_count,
                severity = %record.severity,
                "correlation record materialized"
            );
            self.records.upsert(record.clone());
            records.push(record);
        }
        Ok(records)
    }
}

fn average_confidence(
    forecasts: &dyn ForecastSnapshotStore,
    streams: &BTreeSet<StreamId>,
) -> Option<f64> {
    let scores: Vec<f64> = streams
        .iter()
        .filter_map(|stream| forecasts.latest(stream))
        .map(|snapshot| snapshot.confidence_pct)
        .collect();
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}
