//! Monte Carlo forecast and confidence engine.
//!
//! Samples historical daily throughput (completed tickets per workday over
//! a trailing window) and projects sprint-goal confidence and completion
//! dates. Snapshots are one-per-(stream, day) and immutable: a rerun on the
//! same day is a no-op, the next day writes a fresh row.

mod calendar;
mod monte_carlo;
mod store;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use calendar::{
    add_working_days, working_days_between, HolidayCalendar, WorkdayCalendar, Weekdays,
};
pub use monte_carlo::{
    completion_trials, sprint_confidence, SprintConfidence, DEFAULT_RUNS, MAX_TRIAL_DAYS,
};
pub use store::{ForecastSnapshotStore, MemoryForecastSnapshotStore};

use crate::events::EventStore;
use crate::flow::{p50, p85, p95};
use crate::types::StreamId;

/// Trailing sample window for sprint confidence, in weeks.
pub const DEFAULT_SAMPLE_WINDOW_WEEKS: u64 = 12;

/// One materialized forecast for a stream on a given day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    pub stream: StreamId,
    pub date: NaiveDate,

    /// Simulation inputs.
    pub sample_count: usize,
    pub run_count: u32,
    pub remaining_scope: u32,
    pub working_days_remaining: u32,

    pub confidence_pct: f64,
    pub has_insufficient_data: bool,

    /// Percentile completion dates from the trial distribution.
    pub p50_completion: Option<NaiveDate>,
    pub p85_completion: Option<NaiveDate>,
    pub p95_completion: Option<NaiveDate>,

    /// Trial-outcome distribution: working days to finish → trial count.
    pub histogram: BTreeMap<u32, u32>,
}

/// Materializes forecast snapshots from the event history.
pub struct ForecastEngine {
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn ForecastSnapshotStore>,
    calendar: Arc<dyn WorkdayCalendar>,
}

impl ForecastEngine {
    pub fn new(
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn ForecastSnapshotStore>,
        calendar: Arc<dyn WorkdayCalendar>,
    ) -> Self {
        ForecastEngine {
            events,
            snapshots,
            calendar,
        }
    }

    /// Daily completed-ticket counts per workday over the trailing window
    /// ending at `as_of` (exclusive of `as_of` itself).
    ///
    /// Workdays with no completions contribute zero samples — leaving them
    /// out would bias throughput upwards.
    pub fn daily_throughput(
        &self,
        stream: &StreamId,
        as_of: NaiveDate,
    ) -> crate::events::Result<Vec<f64>> {
        let window_start = as_of
            .checked_sub_days(Days::new(DEFAULT_SAMPLE_WINDOW_WEEKS * 7))
            .unwrap_or(NaiveDate::MIN);

        let from = start_of_day(window_start);
        let to = start_of_day(as_of);
        let completions = self
            .events
            .terminal_transitions_between(Some(stream), from, to)?;

        let mut per_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        let mut date = window_start;
        while date < as_of {
            if self.calendar.is_workday(date) {
                per_day.insert(date, 0.0);
            }
            date = date.checked_add_days(Days::new(1)).unwrap_or(as_of);
        }
        for completion in completions {
            let day = completion.timestamp.date_naive();
            // Weekend completions count toward the following samples only if
            // the day is tracked; otherwise fold into the nearest prior
            // workday bucket if one exists.
            if let Some(count) = per_day.get_mut(&day) {
                *count += 1.0;
            } else if let Some((_, count)) = per_day.range_mut(..day).next_back() {
                *count += 1.0;
            }
        }

        Ok(per_day.into_values().collect())
    }

    /// Materializes the snapshot for `(stream, as_of)`.
    ///
    /// Returns the stored snapshot; an existing row for the same day is
    /// returned unchanged (snapshots are immutable per day).
    pub fn materialize(
        &self,
        stream: &StreamId,
        remaining_scope: u32,
        sprint_end: NaiveDate,
        as_of: NaiveDate,
    ) -> crate::events::Result<ForecastSnapshot> {
        self.materialize_with_rng(
            stream,
            remaining_scope,
            sprint_end,
            as_of,
            &mut StdRng::from_entropy(),
        )
    }

    /// [`Self::materialize`] with a caller-supplied RNG (deterministic tests).
    pub fn materialize_with_rng(
        &self,
        stream: &StreamId,
        remaining_scope: u32,
        sprint_end: NaiveDate,
        as_of: NaiveDate,
        rng: &mut impl Rng,
    ) -> crate::events::Result<ForecastSnapshot> {
        if let Some(existing) = self.snapshots.get(stream, as_of) {
            return Ok(existing);
        }

        let samples = self.daily_throughput(stream, as_of)?;
        let working_days = working_days_between(self.calendar.as_ref(), as_of, sprint_end);

        let confidence = sprint_confidence(
            &samples,
            f64::from(remaining_scope),
            working_days,
            DEFAULT_RUNS,
            rng,
        );

        let trials = completion_trials(&samples, f64::from(remaining_scope), DEFAULT_RUNS, rng);
        let mut histogram: BTreeMap<u32, u32> = BTreeMap::new();
        for days in &trials {
            *histogram.entry(*days).or_insert(0) += 1;
        }

        let mut sorted: Vec<f64> = trials.iter().map(|&d| f64::from(d)).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("trial days are finite"));
        let completion_date = |days: Option<f64>| {
            days.map(|d| add_working_days(self.calendar.as_ref(), as_of, d.ceil() as u32))
        };

        let snapshot = ForecastSnapshot {
            stream: stream.clone(),
            date: as_of,
            sample_count: confidence.sample_count,
            run_count: confidence.run_count,
            remaining_scope,
            working_days_remaining: working_days,
            confidence_pct: confidence.confidence_pct,
            has_insufficient_data: confidence.has_insufficient_data,
            p50_completion: completion_date(p50(&sorted)),
            p85_completion: completion_date(p85(&sorted)),
            p95_completion: completion_date(p95(&sorted)),
            histogram,
        };

        debug!(
            stream = %stream,
            date = %as_of,
            confidence = snapshot.confidence_pct,
            samples = snapshot.sample_count,
            "forecast snapshot materialized"
        );
        self.snapshots.insert_if_absent(snapshot.clone());
        Ok(snapshot)
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
