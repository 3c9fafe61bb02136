//! Per-pull-request cycle computation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{CodeChurn, PrEvent, PrEventKind};
use crate::types::{PrNumber, RepoId};

use super::hours_between;

/// Computed review/merge metrics for one closed or merged pull request.
///
/// Keyed by (repo, PR number); recomputation replaces the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrCycleRecord {
    pub repo: RepoId,
    pub number: PrNumber,

    pub opened_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,

    /// Opened → first submitted review.
    pub time_to_first_review_hours: Option<f64>,
    /// Opened → merged.
    pub time_to_merge_hours: Option<f64>,

    /// Count of submitted reviews.
    pub review_rounds: u32,
    /// Number of distinct reviewers across submitted reviews.
    pub distinct_reviewers: u32,

    /// Churn from the merge event, else the close event, else the open
    /// event (in that preference order).
    pub churn: Option<CodeChurn>,
}

/// Derives the PR cycle record from its events (timestamp-ascending).
///
/// Returns `None` until the PR reaches a terminal state (merged or closed).
pub fn compute_pr_cycle(events: &[PrEvent]) -> Option<PrCycleRecord> {
    let terminal = events
        .iter()
        .any(|e| matches!(e.kind, PrEventKind::Merged | PrEventKind::Closed));
    if !terminal {
        return None;
    }
    let first = events.first()?;

    let timestamp_of = |kind: PrEventKind| {
        events
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| e.timestamp)
    };
    let opened_at = timestamp_of(PrEventKind::Opened);
    let approved_at = timestamp_of(PrEventKind::Approved);
    let merged_at = timestamp_of(PrEventKind::Merged);
    let first_review_at = timestamp_of(PrEventKind::ReviewSubmitted);

    let reviews: Vec<&PrEvent> = events
        .iter()
        .filter(|e| e.kind == PrEventKind::ReviewSubmitted)
        .collect();
    let distinct_reviewers = reviews
        .iter()
        .filter_map(|e| e.reviewer.as_deref())
        .collect::<BTreeSet<_>>()
        .len() as u32;

    let churn_of = |kind: PrEventKind| {
        events
            .iter()
            .find(|e| e.kind == kind)
            .and_then(|e| e.churn)
    };
    let churn = churn_of(PrEventKind::Merged)
        .or_else(|| churn_of(PrEventKind::Closed))
        .or_else(|| churn_of(PrEventKind::Opened));

    Some(PrCycleRecord {
        repo: first.repo.clone(),
        number: first.number,
        opened_at,
        approved_at,
        merged_at,
        time_to_first_review_hours: match (opened_at, first_review_at) {
            (Some(opened), Some(review)) => Some(hours_between(opened, review)),
            _ => None,
        },
        time_to_merge_hours: match (opened_at, merged_at) {
            (Some(opened), Some(merged)) => Some(hours_between(opened, merged)),
            _ => None,
        },
        review_rounds: reviews.len() as u32,
        distinct_reviewers,
        churn,
    })
}
