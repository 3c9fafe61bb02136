//! Source-control payload normalization.
//!
//! Expected payload shapes (GitHub-style):
//!
//! `pull_request` events:
//!
//! ```json
//! {
//!     "action": "opened" | "closed",
//!     "pull_request": {
//!         "number": 7,
//!         "user": { "login": "dana" },
//!         "created_at": "...", "merged_at": null, "closed_at": null,
//!         "merged": false,
//!         "additions": 120, "deletions": 8, "changed_files": 4
//!     },
//!     "repository": { "owner": { "login": "acme" }, "name": "billing", "stream": "payments" }
//! }
//! ```
//!
//! `pull_request_review` events carry a `review` object with `state`
//! (`approved`, `changes_requested`, `commented`), `user`, and
//! `submitted_at`.
//!
//! Every submitted review becomes a `ReviewSubmitted` event; approvals
//! additionally emit an `Approved` event so both review-round counting and
//! time-to-approval work from the history. A closed PR becomes `Merged`
//! when the provider marks it merged, `Closed` otherwise.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::events::{CanonicalEvent, CodeChurn, PrEvent, PrEventKind};
use crate::types::{PrNumber, RepoId, StreamId};

use super::NormalizeError;

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    action: Option<String>,
    pull_request: RawPullRequest,
    repository: RawRepository,
    #[serde(default)]
    review: Option<RawReview>,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: u64,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    merged: bool,
    #[serde(default)]
    additions: Option<u64>,
    #[serde(default)]
    deletions: Option<u64>,
    #[serde(default)]
    changed_files: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    owner: RawUser,
    name: String,
    #[serde(default)]
    stream: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawReview {
    state: String,
    #[serde(default)]
    user: Option<RawUser>,
    submitted_at: DateTime<Utc>,
}

/// Normalizes one source-control delivery.
///
/// `raw_type` is the provider event-type header (`pull_request` or
/// `pull_request_review`); when absent, the payload shape decides (a
/// `review` object means a review event).
pub fn normalize_source_control(
    raw_type: Option<&str>,
    payload: &serde_json::Value,
) -> Result<Vec<CanonicalEvent>, NormalizeError> {
    let raw: RawPayload = serde_json::from_value(payload.clone())?;

    let repo = RepoId::new(&raw.repository.owner.login, &raw.repository.name);
    let number = PrNumber(raw.pull_request.number);
    let stream = raw.repository.stream.as_deref().map(StreamId::new);
    let author = raw.pull_request.user.as_ref().map(|u| u.login.clone());
    let churn = churn_of(&raw.pull_request);

    let is_review = match raw_type {
        Some("pull_request_review") => true,
        Some("pull_request") => false,
        Some(_) => return Ok(Vec::new()),
        None => raw.review.is_some(),
    };

    let make = |kind: PrEventKind, timestamp: DateTime<Utc>, reviewer: Option<String>| PrEvent {
        repo: repo.clone(),
        number,
        kind,
        timestamp,
        author: author.clone(),
        reviewer,
        churn,
        stream: stream.clone(),
    };

    let events = if is_review {
        let review = raw
            .review
            .ok_or(NormalizeError::MissingField("review"))?;
        if raw.action.as_deref() != Some("submitted") {
            return Ok(Vec::new());
        }
        let reviewer = review.user.as_ref().map(|u| u.login.clone());
        let submitted = make(
            PrEventKind::ReviewSubmitted,
            review.submitted_at,
            reviewer.clone(),
        );
        if review.state == "approved" {
            vec![
                submitted,
                make(PrEventKind::Approved, review.submitted_at, reviewer),
            ]
        } else {
            vec![submitted]
        }
    } else {
        match raw.action.as_deref() {
            Some("opened") => {
                let timestamp = raw
                    .pull_request
                    .created_at
                    .ok_or(NormalizeError::MissingField("pull_request.created_at"))?;
                vec![make(PrEventKind::Opened, timestamp, None)]
            }
            Some("closed") if raw.pull_request.merged => {
                let timestamp = raw
                    .pull_request
                    .merged_at
                    .ok_or(NormalizeError::MissingField("pull_request.merged_at"))?;
                vec![make(PrEventKind::Merged, timestamp, None)]
            }
            Some("closed") => {
                let timestamp = raw
                    .pull_request
                    .closed_at
                    .ok_or(NormalizeError::MissingField("pull_request.closed_at"))?;
                vec![make(PrEventKind::Closed, timestamp, None)]
            }
            _ => Vec::new(),
        }
    };

    Ok(events.into_iter().map(CanonicalEvent::Pr).collect())
}

fn churn_of(pr: &RawPullRequest) -> Option<CodeChurn> {
    match (pr.additions, pr.deletions, pr.changed_files) {
        (Some(additions), Some(deletions), Some(changed_files)) => Some(CodeChurn {
            additions,
            deletions,
            changed_files,
        }),
        _ => None,
    }
}
