//! End-to-end pipeline test: webhook payload in, derived metrics out,
//! against the in-memory stores.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use serde_json::json;
use tower::ServiceExt;

use crate::events::{EventStore, MemoryEventStore, WorkItemEventKind};
use crate::flow::{wip_by_stage, FlowEngine, FlowMetricsStore, MemoryFlowMetricsStore};
use crate::normalize::CanonicalNormalizer;
use crate::queue::{Dispatcher, MemoryQueueStore};
use crate::server::{build_router, AppState};
use crate::stages::{StaticStageMappings, StatusMapping};
use crate::types::{PipelineStage, PrNumber, ProjectKey, RepoId, TicketKey};

fn mappings() -> Arc<StaticStageMappings> {
    Arc::new(StaticStageMappings::from_mappings([
        StatusMapping {
            project: ProjectKey::new("X"),
            status_name: "In Progress".into(),
            stage: PipelineStage::Dev,
            is_active_work: true,
            sort_order: 2,
        },
        StatusMapping {
            project: ProjectKey::new("X"),
            status_name: "In Review".into(),
            stage: PipelineStage::CodeReview,
            is_active_work: true,
            sort_order: 3,
        },
    ]))
}

#[tokio::test]
async fn transition_webhook_lands_in_metrics() {
    let queue = Arc::new(MemoryQueueStore::new());
    let events = Arc::new(MemoryEventStore::new());
    let dispatcher = Dispatcher::new(
        queue.clone(),
        events.clone(),
        Arc::new(CanonicalNormalizer::new(mappings())),
    );

    // Ticket X-1 moves "In Progress" -> "In Review".
    let payload = json!({
        "event": "issue_updated",
        "timestamp": "2026-03-02T10:15:00Z",
        "issue": { "key": "X-1", "stream": "payments" },
        "changelog": {
            "items": [ { "field": "status", "from": "In Progress", "to": "In Review" } ]
        }
    });

    // Intake over HTTP; dedup is downstream, so deliver it twice.
    let state = AppState::new(queue.clone(), HashMap::new());
    for _ in 0..2 {
        let app = build_router(state.clone());
        let request = Request::builder()
            .method("POST")
            .uri("/hooks/issue-tracker")
            .header("x-event-type", "issue_updated")
            .body(Body::from(serde_json::to_vec(&payload).unwrap()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
    assert_eq!(queue.len(), 2);

    let outcome = dispatcher
        .process_pending(10, Utc.with_ymd_and_hms(2026, 3, 2, 11, 0, 0).unwrap())
        .unwrap();
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.failed, 0);

    // Exactly one canonical event, with both stages resolved.
    let history = events.work_item_events(&TicketKey::new("X-1")).unwrap();
    assert_eq!(history.len(), 1);
    let event = &history[0];
    assert_eq!(event.kind, WorkItemEventKind::StatusTransitioned);
    assert_eq!(event.from_stage, Some(PipelineStage::Dev));
    assert_eq!(event.to_stage, Some(PipelineStage::CodeReview));

    // WIP reflects the ticket's new stage.
    let wip = wip_by_stage(&events.all_work_item_events().unwrap());
    assert_eq!(wip.get(&PipelineStage::CodeReview), Some(&1));
    assert_eq!(wip.get(&PipelineStage::Dev), None);
}

#[tokio::test]
async fn merged_pr_webhook_lands_in_pr_cycle_records() {
    let queue = Arc::new(MemoryQueueStore::new());
    let events = Arc::new(MemoryEventStore::new());
    let metrics = Arc::new(MemoryFlowMetricsStore::new());
    let dispatcher = Dispatcher::new(
        queue.clone(),
        events.clone(),
        Arc::new(CanonicalNormalizer::new(mappings())),
    );
    let flow = FlowEngine::new(events.clone(), metrics.clone());

    let pr = |action: &str, merged: bool| {
        json!({
            "action": action,
            "pull_request": {
                "number": 7,
                "user": { "login": "dana" },
                "created_at": "2026-03-01T09:00:00Z",
                "merged_at": if merged { json!("2026-03-02T17:00:00Z") } else { json!(null) },
                "merged": merged,
                "additions": 120,
                "deletions": 8,
                "changed_files": 4
            },
            "repository": { "owner": { "login": "acme" }, "name": "billing" }
        })
    };

    let state = AppState::new(queue.clone(), HashMap::new());
    for payload in [pr("opened", false), pr("closed", true)] {
        let app = build_router(state.clone());
        let request = Request::builder()
            .method("POST")
            .uri("/hooks/source-control")
            .header("x-event-type", "pull_request")
            .body(Body::from(serde_json::to_vec(&payload).unwrap()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let outcome = dispatcher
        .process_pending(10, Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap())
        .unwrap();
    assert_eq!(outcome.processed, 2);

    // Recompute every PR subject seen in the history, as the scheduler does.
    let subjects: BTreeSet<_> = events
        .all_pr_events()
        .unwrap()
        .iter()
        .map(|e| (e.repo.clone(), e.number))
        .collect();
    assert_eq!(subjects.len(), 1);
    for (repo, number) in &subjects {
        flow.materialize_pr(repo, *number).unwrap();
    }

    let record = metrics
        .pr_cycle(&RepoId::new("acme", "billing"), PrNumber(7))
        .unwrap();
    assert_eq!(record.time_to_merge_hours, Some(32.0));
    assert_eq!(record.churn.unwrap().additions, 120);
}
