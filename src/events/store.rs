//! Query contract over the canonical event history.
//!
//! The core never talks to a database directly; it goes through
//! [`EventStore`]. The bundled [`MemoryEventStore`] backs tests and the
//! default single-process wiring. A relational implementation must enforce
//! the same uniqueness on (subject, event type, timestamp) — with a unique
//! constraint if inserts can race.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{PrNumber, RepoId, StreamId, TicketKey};

use super::canonical::{
    CanonicalEvent, DeployEvent, EventKey, IncidentEvent, PrEvent, WorkItemEvent,
};

/// Errors surfaced by event-store implementations.
///
/// The in-memory store never fails, but the contract carries an error type
/// so relational implementations can report I/O problems; dispatch treats
/// these as transient per-row failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unavailable or query failed.
    #[error("event store error: {0}")]
    Backend(String),
}

/// Result type for event-store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Append-mostly canonical event history.
pub trait EventStore: Send + Sync {
    /// Inserts the event unless an event with the same key already exists.
    ///
    /// Returns `true` if the event was inserted, `false` on a duplicate.
    /// Duplicates are the normal outcome of webhook re-delivery, not errors.
    fn insert_if_absent(&self, event: CanonicalEvent) -> Result<bool>;

    /// All events for one ticket, ordered by timestamp ascending.
    fn work_item_events(&self, ticket: &TicketKey) -> Result<Vec<WorkItemEvent>>;

    /// All work-item events, ordered by timestamp ascending.
    fn all_work_item_events(&self) -> Result<Vec<WorkItemEvent>>;

    /// All events for one pull request, ordered by timestamp ascending.
    fn pr_events(&self, repo: &RepoId, number: PrNumber) -> Result<Vec<PrEvent>>;

    /// All PR events, ordered by timestamp ascending. Used to enumerate
    /// (repo, number) subjects when recomputing PR cycle records.
    fn all_pr_events(&self) -> Result<Vec<PrEvent>>;

    /// Blocked events in `[from, to]`, ordered by timestamp ascending.
    fn blocked_events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkItemEvent>>;

    /// Terminal transitions (ticket completed or cancelled) in `[from, to]`,
    /// optionally restricted to one delivery stream.
    fn terminal_transitions_between(
        &self,
        stream: Option<&StreamId>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkItemEvent>>;

    /// Deploys for a stream in `[from, to]`, ordered by deploy time ascending.
    fn deploys_between(
        &self,
        stream: &StreamId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DeployEvent>>;

    /// Incident events for a stream in `[from, to]` (by occurrence time),
    /// ordered by occurrence time ascending.
    fn incidents_between(
        &self,
        stream: &StreamId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<IncidentEvent>>;

    /// Hard-deletes events with a canonical timestamp before `cutoff`.
    ///
    /// Returns the number of deleted events. Used by the retention sweep.
    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// In-memory event store.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    events: Vec<CanonicalEvent>,
    keys: HashSet<EventKey>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events (test observability).
    pub fn len(&self) -> usize {
        self.inner.lock().expect("event store poisoned").events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventStore for MemoryEventStore {
    fn insert_if_absent(&self, event: CanonicalEvent) -> Result<bool> {
        let mut inner = self.inner.lock().expect("event store poisoned");
        let key = event.key();
        if inner.keys.contains(&key) {
            return Ok(false);
        }
        inner.keys.insert(key);
        inner.events.push(event);
        Ok(true)
    }

    fn work_item_events(&self, ticket: &TicketKey) -> Result<Vec<WorkItemEvent>> {
        let inner = self.inner.lock().expect("event store poisoned");
        let mut events: Vec<WorkItemEvent> = inner
            .events
            .iter()
            .filter_map(|e| match e {
                CanonicalEvent::WorkItem(w) if &w.ticket == ticket => Some(w.clone()),
                _ => None,
            })
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    fn all_work_item_events(&self) -> Result<Vec<WorkItemEvent>> {
        let inner = self.inner.lock().expect("event store poisoned");
        let mut events: Vec<WorkItemEvent> = inner
            .events
            .iter()
            .filter_map(|e| match e {
                CanonicalEvent::WorkItem(w) => Some(w.clone()),
                _ => None,
            })
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    fn pr_events(&self, repo: &RepoId, number: PrNumber) -> Result<Vec<PrEvent>> {
        let inner = self.inner.lock().expect("event store poisoned");
        let mut events: Vec<PrEvent> = inner
            .events
            .iter()
            .filter_map(|e| match e {
                CanonicalEvent::Pr(p) if &p.repo == repo && p.number == number => Some(p.clone()),
                _ => None,
            })
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    fn all_pr_events(&self) -> Result<Vec<PrEvent>> {
        let inner = self.inner.lock().expect("event store poisoned");
        let mut events: Vec<PrEvent> = inner
            .events
            .iter()
            .filter_map(|e| match e {
                CanonicalEvent::Pr(p) => Some(p.clone()),
                _ => None,
            })
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    fn blocked_events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkItemEvent>> {
        let inner = self.inner.lock().expect("event store poisoned");
        let mut events: Vec<WorkItemEvent> = inner
            .events
            .iter()
            .filter_map(|e| match e {
                CanonicalEvent::WorkItem(w)
                    if w.kind == super::WorkItemEventKind::Blocked
                        && w.timestamp >= from
                        && w.timestamp <= to =>
                {
                    Some(w.clone())
                }
                _ => None,
            })
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    fn terminal_transitions_between(
        &self,
        stream: Option<&StreamId>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkItemEvent>> {
        let inner = self.inner.lock().expect("event store poisoned");
        let mut events: Vec<WorkItemEvent> = inner
            .events
            .iter()
            .filter_map(|e| match e {
                CanonicalEvent::WorkItem(w)
                    if w.is_terminal_transition()
                        && w.timestamp >= from
                        && w.timestamp <= to
                        && stream.is_none_or(|s| w.stream.as_ref() == Some(s)) =>
                {
                    Some(w.clone())
                }
                _ => None,
            })
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    fn deploys_between(
        &self,
        stream: &StreamId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DeployEvent>> {
        let inner = self.inner.lock().expect("event store poisoned");
        let mut events: Vec<DeployEvent> = inner
            .events
            .iter()
            .filter_map(|e| match e {
                CanonicalEvent::Deploy(d)
                    if &d.stream == stream && d.deployed_at >= from && d.deployed_at <= to =>
                {
                    Some(d.clone())
                }
                _ => None,
            })
            .collect();
        events.sort_by_key(|e| e.deployed_at);
        Ok(events)
    }

    fn incidents_between(
        &self,
        stream: &StreamId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<IncidentEvent>> {
        let inner = self.inner.lock().expect("event store poisoned");
        let mut events: Vec<IncidentEvent> = inner
            .events
            .iter()
            .filter_map(|e| match e {
                CanonicalEvent::Incident(i)
                    if &i.stream == stream && i.occurred_at >= from && i.occurred_at <= to =>
                {
                    Some(i.clone())
                }
                _ => None,
            })
            .collect();
        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.inner.lock().expect("event store poisoned");
        let before = inner.events.len();
        inner.events.retain(|e| e.timestamp() >= cutoff);
        let keys: HashSet<EventKey> = inner.events.iter().map(|e| e.key()).collect();
        inner.keys = keys;
        Ok(before - inner.events.len())
    }
}
