//! Canonical event history.
//!
//! Normalizers turn provider payloads into the typed events defined here;
//! every downstream computation reads from this history and nothing else.
//! Events are immutable once created and deduplicated on
//! (subject, event type, timestamp), so webhook re-delivery is a no-op.

mod canonical;
mod store;

pub use canonical::{
    CanonicalEvent, CodeChurn, DeployEvent, EventKey, IncidentEvent, IncidentPhase, PrEvent,
    PrEventKind, WorkItemEvent, WorkItemEventKind,
};
pub use store::{EventStore, MemoryEventStore, Result, StoreError};
