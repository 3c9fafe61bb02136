//! Event intake queue.
//!
//! The durable mailbox between the webhook boundary and normalization.
//! `enqueue` is a plain append and never waits on downstream work; a
//! scheduler drains the queue with [`Dispatcher::process_pending`] on a
//! fixed interval. Failed rows stay pending and are retried on later runs
//! until [`MAX_ATTEMPTS`] is reached, then dead-lettered permanently.

mod dispatch;
mod row;
mod store;

pub use dispatch::{DispatchOutcome, Dispatcher, MAX_ATTEMPTS};
pub use row::{QueueStatus, QueuedEvent};
pub use store::{MemoryQueueStore, QueueError, QueueStore, Result};
