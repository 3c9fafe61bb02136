//! Core domain types shared across the pipeline.

mod ids;
mod source;
mod stage;

pub use ids::{ProjectKey, PrNumber, QueueId, RepoId, StreamId, TicketKey};
pub use source::{SourceKind, UnknownSource};
pub use stage::PipelineStage;
