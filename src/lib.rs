//! Flowlens - delivery-pipeline analytics from webhook event streams.
//!
//! Ingests issue-tracker, source-control, deployment, and incident webhooks,
//! normalizes them into a canonical event history, and materializes flow,
//! forecast, and correlation metrics from that history on a schedule.

pub mod config;
pub mod correlate;
pub mod events;
pub mod flow;
pub mod forecast;
pub mod normalize;
pub mod queue;
pub mod ratelimit;
pub mod retention;
pub mod server;
pub mod stages;
pub mod types;
pub mod webhooks;

#[cfg(test)]
mod pipeline_tests;
