//! HTTP intake boundary.
//!
//! The server does exactly one thing with a webhook: verify its signature
//! and enqueue it. All parsing, normalization, and metric computation
//! happens later in the scheduled dispatcher, so providers always get a
//! fast 202 regardless of downstream load.
//!
//! # Endpoints
//!
//! - `POST /hooks/{source}` - Accepts provider webhook deliveries (202 Accepted)
//! - `GET /health` - Returns 200 if the server is running

use std::collections::HashMap;
use std::sync::Arc;

pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::webhook_handler;

use crate::queue::QueueStore;
use crate::types::SourceKind;

/// Shared application state, passed to handlers via axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    queue: Arc<dyn QueueStore>,

    /// Per-source signing secrets. Sources without an entry accept
    /// deliveries without verification.
    secrets: HashMap<SourceKind, Vec<u8>>,
}

impl AppState {
    pub fn new(queue: Arc<dyn QueueStore>, secrets: HashMap<SourceKind, Vec<u8>>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { queue, secrets }),
        }
    }

    pub fn queue(&self) -> &Arc<dyn QueueStore> {
        &self.inner.queue
    }

    /// The signing secret for a source, when one is configured.
    pub fn secret_for(&self, source: SourceKind) -> Option<&[u8]> {
        self.inner.secrets.get(&source).map(|s| s.as_slice())
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/hooks/{source}", post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
