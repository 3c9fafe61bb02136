//! Webhook endpoint handler.
//!
//! Accepts provider deliveries on `/hooks/{source}`, verifies the
//! signature when one is supplied, and enqueues the payload durably
//! before returning 202 Accepted. Normalization happens asynchronously
//! in the scheduled dispatcher.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::queue::QueueError;
use crate::types::{SourceKind, UnknownSource};
use crate::webhooks::verify_signature;

/// Header carrying the provider's event-type tag.
const HEADER_EVENT_TYPE: &str = "x-event-type";
/// Header carrying the HMAC-SHA256 payload signature.
const HEADER_SIGNATURE: &str = "x-signature-256";

/// Errors that can occur when accepting a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The path named a source we do not ingest.
    #[error(transparent)]
    UnknownSource(#[from] UnknownSource),

    /// Signature header present but verification failed.
    #[error("invalid signature")]
    InvalidSignature,

    /// Invalid JSON body.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Queue write failed.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::UnknownSource(_) => StatusCode::NOT_FOUND,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            WebhookError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST /hooks/{source} where source is one of
///   `issue-tracker`, `source-control`, `deployment`, `incident`
/// - Optional headers:
///   - `X-Event-Type`: provider event-type tag
///   - `X-Signature-256`: HMAC-SHA256 signature of the payload
/// - Body: JSON webhook payload
///
/// # Response
///
/// - 202 Accepted: payload enqueued
/// - 400 Bad Request: invalid JSON
/// - 401 Unauthorized: signature present but invalid
/// - 404 Not Found: unknown source
/// - 500 Internal Server Error: queue failure
///
/// Signature verification is best-effort: deliveries without a signature
/// header are accepted as-is (some providers omit signatures in some
/// configurations), and a signature for a source with no configured
/// secret cannot be checked. When both are present, verification runs
/// before anything else touches the payload.
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let source: SourceKind = source.parse()?;
    let raw_type = get_header(&headers, HEADER_EVENT_TYPE);
    let signature = get_header(&headers, HEADER_SIGNATURE);

    debug!(source = %source, raw_type = ?raw_type, "received webhook");

    if let Some(header) = signature.as_deref() {
        match app_state.secret_for(source) {
            Some(secret) => {
                if !verify_signature(&body, header, secret) {
                    warn!(source = %source, "invalid webhook signature");
                    return Err(WebhookError::InvalidSignature);
                }
            }
            None => {
                warn!(source = %source, "signed delivery for source with no configured secret");
            }
        }
    }

    // Parse only to confirm it is JSON; interpretation waits for the
    // dispatcher.
    let payload: serde_json::Value = serde_json::from_slice(&body)?;

    let row = app_state
        .queue()
        .enqueue(source, payload, raw_type, signature, Utc::now())?;
    info!(source = %source, id = %row.id, "webhook enqueued");
    Ok((StatusCode::ACCEPTED, "Accepted"))
}

/// Extracts an optional header value as a string.
fn get_header(headers: &HeaderMap, name: &'static str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
