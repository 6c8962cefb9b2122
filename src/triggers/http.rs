//! HTTP event trigger
//!
//! Lets the blog's request handlers publish domain events (for example
//! `Post_Created` after an insert) without linking against the hub.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::hub::ConnectionId;
use crate::server::AppState;

/// Maximum length of an event kind
const MAX_KIND_LENGTH: usize = 64;

#[derive(Debug, Deserialize)]
pub struct BroadcastEventRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    /// Connection that should not receive the event, usually the originator
    #[serde(default)]
    pub exclude: Option<ConnectionId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BroadcastEventResponse {
    pub recipients: usize,
    pub dropped: usize,
    pub evicted: usize,
    pub timestamp: DateTime<Utc>,
}

/// Broadcast an event to every connected client
#[tracing::instrument(
    name = "http.broadcast_event",
    skip(state, request),
    fields(kind = %request.kind, exclude = ?request.exclude)
)]
pub async fn broadcast_event(
    State(state): State<AppState>,
    Json(request): Json<BroadcastEventRequest>,
) -> Result<Json<BroadcastEventResponse>> {
    validate_kind(&request.kind)?;

    let report = state
        .hub
        .broadcast(&request.kind, &request.payload, request.exclude.as_ref())
        .await;

    Ok(Json(BroadcastEventResponse {
        recipients: report.recipients,
        dropped: report.dropped,
        evicted: report.evicted,
        timestamp: Utc::now(),
    }))
}

fn validate_kind(kind: &str) -> Result<()> {
    if kind.trim().is_empty() {
        return Err(AppError::Validation("Event type must not be empty".to_string()));
    }
    if kind.len() > MAX_KIND_LENGTH {
        return Err(AppError::Validation(format!(
            "Event type must be at most {} characters",
            MAX_KIND_LENGTH
        )));
    }
    Ok(())
}
