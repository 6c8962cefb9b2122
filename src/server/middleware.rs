use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use super::AppState;
use crate::error::AppError;

/// Header carrying the shared secret for event triggers
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Guards the event trigger routes with the configured `api.key`
///
/// With no key configured every request passes, which is how local
/// development runs.
pub async fn api_key_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = state.settings.api.key.as_deref() {
        let provided = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::warn!(path = %req.uri().path(), "Trigger request without API key");
                AppError::Unauthorized(format!("Missing {} header", API_KEY_HEADER))
            })?;

        if provided != expected {
            tracing::warn!(path = %req.uri().path(), "Trigger request with invalid API key");
            return Err(AppError::Unauthorized("Invalid API key".to_string()));
        }
    }

    Ok(next.run(req).await)
}
