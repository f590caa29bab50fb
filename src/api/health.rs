use std::time::SystemTime;

use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::state::AppState;

/// Health check handler: liveness plus token readiness.
pub fn health_handler(state: &AppState) -> Response {
    axum::Json(json!({
        "status": "ok",
        "tokenReady": state.bearer.token_ready(),
        "hasToken": state.bearer.has_token(),
        "time": httpdate::fmt_http_date(SystemTime::now()),
    }))
    .into_response()
}

/// Status handler: health fields plus the effective upstream settings.
pub fn status_handler(state: &AppState) -> Response {
    let upstream = &state.config.upstream;
    axum::Json(json!({
        "status": "ok",
        "tokenReady": state.bearer.token_ready(),
        "hasToken": state.bearer.has_token(),
        "upstreamBase": upstream.base_url,
        "defaultProvider": upstream.default_provider,
        "defaultModel": upstream.default_model,
        "time": httpdate::fmt_http_date(SystemTime::now()),
    }))
    .into_response()
}
