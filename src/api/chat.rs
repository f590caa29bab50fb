use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};

use crate::extract::{extract_message, extract_parts, merge_query_params, pick_string_deep};
use crate::orchestrator::{self, ChatRequest};
use crate::state::AppState;

/// POST /auto-chat: one inbound message, one aggregated response.
pub async fn handler(
    state: &AppState,
    headers: &HeaderMap,
    query: Option<&str>,
    body: &[u8],
) -> Response {
    let request_id = state.next_request_id();

    let mut payload: Value = if body.is_empty() {
        json!({})
    } else {
        match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::info!(request_id = %request_id, "rejected request with invalid JSON body");
                return (
                    StatusCode::BAD_REQUEST,
                    axum::Json(json!({ "error": "invalid JSON", "detail": err.to_string() })),
                )
                    .into_response();
            }
        }
    };
    if let Some(query) = query {
        merge_query_params(&mut payload, query);
    }

    let upstream = &state.config.upstream;
    let title = pick_string_deep(&payload, &["title", "sessionTitle"])
        .unwrap_or_else(|| upstream.default_session_title.clone());
    let provider_id = pick_string_deep(&payload, &["providerID", "providerId", "provider"])
        .unwrap_or_else(|| upstream.default_provider.clone());
    let model_id = pick_string_deep(&payload, &["modelID", "modelId", "model"])
        .unwrap_or_else(|| upstream.default_model.clone());
    let message_text = extract_message(&payload);
    let parts = extract_parts(&payload, message_text.as_deref());

    tracing::info!(
        request_id = %request_id,
        provider = %provider_id,
        model = %model_id,
        parts = parts.len(),
        "auto-chat request"
    );

    if parts.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({ "error": "message text required" })),
        )
            .into_response();
    }

    let client_auth = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string);
    if state.config.auth.require_client_auth && client_auth.is_none() {
        tracing::info!(request_id = %request_id, "missing client Authorization header");
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({ "error": "Authorization required" })),
        )
            .into_response();
    }
    // Client credentials override the service's static/file-backed token.
    let auth_header = client_auth.or_else(|| state.bearer.resolve());

    let request = ChatRequest {
        title,
        provider_id,
        model_id,
        parts,
    };
    match orchestrator::run(state, request, auth_header).await {
        Ok(completion) => {
            tracing::info!(
                request_id = %request_id,
                session_id = %completion.session_id,
                response_chars = completion.text.len(),
                timed_out = completion.timed_out,
                "auto-chat complete"
            );
            (
                StatusCode::OK,
                axum::Json(json!({
                    "sessionId": completion.session_id,
                    "messageId": completion.message_id,
                    "response": {
                        "text": completion.text,
                        "timedOut": completion.timed_out,
                    },
                })),
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!(request_id = %request_id, error = %err, "auto-chat failed");
            err.into_response()
        }
    }
}
