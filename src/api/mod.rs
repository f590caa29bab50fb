pub mod chat;
pub mod health;

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::state::AppState;

const DEFAULT_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

enum RouteMatch {
    Preflight,
    Health,
    Status,
    Chat,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// Every response carries the permissive CORS headers the original callers
/// rely on; `OPTIONS` preflights short-circuit with 204.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path());

    let mut response = match route {
        RouteMatch::Preflight => StatusCode::NO_CONTENT.into_response(),
        RouteMatch::Health => health::health_handler(&state),
        RouteMatch::Status => health::status_handler(&state),
        RouteMatch::Chat => {
            let body_bytes = match read_request_body(body).await {
                Ok(bytes) => bytes,
                Err(mut response) => {
                    apply_cors(&mut response);
                    return Ok(response);
                }
            };
            chat::handler(&state, &parts.headers, parts.uri.query(), &body_bytes).await
        }
        RouteMatch::NotFound => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "error": "Not Found. Use POST /auto-chat" })),
        )
            .into_response(),
    };

    apply_cors(&mut response);
    Ok(response)
}

fn match_route(method: &Method, path: &str) -> RouteMatch {
    if *method == Method::OPTIONS {
        return RouteMatch::Preflight;
    }
    match path {
        "/health" if *method == Method::GET => RouteMatch::Health,
        "/status" if *method == Method::GET => RouteMatch::Status,
        "/auto-chat" if *method == Method::POST => RouteMatch::Chat,
        _ => RouteMatch::NotFound,
    }
}

fn apply_cors(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
}

async fn read_request_body(body: Body) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, DEFAULT_BODY_LIMIT_BYTES)
        .await
        .map_err(|_| {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large (max 2MiB)",
            )
                .into_response()
        })
}
