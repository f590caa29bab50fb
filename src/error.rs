use axum::response::IntoResponse;
use serde_json::json;

/// Canonical error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Upstream request timed out after {timeout_ms}ms: {context}")]
    UpstreamTimeout {
        context: &'static str,
        timeout_ms: u64,
    },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Upstream protocol error: {0}")]
    Protocol(String),
    #[error("Message response timed out after {timeout_ms}ms")]
    StreamTimeout { timeout_ms: u64 },
    #[error("SSE stream ended without complete response")]
    StreamEnded,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status for the caller-facing response.
    ///
    /// Request-side problems map to 4xx; everything the gateway or the
    /// upstream got wrong is a plain 500, matching the single catch-all
    /// this service exposes.
    #[must_use]
    pub fn http_status(&self) -> http::StatusCode {
        match self {
            GatewayError::InvalidRequest(_) => http::StatusCode::BAD_REQUEST,
            GatewayError::Auth(_) => http::StatusCode::UNAUTHORIZED,
            GatewayError::Config(_)
            | GatewayError::Upstream { .. }
            | GatewayError::UpstreamTimeout { .. }
            | GatewayError::Transport(_)
            | GatewayError::Protocol(_)
            | GatewayError::StreamTimeout { .. }
            | GatewayError::StreamEnded
            | GatewayError::Internal(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Format an error as the `{error, stack}` JSON body the gateway returns.
///
/// There is no call stack to report; `stack` carries the debug rendering of
/// the error variant so callers still get structured detail under that key.
#[must_use]
pub fn format_error(err: &GatewayError) -> (http::StatusCode, serde_json::Value) {
    let body = json!({
        "error": err.to_string(),
        "stack": format!("{err:?}"),
    });
    (err.http_status(), body)
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = format_error(&self);
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_request_maps_to_400() {
        let err = GatewayError::InvalidRequest("message text required".to_string());
        assert_eq!(err.http_status(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_auth_maps_to_401() {
        let err = GatewayError::Auth("Authorization required".to_string());
        assert_eq!(err.http_status(), http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_stream_failures_map_to_500() {
        let timeout = GatewayError::StreamTimeout { timeout_ms: 120_000 };
        let ended = GatewayError::StreamEnded;
        assert_eq!(
            timeout.http_status(),
            http::StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ended.http_status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_format_error_body_shape() {
        let err = GatewayError::Upstream {
            status: 503,
            message: "unavailable".to_string(),
        };
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .expect("error field")
            .contains("status=503"));
        assert!(body["stack"].as_str().expect("stack field").len() > 0);
    }
}
