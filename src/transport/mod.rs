use std::time::Duration;

use http::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use http::Method;
use serde_json::Value;

use crate::config::UpstreamConfig;
use crate::error::GatewayError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffered upstream response for the JSON request/response endpoints.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    #[must_use]
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON; an empty body decodes to an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Protocol`] when the body is not valid JSON.
    pub fn json(&self) -> Result<Value, GatewayError> {
        if self.body.is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.body)
            .map_err(|e| GatewayError::Protocol(format!("invalid JSON in upstream response: {e}")))
    }
}

/// HTTP client for the upstream conversational API.
///
/// One pooled `reqwest` client serves both traffic shapes: JSON calls carry a
/// fixed per-request timeout, the SSE GET carries none because its lifetime
/// is owned by the event listener's timer.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl UpstreamClient {
    /// Build the client from the upstream config.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] when the underlying client cannot
    /// be constructed.
    pub fn new(config: &UpstreamConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .tcp_nodelay(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a JSON request with the fixed per-call timeout and buffer the
    /// response body.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UpstreamTimeout`] when the call exceeds the
    /// per-request timeout, [`GatewayError::Transport`] for other network
    /// failures. Non-2xx statuses are returned as values, not errors.
    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        auth_header: Option<&str>,
        body: Option<&Value>,
        context: &'static str,
    ) -> Result<UpstreamResponse, GatewayError> {
        let url = self.endpoint(path);
        let mut request = self
            .client
            .request(method, &url)
            .timeout(self.request_timeout);
        if let Some(auth) = auth_header {
            request = request.header(AUTHORIZATION, auth);
        }
        if let Some(body) = body {
            let encoded = serde_json::to_string(body)
                .map_err(|e| GatewayError::Internal(format!("failed to encode body: {e}")))?;
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(encoded);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_request_error(e, context))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_request_error(e, context))?;
        Ok(UpstreamResponse { status, body })
    }

    /// Open the long-lived event stream connection.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] when the GET cannot be issued or
    /// the upstream refuses the connection.
    pub async fn open_event_stream(
        &self,
        auth_header: Option<&str>,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = self.endpoint("/event");
        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(auth) = auth_header {
            request = request.header(AUTHORIZATION, auth);
        }
        request
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("event stream connect failed: {e}")))
    }

    fn map_request_error(&self, err: reqwest::Error, context: &'static str) -> GatewayError {
        if err.is_timeout() {
            GatewayError::UpstreamTimeout {
                context,
                timeout_ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            GatewayError::Transport(format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let config = UpstreamConfig {
            base_url: "http://opencode:7012/".to_string(),
            ..UpstreamConfig::default()
        };
        let client = UpstreamClient::new(&config).expect("client");
        assert_eq!(client.endpoint("/session"), "http://opencode:7012/session");
        assert_eq!(client.endpoint("/event"), "http://opencode:7012/event");
    }

    #[test]
    fn test_response_ok_range() {
        let ok = UpstreamResponse {
            status: 204,
            body: String::new(),
        };
        let not_ok = UpstreamResponse {
            status: 301,
            body: String::new(),
        };
        assert!(ok.ok());
        assert!(!not_ok.ok());
    }

    #[test]
    fn test_response_json_empty_body_is_empty_object() {
        let response = UpstreamResponse {
            status: 200,
            body: String::new(),
        };
        assert_eq!(response.json().expect("json"), serde_json::json!({}));
    }

    #[test]
    fn test_response_json_invalid_body_is_protocol_error() {
        let response = UpstreamResponse {
            status: 200,
            body: "not json".to_string(),
        };
        assert!(matches!(
            response.json(),
            Err(GatewayError::Protocol(_))
        ));
    }
}
