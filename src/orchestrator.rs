//! Completion orchestrator: drives one full upstream conversation for one
//! inbound request — session create, listener attach, message submit, await.

use std::time::Duration;

use http::Method;
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::extract::MessagePart;
use crate::state::AppState;
use crate::stream::listener::wait_for_completion;

/// Resolved inputs for one completion run.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub title: String,
    pub provider_id: String,
    pub model_id: String,
    pub parts: Vec<MessagePart>,
}

/// Aggregated outcome handed back to the front controller.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub session_id: String,
    pub message_id: Option<String>,
    pub text: String,
    pub timed_out: bool,
}

/// Run one complete request against the upstream.
///
/// The listener is started before the message is submitted: a fast upstream
/// could otherwise emit and complete the entire event sequence before any
/// listener is attached, hanging the request permanently.
///
/// # Errors
///
/// Fails when session creation or message submission returns non-2xx or
/// network-fails, or when the listener settles without usable text.
pub async fn run(
    state: &AppState,
    request: ChatRequest,
    auth_header: Option<String>,
) -> Result<ChatCompletion, GatewayError> {
    let upstream = &state.config.upstream;
    let client = state.client.clone();

    let session_response = client
        .request_json(
            Method::POST,
            "/session",
            auth_header.as_deref(),
            Some(&json!({ "title": request.title })),
            "session creation",
        )
        .await?;
    if !session_response.ok() {
        return Err(GatewayError::Upstream {
            status: session_response.status,
            message: format!("Session creation failed: {}", session_response.status),
        });
    }
    let session_id = session_response
        .json()?
        .get("id")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| GatewayError::Protocol("session creation response missing id".to_string()))?;
    tracing::debug!(session_id = %session_id, "session created");

    let message_timeout = Duration::from_millis(upstream.message_timeout_ms);
    let listener = tokio::spawn(wait_for_completion(
        client.clone(),
        session_id.clone(),
        auth_header.clone(),
        message_timeout,
    ));

    // Give the listener's connection time to be accepted upstream before the
    // message triggers events. A mitigation for connection-establishment
    // latency, not a guarantee.
    tokio::time::sleep(Duration::from_millis(upstream.pre_send_delay_ms)).await;

    tracing::debug!(session_id = %session_id, "submitting message");
    let message_body = json!({
        "providerID": request.provider_id,
        "modelID": request.model_id,
        "parts": request.parts,
    });
    let message_path = format!("/session/{session_id}/message");
    let message_response = match client
        .request_json(
            Method::POST,
            &message_path,
            auth_header.as_deref(),
            Some(&message_body),
            "message submission",
        )
        .await
    {
        Ok(response) => response,
        Err(err) => {
            // Release the already-started listener, or its connection leaks.
            listener.abort();
            return Err(err);
        }
    };
    if !message_response.ok() {
        listener.abort();
        return Err(GatewayError::Upstream {
            status: message_response.status,
            message: format!("Message sending failed: {}", message_response.status),
        });
    }

    let result = match listener.await {
        Ok(result) => result?,
        Err(join_err) => {
            return Err(GatewayError::Internal(format!(
                "listener task failed: {join_err}"
            )));
        }
    };

    Ok(ChatCompletion {
        session_id,
        message_id: result.message_id,
        text: result.text,
        timed_out: result.timed_out,
    })
}
