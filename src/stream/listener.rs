//! Event stream listener: the state machine that turns the upstream's
//! session-scoped event stream into one aggregated completion result.

use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::time::Instant;

use super::sse::DataLineParser;
use crate::error::GatewayError;
use crate::extract::value_at_path;
use crate::transport::UpstreamClient;

/// Terminal value of one listen: the aggregated assistant text, the id of the
/// assistant message when one was observed, and whether the overall timeout
/// cut the stream short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResult {
    pub text: String,
    pub message_id: Option<String>,
    pub timed_out: bool,
}

/// Paths at which an event may carry its session id, in priority order.
const SESSION_ID_PATHS: &[&[&str]] = &[
    &["sessionID"],
    &["info", "sessionID"],
    &["part", "sessionID"],
];

enum Progress {
    Listening,
    Complete,
}

/// Accumulated answer state for one session. `text` only grows; trimming
/// happens exactly once, at resolution.
struct ListenerState {
    session_id: String,
    text: String,
    message_id: Option<String>,
    assistant_finished: bool,
}

impl ListenerState {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            text: String::new(),
            message_id: None,
            assistant_finished: false,
        }
    }

    fn matches_session(&self, props: &Value) -> bool {
        SESSION_ID_PATHS.iter().any(|path| {
            value_at_path(props, path).and_then(Value::as_str) == Some(self.session_id.as_str())
        })
    }

    /// Apply one decoded `data:` payload. Malformed JSON and events scoped to
    /// other sessions are no-ops.
    fn apply_payload(&mut self, payload: &str) -> Progress {
        let Ok(event) = serde_json::from_str::<Value>(payload) else {
            return Progress::Listening;
        };
        let props = event.get("properties").unwrap_or(&Value::Null);
        if !self.matches_session(props) {
            return Progress::Listening;
        }

        match event.get("type").and_then(Value::as_str) {
            Some("message.part.updated") => {
                let is_text_part = value_at_path(props, &["part", "type"])
                    .and_then(Value::as_str)
                    == Some("text");
                if is_text_part {
                    if let Some(delta) = props.get("delta").and_then(Value::as_str) {
                        if !delta.is_empty() {
                            self.text.push_str(delta);
                        }
                    }
                }
            }
            Some("message.updated") => {
                let info = props.get("info").unwrap_or(&Value::Null);
                let is_assistant = info.get("role").and_then(Value::as_str) == Some("assistant");
                let session_matches = info.get("sessionID").and_then(Value::as_str)
                    == Some(self.session_id.as_str());
                if is_assistant && session_matches {
                    if let Some(id) = info.get("id").and_then(Value::as_str) {
                        self.message_id = Some(id.to_string());
                    }
                    if is_truthy(info.get("finish")) {
                        self.assistant_finished = true;
                    }
                }
            }
            Some("session.idle") => {
                let session_matches = props.get("sessionID").and_then(Value::as_str)
                    == Some(self.session_id.as_str());
                // Completion trigger: only when the assistant turn ended and
                // some text was accumulated; otherwise work may still be
                // pending and the stream keeps listening.
                if session_matches && self.assistant_finished && !self.text.is_empty() {
                    return Progress::Complete;
                }
            }
            _ => {}
        }
        Progress::Listening
    }

    fn settle_completed(self) -> Result<CompletionResult, GatewayError> {
        Ok(CompletionResult {
            text: self.text.trim().to_string(),
            message_id: self.message_id,
            timed_out: false,
        })
    }

    fn settle_timed_out(self, timeout_ms: u64) -> Result<CompletionResult, GatewayError> {
        let text = self.text.trim().to_string();
        if text.is_empty() {
            return Err(GatewayError::StreamTimeout { timeout_ms });
        }
        Ok(CompletionResult {
            text,
            message_id: self.message_id,
            timed_out: true,
        })
    }

    fn settle_ended(self) -> Result<CompletionResult, GatewayError> {
        let text = self.text.trim().to_string();
        if text.is_empty() {
            return Err(GatewayError::StreamEnded);
        }
        Ok(CompletionResult {
            text,
            message_id: self.message_id,
            timed_out: false,
        })
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

/// Connect to the upstream event endpoint and listen until the session
/// completes, the stream ends, or `timeout` elapses.
///
/// The deadline is armed before the GET is issued, so connection
/// establishment counts against the budget.
///
/// # Errors
///
/// Fails only when no usable text was accumulated: [`GatewayError::StreamTimeout`]
/// on an empty timeout, [`GatewayError::StreamEnded`] when the server closes
/// with nothing accumulated, or [`GatewayError::Transport`] on network errors.
pub async fn wait_for_completion(
    client: UpstreamClient,
    session_id: String,
    auth_header: Option<String>,
    timeout: Duration,
) -> Result<CompletionResult, GatewayError> {
    let timeout_ms = timeout.as_millis() as u64;
    let deadline = Instant::now() + timeout;
    let response = tokio::time::timeout_at(deadline, client.open_event_stream(auth_header.as_deref()))
        .await
        .map_err(|_| GatewayError::StreamTimeout { timeout_ms })??;
    listen_until(response.bytes_stream(), &session_id, deadline, timeout_ms).await
}

/// Listen on a pre-opened byte stream with a fresh timeout. Split out from
/// [`wait_for_completion`] so the state machine can be driven by synthetic
/// streams.
///
/// # Errors
///
/// Same failure modes as [`wait_for_completion`].
pub async fn listen_events<S, E>(
    byte_stream: S,
    session_id: &str,
    timeout: Duration,
) -> Result<CompletionResult, GatewayError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let timeout_ms = timeout.as_millis() as u64;
    let deadline = Instant::now() + timeout;
    listen_until(byte_stream, session_id, deadline, timeout_ms).await
}

async fn listen_until<S, E>(
    byte_stream: S,
    session_id: &str,
    deadline: Instant,
    timeout_ms: u64,
) -> Result<CompletionResult, GatewayError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut stream = std::pin::pin!(byte_stream);
    let mut parser = DataLineParser::new();
    let mut payloads: Vec<String> = Vec::new();
    let mut state = ListenerState::new(session_id);
    let sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            () = &mut sleep => {
                // Returning drops the stream, tearing down the connection.
                return state.settle_timed_out(timeout_ms);
            }
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    parser.feed_into(&bytes, &mut payloads);
                    for payload in payloads.drain(..) {
                        if let Progress::Complete = state.apply_payload(&payload) {
                            // First terminal transition wins; later frames in
                            // the same chunk are never applied.
                            return state.settle_completed();
                        }
                    }
                }
                Some(Err(err)) => {
                    return Err(GatewayError::Transport(format!("event stream error: {err}")));
                }
                None => return state.settle_ended(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SID: &str = "ses_123";

    fn delta_event(session: &str, delta: &str) -> String {
        json!({
            "type": "message.part.updated",
            "properties": {
                "delta": delta,
                "part": {"type": "text", "sessionID": session},
            }
        })
        .to_string()
    }

    fn updated_event(session: &str, id: &str, finish: Value) -> String {
        json!({
            "type": "message.updated",
            "properties": {
                "info": {"id": id, "role": "assistant", "sessionID": session, "finish": finish},
            }
        })
        .to_string()
    }

    fn idle_event(session: &str) -> String {
        json!({"type": "session.idle", "properties": {"sessionID": session}}).to_string()
    }

    #[test]
    fn test_deltas_accumulate_in_order() {
        let mut state = ListenerState::new(SID);
        state.apply_payload(&delta_event(SID, "Hel"));
        state.apply_payload(&delta_event(SID, "lo"));
        assert_eq!(state.text, "Hello");
    }

    #[test]
    fn test_foreign_session_events_are_noops() {
        let mut state = ListenerState::new(SID);
        state.apply_payload(&delta_event("ses_other", "nope"));
        state.apply_payload(&updated_event("ses_other", "msg_1", json!(true)));
        assert!(matches!(
            state.apply_payload(&idle_event("ses_other")),
            Progress::Listening
        ));
        assert!(state.text.is_empty());
        assert!(state.message_id.is_none());
        assert!(!state.assistant_finished);
    }

    #[test]
    fn test_event_without_session_id_discarded() {
        let mut state = ListenerState::new(SID);
        state.apply_payload(
            &json!({"type": "message.part.updated", "properties": {"delta": "x", "part": {"type": "text"}}})
                .to_string(),
        );
        assert!(state.text.is_empty());
    }

    #[test]
    fn test_non_text_part_delta_ignored() {
        let mut state = ListenerState::new(SID);
        state.apply_payload(
            &json!({
                "type": "message.part.updated",
                "properties": {"delta": "x", "part": {"type": "tool", "sessionID": SID}}
            })
            .to_string(),
        );
        assert!(state.text.is_empty());
    }

    #[test]
    fn test_message_updated_records_id_and_finish() {
        let mut state = ListenerState::new(SID);
        state.apply_payload(&updated_event(SID, "msg_1", Value::Null));
        assert_eq!(state.message_id.as_deref(), Some("msg_1"));
        assert!(!state.assistant_finished);
        state.apply_payload(&updated_event(SID, "msg_1", json!("stop")));
        assert!(state.assistant_finished);
    }

    #[test]
    fn test_non_assistant_message_updated_ignored() {
        let mut state = ListenerState::new(SID);
        state.apply_payload(
            &json!({
                "type": "message.updated",
                "properties": {"info": {"id": "msg_u", "role": "user", "sessionID": SID}}
            })
            .to_string(),
        );
        assert!(state.message_id.is_none());
    }

    #[test]
    fn test_idle_requires_finish_and_text() {
        let mut state = ListenerState::new(SID);
        assert!(matches!(
            state.apply_payload(&idle_event(SID)),
            Progress::Listening
        ));

        state.apply_payload(&delta_event(SID, "answer"));
        assert!(matches!(
            state.apply_payload(&idle_event(SID)),
            Progress::Listening
        ));

        state.apply_payload(&updated_event(SID, "msg_1", json!(true)));
        assert!(matches!(
            state.apply_payload(&idle_event(SID)),
            Progress::Complete
        ));
    }

    #[test]
    fn test_idle_with_finish_but_no_text_keeps_listening() {
        let mut state = ListenerState::new(SID);
        state.apply_payload(&updated_event(SID, "msg_1", json!(true)));
        assert!(matches!(
            state.apply_payload(&idle_event(SID)),
            Progress::Listening
        ));
    }

    #[test]
    fn test_malformed_payload_dropped() {
        let mut state = ListenerState::new(SID);
        assert!(matches!(
            state.apply_payload("{not json"),
            Progress::Listening
        ));
        state.apply_payload(&delta_event(SID, "still works"));
        assert_eq!(state.text, "still works");
    }

    #[test]
    fn test_settle_trims_once_at_resolution() {
        let mut state = ListenerState::new(SID);
        state.apply_payload(&delta_event(SID, "  answer"));
        state.apply_payload(&delta_event(SID, " text \n"));
        let result = state.settle_ended().expect("text accumulated");
        assert_eq!(result.text, "answer text");
        assert!(!result.timed_out);
    }

    #[test]
    fn test_settle_timed_out_empty_is_error() {
        let state = ListenerState::new(SID);
        assert!(matches!(
            state.settle_timed_out(5_000),
            Err(GatewayError::StreamTimeout { timeout_ms: 5_000 })
        ));
    }

    #[test]
    fn test_settle_ended_empty_is_error() {
        let state = ListenerState::new(SID);
        assert!(matches!(state.settle_ended(), Err(GatewayError::StreamEnded)));
    }

    #[test]
    fn test_is_truthy_json_semantics() {
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some(&Value::Null)));
        assert!(!is_truthy(Some(&json!(false))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!(1))));
        assert!(is_truthy(Some(&json!("stop"))));
        assert!(is_truthy(Some(&json!({}))));
    }
}
