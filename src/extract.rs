//! Heuristic payload-field extraction.
//!
//! Inbound callers send a message string inside arbitrary JSON shapes. The
//! lookup logic is table-driven: a list of paths evaluated in priority order
//! against the payload tree, instead of scattered conditional chains.

use serde::Serialize;
use serde_json::Value;

/// One message part submitted to the upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessagePart {
    #[serde(rename = "type")]
    pub part_type: String,
    pub text: String,
}

impl MessagePart {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            part_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Lookup paths for the message string, in priority order.
const MESSAGE_PATHS: &[&[&str]] = &[
    &["message"],
    &["text"],
    &["content"],
    &["prompt"],
    &["input"],
    &["question"],
    &["body", "message"],
    &["body", "text"],
    &["body", "content"],
    &["body", "prompt"],
    &["data", "message"],
    &["data", "text"],
    &["data", "content"],
    &["inputs", "message"],
    &["inputs", "text"],
    &["inputs", "prompt"],
];

/// Lookup paths for the text of a single part entry.
const PART_TEXT_PATHS: &[&[&str]] = &[&["text"], &["content"], &["value"]];

/// Walk a path of object keys down a JSON tree.
#[must_use]
pub fn value_at_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

/// Return the first non-empty trimmed string found at any of the given paths.
#[must_use]
pub fn string_by_paths<'a>(value: &'a Value, paths: &[&[&str]]) -> Option<&'a str> {
    if !value.is_object() {
        return None;
    }
    for path in paths {
        if let Some(found) = value_at_path(value, path).and_then(Value::as_str) {
            let trimmed = found.trim();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
    }
    None
}

/// Locate the message string inside an arbitrary payload shape.
///
/// Tries the direct path table first, then recurses into common container
/// fields, then walks a `messages` array from the newest entry backwards.
#[must_use]
pub fn extract_message(payload: &Value) -> Option<String> {
    if let Value::String(s) = payload {
        let trimmed = s.trim();
        return (!trimmed.is_empty()).then(|| trimmed.to_string());
    }

    if let Some(direct) = string_by_paths(payload, MESSAGE_PATHS) {
        return Some(direct.to_string());
    }

    for container_key in ["body", "data", "inputs", "input"] {
        if let Some(container) = payload.get(container_key) {
            if container.is_object() {
                if let Some(nested) = extract_message(container) {
                    return Some(nested);
                }
            }
        }
    }

    if let Some(messages) = payload.get("messages").and_then(Value::as_array) {
        for msg in messages.iter().rev() {
            if let Some(from_message) = extract_message(msg) {
                return Some(from_message);
            }
            if let Some(parts) = msg.get("parts").and_then(Value::as_array) {
                for part in parts {
                    if let Value::String(s) = part {
                        let trimmed = s.trim();
                        if !trimmed.is_empty() {
                            return Some(trimmed.to_string());
                        }
                    }
                    if let Some(part_text) = string_by_paths(part, PART_TEXT_PATHS) {
                        return Some(part_text.to_string());
                    }
                }
            }
        }
    }
    None
}

fn normalize_parts_array(candidate: &Value) -> Vec<MessagePart> {
    let Some(entries) = candidate.as_array() else {
        return Vec::new();
    };
    let mut parts = Vec::new();
    for entry in entries {
        match entry {
            Value::String(s) => {
                let text = s.trim();
                if !text.is_empty() {
                    parts.push(MessagePart::text(text));
                }
            }
            Value::Object(_) => {
                if let Some(text) = string_by_paths(entry, PART_TEXT_PATHS) {
                    let part_type = entry
                        .get("type")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .unwrap_or("text");
                    parts.push(MessagePart {
                        part_type: part_type.to_string(),
                        text: text.to_string(),
                    });
                }
            }
            _ => {}
        }
    }
    parts
}

/// Extract the parts array from the payload, falling back to a single text
/// part built from `fallback_text`.
#[must_use]
pub fn extract_parts(payload: &Value, fallback_text: Option<&str>) -> Vec<MessagePart> {
    let mut candidates: Vec<&Value> = Vec::new();
    for path in [
        &["parts"][..],
        &["body", "parts"],
        &["data", "parts"],
        &["inputs", "parts"],
    ] {
        if let Some(candidate) = value_at_path(payload, path) {
            candidates.push(candidate);
        }
    }
    if let Some(messages) = payload.get("messages").and_then(Value::as_array) {
        for msg in messages {
            if let Some(parts) = msg.get("parts") {
                candidates.push(parts);
            }
            if let Some(content) = msg.get("content") {
                candidates.push(content);
            }
        }
    }

    for candidate in candidates {
        let normalized = normalize_parts_array(candidate);
        if !normalized.is_empty() {
            return normalized;
        }
    }

    match fallback_text {
        Some(text) if !text.is_empty() => vec![MessagePart::text(text)],
        _ => Vec::new(),
    }
}

/// Return the first non-empty string stored under any of `keys`, checking the
/// payload itself and its common container fields.
#[must_use]
pub fn pick_string_deep(payload: &Value, keys: &[&str]) -> Option<String> {
    let containers = [
        Some(payload),
        payload.get("inputs"),
        payload.get("body"),
        payload.get("data"),
    ];
    for container in containers.into_iter().flatten() {
        if !container.is_object() {
            continue;
        }
        for key in keys {
            if let Some(value) = container.get(key).and_then(Value::as_str) {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }
    None
}

/// Merge URL query parameters into the payload, keeping existing body fields.
/// Values that look like JSON documents are parsed as such.
pub fn merge_query_params(target: &mut Value, query: &str) {
    if query.is_empty() {
        return;
    }
    if !target.is_object() {
        return;
    }
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let Some(object) = target.as_object_mut() else {
            return;
        };
        if !object.contains_key(key.as_ref()) {
            object.insert(key.into_owned(), parse_maybe_json(&value));
        }
    }
}

fn parse_maybe_json(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::String(String::new());
    }
    let looks_structured = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if looks_structured {
        if let Ok(parsed) = serde_json::from_str(trimmed) {
            return parsed;
        }
    }
    Value::String(trimmed.to_string())
}
