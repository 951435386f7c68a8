//! Normalization of agent output lines into displayable text.
//!
//! Structured backends print one JSON envelope per line with a `type`
//! discriminator. Each line is reduced to at most one line of plain text;
//! lifecycle markers are dropped, and anything not understood is passed
//! through unchanged so new backend output is never silently eaten.

use serde_json::Value;

use crate::core::types::AgentType;

/// Envelope types that carry no displayable text.
const LIFECYCLE_TYPES: &[&str] = &[
    "system",
    "user",
    "step_start",
    "step_finish",
    "tool_use",
    "tool_call",
    "tool_result",
    "message_start",
    "message_delta",
    "message_stop",
    "content_block_start",
    "content_block_stop",
    "ping",
];

/// Whether a backend prints structured envelopes or plain text.
pub fn emits_envelopes(agent: AgentType) -> bool {
    !matches!(agent, AgentType::Codex)
}

/// Normalize one line of `agent` output. `None` means "nothing to display".
pub fn normalize_line(agent: AgentType, line: &str) -> Option<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    if !emits_envelopes(agent) {
        return Some(line.to_string());
    }
    normalize_envelope(line)
}

/// Backend-independent envelope normalizer.
pub fn normalize_envelope(line: &str) -> Option<String> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value @ Value::Object(_)) => value,
        _ => return Some(line.to_string()),
    };
    let Some(kind) = value["type"].as_str() else {
        return Some(line.to_string());
    };

    match kind {
        "assistant" => assistant_text(&value),
        "result" => {
            if is_success_result(&value) {
                value["result"].as_str().and_then(non_empty)
            } else {
                None
            }
        }
        "text" => value["part"]["text"]
            .as_str()
            .or_else(|| value["text"].as_str())
            .and_then(non_empty),
        "stream_event" => delta_text(&value["event"]),
        "content_block_delta" => delta_text(&value),
        other if LIFECYCLE_TYPES.contains(&other) => None,
        _ => Some(line.to_string()),
    }
}

/// Error text of a `result` envelope that reports failure, if `line` is one.
pub fn failed_result(line: &str) -> Option<String> {
    let value: Value = serde_json::from_str(line).ok()?;
    if value["type"].as_str() != Some("result") || is_success_result(&value) {
        return None;
    }
    let subtype = value["subtype"].as_str().unwrap_or("unknown");
    let detail = value["result"]
        .as_str()
        .or_else(|| value["error"].as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    Some(match detail {
        Some(detail) => format!("agent reported {subtype}: {detail}"),
        None => format!("agent reported {subtype}"),
    })
}

fn is_success_result(value: &Value) -> bool {
    value["subtype"].as_str() == Some("success") && value["is_error"].as_bool() != Some(true)
}

fn assistant_text(value: &Value) -> Option<String> {
    let blocks = value["message"]["content"]
        .as_array()
        .or_else(|| value["content"].as_array())?;
    let text: String = blocks
        .iter()
        .filter(|block| block["type"].as_str() == Some("text"))
        .filter_map(|block| block["text"].as_str())
        .collect();
    non_empty(&text)
}

fn delta_text(event: &Value) -> Option<String> {
    if event["type"].as_str() != Some("content_block_delta") {
        return None;
    }
    let delta = &event["delta"];
    if delta["type"].as_str() != Some("text_delta") {
        return None;
    }
    delta["text"].as_str().and_then(non_empty)
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
