//! Action signal decoding
//!
//! The model can answer with a JSON directive instead of prose, e.g.
//! `{"action":"CHANGE_DATABASE","database":"sales","message":"Switched"}`.
//! Anything that is not such a directive is ordinary chat text.

use serde_json::Value;
use sid_core::ActionSignal;
use tracing::debug;

pub const CHANGE_DATABASE: &str = "CHANGE_DATABASE";

/// Decode `text` as an action signal. Never fails; a miss is `None`.
pub fn decode(text: &str) -> Option<ActionSignal> {
    let body = strip_fence(text.trim());
    if !body.starts_with('{') {
        debug!("Not an action signal: not a JSON object");
        return None;
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Not an action signal: invalid JSON");
            return None;
        }
    };

    match value.get("action").and_then(Value::as_str) {
        Some(CHANGE_DATABASE) => {}
        other => {
            debug!(action = ?other, "Not an action signal: unrecognized action");
            return None;
        }
    }

    let database = match value.get("database").and_then(Value::as_str) {
        Some(db) if !db.trim().is_empty() => db.to_string(),
        _ => {
            debug!("CHANGE_DATABASE without a database name");
            return None;
        }
    };
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(ActionSignal::ChangeDatabase { database, message })
}

/// Decode the joined final text, falling back to the text blocks of the
/// response that ended the run, last first.
///
/// `last_response` must hold only model-authored text from that response;
/// tool traces and earlier rounds never produce a signal here.
pub fn decode_final(final_text: &str, last_response: &[String]) -> Option<ActionSignal> {
    decode(final_text).or_else(|| last_response.iter().rev().find_map(|s| decode(s)))
}

/// Remove a surrounding Markdown code fence (```json ... ```).
fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let rest = match rest.find('\n') {
        Some(newline) if !rest[..newline].trim_start().starts_with('{') => &rest[newline + 1..],
        _ => rest,
    };
    rest.trim()
}
