//! Compatibility shim for the vendor's response payloads.
//!
//! The vendor has shipped several different response shapes over time and
//! none of them is contractual. Every bit of knowledge about where a reply,
//! an extracted variable, or an end-of-chat marker may live is kept here so
//! that a future shape change touches exactly one module.

use serde_json::{Map, Value};

use crate::types::Variables;

/// Placeholder reply used when no known shape yields any text.
pub const NO_RESPONSE_TEXT: &str = "No response received";

/// Substrings the vendor puts in error bodies once a chat is over.
const ENDED_TEXT_MARKERS: &[&str] = &["Chat already ended", "chat ended"];

/// Keys that may hold an array of conversation turns.
const TURN_ARRAY_KEYS: &[&str] = &["messages", "turns"];

/// Role names that identify a turn as coming from the agent.
const AGENT_ROLES: &[&str] = &["agent", "assistant", "bot"];

/// Flat string fields that may hold the reply, in lookup order.
const FLAT_REPLY_KEYS: &[&str] = &["response", "output_text"];

/// Nesting paths that may hold extracted variables, in lookup order.
const VARIABLE_PATHS: &[&[&str]] = &[
    &["variables"],
    &["metadata", "variables"],
    &["extracted_variables"],
    &["state", "variables"],
];

const ENDED_STATUSES: &[&str] = &["ended", "finished", "completed", "error"];
const ENDED_FLAGS: &[&str] = &["ended", "is_ended", "finished"];
const ENDED_TIMESTAMPS: &[&str] = &["ended_at", "finished_at", "end_time"];

/// Find the agent's reply text in a vendor payload.
///
/// Lookup order: the last agent turn with non-empty content in a turn array,
/// then the flat `response` field, then the flat `output_text` field.
pub fn find_reply_text(response: &Value) -> Option<String> {
    if let Some(text) = last_agent_turn(response) {
        return Some(text);
    }

    FLAT_REPLY_KEYS
        .iter()
        .filter_map(|key| response.get(*key))
        .filter_map(Value::as_str)
        .find(|text| !text.trim().is_empty())
        .map(str::to_string)
}

/// Extract the reply text, degrading to a placeholder if no shape matches.
pub fn extract_reply_text(response: &Value) -> String {
    find_reply_text(response).unwrap_or_else(|| {
        tracing::warn!("No reply text found in vendor response, using placeholder");
        NO_RESPONSE_TEXT.to_string()
    })
}

fn last_agent_turn(response: &Value) -> Option<String> {
    let turns = TURN_ARRAY_KEYS
        .iter()
        .find_map(|key| response.get(*key).and_then(Value::as_array))?;

    turns.iter().rev().find_map(|turn| {
        let role = turn.get("role").and_then(Value::as_str)?;
        if !AGENT_ROLES.iter().any(|r| role.eq_ignore_ascii_case(r)) {
            return None;
        }
        let text = turn_content(turn.get("content")?)?;
        if text.trim().is_empty() { None } else { Some(text) }
    })
}

/// Turn content is either a plain string or a list of `{text}` parts.
fn turn_content(content: &Value) -> Option<String> {
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let text: Vec<&str> = parts
                .iter()
                .filter_map(|p| p.as_str().or_else(|| p.get("text").and_then(Value::as_str)))
                .collect();
            if text.is_empty() {
                None
            } else {
                Some(text.join(""))
            }
        }
        _ => None,
    }
}

/// Extract vendor-side variables from a payload.
///
/// Returns the first non-empty object found along the known nesting paths,
/// with null and empty-string values dropped. `None` if nothing usable exists.
pub fn extract_variables(response: &Value) -> Option<Variables> {
    VARIABLE_PATHS.iter().find_map(|path| {
        let object = lookup(response, path)?.as_object()?;
        let filtered = usable_values(object);
        if filtered.is_empty() { None } else { Some(filtered) }
    })
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

fn usable_values(object: &Map<String, Value>) -> Variables {
    object
        .iter()
        .filter(|(_, v)| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Check whether error text carries the vendor's end-of-chat marker.
///
/// Case-sensitive on purpose: these are the vendor's literal messages.
pub fn is_ended_text(text: &str) -> bool {
    ENDED_TEXT_MARKERS.iter().any(|m| text.contains(m))
}

/// Check whether a payload (or a bare error string) says the chat is over.
///
/// Strings are matched against the vendor's error markers. Objects are ended
/// if any of the status string, boolean flags, or end timestamps say so.
pub fn is_session_ended(response: &Value) -> bool {
    match response {
        Value::String(text) => is_ended_text(text),
        Value::Object(object) => is_ended_object(object),
        _ => false,
    }
}

fn is_ended_object(object: &Map<String, Value>) -> bool {
    let by_status = object
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|s| ENDED_STATUSES.iter().any(|e| s.eq_ignore_ascii_case(e)));

    let by_flag = ENDED_FLAGS
        .iter()
        .any(|key| object.get(*key).and_then(Value::as_bool) == Some(true));

    let by_timestamp = ENDED_TIMESTAMPS
        .iter()
        .any(|key| object.get(*key).is_some_and(|v| !v.is_null()));

    by_status || by_flag || by_timestamp
}

/// The normalized shape returned for a status lookup on a vanished session.
pub fn synthesized_ended_status() -> Value {
    serde_json::json!({ "status": "ended", "ended": true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_from_turn_array_picks_last_agent_turn() {
        let response = json!({
            "messages": [
                {"role": "agent", "content": "first"},
                {"role": "user", "content": "question"},
                {"role": "agent", "content": "second"},
                {"role": "user", "content": "trailing user turn"}
            ]
        });
        assert_eq!(find_reply_text(&response).as_deref(), Some("second"));
    }

    #[test]
    fn test_reply_skips_empty_agent_turns() {
        let response = json!({
            "messages": [
                {"role": "assistant", "content": "real answer"},
                {"role": "assistant", "content": "   "}
            ]
        });
        assert_eq!(find_reply_text(&response).as_deref(), Some("real answer"));
    }

    #[test]
    fn test_reply_from_content_parts() {
        let response = json!({
            "turns": [{"role": "Bot", "content": [{"text": "Hello, "}, {"text": "world"}]}]
        });
        assert_eq!(find_reply_text(&response).as_deref(), Some("Hello, world"));
    }

    #[test]
    fn test_reply_falls_back_to_flat_fields() {
        assert_eq!(
            find_reply_text(&json!({"response": "flat"})).as_deref(),
            Some("flat")
        );
        assert_eq!(
            find_reply_text(&json!({"output_text": "output"})).as_deref(),
            Some("output")
        );
        // turn array without agent turns falls through to the flat fields
        let response = json!({
            "messages": [{"role": "user", "content": "hi"}],
            "response": "flat wins"
        });
        assert_eq!(find_reply_text(&response).as_deref(), Some("flat wins"));
    }

    #[test]
    fn test_flat_reply_keeps_whitespace() {
        assert_eq!(
            find_reply_text(&json!({"response": "  indented\nline \n"})).as_deref(),
            Some("  indented\nline \n")
        );
        // blank flat fields are skipped, not returned
        assert_eq!(
            find_reply_text(&json!({"response": " \n", "output_text": "\tnext"})).as_deref(),
            Some("\tnext")
        );
    }

    #[test]
    fn test_reply_placeholder() {
        assert_eq!(extract_reply_text(&json!({})), NO_RESPONSE_TEXT);
        assert_eq!(extract_reply_text(&json!({"response": ""})), NO_RESPONSE_TEXT);
        assert_eq!(extract_reply_text(&Value::Null), NO_RESPONSE_TEXT);
    }

    #[test]
    fn test_variables_prefer_top_level() {
        let response = json!({
            "variables": {"name": "Ada"},
            "metadata": {"variables": {"name": "Grace"}}
        });
        let vars = extract_variables(&response).unwrap();
        assert_eq!(vars.get("name"), Some(&json!("Ada")));
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn test_variables_search_order_skips_empty() {
        let response = json!({
            "variables": {"blank": "", "missing": null},
            "metadata": {"variables": {}},
            "extracted_variables": {"email": "ada@example.com", "age": 36}
        });
        let vars = extract_variables(&response).unwrap();
        assert_eq!(vars.get("email"), Some(&json!("ada@example.com")));
        assert_eq!(vars.get("age"), Some(&json!(36)));
    }

    #[test]
    fn test_variables_nested_state_path() {
        let response = json!({"state": {"variables": {"plan": "pro", "trial": false}}});
        let vars = extract_variables(&response).unwrap();
        assert_eq!(vars.get("trial"), Some(&json!(false)));
    }

    #[test]
    fn test_variables_none_when_absent() {
        assert!(extract_variables(&json!({})).is_none());
        assert!(extract_variables(&json!({"variables": {}})).is_none());
        assert!(extract_variables(&json!({"variables": "not an object"})).is_none());
        assert!(extract_variables(&json!({"metadata": {"variables": {"x": null}}})).is_none());
    }

    #[test]
    fn test_ended_object_mode() {
        assert!(is_session_ended(&json!({"status": "ended"})));
        assert!(is_session_ended(&json!({"status": "Completed"})));
        assert!(is_session_ended(&json!({"ended": true})));
        assert!(is_session_ended(&json!({"is_ended": true})));
        assert!(is_session_ended(&json!({"finished": true})));
        assert!(is_session_ended(&json!({"ended_at": 169999})));
        assert!(is_session_ended(&json!({"end_time": "2024-01-01T00:00:00Z"})));
    }

    #[test]
    fn test_not_ended_object_mode() {
        assert!(!is_session_ended(&json!({"ended_at": null})));
        assert!(!is_session_ended(&json!({})));
        assert!(!is_session_ended(&json!({"status": "active", "ended": false})));
        assert!(!is_session_ended(&json!([{"status": "ended"}])));
    }

    #[test]
    fn test_ended_string_mode() {
        assert!(is_session_ended(&json!("Error: Chat already ended")));
        assert!(is_session_ended(&json!("the chat ended")));
        assert!(!is_session_ended(&json!("Chat Ended")));
        assert!(!is_session_ended(&json!("internal server error")));
    }

    #[test]
    fn test_synthesized_status_is_ended() {
        assert!(is_session_ended(&synthesized_ended_status()));
    }
}
