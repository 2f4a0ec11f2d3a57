//! Opportunistic extraction of a JSON object embedded in model output.
//!
//! Model replies are free text that may carry one JSON object instructing
//! further action (an execution plan, a tool call). Anything that does not
//! parse is treated as "no structured payload", never as an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Deserializer, Map, Value};

static FENCED_JSON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)\s*(.*?)```").expect("fence pattern is valid"));

/// Find the JSON object carried by `text`, if any.
///
/// Search order:
/// 1. the first fenced block tagged `json` whose contents parse as an object
/// 2. the greedy span from the first `{` to the last `}`
/// 3. the first complete object starting at any `{`, ignoring what follows
///
/// Arrays and scalars are never returned.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    for caps in FENCED_JSON_RE.captures_iter(text) {
        if let Some(obj) = parse_object(caps[1].trim()) {
            return Some(obj);
        }
    }

    let start = text.find('{')?;
    if let Some(end) = text.rfind('}') {
        if end > start {
            if let Some(obj) = parse_object(&text[start..=end]) {
                return Some(obj);
            }
        }
    }

    text.match_indices('{')
        .find_map(|(idx, _)| first_object_at(&text[idx..]))
}

fn parse_object(snippet: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(snippet).ok()? {
        Value::Object(obj) => Some(obj),
        _ => None,
    }
}

fn first_object_at(text: &str) -> Option<Map<String, Value>> {
    let mut stream = Deserializer::from_str(text).into_iter::<Value>();
    match stream.next()?.ok()? {
        Value::Object(obj) => Some(obj),
        _ => None,
    }
}
