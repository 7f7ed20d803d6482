//! Message codec: pure translation between provider frames, fork handshakes
//! and the canonical messages published on the event bus.
//!
//! Nothing in here performs I/O and nothing returns a parse error: malformed
//! input degrades to an empty object and falls through to the "ignored" paths.

pub mod envelope;
pub mod handshake;
pub mod result;

pub use envelope::{BusMessage, TranscriptEvent, error_message, transcript_message};
pub use handshake::{build_end_payload, build_initial_handshake};
pub use result::{ClassifiedFrame, ResultFields, classify_result_frame};

use serde_json::{Map, Value};

/// Parse a JSON object, yielding `{}` for anything unparseable or non-object.
pub fn parse_json_lenient(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => Value::Object(Map::new()),
    }
}

/// Read a string-or-bool flag the way the settings store hands it back.
pub fn lenient_bool(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" | "" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

/// Read a non-negative integer from a number or numeric string.
pub fn lenient_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| *f >= 0.0)
            .map(|f| f.round() as u64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json_lenient_malformed_is_empty_object() {
        assert_eq!(parse_json_lenient("{oops"), json!({}));
        assert_eq!(parse_json_lenient(""), json!({}));
        assert_eq!(parse_json_lenient("42"), json!({}));
        assert_eq!(parse_json_lenient(r#"{"text":"hi"}"#), json!({"text": "hi"}));
    }

    #[test]
    fn test_lenient_bool() {
        assert_eq!(lenient_bool(Some(&json!("true"))), Some(true));
        assert_eq!(lenient_bool(Some(&json!(false))), Some(false));
        assert_eq!(lenient_bool(Some(&json!(1))), Some(true));
        assert_eq!(lenient_bool(Some(&json!("maybe"))), None);
        assert_eq!(lenient_bool(None), None);
    }

    #[test]
    fn test_lenient_u64() {
        assert_eq!(lenient_u64(Some(&json!(500))), Some(500));
        assert_eq!(lenient_u64(Some(&json!("750"))), Some(750));
        assert_eq!(lenient_u64(Some(&json!(1.4))), Some(1));
        assert_eq!(lenient_u64(Some(&json!(-3))), None);
        assert_eq!(lenient_u64(Some(&json!("abc"))), None);
    }
}
