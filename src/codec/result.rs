//! Classification of result frames arriving over the fork channel.

use crate::codec::{lenient_u64, parse_json_lenient};
use crate::provider::Provider;
use serde_json::Value;

/// Recognized text plus its timing, as carried by a result frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultFields {
    pub text: String,
    /// Locale reported by the provider, if any.
    pub locale: Option<String>,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// What a raw result frame means to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedFrame {
    /// A completed utterance.
    Final(ResultFields),
    /// An in-progress hypothesis.
    Partial(ResultFields),
    /// The provider (or the bridge) reported a fault.
    Error { code: i64, message: String },
    /// Nothing to act on.
    Ignored,
}

/// Classify a raw result frame.
///
/// Both providers deliver `{"text": ...}` for finals and `{"partial": ...}`
/// for partials over the fork channel; they differ in where the timing is.
/// Vosk puts per-word `start`/`end` seconds in a `result` array, frames that
/// went through the bridge carry `timeBegin`/`timeEnd` milliseconds.
pub fn classify_result_frame(provider: Provider, raw: &str) -> ClassifiedFrame {
    let body = parse_json_lenient(raw);

    if let Some(code) = body.get("errorCode").filter(|c| !c.is_null()) {
        return ClassifiedFrame::Error {
            code: code
                .as_i64()
                .or_else(|| code.as_str().and_then(|s| s.trim().parse().ok()))
                .unwrap_or(0),
            message: body
                .get("errorMessage")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };
    }

    let (start_ms, end_ms) = match provider {
        Provider::Vosk => vosk_timing(&body),
        Provider::Gladia => (
            lenient_u64(body.get("timeBegin").or_else(|| body.get("time_begin"))).unwrap_or(0),
            lenient_u64(body.get("timeEnd").or_else(|| body.get("time_end"))).unwrap_or(0),
        ),
    };
    let locale = body
        .get("locale")
        .and_then(Value::as_str)
        .filter(|l| !l.is_empty())
        .map(str::to_string);

    if let Some(text) = body.get("text").and_then(Value::as_str) {
        if text.trim().is_empty() {
            return ClassifiedFrame::Ignored;
        }
        return ClassifiedFrame::Final(ResultFields {
            text: text.to_string(),
            locale,
            start_ms,
            end_ms,
        });
    }

    if let Some(partial) = body.get("partial").and_then(Value::as_str) {
        return ClassifiedFrame::Partial(ResultFields {
            text: partial.to_string(),
            locale,
            start_ms,
            end_ms,
        });
    }

    ClassifiedFrame::Ignored
}

fn vosk_timing(body: &Value) -> (u64, u64) {
    let Some(words) = body.get("result").and_then(Value::as_array) else {
        return (0, 0);
    };
    let seconds_to_ms = |v: Option<&Value>| {
        v.and_then(Value::as_f64)
            .filter(|s| *s >= 0.0)
            .map(|s| (s * 1000.0).round() as u64)
            .unwrap_or(0)
    };
    let start = seconds_to_ms(words.first().and_then(|w| w.get("start")));
    let end = seconds_to_ms(words.last().and_then(|w| w.get("end")));
    (start, end)
}
