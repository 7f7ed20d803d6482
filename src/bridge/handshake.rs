//! First frame of an inbound fork stream.

use crate::codec::{lenient_bool, lenient_u64};
use crate::defaults;
use crate::error::{ForkscribeError, Result};
use serde_json::{Map, Value};

/// Session parameters taken from the fork handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParams {
    pub partial_utterances: bool,
    pub min_utterance_length_ms: u64,
    pub sample_rate: u32,
    /// `None` lets the provider detect the language.
    pub language: Option<String>,
    /// Handshake as forwarded to a direct provider link, minus any `"auto"`
    /// language.
    pub forwarded: Value,
}

impl SessionParams {
    /// Parse the handshake. Anything but a JSON object is rejected; missing
    /// fields fall back to partials off, no minimum length, 16 kHz.
    pub fn from_handshake(raw: &str) -> Result<Self> {
        let mut object: Map<String, Value> = match serde_json::from_str(raw) {
            Ok(Value::Object(object)) => object,
            Ok(_) => {
                return Err(ForkscribeError::Handshake {
                    message: "not a JSON object".to_string(),
                });
            }
            Err(e) => {
                return Err(ForkscribeError::Handshake {
                    message: e.to_string(),
                });
            }
        };

        let partial_utterances = lenient_bool(object.get("partialUtterances")).unwrap_or(false);
        let min_utterance_length_ms = lenient_u64(object.get("minUtteranceLength")).unwrap_or(0);
        let sample_rate = lenient_u64(
            object
                .get("sample_rate")
                .or_else(|| object.get("sampleRate")),
        )
        .and_then(|rate| u32::try_from(rate).ok())
        .filter(|rate| *rate > 0)
        .unwrap_or(defaults::SAMPLE_RATE_KHZ * 1000);

        let language = object
            .get("language")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|language| {
                !language.is_empty() && !language.eq_ignore_ascii_case(defaults::AUTO_LANGUAGE)
            })
            .map(str::to_string);

        match &language {
            Some(language) => {
                object.insert("language".to_string(), Value::String(language.clone()));
            }
            None => {
                object.remove("language");
            }
        }

        Ok(Self {
            partial_utterances,
            min_utterance_length_ms,
            sample_rate,
            language,
            forwarded: Value::Object(object),
        })
    }
}
