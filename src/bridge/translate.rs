//! Provider frame → fork result frame translation and filtering.

use crate::bridge::handshake::SessionParams;
use crate::codec::parse_json_lenient;
use crate::config::BridgeConfig;
use crate::defaults;
use serde::Serialize;
use serde_json::Value;

/// Result frame sent back up the fork stream. Exactly one of `text` and
/// `partial` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<String>,
    pub locale: String,
    pub time_begin: u64,
    pub time_end: u64,
}

/// Error frame sent up the fork stream when the provider faults.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFrame {
    pub error_code: u16,
    pub error_message: String,
}

impl ErrorFrame {
    pub fn provider_fault(code: u16) -> Self {
        Self {
            error_code: code,
            error_message: defaults::PROVIDER_FAULT_MESSAGE.to_string(),
        }
    }
}

/// Why a provider frame produced no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dropped {
    LowConfidence,
    PartialsDisabled,
    TooShort,
    Empty,
    Unrecognized,
}

/// Per-session filter turning provider frames into output frames.
#[derive(Debug, Clone)]
pub struct ResultTranslator {
    min_confidence: f64,
    min_translation_confidence: f64,
    partial_utterances: bool,
    min_utterance_length_ms: u64,
    language: Option<String>,
    opened_at_ms: u64,
}

impl ResultTranslator {
    pub fn new(config: &BridgeConfig, params: &SessionParams, opened_at_ms: u64) -> Self {
        Self {
            min_confidence: config.min_confidence,
            min_translation_confidence: config.min_translation_confidence,
            partial_utterances: params.partial_utterances,
            min_utterance_length_ms: params.min_utterance_length_ms,
            language: params.language.clone(),
            opened_at_ms,
        }
    }

    pub fn translate(&self, raw: &str) -> Result<OutputFrame, Dropped> {
        let frame = parse_json_lenient(raw);
        let data = frame.get("data").unwrap_or(&Value::Null);

        match frame.get("type").and_then(Value::as_str) {
            Some("transcript") => self.transcript(data),
            Some("translation") => self.translation(data),
            _ => Err(Dropped::Unrecognized),
        }
    }

    fn transcript(&self, data: &Value) -> Result<OutputFrame, Dropped> {
        let utterance = data.get("utterance").unwrap_or(&Value::Null);
        let span = Span::of(utterance);

        if span.confidence < self.min_confidence {
            return Err(Dropped::LowConfidence);
        }
        if span.text.trim().is_empty() {
            return Err(Dropped::Empty);
        }

        let is_final = data
            .get("is_final")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let locale = span.language.or(self.language.clone()).unwrap_or_default();

        if is_final {
            return Ok(self.output(Some(span.text), None, locale, span.start, span.end));
        }

        if !self.partial_utterances {
            return Err(Dropped::PartialsDisabled);
        }
        let duration_ms = ((span.end - span.start).max(0.0) * 1000.0).round() as u64;
        if duration_ms < self.min_utterance_length_ms {
            return Err(Dropped::TooShort);
        }

        Ok(self.output(None, Some(span.text), locale, span.start, span.end))
    }

    fn translation(&self, data: &Value) -> Result<OutputFrame, Dropped> {
        let utterance = data.get("translated_utterance").unwrap_or(&Value::Null);
        let span = Span::of(utterance);

        if span.confidence < self.min_translation_confidence {
            return Err(Dropped::LowConfidence);
        }
        if span.text.trim().is_empty() {
            return Err(Dropped::Empty);
        }

        let locale = span
            .language
            .or_else(|| {
                data.get("target_language")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_default();

        Ok(self.output(Some(span.text), None, locale, span.start, span.end))
    }

    fn output(
        &self,
        text: Option<String>,
        partial: Option<String>,
        locale: String,
        start_s: f64,
        end_s: f64,
    ) -> OutputFrame {
        OutputFrame {
            text,
            partial,
            locale,
            time_begin: self.absolute_ms(start_s),
            time_end: self.absolute_ms(end_s),
        }
    }

    fn absolute_ms(&self, offset_s: f64) -> u64 {
        self.opened_at_ms + (offset_s.max(0.0) * 1000.0).round() as u64
    }
}

/// Fields shared by transcript and translation utterances.
struct Span {
    text: String,
    start: f64,
    end: f64,
    confidence: f64,
    language: Option<String>,
}

impl Span {
    fn of(utterance: &Value) -> Self {
        let number = |field: &str| utterance.get(field).and_then(Value::as_f64);
        Self {
            text: utterance
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            start: number("start").unwrap_or(0.0),
            end: number("end").unwrap_or(0.0),
            // Frames without a score never pass a positive threshold
            confidence: number("confidence").unwrap_or(0.0),
            language: utterance
                .get("language")
                .and_then(Value::as_str)
                .filter(|language| !language.is_empty())
                .map(str::to_string),
        }
    }
}
