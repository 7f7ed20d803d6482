//! Provider-specific session handshake and end-of-session payloads.

use crate::config::{LanguageStyle, LocaleConfig, ProviderConfig};
use crate::provider::Provider;
use crate::store::ResolvedSettings;
use serde_json::{Map, Value, json};

/// Build the first message sent on a new fork stream.
///
/// Starts from the provider's configured template and writes the fields
/// each provider requires:
/// * vosk: `config.sample_rate` as a Hz string (`"16000"`)
/// * gladia: integer Hz `sample_rate`, the language, and the partial-result
///   preferences the bridge filters on
pub fn build_initial_handshake(
    settings: &ResolvedSettings,
    provider_config: &ProviderConfig,
    sample_rate_khz: u32,
    locales: &LocaleConfig,
) -> Value {
    let mut message = match &provider_config.start_message {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    let sample_rate_hz = sample_rate_khz * 1000;

    match settings.provider {
        Provider::Vosk => {
            let config = message
                .entry("config")
                .or_insert_with(|| Value::Object(Map::new()));
            if !config.is_object() {
                *config = Value::Object(Map::new());
            }
            if let Value::Object(config) = config {
                config.insert(
                    "sample_rate".to_string(),
                    Value::String(sample_rate_hz.to_string()),
                );
            }
        }
        Provider::Gladia => {
            message.insert("sample_rate".to_string(), json!(sample_rate_hz));
            match language_for(&settings.locale, provider_config.language_style, locales) {
                Some(language) => {
                    message.insert("language".to_string(), Value::String(language));
                }
                None => {
                    message.remove("language");
                }
            }
            message.insert(
                "partialUtterances".to_string(),
                Value::String(settings.partial_utterances.to_string()),
            );
            message.insert(
                "minUtteranceLength".to_string(),
                json!(settings.min_utterance_length),
            );
        }
    }

    Value::Object(message)
}

/// End-of-session payload sent with the stop command.
pub fn build_end_payload(provider_config: &ProviderConfig) -> Value {
    match &provider_config.end_message {
        Value::Null => json!({}),
        other => other.clone(),
    }
}

/// `None` when the locale has no name in the table.
fn language_for(locale: &str, style: LanguageStyle, locales: &LocaleConfig) -> Option<String> {
    match style {
        LanguageStyle::Code => Some(locale.chars().take(2).collect()),
        LanguageStyle::Name => locales.name_for(locale).map(str::to_string),
    }
}
