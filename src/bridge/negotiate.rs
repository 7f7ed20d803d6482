//! Live session negotiation against the provider's REST endpoint.

use crate::bridge::handshake::SessionParams;
use crate::config::BridgeConfig;
use crate::error::{ForkscribeError, Result};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct LiveSession {
    #[serde(default)]
    id: String,
    url: String,
}

/// Request body for a new live session.
pub fn negotiation_body(config: &BridgeConfig, params: &SessionParams) -> Value {
    let mut body = json!({
        "encoding": config.encoding,
        "sample_rate": params.sample_rate,
        "bit_depth": config.bit_depth,
        "channels": config.channels,
        "messages_config": {
            "receive_partial_transcripts": params.partial_utterances,
        },
    });

    if let Some(language) = &params.language {
        body["language_config"] = json!({
            "languages": [language],
            "code_switching": false,
        });
    }

    if config.translation && !config.translation_languages.is_empty() {
        body["realtime_processing"] = json!({
            "translation": true,
            "translation_config": {
                "target_languages": config.translation_languages,
            },
        });
    }

    body
}

/// Ask the provider for a streaming endpoint. Any non-2xx answer is an error
/// carrying the status and body; there is no retry.
pub async fn negotiate(
    client: &reqwest::Client,
    config: &BridgeConfig,
    params: &SessionParams,
) -> Result<String> {
    let response = client
        .post(&config.negotiation_url)
        .header("x-gladia-key", &config.api_key)
        .json(&negotiation_body(config, params))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ForkscribeError::Negotiation {
            status: status.as_u16(),
            body,
        });
    }

    let session: LiveSession = response.json().await?;
    tracing::debug!(session_id = session.id, "live session negotiated");
    Ok(session.url)
}
