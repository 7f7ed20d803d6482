//! Default configuration constants for forkscribe.
//!
//! Shared by the configuration types, the controller and the bridge so that
//! both processes agree on wire-level values.

/// Audio-fork sample rate in kHz.
///
/// The telephony platform streams 16 kHz mono L16; providers receive the
/// same rate expressed in Hz.
pub const SAMPLE_RATE_KHZ: u32 = 16;

/// Delay between stopping a session and starting its replacement after a
/// settings change, in milliseconds.
pub const SETTLE_DELAY_MS: u64 = 1000;

/// Command verb understood by the telephony audio-fork module.
pub const FORK_VERB: &str = "uuid_audio_fork";

/// Bus channel that canonical transcript messages are published on.
pub const PUBLISH_CHANNEL: &str = "to-akka-apps-redis-channel";

/// Partial texts that never carry information.
pub const IGNORED_PARTIALS: &[&str] = &["", "the"];

/// Language value that removes the language constraint.
pub const AUTO_LANGUAGE: &str = "auto";

/// Close codes at or above this value signal a provider-side fault.
pub const PROVIDER_FAULT_CLOSE_CODE: u16 = 4000;

/// Message sent upstream when the provider closes with a fault code.
pub const PROVIDER_FAULT_MESSAGE: &str = "Transcription provider closed the session";

/// Default bridge listen address.
pub const BRIDGE_LISTEN: &str = "0.0.0.0:8777";

/// Wait before retrying a failed provider connection, in milliseconds.
pub const BRIDGE_RECONNECT_MS: u64 = 1000;

/// Gladia live session negotiation endpoint.
pub const GLADIA_NEGOTIATION_URL: &str = "https://api.gladia.io/v2/live";

/// Minimum confidence for transcript frames.
pub const MIN_CONFIDENCE: f64 = 0.6;

/// Minimum confidence for translation frames.
pub const MIN_TRANSLATION_CONFIDENCE: f64 = 0.6;

/// FreeSWITCH event socket defaults.
pub const ESL_HOST: &str = "127.0.0.1";
pub const ESL_PORT: u16 = 8021;
pub const ESL_PASSWORD: &str = "ClueCon";

/// Delay between event socket reconnection attempts, in milliseconds.
pub const ESL_RECONNECT_MS: u64 = 5000;

/// Settings store key prefixes, suffixed with `_<id>`.
pub const KEY_VOICE_TO_MEETING: &str = "bbb-transcription-manager_voiceToMeeting";
pub const KEY_USER_LOCALE: &str = "bbb-transcription-manager_locale";
pub const KEY_USER_PARTIAL_UTTERANCE: &str = "bbb-transcription-manager_partial_utterance";
pub const KEY_USER_MIN_UTTERANCE_LENGTH: &str = "bbb-transcription-manager_min_utterance_length";
pub const KEY_USER_PROVIDER: &str = "bbb-transcription-manager_provider";
