use crate::defaults;
use crate::error::{ForkscribeError, Result};
use crate::provider::Provider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub controller: ControllerConfig,
    pub esl: EslConfig,
    pub providers: ProvidersConfig,
    pub bridge: BridgeConfig,
    pub locales: LocaleConfig,
}

/// Channel session controller configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    pub sample_rate_khz: u32,
    pub include_partial_results: bool,
    pub settle_delay_ms: u64,
    /// A final transcript arriving while a stop is pending executes the stop.
    pub stop_on_final: bool,
    pub ignored_partials: Vec<String>,
    pub default_provider: Provider,
    pub fork_verb: String,
    pub publish_channel: String,
    pub socket: Option<PathBuf>,
}

/// FreeSWITCH event socket configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EslConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub reconnect_interval_ms: u64,
}

/// Per-provider endpoints and message templates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProvidersConfig {
    #[serde(default = "ProviderConfig::vosk")]
    pub vosk: ProviderConfig,
    #[serde(default = "ProviderConfig::gladia")]
    pub gladia: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// Single server used for every locale.
    pub server: Option<String>,
    /// Locale-specific servers, checked before `server`.
    pub servers: BTreeMap<String, String>,
    pub start_message: serde_json::Value,
    pub end_message: serde_json::Value,
    pub language_style: LanguageStyle,
}

/// How a provider expects the session language to be spelled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LanguageStyle {
    /// Two-letter code, e.g. `en`.
    #[default]
    Code,
    /// Full lowercase language name, e.g. `english`.
    Name,
}

/// Provider proxy bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub listen: String,
    /// Direct provider WebSocket, used when `negotiation_url` is empty.
    pub provider_url: String,
    pub negotiation_url: String,
    pub api_key: String,
    pub encoding: String,
    pub bit_depth: u32,
    pub channels: u32,
    pub min_confidence: f64,
    pub min_translation_confidence: f64,
    pub translation: bool,
    pub translation_languages: Vec<String>,
}

/// Locale code → language name substitution table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocaleConfig {
    pub names: BTreeMap<String, String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sample_rate_khz: defaults::SAMPLE_RATE_KHZ,
            include_partial_results: true,
            settle_delay_ms: defaults::SETTLE_DELAY_MS,
            stop_on_final: true,
            ignored_partials: defaults::IGNORED_PARTIALS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_provider: Provider::Vosk,
            fork_verb: defaults::FORK_VERB.to_string(),
            publish_channel: defaults::PUBLISH_CHANNEL.to_string(),
            socket: None,
        }
    }
}

impl Default for EslConfig {
    fn default() -> Self {
        Self {
            host: defaults::ESL_HOST.to_string(),
            port: defaults::ESL_PORT,
            password: defaults::ESL_PASSWORD.to_string(),
            reconnect_interval_ms: defaults::ESL_RECONNECT_MS,
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            vosk: ProviderConfig::vosk(),
            gladia: ProviderConfig::gladia(),
        }
    }
}

impl ProvidersConfig {
    pub fn get(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::Vosk => &self.vosk,
            Provider::Gladia => &self.gladia,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            server: None,
            servers: BTreeMap::new(),
            start_message: serde_json::json!({}),
            end_message: serde_json::json!({}),
            language_style: LanguageStyle::Code,
        }
    }
}

impl ProviderConfig {
    fn vosk() -> Self {
        Self {
            server: None,
            servers: BTreeMap::from([
                ("en-US".to_string(), "ws://127.0.0.1:2700".to_string()),
                ("es-ES".to_string(), "ws://127.0.0.1:2701".to_string()),
                ("fr-FR".to_string(), "ws://127.0.0.1:2702".to_string()),
                ("pt-BR".to_string(), "ws://127.0.0.1:2703".to_string()),
            ]),
            start_message: serde_json::json!({ "config": { "sample_rate": "" } }),
            end_message: serde_json::json!({ "eof": 1 }),
            language_style: LanguageStyle::Code,
        }
    }

    fn gladia() -> Self {
        Self {
            server: Some("ws://127.0.0.1:8777".to_string()),
            servers: BTreeMap::new(),
            start_message: serde_json::json!({}),
            end_message: serde_json::json!({ "type": "stop_recording" }),
            language_style: LanguageStyle::Code,
        }
    }

    /// Resolve the fork target for a locale: locale table first, then the
    /// catch-all server.
    pub fn server_for(&self, locale: &str) -> Option<&str> {
        self.servers
            .get(locale)
            .or(self.server.as_ref())
            .map(String::as_str)
            .filter(|url| !url.is_empty())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen: defaults::BRIDGE_LISTEN.to_string(),
            provider_url: String::new(),
            negotiation_url: defaults::GLADIA_NEGOTIATION_URL.to_string(),
            api_key: String::new(),
            encoding: "wav/pcm".to_string(),
            bit_depth: 16,
            channels: 1,
            min_confidence: defaults::MIN_CONFIDENCE,
            min_translation_confidence: defaults::MIN_TRANSLATION_CONFIDENCE,
            translation: false,
            translation_languages: Vec::new(),
        }
    }
}

impl Default for LocaleConfig {
    fn default() -> Self {
        let names = [
            ("en", "english"),
            ("es", "spanish"),
            ("fr", "french"),
            ("pt", "portuguese"),
            ("de", "german"),
            ("it", "italian"),
        ];
        Self {
            names: names
                .iter()
                .map(|(code, name)| (code.to_string(), name.to_string()))
                .collect(),
        }
    }
}

impl LocaleConfig {
    /// Full language name for a locale, if the table has one.
    pub fn name_for(&self, locale: &str) -> Option<&str> {
        let code: String = locale.chars().take(2).collect::<String>().to_lowercase();
        self.names.get(&code).map(String::as_str)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist.
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - FORKSCRIBE_ESL_HOST → esl.host
    /// - FORKSCRIBE_ESL_PASSWORD → esl.password
    /// - FORKSCRIBE_GLADIA_API_KEY → bridge.api_key
    /// - FORKSCRIBE_BRIDGE_LISTEN → bridge.listen
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(host) = std::env::var("FORKSCRIBE_ESL_HOST")
            && !host.is_empty()
        {
            self.esl.host = host;
        }

        if let Ok(password) = std::env::var("FORKSCRIBE_ESL_PASSWORD")
            && !password.is_empty()
        {
            self.esl.password = password;
        }

        if let Ok(key) = std::env::var("FORKSCRIBE_GLADIA_API_KEY")
            && !key.is_empty()
        {
            self.bridge.api_key = key;
        }

        if let Ok(listen) = std::env::var("FORKSCRIBE_BRIDGE_LISTEN")
            && !listen.is_empty()
        {
            self.bridge.listen = listen;
        }

        self
    }

    /// Reject values that would only fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.bridge.listen.parse::<SocketAddr>().is_err() {
            return Err(ForkscribeError::ConfigInvalidValue {
                key: "bridge.listen".to_string(),
                message: format!("'{}' is not a socket address", self.bridge.listen),
            });
        }

        if self.bridge.negotiation_url.is_empty() && self.bridge.provider_url.is_empty() {
            return Err(ForkscribeError::ConfigInvalidValue {
                key: "bridge.provider_url".to_string(),
                message: "required when bridge.negotiation_url is empty".to_string(),
            });
        }

        for (key, value) in [
            ("bridge.min_confidence", self.bridge.min_confidence),
            (
                "bridge.min_translation_confidence",
                self.bridge.min_translation_confidence,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ForkscribeError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: format!("{} is outside 0.0..=1.0", value),
                });
            }
        }

        if self.controller.sample_rate_khz == 0 {
            return Err(ForkscribeError::ConfigInvalidValue {
                key: "controller.sample_rate_khz".to_string(),
                message: "must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_display_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/forkscribe/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("forkscribe")
            .join("config.toml")
    }
}
