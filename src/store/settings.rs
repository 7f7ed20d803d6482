//! Typed, namespaced access to per-user speech settings.

use crate::defaults;
use crate::error::Result;
use crate::provider::Provider;
use crate::store::SettingsStore;
use std::sync::Arc;

/// Settings as stored for one user; any field may be unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserSettings {
    pub provider: Option<Provider>,
    pub locale: Option<String>,
    pub partial_utterances: bool,
    pub min_utterance_length: u64,
}

/// Settings with both provider and locale known, enough to start a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    pub provider: Provider,
    pub locale: String,
    pub partial_utterances: bool,
    pub min_utterance_length: u64,
}

impl UserSettings {
    /// `None` when provider or locale is missing or empty.
    pub fn resolve(&self) -> Option<ResolvedSettings> {
        let provider = self.provider?;
        let locale = self.locale.as_deref().filter(|l| !l.trim().is_empty())?;
        Some(ResolvedSettings {
            provider,
            locale: locale.to_string(),
            partial_utterances: self.partial_utterances,
            min_utterance_length: self.min_utterance_length,
        })
    }
}

fn key(prefix: &str, id: &str) -> String {
    format!("{}_{}", prefix, id)
}

/// Typed wrapper over the raw key/value store.
#[derive(Clone)]
pub struct SettingsGateway {
    store: Arc<dyn SettingsStore>,
}

impl SettingsGateway {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Read a user's settings, provider first, then locale, then options.
    pub async fn user_settings(&self, user_id: &str) -> Result<UserSettings> {
        let provider = self.provider(user_id).await?;
        let locale = self.locale(user_id).await?;
        let partial = self
            .store
            .get(&key(defaults::KEY_USER_PARTIAL_UTTERANCE, user_id))
            .await?;
        let min_length = self
            .store
            .get(&key(defaults::KEY_USER_MIN_UTTERANCE_LENGTH, user_id))
            .await?;

        Ok(UserSettings {
            provider,
            locale,
            partial_utterances: partial
                .as_deref()
                .map(|v| matches!(v.trim(), "true" | "1"))
                .unwrap_or(false),
            min_utterance_length: min_length
                .as_deref()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
        })
    }

    pub async fn provider(&self, user_id: &str) -> Result<Option<Provider>> {
        let raw = self
            .store
            .get(&key(defaults::KEY_USER_PROVIDER, user_id))
            .await?;
        Ok(raw.filter(|p| !p.trim().is_empty()).and_then(|p| {
            p.parse::<Provider>()
                .map_err(|e| tracing::warn!(user_id, error = %e, "ignoring stored provider"))
                .ok()
        }))
    }

    pub async fn locale(&self, user_id: &str) -> Result<Option<String>> {
        let raw = self
            .store
            .get(&key(defaults::KEY_USER_LOCALE, user_id))
            .await?;
        Ok(raw.filter(|l| !l.trim().is_empty()))
    }

    /// The user's stored partial-result preference, `None` when never set.
    pub async fn partial_utterances(&self, user_id: &str) -> Result<Option<bool>> {
        let raw = self
            .store
            .get(&key(defaults::KEY_USER_PARTIAL_UTTERANCE, user_id))
            .await?;
        Ok(raw.map(|v| matches!(v.trim(), "true" | "1")))
    }

    pub async fn set_provider(&self, user_id: &str, provider: &str) -> Result<()> {
        self.store
            .set(&key(defaults::KEY_USER_PROVIDER, user_id), provider)
            .await
    }

    pub async fn set_locale(&self, user_id: &str, locale: &str) -> Result<()> {
        self.store
            .set(&key(defaults::KEY_USER_LOCALE, user_id), locale)
            .await
    }

    pub async fn set_partial_utterances(&self, user_id: &str, enabled: bool) -> Result<()> {
        self.store
            .set(
                &key(defaults::KEY_USER_PARTIAL_UTTERANCE, user_id),
                if enabled { "true" } else { "false" },
            )
            .await
    }

    pub async fn set_min_utterance_length(&self, user_id: &str, length_ms: u64) -> Result<()> {
        self.store
            .set(
                &key(defaults::KEY_USER_MIN_UTTERANCE_LENGTH, user_id),
                &length_ms.to_string(),
            )
            .await
    }

    pub async fn voice_to_meeting(&self, voice_conf: &str) -> Result<Option<String>> {
        self.store
            .get(&key(defaults::KEY_VOICE_TO_MEETING, voice_conf))
            .await
    }

    pub async fn set_voice_to_meeting(&self, voice_conf: &str, meeting_id: &str) -> Result<()> {
        self.store
            .set(&key(defaults::KEY_VOICE_TO_MEETING, voice_conf), meeting_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn gateway() -> (Arc<MemoryStore>, SettingsGateway) {
        let store = Arc::new(MemoryStore::new());
        let gateway = SettingsGateway::new(store.clone());
        (store, gateway)
    }

    #[tokio::test]
    async fn test_unset_user_has_no_resolution() {
        let (_, gateway) = gateway();
        let settings = gateway.user_settings("w_1").await.unwrap();
        assert_eq!(settings, UserSettings::default());
        assert!(settings.resolve().is_none());
    }

    #[tokio::test]
    async fn test_round_trip_through_namespaced_keys() {
        let (store, gateway) = gateway();
        gateway.set_provider("w_1", "gladia").await.unwrap();
        gateway.set_locale("w_1", "pt-BR").await.unwrap();
        gateway.set_partial_utterances("w_1", true).await.unwrap();
        gateway.set_min_utterance_length("w_1", 500).await.unwrap();

        assert_eq!(
            store
                .get("bbb-transcription-manager_provider_w_1")
                .await
                .unwrap(),
            Some("gladia".to_string())
        );

        let resolved = gateway
            .user_settings("w_1")
            .await
            .unwrap()
            .resolve()
            .unwrap();
        assert_eq!(resolved.provider, Provider::Gladia);
        assert_eq!(resolved.locale, "pt-BR");
        assert!(resolved.partial_utterances);
        assert_eq!(resolved.min_utterance_length, 500);
    }

    #[tokio::test]
    async fn test_empty_locale_does_not_resolve() {
        let (_, gateway) = gateway();
        gateway.set_provider("w_1", "vosk").await.unwrap();
        gateway.set_locale("w_1", "").await.unwrap();
        let settings = gateway.user_settings("w_1").await.unwrap();
        assert_eq!(settings.provider, Some(Provider::Vosk));
        assert!(settings.resolve().is_none());
    }

    #[tokio::test]
    async fn test_unknown_provider_reads_as_unset() {
        let (_, gateway) = gateway();
        gateway.set_provider("w_1", "carrier-pigeon").await.unwrap();
        assert_eq!(gateway.provider("w_1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_partial_preference_distinguishes_unset() {
        let (_, gateway) = gateway();
        assert_eq!(gateway.partial_utterances("w_1").await.unwrap(), None);
        gateway.set_partial_utterances("w_1", false).await.unwrap();
        assert_eq!(gateway.partial_utterances("w_1").await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_voice_to_meeting_mapping() {
        let (_, gateway) = gateway();
        assert_eq!(gateway.voice_to_meeting("72013").await.unwrap(), None);
        gateway.set_voice_to_meeting("72013", "meeting-1").await.unwrap();
        assert_eq!(
            gateway.voice_to_meeting("72013").await.unwrap(),
            Some("meeting-1".to_string())
        );
    }
}
