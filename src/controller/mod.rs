//! Channel session controller.
//!
//! Owns one [`Channel`] per call leg and decides when an audio fork should
//! be running for it. Events arrive on a single mpsc queue and are handled
//! one at a time, so channel state is never touched concurrently.
//!
//! Start/stop rules:
//! * a start while the fork is running is a no-op
//! * the first stop signal on a running fork is absorbed (`StopPending`);
//!   a second stop signal, or a final transcript while pending, executes it
//! * a start signal while a stop is pending cancels the pending stop
//! * hangups stop immediately and drop the channel
//! * a settings change on a running channel stops now and starts again
//!   after the settle delay, via a `RestartDue` event posted back onto the
//!   controller's own queue

pub mod channel;
pub mod commander;
pub mod events;
pub mod filter;

pub use channel::{Channel, ChannelRegistry, ControllerStatus, ForkState};
pub use commander::{ForkCommander, RecordingCommander, start_command, stop_command};
pub use events::{ControllerEvent, SettingsChange};
pub use filter::TranscriptFilter;

use crate::codec::{
    ClassifiedFrame, TranscriptEvent, build_end_payload, build_initial_handshake,
    classify_result_frame, error_message, transcript_message,
};
use crate::config::{Config, ControllerConfig, LocaleConfig, ProvidersConfig};
use crate::error::Result;
use crate::provider::Provider;
use crate::store::{EventBus, SettingsGateway};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

pub struct ChannelController {
    config: ControllerConfig,
    providers: ProvidersConfig,
    locales: LocaleConfig,
    settings: SettingsGateway,
    bus: Arc<dyn EventBus>,
    commander: Arc<dyn ForkCommander>,
    channels: ChannelRegistry,
    filter: TranscriptFilter,
    events: mpsc::UnboundedSender<ControllerEvent>,
}

impl ChannelController {
    /// `events` must feed the queue this controller is run from; scheduled
    /// restarts are posted to it.
    pub fn new(
        config: &Config,
        settings: SettingsGateway,
        bus: Arc<dyn EventBus>,
        commander: Arc<dyn ForkCommander>,
        events: mpsc::UnboundedSender<ControllerEvent>,
    ) -> Self {
        Self {
            config: config.controller.clone(),
            providers: config.providers.clone(),
            locales: config.locales.clone(),
            settings,
            bus,
            commander,
            channels: ChannelRegistry::new(),
            filter: TranscriptFilter::new(&config.controller.ignored_partials),
            events,
        }
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn status(&self) -> ControllerStatus {
        self.channels.status()
    }

    /// Handle events until the queue closes, publishing status after each.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<ControllerEvent>,
        status: watch::Sender<ControllerStatus>,
    ) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
            status.send_replace(self.status());
        }
        tracing::debug!("controller event queue closed");
    }

    pub async fn handle(&mut self, event: ControllerEvent) {
        tracing::trace!(kind = event.kind(), "controller event");
        match event {
            ControllerEvent::ChannelAnswered {
                channel_id,
                user_id,
                call_id,
            } => {
                tracing::info!(
                    channel_id,
                    user_id,
                    call_id = call_id.as_deref().unwrap_or_default(),
                    "channel answered"
                );
                self.channels.ensure(&channel_id, &user_id);
                if self
                    .channels
                    .get(&channel_id)
                    .is_some_and(|channel| channel.restart_pending)
                {
                    tracing::debug!(channel_id, "restart scheduled, start deferred to it");
                    return;
                }
                self.start(&channel_id).await;
            }
            ControllerEvent::ChannelHangup { channel_id } => {
                tracing::info!(channel_id, "channel hangup");
                self.execute_stop(&channel_id).await;
                self.release(&channel_id);
            }
            ControllerEvent::StartTalking {
                channel_id,
                user_id,
            } => self.start_talking(&channel_id, user_id.as_deref()).await,
            ControllerEvent::StopTalking { channel_id, .. } => {
                self.stop_talking(&channel_id).await
            }
            ControllerEvent::SettingsChanged { user_id, change } => {
                self.settings_changed(&user_id, &change).await
            }
            ControllerEvent::MeetingCreated {
                voice_conf,
                meeting_id,
            } => {
                tracing::debug!(voice_conf, meeting_id, "meeting created");
                if let Err(e) = self
                    .settings
                    .set_voice_to_meeting(&voice_conf, &meeting_id)
                    .await
                {
                    tracing::warn!(voice_conf, error = %e, "failed to store meeting mapping");
                }
            }
            ControllerEvent::ResultFrame {
                channel_id,
                user_id,
                conference,
                body,
            }
            | ControllerEvent::ErrorFrame {
                channel_id,
                user_id,
                conference,
                body,
            } => {
                self.result_frame(&channel_id, user_id, conference.as_deref(), &body)
                    .await
            }
            ControllerEvent::ForkDisconnected {
                channel_id,
                user_id,
            } => {
                tracing::info!(
                    channel_id,
                    user_id = user_id.as_deref().unwrap_or_default(),
                    "audio fork connection dropped"
                );
            }
            ControllerEvent::RestartDue { channel_id } => self.restart_due(&channel_id).await,
        }
    }

    async fn start_talking(&mut self, channel_id: &str, user_id: Option<&str>) {
        if let Some(user_id) = user_id {
            self.channels.ensure(channel_id, user_id);
        }
        let Some(channel) = self.channels.get_mut(channel_id) else {
            tracing::debug!(channel_id, "start talking on unknown channel");
            return;
        };

        match (channel.fork_state, channel.restart_pending) {
            (ForkState::StopPending, _) => {
                channel.cancel_stop();
                tracing::debug!(channel_id, "pending stop cancelled");
            }
            (ForkState::Active, _) => {}
            (ForkState::Idle, true) => {
                tracing::debug!(channel_id, "restart scheduled, start deferred to it");
            }
            (ForkState::Idle, false) => self.start(channel_id).await,
        }
    }

    async fn stop_talking(&mut self, channel_id: &str) {
        let Some(channel) = self.channels.get_mut(channel_id) else {
            tracing::debug!(channel_id, "stop talking on unknown channel");
            return;
        };

        let state = channel.fork_state;
        match state {
            ForkState::Idle => {}
            ForkState::Active => {
                channel.defer_stop();
                tracing::debug!(channel_id, "stop deferred until next stop signal");
            }
            ForkState::StopPending => {
                self.execute_stop(channel_id).await;
                self.release(channel_id);
            }
        }
    }

    /// Start forking a channel's audio with the user's current settings.
    async fn start(&mut self, channel_id: &str) {
        let Some(channel) = self.channels.get(channel_id) else {
            return;
        };
        if channel.fork_state.is_running() {
            tracing::debug!(channel_id, "audio fork already running");
            return;
        }
        let user_id = channel.user_id.clone();

        let resolved = match self.settings.user_settings(&user_id).await {
            Ok(settings) => settings.resolve(),
            Err(e) => {
                tracing::warn!(channel_id, user_id, error = %e, "failed to read user settings");
                return;
            }
        };
        let Some(resolved) = resolved else {
            tracing::warn!(channel_id, user_id, "no provider or locale set, not transcribing");
            return;
        };

        let provider_config = self.providers.get(resolved.provider);
        let Some(server_url) = provider_config.server_for(&resolved.locale) else {
            tracing::warn!(
                channel_id,
                user_id,
                provider = %resolved.provider,
                locale = resolved.locale,
                "no server configured, not transcribing"
            );
            return;
        };

        let handshake = build_initial_handshake(
            &resolved,
            provider_config,
            self.config.sample_rate_khz,
            &self.locales,
        );
        let command = start_command(
            &self.config.fork_verb,
            channel_id,
            server_url,
            self.config.sample_rate_khz,
            &handshake,
        );

        tracing::info!(
            channel_id,
            user_id,
            provider = %resolved.provider,
            locale = resolved.locale,
            "starting audio fork"
        );
        if let Err(e) = self.commander.execute(&command).await {
            tracing::error!(channel_id, error = %e, "failed to start audio fork");
            return;
        }

        if let Some(channel) = self.channels.get_mut(channel_id) {
            channel.mark_active(resolved.provider);
        }
    }

    /// Stop a running fork now, bypassing the debounce.
    async fn execute_stop(&mut self, channel_id: &str) {
        let Some(channel) = self.channels.get(channel_id) else {
            return;
        };
        if !channel.fork_state.is_running() {
            return;
        }

        let provider = match channel.session_provider {
            Some(provider) => provider,
            None => {
                let user_id = channel.user_id.clone();
                self.stored_provider(&user_id).await
            }
        };
        let end_payload = build_end_payload(self.providers.get(provider));
        let command = stop_command(&self.config.fork_verb, channel_id, &end_payload);

        tracing::info!(channel_id, provider = %provider, "stopping audio fork");
        if let Err(e) = self.commander.execute(&command).await {
            tracing::error!(channel_id, error = %e, "failed to stop audio fork, channel may be gone");
        }

        if let Some(channel) = self.channels.get_mut(channel_id) {
            channel.mark_idle();
        }
    }

    fn release(&mut self, channel_id: &str) {
        if self.channels.remove(channel_id).is_some() {
            tracing::debug!(channel_id, "channel released");
        }
        self.filter.forget(channel_id);
    }

    async fn settings_changed(&mut self, user_id: &str, change: &SettingsChange) {
        if let Err(e) = self.write_settings(user_id, change).await {
            tracing::warn!(user_id, error = %e, "failed to store settings change");
            return;
        }

        let Some(channel_id) = self.channels.channel_for_user(user_id).map(str::to_string)
        else {
            return;
        };
        self.restart(&channel_id).await;
    }

    async fn write_settings(&self, user_id: &str, change: &SettingsChange) -> Result<()> {
        match change {
            SettingsChange::Locale { provider, locale } => {
                tracing::info!(user_id, provider, locale, "speech locale changed");
                self.settings.set_provider(user_id, provider).await?;
                self.settings.set_locale(user_id, locale).await
            }
            SettingsChange::Options {
                partial_utterances,
                min_utterance_length,
            } => {
                tracing::info!(
                    user_id,
                    partial_utterances,
                    min_utterance_length,
                    "speech options changed"
                );
                self.settings
                    .set_partial_utterances(user_id, *partial_utterances)
                    .await?;
                self.settings
                    .set_min_utterance_length(user_id, *min_utterance_length)
                    .await
            }
        }
    }

    /// Stop a running channel and schedule its replacement start.
    async fn restart(&mut self, channel_id: &str) {
        let Some(channel) = self.channels.get(channel_id) else {
            return;
        };
        if channel.restart_pending {
            tracing::debug!(channel_id, "restart already scheduled");
            return;
        }
        if !channel.fork_state.is_running() {
            return;
        }

        self.execute_stop(channel_id).await;
        if let Some(channel) = self.channels.get_mut(channel_id) {
            channel.restart_pending = true;
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.settle_delay_ms);
        let events = self.events.clone();
        let channel_id = channel_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if events
                .send(ControllerEvent::RestartDue { channel_id })
                .is_err()
            {
                tracing::trace!("controller gone before restart");
            }
        });
    }

    async fn restart_due(&mut self, channel_id: &str) {
        let Some(channel) = self.channels.get_mut(channel_id) else {
            tracing::debug!(channel_id, "channel gone before restart");
            return;
        };
        if !channel.restart_pending {
            return;
        }
        channel.restart_pending = false;
        self.start(channel_id).await;
    }

    async fn result_frame(
        &mut self,
        channel_id: &str,
        user_id: Option<String>,
        conference: Option<&str>,
        body: &str,
    ) {
        let channel = self.channels.get(channel_id);
        let Some(user_id) = user_id.or_else(|| channel.map(|c| c.user_id.clone())) else {
            tracing::debug!(channel_id, "result frame without user, dropped");
            return;
        };
        let provider = match channel.and_then(|c| c.session_provider) {
            Some(provider) => provider,
            None => self.stored_provider(&user_id).await,
        };

        let frame = classify_result_frame(provider, body);
        if frame == ClassifiedFrame::Ignored {
            tracing::trace!(channel_id, "result frame ignored");
            return;
        }

        let meeting_id = match conference {
            Some(conference) => self
                .settings
                .voice_to_meeting(conference)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(conference, error = %e, "failed to read meeting mapping");
                    None
                }),
            None => None,
        };

        let (fields, is_final) = match frame {
            ClassifiedFrame::Error { code, message } => {
                tracing::error!(channel_id, user_id, code, message, "transcription error");
                self.publish(error_message(
                    meeting_id.as_deref(),
                    &user_id,
                    code,
                    &message,
                    now_ms(),
                ))
                .await;
                return;
            }
            ClassifiedFrame::Final(fields) => (fields, true),
            ClassifiedFrame::Partial(fields) => (fields, false),
            ClassifiedFrame::Ignored => return,
        };

        if !is_final && !self.partials_enabled(&user_id).await {
            tracing::debug!(channel_id, partial = fields.text, "partial results disabled, discarded");
            return;
        }
        if !self.filter.admit(channel_id, &fields.text, is_final) {
            tracing::trace!(channel_id, partial = fields.text, "repeated partial dropped");
            return;
        }

        let locale = match fields.locale {
            Some(locale) => locale,
            None => self
                .settings
                .locale(&user_id)
                .await
                .ok()
                .flatten()
                .unwrap_or_default(),
        };
        if is_final {
            tracing::info!(channel_id, user_id, text = fields.text, "final transcript");
        }

        let event = TranscriptEvent {
            meeting_id,
            user_id,
            locale,
            text: fields.text,
            is_final,
            start_ms: fields.start_ms,
            end_ms: fields.end_ms,
        };
        self.publish(transcript_message(&event, now_ms())).await;

        let stop_pending = self
            .channels
            .get(channel_id)
            .is_some_and(|c| c.fork_state == ForkState::StopPending);
        if is_final && self.config.stop_on_final && stop_pending {
            tracing::debug!(channel_id, "final transcript completes pending stop");
            self.execute_stop(channel_id).await;
            self.release(channel_id);
        }
    }

    /// Partials pass only when enabled globally and not turned off by the user.
    async fn partials_enabled(&self, user_id: &str) -> bool {
        if !self.config.include_partial_results {
            return false;
        }
        match self.settings.partial_utterances(user_id).await {
            Ok(preference) => preference.unwrap_or(true),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "failed to read partial-result preference");
                true
            }
        }
    }

    async fn stored_provider(&self, user_id: &str) -> Provider {
        match self.settings.provider(user_id).await {
            Ok(Some(provider)) => provider,
            Ok(None) => self.config.default_provider,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "failed to read provider");
                self.config.default_provider
            }
        }
    }

    async fn publish(&self, message: serde_json::Value) {
        if let Err(e) = self
            .bus
            .publish(&self.config.publish_channel, message)
            .await
        {
            tracing::error!(error = %e, "failed to publish message");
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
