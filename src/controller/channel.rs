//! Per-call-leg records and the registry that owns them.

use crate::provider::Provider;
use serde::Serialize;
use std::collections::HashMap;

/// Whether an audio fork is running for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForkState {
    Idle,
    Active,
    /// Fork still running; one stop signal has been absorbed.
    StopPending,
}

impl ForkState {
    /// True while a fork session is running, pending stop included.
    pub fn is_running(self) -> bool {
        !matches!(self, ForkState::Idle)
    }
}

/// One call leg.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub channel_id: String,
    pub user_id: String,
    pub fork_state: ForkState,
    pub stop_debounce: bool,
    /// A restart stop was issued and the replacement start is scheduled.
    pub restart_pending: bool,
    /// Provider the running session was started with.
    pub session_provider: Option<Provider>,
}

impl Channel {
    pub fn new(channel_id: &str, user_id: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            fork_state: ForkState::Idle,
            stop_debounce: false,
            restart_pending: false,
            session_provider: None,
        }
    }

    pub fn mark_active(&mut self, provider: Provider) {
        self.fork_state = ForkState::Active;
        self.stop_debounce = false;
        self.session_provider = Some(provider);
    }

    pub fn mark_idle(&mut self) {
        self.fork_state = ForkState::Idle;
        self.stop_debounce = false;
        self.session_provider = None;
    }

    /// Absorb a first stop signal.
    pub fn defer_stop(&mut self) {
        self.fork_state = ForkState::StopPending;
        self.stop_debounce = true;
    }

    /// Cancel an absorbed stop; the session keeps running.
    pub fn cancel_stop(&mut self) {
        self.fork_state = ForkState::Active;
        self.stop_debounce = false;
    }
}

/// Counts reported over the control socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
    pub channels: usize,
    pub active: usize,
    pub stop_pending: usize,
    pub restart_pending: usize,
}

/// Channels keyed by id, plus the user → channel lookup used by settings
/// changes.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, Channel>,
    by_user: HashMap<String, String>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel_id: &str) -> Option<&Channel> {
        self.channels.get(channel_id)
    }

    pub fn get_mut(&mut self, channel_id: &str) -> Option<&mut Channel> {
        self.channels.get_mut(channel_id)
    }

    /// Fetch a channel, creating it on first sight. A known channel is
    /// re-associated with `user_id` when the caller identity changed.
    pub fn ensure(&mut self, channel_id: &str, user_id: &str) -> &mut Channel {
        if let Some(previous) = self
            .channels
            .get(channel_id)
            .map(|c| c.user_id.clone())
            .filter(|previous| previous != user_id)
        {
            self.unlink_user(&previous, channel_id);
        }
        self.by_user
            .insert(user_id.to_string(), channel_id.to_string());

        let channel = self
            .channels
            .entry(channel_id.to_string())
            .or_insert_with(|| Channel::new(channel_id, user_id));
        channel.user_id = user_id.to_string();
        channel
    }

    pub fn remove(&mut self, channel_id: &str) -> Option<Channel> {
        let channel = self.channels.remove(channel_id)?;
        self.unlink_user(&channel.user_id, channel_id);
        Some(channel)
    }

    /// Channel currently carrying a user's audio.
    pub fn channel_for_user(&self, user_id: &str) -> Option<&str> {
        self.by_user.get(user_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn status(&self) -> ControllerStatus {
        let mut status = ControllerStatus {
            channels: self.channels.len(),
            ..ControllerStatus::default()
        };
        for channel in self.channels.values() {
            match channel.fork_state {
                ForkState::Active => status.active += 1,
                ForkState::StopPending => status.stop_pending += 1,
                ForkState::Idle => {}
            }
            if channel.restart_pending {
                status.restart_pending += 1;
            }
        }
        status
    }

    fn unlink_user(&mut self, user_id: &str, channel_id: &str) {
        if self.by_user.get(user_id).is_some_and(|c| c == channel_id) {
            self.by_user.remove(user_id);
        }
    }
}
