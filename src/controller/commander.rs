//! Seam through which the controller issues audio-fork commands.

use crate::error::{ForkscribeError, Result};
use std::sync::Mutex;

/// Accepts fork start/stop commands as opaque command strings.
#[async_trait::async_trait]
pub trait ForkCommander: Send + Sync {
    async fn execute(&self, command: &str) -> Result<()>;
}

/// Build the command that starts forking a channel's audio.
pub fn start_command(
    verb: &str,
    channel_id: &str,
    server_url: &str,
    sample_rate_khz: u32,
    handshake: &serde_json::Value,
) -> String {
    format!(
        "{} {} start {} mono {}k {}",
        verb, channel_id, server_url, sample_rate_khz, handshake
    )
}

/// Build the command that stops forking a channel's audio.
pub fn stop_command(verb: &str, channel_id: &str, end_payload: &serde_json::Value) -> String {
    format!("{} {} stop {}", verb, channel_id, end_payload)
}

/// Commander that records every command instead of sending it.
pub struct RecordingCommander {
    commands: Mutex<Vec<String>>,
    should_fail: bool,
}

impl RecordingCommander {
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            should_fail: false,
        }
    }

    /// Configure the commander to reject every command (after recording it).
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Commands issued so far, oldest first.
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl Default for RecordingCommander {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ForkCommander for RecordingCommander {
    async fn execute(&self, command: &str) -> Result<()> {
        match self.commands.lock() {
            Ok(mut commands) => commands.push(command.to_string()),
            Err(poisoned) => poisoned.into_inner().push(command.to_string()),
        }
        if self.should_fail {
            return Err(ForkscribeError::ForkCommand {
                reply: "-ERR mock failure".to_string(),
            });
        }
        Ok(())
    }
}
