//! forkscribe - telephony audio-fork to streaming speech-recognition bridge
//!
//! Two processes share this crate: the channel session controller, which
//! starts and stops audio forks on call events and publishes transcripts,
//! and the provider proxy bridge, which relays each fork stream to a
//! provider's real-time API.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod bridge;
#[cfg(feature = "cli")]
pub mod cli;
pub mod codec;
pub mod config;
pub mod controller;
pub mod daemon;
pub mod defaults;
pub mod error;
pub mod esl;
pub mod ipc;
pub mod logging;
pub mod provider;
pub mod store;

// Controller
pub use controller::{ChannelController, ControllerEvent, ControllerStatus, ForkCommander};

// Bridge
pub use bridge::{ProxySession, SessionParams};

// External collaborator seams
pub use store::{EventBus, MemoryStore, SettingsGateway, SettingsStore};

// Error handling
pub use error::{ForkscribeError, Result};

// Config
pub use config::Config;
pub use provider::Provider;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_has_hash_only_when_built_from_git() {
        let ver = version_string();
        match option_env!("GIT_HASH") {
            Some(hash) if !hash.is_empty() => assert_eq!(ver.split('+').nth(1), Some(hash)),
            _ => assert_eq!(ver, env!("CARGO_PKG_VERSION")),
        }
    }
}
