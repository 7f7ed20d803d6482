//! Settings store and event bus seams.
//!
//! The controller only ever talks to these traits; the process wires in a
//! concrete implementation at startup and hands the same handle to every
//! component that needs it.

pub mod memory;
pub mod settings;

pub use memory::MemoryStore;
pub use settings::{ResolvedSettings, SettingsGateway, UserSettings};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Async key/value store holding per-user speech settings.
#[async_trait::async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read a key; `None` when it was never written.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a key, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// A message as it went out on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedMessage {
    pub channel: String,
    pub message: serde_json::Value,
}

/// Publish/subscribe side of the platform event bus.
#[async_trait::async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a message on a channel.
    async fn publish(&self, channel: &str, message: serde_json::Value) -> Result<()>;

    /// Receive every message published from now on.
    fn subscribe(&self) -> broadcast::Receiver<PublishedMessage>;
}
