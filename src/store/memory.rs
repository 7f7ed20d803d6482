//! In-process settings store and event bus.

use crate::error::Result;
use crate::store::{EventBus, PublishedMessage, SettingsStore};
use std::collections::HashMap;
use tokio::sync::{Mutex, broadcast};

const BUS_CAPACITY: usize = 256;

/// Settings store and bus kept in memory for the lifetime of the process.
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    bus: broadcast::Sender<PublishedMessage>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            values: Mutex::new(HashMap::new()),
            bus,
        }
    }

    /// Number of keys currently stored.
    pub async fn len(&self) -> usize {
        self.values.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.lock().await.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SettingsStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventBus for MemoryStore {
    async fn publish(&self, channel: &str, message: serde_json::Value) -> Result<()> {
        let published = PublishedMessage {
            channel: channel.to_string(),
            message,
        };
        if self.bus.send(published).is_err() {
            tracing::trace!(channel, "no bus subscribers, message dropped");
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PublishedMessage> {
        self.bus.subscribe()
    }
}
