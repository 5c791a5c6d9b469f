//! CHANNEL STORE - Publish/subscribe store of named message channels
//!
//! ROLE: every piece of state the processor reads or writes lives in the
//! channels of one device (agent): the relayed uplink snapshots, the operator
//! commands, the ui state, alerts and activity logs. The processor itself
//! keeps nothing between invocations.
//!
//! READ MODES:
//! - aggregate: latest value published on a channel
//! - window: every message published within `[start, end)`, in publish order
//!
//! `MemoryChannelStore` is the in-process implementation used by tests and
//! the devkit harness; `PlatformChannelStore` (see `platform`) talks to the
//! channel platform over HTTP.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("channel '{channel}' answered HTTP {status}")]
    Status { channel: String, status: u16 },
    #[error("invalid response from channel '{channel}': {reason}")]
    Decode { channel: String, reason: String },
}

/// Channels of a single device.
pub trait ChannelStore {
    fn publish(&self, channel: &str, document: &Value) -> impl Future<Output = Result<(), ChannelError>> + Send;

    fn get_aggregate(&self, channel: &str) -> impl Future<Output = Result<Option<Value>, ChannelError>> + Send;

    fn get_messages_in_window(
        &self,
        channel: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ChannelMessage>, ChannelError>> + Send;
}

/// In-memory channels, cheap to clone (shared storage).
#[derive(Debug, Clone, Default)]
pub struct MemoryChannelStore {
    channels: Arc<Mutex<HashMap<String, Vec<ChannelMessage>>>>,
}

impl MemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a message at an explicit publish time, keeping publish order.
    pub fn insert(&self, channel: &str, timestamp: DateTime<Utc>, payload: Value) {
        let mut channels = self.channels.lock();
        let messages = channels.entry(channel.to_string()).or_default();
        let position = messages.partition_point(|m| m.timestamp <= timestamp);
        messages.insert(position, ChannelMessage { timestamp, payload });
    }

    pub fn messages(&self, channel: &str) -> Vec<ChannelMessage> {
        self.channels.lock().get(channel).cloned().unwrap_or_default()
    }

    pub fn latest(&self, channel: &str) -> Option<Value> {
        self.channels
            .lock()
            .get(channel)
            .and_then(|messages| messages.last())
            .map(|m| m.payload.clone())
    }

    pub fn clear(&self) {
        self.channels.lock().clear();
    }
}

impl ChannelStore for MemoryChannelStore {
    async fn publish(&self, channel: &str, document: &Value) -> Result<(), ChannelError> {
        self.insert(channel, Utc::now(), document.clone());
        Ok(())
    }

    async fn get_aggregate(&self, channel: &str) -> Result<Option<Value>, ChannelError> {
        Ok(self.latest(channel))
    }

    async fn get_messages_in_window(
        &self,
        channel: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ChannelMessage>, ChannelError> {
        Ok(self
            .messages(channel)
            .into_iter()
            .filter(|m| m.timestamp >= start && m.timestamp < end)
            .collect())
    }
}
