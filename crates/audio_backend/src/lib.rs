use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{ChannelId, GuildId, UserId},
    protocol::{BackendEvent, SignalingEnvelope},
};
use tokio::sync::broadcast;

mod memory;

pub use memory::{MemoryBackend, MemoryConnector, MemoryPlayer};

/// Connection details for one audio node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub region: String,
    pub label: String,
}

/// Per-guild player held by the backend.
pub trait BackendPlayer: Send + Sync {
    fn guild_id(&self) -> GuildId;
    fn channel_id(&self) -> Option<ChannelId>;
    fn set_channel_id(&self, channel_id: Option<ChannelId>);
    /// Live connectivity as the backend sees it; never cached by callers.
    fn is_connected(&self) -> bool;
}

#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Platform user id the backend client was created for.
    fn user_id(&self) -> UserId;
    async fn add_node(&self, node: NodeConfig) -> anyhow::Result<()>;
    fn nodes(&self) -> Vec<NodeConfig>;
    async fn voice_update(&self, envelope: SignalingEnvelope) -> anyhow::Result<()>;
    /// Returns the existing player for `guild_id` or creates one.
    async fn create_player(&self, guild_id: GuildId) -> anyhow::Result<Arc<dyn BackendPlayer>>;
    async fn get_player(&self, guild_id: GuildId)
        -> anyhow::Result<Option<Arc<dyn BackendPlayer>>>;
    async fn destroy_player(&self, guild_id: GuildId) -> anyhow::Result<bool>;
    fn subscribe_events(&self) -> broadcast::Receiver<BackendEvent>;
    async fn shutdown(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait AudioBackendConnector: Send + Sync {
    async fn connect(&self, user_id: UserId) -> anyhow::Result<Arc<dyn AudioBackend>>;
}

pub struct MissingAudioBackendConnector;

#[async_trait]
impl AudioBackendConnector for MissingAudioBackendConnector {
    async fn connect(&self, _user_id: UserId) -> anyhow::Result<Arc<dyn AudioBackend>> {
        Err(anyhow!("audio backend connector is unavailable"))
    }
}

#[cfg(test)]
#[path = "tests/memory_tests.rs"]
mod tests;
