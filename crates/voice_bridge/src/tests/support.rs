use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use audio_backend::{MemoryBackend, MemoryConnector, NodeConfig};
use serde_json::json;
use shared::{
    domain::{ChannelId, GuildId, UserId},
    protocol::PlatformVoiceEvent,
};

use crate::controller::{BridgeConfig, ConnectionState, VoiceController, VoicePlatform};

pub(crate) const BOT: UserId = UserId(4242);

#[derive(Default)]
pub(crate) struct RecordingPlatform {
    calls: parking_lot::Mutex<Vec<(GuildId, Option<ChannelId>)>>,
    fail: AtomicBool,
}

impl RecordingPlatform {
    pub(crate) fn calls(&self) -> Vec<(GuildId, Option<ChannelId>)> {
        self.calls.lock().clone()
    }

    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoicePlatform for RecordingPlatform {
    async fn change_voice_state(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
    ) -> anyhow::Result<()> {
        self.calls.lock().push((guild_id, channel_id));
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("gateway connection closed"));
        }
        Ok(())
    }
}

pub(crate) struct Harness {
    pub(crate) controller: Arc<VoiceController>,
    pub(crate) platform: Arc<RecordingPlatform>,
    pub(crate) connector: Arc<MemoryConnector>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let platform = Arc::new(RecordingPlatform::default());
        let connector = Arc::new(MemoryConnector::new());
        let controller = VoiceController::new(config(), platform.clone(), connector.clone());
        Self {
            controller,
            platform,
            connector,
        }
    }

    pub(crate) fn backend(&self) -> Arc<MemoryBackend> {
        self.connector.last_backend().expect("backend created")
    }

    /// Delivers the platform's confirmation for the bot joining `channel`.
    pub(crate) async fn confirm_join(&self, guild: u64, channel: u64) {
        self.controller
            .relay(own_state(guild, Some(channel)))
            .await
            .expect("relay state");
        self.controller
            .relay(server_update(guild))
            .await
            .expect("relay server");
    }
}

pub(crate) fn config() -> BridgeConfig {
    BridgeConfig {
        user_id: BOT,
        node: NodeConfig {
            host: "localhost".into(),
            port: 2333,
            password: "test".into(),
            region: "us".into(),
            label: "default-node".into(),
        },
        join_timeout: Duration::from_millis(200),
    }
}

pub(crate) fn state_update(guild: u64, channel: Option<u64>, user: UserId) -> PlatformVoiceEvent {
    PlatformVoiceEvent::StateUpdate(json!({
        "guild_id": guild.to_string(),
        "channel_id": channel.map(|c| c.to_string()),
        "user_id": user.to_string(),
        "session_id": "0d2b9e4b7a1f4c6e",
        "self_deaf": false,
        "self_mute": false
    }))
}

pub(crate) fn own_state(guild: u64, channel: Option<u64>) -> PlatformVoiceEvent {
    state_update(guild, channel, BOT)
}

pub(crate) fn server_update(guild: u64) -> PlatformVoiceEvent {
    PlatformVoiceEvent::ServerUpdate(json!({
        "guild_id": guild.to_string(),
        "token": "a1b2c3",
        "endpoint": "us-east42.voice.example:443"
    }))
}

pub(crate) async fn wait_for_state(
    controller: &VoiceController,
    guild_id: GuildId,
    expected: ConnectionState,
) {
    let mut state = controller.watch_state(guild_id).await;
    tokio::time::timeout(Duration::from_secs(1), state.wait_for(|s| *s == expected))
        .await
        .expect("state change timeout")
        .expect("state channel open");
}
