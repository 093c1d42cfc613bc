use async_trait::async_trait;
use serde_json::json;
use shared::{
    domain::{ChannelId, GuildId, UserId},
    protocol::PlatformVoiceEvent,
};
use tokio::sync::mpsc;
use tracing::debug;
use voice_bridge::VoicePlatform;

/// Stands in for the chat gateway: a join request is answered with the
/// voice-state and voice-server dispatches the platform would send back.
/// Leaves are not echoed, as the platform does not reliably confirm them.
pub struct LoopbackPlatform {
    user_id: UserId,
    gateway: mpsc::UnboundedSender<PlatformVoiceEvent>,
}

impl LoopbackPlatform {
    pub fn new(user_id: UserId, gateway: mpsc::UnboundedSender<PlatformVoiceEvent>) -> Self {
        Self { user_id, gateway }
    }
}

#[async_trait]
impl VoicePlatform for LoopbackPlatform {
    async fn change_voice_state(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
    ) -> anyhow::Result<()> {
        debug!(%guild_id, ?channel_id, "loopback: voice state change requested");
        let Some(channel_id) = channel_id else {
            return Ok(());
        };

        self.gateway.send(PlatformVoiceEvent::StateUpdate(json!({
            "guild_id": guild_id.to_string(),
            "channel_id": channel_id.to_string(),
            "user_id": self.user_id.to_string(),
            "session_id": format!("loopback-{guild_id}"),
            "self_deaf": true,
            "self_mute": false,
        })))?;
        self.gateway.send(PlatformVoiceEvent::ServerUpdate(json!({
            "guild_id": guild_id.to_string(),
            "token": format!("loopback-token-{channel_id}"),
            "endpoint": "loopback.voice.invalid:443",
        })))?;
        Ok(())
    }
}
