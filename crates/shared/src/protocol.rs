use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ChannelId, GuildId, UserId};

pub const VOICE_SERVER_UPDATE: &str = "VOICE_SERVER_UPDATE";
pub const VOICE_STATE_UPDATE: &str = "VOICE_STATE_UPDATE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalingKind {
    #[serde(rename = "VOICE_SERVER_UPDATE")]
    VoiceServerUpdate,
    #[serde(rename = "VOICE_STATE_UPDATE")]
    VoiceStateUpdate,
}

impl SignalingKind {
    pub fn tag(self) -> &'static str {
        match self {
            Self::VoiceServerUpdate => VOICE_SERVER_UPDATE,
            Self::VoiceStateUpdate => VOICE_STATE_UPDATE,
        }
    }
}

/// Voice handshake data in the shape the audio backend's voice-update handler
/// expects. `data` is the platform payload exactly as it was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalingEnvelope {
    #[serde(rename = "type")]
    pub kind: SignalingKind,
    pub data: Value,
}

/// Raw voice signaling dispatched by the chat platform's gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformVoiceEvent {
    ServerUpdate(Value),
    StateUpdate(Value),
}

impl PlatformVoiceEvent {
    pub fn payload(&self) -> &Value {
        match self {
            Self::ServerUpdate(data) | Self::StateUpdate(data) => data,
        }
    }

    pub fn guild_id(&self) -> Option<GuildId> {
        GuildId::deserialize(self.payload().get("guild_id")?).ok()
    }
}

/// Typed view over a voice-server-update payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoiceServerUpdate {
    pub guild_id: GuildId,
    pub token: String,
    /// Absent while the platform is reallocating the voice server.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl VoiceServerUpdate {
    pub fn from_payload(data: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(data)
    }
}

/// Typed view over a voice-state-update payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoiceStateUpdate {
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    pub user_id: UserId,
    pub session_id: String,
}

impl VoiceStateUpdate {
    pub fn from_payload(data: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(data)
    }
}

/// Playback lifecycle events emitted by the audio backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BackendEvent {
    #[serde(rename = "NodeReadyEvent")]
    NodeReady { label: String },
    #[serde(rename = "TrackStartEvent", rename_all = "camelCase")]
    TrackStart { guild_id: GuildId, track: String },
    #[serde(rename = "TrackEndEvent", rename_all = "camelCase")]
    TrackEnd {
        guild_id: GuildId,
        track: String,
        reason: String,
    },
    #[serde(rename = "TrackExceptionEvent", rename_all = "camelCase")]
    TrackException {
        guild_id: GuildId,
        track: String,
        message: String,
    },
    #[serde(rename = "TrackStuckEvent", rename_all = "camelCase")]
    TrackStuck {
        guild_id: GuildId,
        track: String,
        threshold_ms: u64,
    },
    #[serde(rename = "QueueEndEvent", rename_all = "camelCase")]
    QueueEnd { guild_id: GuildId },
    #[serde(other)]
    Unknown,
}

impl BackendEvent {
    /// Decodes one `{"op":"event","type":...}` frame from the backend socket.
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            Self::TrackStart { guild_id, .. }
            | Self::TrackEnd { guild_id, .. }
            | Self::TrackException { guild_id, .. }
            | Self::TrackStuck { guild_id, .. }
            | Self::QueueEnd { guild_id } => Some(*guild_id),
            Self::NodeReady { .. } | Self::Unknown => None,
        }
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
