use std::time::Duration;

use shared::{
    domain::{ChannelId, GuildId},
    error::{ErrorCategory, UserFacingError},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoiceBridgeError {
    #[error("caller is not in a voice channel")]
    NotInVoiceChannel,
    #[error("not connected to a voice channel in guild {0}")]
    NotConnected(GuildId),
    #[error("audio backend call failed: {source}")]
    Backend { source: anyhow::Error },
    #[error("platform voice request for guild {guild_id} failed: {source}")]
    Platform {
        guild_id: GuildId,
        source: anyhow::Error,
    },
    #[error("join of channel {channel_id} in guild {guild_id} not confirmed within {timeout:?}")]
    JoinTimeout {
        guild_id: GuildId,
        channel_id: ChannelId,
        timeout: Duration,
    },
    #[error("voice connection for guild {0} was dropped before it was confirmed")]
    ConnectionDropped(GuildId),
}

impl VoiceBridgeError {
    pub fn backend(source: anyhow::Error) -> Self {
        Self::Backend { source }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotInVoiceChannel | Self::NotConnected(_) => ErrorCategory::UserInput,
            Self::Backend { .. }
            | Self::Platform { .. }
            | Self::JoinTimeout { .. }
            | Self::ConnectionDropped(_) => ErrorCategory::Connectivity,
        }
    }

    pub fn is_user_input(&self) -> bool {
        self.category() == ErrorCategory::UserInput
    }

    pub fn to_user_facing(&self) -> UserFacingError {
        let message = match self {
            Self::NotInVoiceChannel => "Join a voice channel first, then try again.".to_string(),
            Self::NotConnected(_) => "I'm not connected to a voice channel here.".to_string(),
            Self::JoinTimeout { .. } | Self::ConnectionDropped(_) => {
                "Couldn't connect to the voice channel, please try again.".to_string()
            }
            Self::Backend { .. } | Self::Platform { .. } => {
                "Voice is unavailable right now, please try again later.".to_string()
            }
        };
        UserFacingError::new(self.category(), message)
    }
}
