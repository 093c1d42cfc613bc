//! `join` / `leave` command handlers and how their failures reach the user.

use std::sync::Arc;

use shared::{
    domain::{ChannelId, GuildId},
    error::UserFacingError,
};
use tracing::{debug, warn};

use crate::{
    controller::{ConnectionState, RoomSession, VoiceController},
    error::VoiceBridgeError,
};

/// What the command layer knows about an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    pub guild_id: GuildId,
    /// Voice channel the invoking user currently sits in.
    pub author_voice_channel: Option<ChannelId>,
}

/// Joins the invoking user's voice channel and waits for the platform to
/// confirm it.
pub async fn join(
    controller: &Arc<VoiceController>,
    ctx: CommandContext,
) -> Result<RoomSession, VoiceBridgeError> {
    let Some(channel_id) = ctx.author_voice_channel else {
        return Err(VoiceBridgeError::NotInVoiceChannel);
    };

    let state = controller.connect(ctx.guild_id, channel_id).await?;
    if state == ConnectionState::Connected {
        if let Some(session) = controller.room_session(ctx.guild_id).await {
            return Ok(session);
        }
    }

    let timeout = controller.config().join_timeout;
    controller.wait_until_connected(ctx.guild_id, timeout).await
}

pub async fn leave(controller: &VoiceController, guild_id: GuildId) -> Result<(), VoiceBridgeError> {
    if !controller.is_active(guild_id).await {
        return Err(VoiceBridgeError::NotConnected(guild_id));
    }
    controller.disconnect(guild_id, true).await?;
    Ok(())
}

/// Turns a failed command into the reply shown to the user. User mistakes
/// are not faults and stay out of the warning log.
pub fn report_failure(guild_id: GuildId, error: &VoiceBridgeError) -> UserFacingError {
    if error.is_user_input() {
        debug!(%guild_id, %error, "voice: command rejected");
    } else {
        warn!(%guild_id, %error, "voice: command failed");
    }
    error.to_user_facing()
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
