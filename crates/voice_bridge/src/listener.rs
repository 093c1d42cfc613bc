//! Reacts to playback lifecycle events coming from the audio backend.

use std::sync::{Arc, Weak};

use shared::protocol::BackendEvent;
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    StreamExt,
};
use tracing::{debug, error, info, warn};

use crate::controller::VoiceController;

/// Consumes the backend event stream on a dedicated task. The task holds the
/// controller weakly and ends when either the controller or the stream goes
/// away.
pub(crate) fn spawn(
    controller: Weak<VoiceController>,
    events: broadcast::Receiver<BackendEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = BroadcastStream::new(events);
        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "voice: playback listener lagged behind backend events");
                    continue;
                }
            };
            let Some(controller) = controller.upgrade() else {
                break;
            };
            dispatch(controller, event);
        }
        debug!("voice: playback listener stopped");
    })
}

fn dispatch(controller: Arc<VoiceController>, event: BackendEvent) {
    match event {
        BackendEvent::QueueEnd { guild_id } => {
            // Leaving runs on its own task so event dispatch never waits on
            // the platform.
            tokio::spawn(async move {
                // The player can still be in voice after the room gave up on
                // it, e.g. a confirmation that arrived after a join timeout.
                let player_connected = matches!(
                    controller.registry().lookup(guild_id).await,
                    Ok(Some(session)) if session.player.is_connected()
                );
                if !player_connected && !controller.is_active(guild_id).await {
                    debug!(%guild_id, "voice: queue ended with no active connection");
                    return;
                }
                match controller.disconnect(guild_id, true).await {
                    Ok(_) => info!(%guild_id, "voice: queue ended, left voice channel"),
                    Err(error) => {
                        error!(%guild_id, %error, "voice: failed to leave after queue end")
                    }
                }
            });
        }
        BackendEvent::NodeReady { label } => info!(%label, "voice: node is ready"),
        BackendEvent::TrackException {
            guild_id, message, ..
        } => warn!(%guild_id, %message, "voice: track failed"),
        BackendEvent::Unknown => debug!("voice: ignoring unrecognized backend event"),
        other => debug!(?other, "voice: playback event"),
    }
}

#[cfg(test)]
#[path = "tests/listener_tests.rs"]
mod tests;
