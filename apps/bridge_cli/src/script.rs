//! JSON-lines replay of gateway dispatches, commands and backend frames.

use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use audio_backend::{MemoryBackend, MemoryConnector};
use serde::Deserialize;
use serde_json::Value;
use shared::{
    domain::{ChannelId, GuildId},
    protocol::{BackendEvent, PlatformVoiceEvent},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};
use voice_bridge::{
    commands::{self, CommandContext},
    BridgeConfig, VoiceController,
};

use crate::platform::LoopbackPlatform;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    VoiceServerUpdate {
        d: Value,
    },
    VoiceStateUpdate {
        d: Value,
    },
    Join {
        guild_id: GuildId,
        #[serde(default)]
        channel_id: Option<ChannelId>,
    },
    Leave {
        guild_id: GuildId,
    },
    QueueEnd {
        guild_id: GuildId,
    },
    BackendFrame {
        frame: String,
    },
    Status {
        guild_id: GuildId,
    },
    Sleep {
        ms: u64,
    },
}

pub struct Runner {
    controller: Arc<VoiceController>,
    connector: Arc<MemoryConnector>,
    gateway: mpsc::UnboundedSender<PlatformVoiceEvent>,
    pump: JoinHandle<()>,
}

impl Runner {
    /// Wires the controller to the in-memory backend and a loopback gateway,
    /// and starts the task relaying gateway dispatches in arrival order.
    pub async fn start(config: BridgeConfig) -> anyhow::Result<Self> {
        let (gateway, mut dispatches) = mpsc::unbounded_channel();
        let connector = Arc::new(MemoryConnector::new());
        let platform = Arc::new(LoopbackPlatform::new(config.user_id, gateway.clone()));
        let controller = VoiceController::new(config, platform, connector.clone());
        controller.start().await?;

        let pump = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                while let Some(event) = dispatches.recv().await {
                    if let Err(error) = controller.relay(event).await {
                        warn!(%error, "voice: failed to relay gateway event");
                    }
                }
            })
        };

        Ok(Self {
            controller,
            connector,
            gateway,
            pump,
        })
    }

    fn backend(&self) -> anyhow::Result<Arc<MemoryBackend>> {
        self.connector
            .last_backend()
            .ok_or_else(|| anyhow!("audio backend has not been created"))
    }

    pub async fn run(&self, step: ScriptStep) -> anyhow::Result<String> {
        let output = match step {
            ScriptStep::VoiceServerUpdate { d } => {
                self.gateway.send(PlatformVoiceEvent::ServerUpdate(d))?;
                "voice_server_update queued".to_string()
            }
            ScriptStep::VoiceStateUpdate { d } => {
                self.gateway.send(PlatformVoiceEvent::StateUpdate(d))?;
                "voice_state_update queued".to_string()
            }
            ScriptStep::Join {
                guild_id,
                channel_id,
            } => {
                let ctx = CommandContext {
                    guild_id,
                    author_voice_channel: channel_id,
                };
                match commands::join(&self.controller, ctx).await {
                    Ok(session) => match session.channel_id {
                        Some(channel_id) => {
                            format!("join guild={guild_id} -> connected channel={channel_id}")
                        }
                        None => format!("join guild={guild_id} -> connected"),
                    },
                    Err(error) => {
                        let reply = commands::report_failure(guild_id, &error);
                        format!("join guild={guild_id} -> {:?}: {}", reply.category, reply.message)
                    }
                }
            }
            ScriptStep::Leave { guild_id } => {
                match commands::leave(&self.controller, guild_id).await {
                    Ok(()) => format!("leave guild={guild_id} -> disconnected"),
                    Err(error) => {
                        let reply = commands::report_failure(guild_id, &error);
                        format!("leave guild={guild_id} -> {:?}: {}", reply.category, reply.message)
                    }
                }
            }
            ScriptStep::QueueEnd { guild_id } => {
                self.backend()?.finish_queue(guild_id)?;
                format!("queue_end guild={guild_id} emitted")
            }
            ScriptStep::BackendFrame { frame } => match BackendEvent::decode(&frame) {
                Ok(event) => {
                    let receivers = self.backend()?.emit(event);
                    format!("backend frame delivered to {receivers} listener(s)")
                }
                Err(error) => {
                    debug!(%error, "voice: ignoring malformed backend frame");
                    "backend frame ignored".to_string()
                }
            },
            ScriptStep::Status { guild_id } => match self.controller.room_session(guild_id).await {
                Some(session) => format!(
                    "status guild={guild_id} state={:?} channel={} connected={}",
                    session.state,
                    session
                        .channel_id
                        .map(|channel_id| channel_id.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    session.connected
                ),
                None => format!("status guild={guild_id} state=Unknown"),
            },
            ScriptStep::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                format!("slept {ms}ms")
            }
        };
        Ok(output)
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.controller.shutdown().await?;
        self.pump.abort();
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/script_tests.rs"]
mod tests;
