//! Per-guild voice connection state machine.
//!
//! `connect` marks a guild `Connecting` as soon as the platform join request is
//! issued. The backend player's own connectivity flag is the ground truth: the
//! guild only settles to `Connected` after a relayed voice-state update makes
//! the player report the requested channel. Every operation on a guild runs
//! under that guild's lock, from the platform request until the resulting state
//! is recorded. Guilds never wait on each other.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use audio_backend::{AudioBackend, AudioBackendConnector, NodeConfig};
use shared::{
    domain::{ChannelId, GuildId, UserId},
    protocol::{PlatformVoiceEvent, VoiceStateUpdate},
};
use tokio::{
    sync::{watch, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    error::VoiceBridgeError,
    listener,
    registry::{SessionHandle, SessionRegistry},
    translator,
};

/// Platform-side voice API the controller drives.
#[async_trait]
pub trait VoicePlatform: Send + Sync {
    /// Asks the platform to move the bot into `channel_id`, or out of voice
    /// entirely when `None`.
    async fn change_voice_state(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub user_id: UserId,
    pub node: NodeConfig,
    pub join_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSession {
    pub guild_id: GuildId,
    pub channel_id: Option<ChannelId>,
    pub state: ConnectionState,
    /// Queried from the backend player at snapshot time.
    pub connected: bool,
}

#[derive(Default)]
struct RoomEntry {
    channel_id: Option<ChannelId>,
    requested_at: Option<Instant>,
}

struct Room {
    entry: Mutex<RoomEntry>,
    state: watch::Sender<ConnectionState>,
}

impl Room {
    fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            entry: Mutex::new(RoomEntry::default()),
            state,
        }
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

pub struct VoiceController {
    config: BridgeConfig,
    platform: Arc<dyn VoicePlatform>,
    registry: SessionRegistry,
    rooms: RwLock<HashMap<GuildId, Arc<Room>>>,
    listener: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl VoiceController {
    pub fn new(
        config: BridgeConfig,
        platform: Arc<dyn VoicePlatform>,
        connector: Arc<dyn AudioBackendConnector>,
    ) -> Arc<Self> {
        let registry = SessionRegistry::new(connector, config.node.clone());
        Arc::new(Self {
            config,
            platform,
            registry,
            rooms: RwLock::new(HashMap::new()),
            listener: parking_lot::Mutex::new(None),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Creates the backend client and starts the playback listener ahead of
    /// the first join.
    pub async fn start(self: &Arc<Self>) -> Result<(), VoiceBridgeError> {
        self.ensure_backend().await.map(|_| ())
    }

    async fn ensure_backend(self: &Arc<Self>) -> Result<Arc<dyn AudioBackend>, VoiceBridgeError> {
        let backend = self.registry.backend(self.config.user_id).await?;
        if let Some(events) = self.registry.take_event_receiver() {
            let handle = listener::spawn(Arc::downgrade(self), events);
            *self.listener.lock() = Some(handle);
        }
        Ok(backend)
    }

    async fn room(&self, guild_id: GuildId) -> Arc<Room> {
        if let Some(room) = self.rooms.read().await.get(&guild_id) {
            return Arc::clone(room);
        }
        let mut rooms = self.rooms.write().await;
        Arc::clone(rooms.entry(guild_id).or_insert_with(|| Arc::new(Room::new())))
    }

    async fn existing_room(&self, guild_id: GuildId) -> Option<Arc<Room>> {
        self.rooms.read().await.get(&guild_id).cloned()
    }

    /// Joins `channel_id`, or switches to it when already in another channel
    /// of the same guild. Returns the state recorded once the platform request
    /// has been issued; `Connected` only if the backend already reports it.
    pub async fn connect(
        self: &Arc<Self>,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<ConnectionState, VoiceBridgeError> {
        let room = self.room(guild_id).await;
        let mut entry = room.entry.lock().await;

        let current = room.current();
        if current != ConnectionState::Disconnected && entry.channel_id == Some(channel_id) {
            debug!(%guild_id, %channel_id, ?current, "voice: already joined, ignoring connect");
            return Ok(current);
        }

        self.ensure_backend().await?;
        let session = self
            .registry
            .get_or_create(self.config.user_id, guild_id)
            .await?;

        if let Some(previous) = entry.channel_id {
            info!(%guild_id, from = %previous, to = %channel_id, "voice: switching channel");
        }

        self.platform
            .change_voice_state(guild_id, Some(channel_id))
            .await
            .map_err(|source| {
                warn!(%guild_id, %channel_id, error = %source, "voice: join request failed");
                VoiceBridgeError::Platform { guild_id, source }
            })?;

        entry.channel_id = Some(channel_id);
        entry.requested_at = Some(Instant::now());
        let state = if session.player.is_connected()
            && session.player.channel_id() == Some(channel_id)
        {
            ConnectionState::Connected
        } else {
            ConnectionState::Connecting
        };
        room.set(state);

        info!(%guild_id, %channel_id, ?state, "voice: join requested");
        Ok(state)
    }

    /// Leaves voice in `guild_id`. Returns whether a leave request was sent.
    ///
    /// Without `force`, a guild the backend already reports as disconnected is
    /// left alone. With `force` the leave is always sent. Once a leave has been
    /// sent the guild is `Disconnected`, even if the platform call failed.
    pub async fn disconnect(
        &self,
        guild_id: GuildId,
        force: bool,
    ) -> Result<bool, VoiceBridgeError> {
        let Some(session) = self.registry.lookup(guild_id).await? else {
            debug!(%guild_id, "voice: no backend session, nothing to disconnect");
            return Ok(false);
        };

        let room = self.room(guild_id).await;
        let mut entry = room.entry.lock().await;

        if !force && !session.player.is_connected() {
            debug!(%guild_id, "voice: backend reports not connected, skipping leave");
            return Ok(false);
        }

        self.leave(guild_id, &session, &room, &mut entry, force).await?;
        Ok(true)
    }

    /// Sends the leave request and records `Disconnected`. The caller holds
    /// the room's entry lock.
    async fn leave(
        &self,
        guild_id: GuildId,
        session: &SessionHandle,
        room: &Room,
        entry: &mut RoomEntry,
        force: bool,
    ) -> Result<(), VoiceBridgeError> {
        let result = self.platform.change_voice_state(guild_id, None).await;

        // The platform does not reliably confirm a self-initiated leave, so the
        // player's channel is cleared here rather than by a state update.
        session.player.set_channel_id(None);
        let previous = entry.channel_id.take();
        entry.requested_at = None;
        room.set(ConnectionState::Disconnected);

        match result {
            Ok(()) => {
                info!(%guild_id, channel_id = ?previous, force, "voice: disconnected");
                Ok(())
            }
            Err(source) => {
                warn!(%guild_id, error = %source, "voice: leave request failed");
                Err(VoiceBridgeError::Platform { guild_id, source })
            }
        }
    }

    /// Forwards one platform signaling event to the backend and settles the
    /// guild's state against the player afterwards. Callers must relay events
    /// one at a time, in the order the platform emitted them.
    pub async fn relay(&self, event: PlatformVoiceEvent) -> Result<(), VoiceBridgeError> {
        let mut left_voice = false;
        if let PlatformVoiceEvent::StateUpdate(data) = &event {
            if let Ok(update) = VoiceStateUpdate::from_payload(data) {
                if update.user_id != self.config.user_id {
                    return Ok(());
                }
                left_voice = update.channel_id.is_none();
            }
        }

        let Some(backend) = self.registry.existing_backend() else {
            debug!("voice: no backend client yet, dropping signaling event");
            return Ok(());
        };

        let guild_id = event.guild_id();
        backend
            .voice_update(translator::translate(event))
            .await
            .map_err(VoiceBridgeError::backend)?;

        if let Some(guild_id) = guild_id {
            self.settle(guild_id, left_voice).await?;
        }
        Ok(())
    }

    /// `left_voice` is set when the relayed event removed the bot from voice.
    async fn settle(&self, guild_id: GuildId, left_voice: bool) -> Result<(), VoiceBridgeError> {
        let Some(room) = self.existing_room(guild_id).await else {
            return Ok(());
        };
        let Some(session) = self.registry.lookup(guild_id).await? else {
            return Ok(());
        };

        let mut entry = room.entry.lock().await;
        let connected = session.player.is_connected();
        let player_channel = session.player.channel_id();

        match room.current() {
            ConnectionState::Connecting if connected && player_channel == entry.channel_id => {
                let elapsed = entry.requested_at.map(|at| at.elapsed());
                room.set(ConnectionState::Connected);
                info!(%guild_id, channel_id = ?player_channel, ?elapsed, "voice: connected");
            }
            ConnectionState::Connecting if left_voice && !connected => {
                entry.channel_id = None;
                entry.requested_at = None;
                room.set(ConnectionState::Disconnected);
                warn!(%guild_id, "voice: pending join dropped by platform");
            }
            ConnectionState::Connected if !connected => {
                entry.channel_id = None;
                entry.requested_at = None;
                room.set(ConnectionState::Disconnected);
                warn!(%guild_id, "voice: connection dropped by platform");
            }
            ConnectionState::Connected if player_channel != entry.channel_id => {
                info!(%guild_id, channel_id = ?player_channel, "voice: moved to another channel");
                entry.channel_id = player_channel;
            }
            _ => {}
        }
        Ok(())
    }

    /// Waits for a pending join to settle. On timeout the guild is forced back
    /// to `Disconnected` and a connectivity error is returned.
    pub async fn wait_until_connected(
        &self,
        guild_id: GuildId,
        timeout: Duration,
    ) -> Result<RoomSession, VoiceBridgeError> {
        let room = self
            .existing_room(guild_id)
            .await
            .ok_or(VoiceBridgeError::ConnectionDropped(guild_id))?;
        let mut state = room.state.subscribe();

        let settled = tokio::time::timeout(timeout, async {
            state
                .wait_for(|state| *state != ConnectionState::Connecting)
                .await
                .map(|state| *state)
        })
        .await;

        match settled {
            Ok(Ok(ConnectionState::Connected)) => self
                .room_session(guild_id)
                .await
                .ok_or(VoiceBridgeError::ConnectionDropped(guild_id)),
            Ok(_) => Err(VoiceBridgeError::ConnectionDropped(guild_id)),
            Err(_) => {
                let session = self.registry.lookup(guild_id).await?;
                let mut entry = room.entry.lock().await;

                // A confirmation may have settled the room after the timer
                // fired but before the lock was taken.
                if room.current() == ConnectionState::Connected {
                    drop(entry);
                    return self
                        .room_session(guild_id)
                        .await
                        .ok_or(VoiceBridgeError::ConnectionDropped(guild_id));
                }
                let Some(channel_id) = entry.channel_id else {
                    return Err(VoiceBridgeError::ConnectionDropped(guild_id));
                };

                warn!(%guild_id, ?timeout, "voice: join not confirmed in time");
                match session {
                    Some(session) => {
                        if let Err(error) =
                            self.leave(guild_id, &session, &room, &mut entry, true).await
                        {
                            warn!(%guild_id, %error, "voice: cleanup after join timeout failed");
                        }
                    }
                    None => {
                        entry.channel_id = None;
                        entry.requested_at = None;
                        room.set(ConnectionState::Disconnected);
                    }
                }
                Err(VoiceBridgeError::JoinTimeout {
                    guild_id,
                    channel_id,
                    timeout,
                })
            }
        }
    }

    pub async fn state(&self, guild_id: GuildId) -> ConnectionState {
        match self.existing_room(guild_id).await {
            Some(room) => room.current(),
            None => ConnectionState::Disconnected,
        }
    }

    pub async fn is_active(&self, guild_id: GuildId) -> bool {
        self.state(guild_id).await != ConnectionState::Disconnected
    }

    pub async fn watch_state(&self, guild_id: GuildId) -> watch::Receiver<ConnectionState> {
        self.room(guild_id).await.state.subscribe()
    }

    pub async fn room_session(&self, guild_id: GuildId) -> Option<RoomSession> {
        let room = self.existing_room(guild_id).await?;
        let session = self.registry.lookup(guild_id).await.ok().flatten()?;
        let entry = room.entry.lock().await;
        Some(RoomSession {
            guild_id,
            channel_id: entry.channel_id,
            state: room.current(),
            connected: session.player.is_connected(),
        })
    }

    /// Leaves voice if needed, then drops the guild's player and room state.
    pub async fn remove_room(&self, guild_id: GuildId) -> Result<(), VoiceBridgeError> {
        if self.is_active(guild_id).await {
            self.disconnect(guild_id, true).await?;
        }
        self.registry.remove(guild_id).await?;
        self.rooms.write().await.remove(&guild_id);
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), VoiceBridgeError> {
        let listener = self.listener.lock().take();
        if let Some(handle) = listener {
            handle.abort();
        }
        self.registry.shutdown().await
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
