//! In-process backend that tracks the voice handshake per guild and lets the
//! caller inject playback events. Used by the replay binary and tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared::{
    domain::{ChannelId, GuildId, UserId},
    protocol::{
        BackendEvent, SignalingEnvelope, SignalingKind, VoiceServerUpdate, VoiceStateUpdate,
    },
};
use tokio::sync::broadcast;
use tracing::debug;

use crate::{AudioBackend, AudioBackendConnector, BackendPlayer, NodeConfig};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct PlayerVoiceState {
    channel_id: Option<ChannelId>,
    session_id: Option<String>,
    endpoint: Option<String>,
    token: Option<String>,
}

pub struct MemoryPlayer {
    guild_id: GuildId,
    voice: Mutex<PlayerVoiceState>,
}

impl MemoryPlayer {
    fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            voice: Mutex::new(PlayerVoiceState::default()),
        }
    }

    pub fn session_id(&self) -> Option<String> {
        self.voice.lock().session_id.clone()
    }

    pub fn endpoint(&self) -> Option<String> {
        self.voice.lock().endpoint.clone()
    }

    /// True once both halves of the handshake have been seen.
    pub fn handshake_complete(&self) -> bool {
        let voice = self.voice.lock();
        voice.session_id.is_some() && voice.token.is_some() && voice.endpoint.is_some()
    }

    fn apply_state(&self, update: &VoiceStateUpdate) {
        let mut voice = self.voice.lock();
        voice.channel_id = update.channel_id;
        if update.channel_id.is_some() {
            voice.session_id = Some(update.session_id.clone());
        } else {
            *voice = PlayerVoiceState::default();
        }
    }

    fn apply_server(&self, update: &VoiceServerUpdate) {
        let mut voice = self.voice.lock();
        voice.token = Some(update.token.clone());
        voice.endpoint = update.endpoint.clone();
    }
}

impl BackendPlayer for MemoryPlayer {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn channel_id(&self) -> Option<ChannelId> {
        self.voice.lock().channel_id
    }

    fn set_channel_id(&self, channel_id: Option<ChannelId>) {
        self.voice.lock().channel_id = channel_id;
    }

    fn is_connected(&self) -> bool {
        self.voice.lock().channel_id.is_some()
    }
}

pub struct MemoryBackend {
    user_id: UserId,
    nodes: RwLock<Vec<NodeConfig>>,
    players: RwLock<HashMap<GuildId, Arc<MemoryPlayer>>>,
    voice_updates: Mutex<Vec<SignalingEnvelope>>,
    events: broadcast::Sender<BackendEvent>,
}

impl MemoryBackend {
    pub fn new(user_id: UserId) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            user_id,
            nodes: RwLock::new(Vec::new()),
            players: RwLock::new(HashMap::new()),
            voice_updates: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn player(&self, guild_id: GuildId) -> Option<Arc<MemoryPlayer>> {
        self.players.read().get(&guild_id).cloned()
    }

    /// Every envelope handed to `voice_update`, in arrival order.
    pub fn voice_updates(&self) -> Vec<SignalingEnvelope> {
        self.voice_updates.lock().clone()
    }

    pub fn emit(&self, event: BackendEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Simulates the guild's queue running dry.
    pub fn finish_queue(&self, guild_id: GuildId) -> anyhow::Result<()> {
        if self.player(guild_id).is_none() {
            return Err(anyhow!("no player for guild {guild_id}"));
        }
        self.emit(BackendEvent::QueueEnd { guild_id });
        Ok(())
    }

    fn handle_state_update(&self, envelope: &SignalingEnvelope) -> anyhow::Result<()> {
        let update = VoiceStateUpdate::from_payload(&envelope.data)
            .context("malformed voice state update")?;
        if update.user_id != self.user_id {
            return Ok(());
        }
        let guild_id = update
            .guild_id
            .ok_or_else(|| anyhow!("voice state update without guild_id"))?;
        match self.player(guild_id) {
            Some(player) => player.apply_state(&update),
            None => debug!(%guild_id, "memory backend: state update for unknown player"),
        }
        Ok(())
    }

    fn handle_server_update(&self, envelope: &SignalingEnvelope) -> anyhow::Result<()> {
        let update = VoiceServerUpdate::from_payload(&envelope.data)
            .context("malformed voice server update")?;
        match self.player(update.guild_id) {
            Some(player) => player.apply_server(&update),
            None => debug!(guild_id = %update.guild_id, "memory backend: server update for unknown player"),
        }
        Ok(())
    }
}

#[async_trait]
impl AudioBackend for MemoryBackend {
    fn user_id(&self) -> UserId {
        self.user_id
    }

    async fn add_node(&self, node: NodeConfig) -> anyhow::Result<()> {
        let label = node.label.clone();
        {
            let mut nodes = self.nodes.write();
            if nodes.iter().any(|existing| existing.label == node.label) {
                return Err(anyhow!("node {label} is already registered"));
            }
            nodes.push(node);
        }
        self.emit(BackendEvent::NodeReady { label });
        Ok(())
    }

    fn nodes(&self) -> Vec<NodeConfig> {
        self.nodes.read().clone()
    }

    async fn voice_update(&self, envelope: SignalingEnvelope) -> anyhow::Result<()> {
        self.voice_updates.lock().push(envelope.clone());
        match envelope.kind {
            SignalingKind::VoiceStateUpdate => self.handle_state_update(&envelope),
            SignalingKind::VoiceServerUpdate => self.handle_server_update(&envelope),
        }
    }

    async fn create_player(&self, guild_id: GuildId) -> anyhow::Result<Arc<dyn BackendPlayer>> {
        if self.nodes.read().is_empty() {
            return Err(anyhow!("no audio node available for guild {guild_id}"));
        }
        let player = self
            .players
            .write()
            .entry(guild_id)
            .or_insert_with(|| Arc::new(MemoryPlayer::new(guild_id)))
            .clone();
        Ok(player)
    }

    async fn get_player(
        &self,
        guild_id: GuildId,
    ) -> anyhow::Result<Option<Arc<dyn BackendPlayer>>> {
        Ok(self
            .player(guild_id)
            .map(|player| player as Arc<dyn BackendPlayer>))
    }

    async fn destroy_player(&self, guild_id: GuildId) -> anyhow::Result<bool> {
        Ok(self.players.write().remove(&guild_id).is_some())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.players.write().clear();
        self.nodes.write().clear();
        Ok(())
    }
}

/// Hands out `MemoryBackend`s and keeps them reachable for inspection.
#[derive(Default)]
pub struct MemoryConnector {
    connect_calls: AtomicUsize,
    backends: Mutex<Vec<Arc<MemoryBackend>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn last_backend(&self) -> Option<Arc<MemoryBackend>> {
        self.backends.lock().last().cloned()
    }
}

#[async_trait]
impl AudioBackendConnector for MemoryConnector {
    async fn connect(&self, user_id: UserId) -> anyhow::Result<Arc<dyn AudioBackend>> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let backend = Arc::new(MemoryBackend::new(user_id));
        self.backends.lock().push(Arc::clone(&backend));
        Ok(backend)
    }
}
