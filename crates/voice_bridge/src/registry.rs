//! Process-scoped ownership of the audio backend client and its per-guild
//! players.
//!
//! The backend client is created on first use, registers the configured node
//! exactly once and lives until [`SessionRegistry::shutdown`]. Concurrent first
//! use from several guilds is serialised by the `OnceCell`, so only one client
//! and node registration can ever exist per registry. A client whose node
//! registration failed stays in place and only the registration is retried.

use std::sync::Arc;

use audio_backend::{AudioBackend, AudioBackendConnector, BackendPlayer, NodeConfig};
use parking_lot::Mutex;
use shared::{
    domain::{GuildId, UserId},
    protocol::BackendEvent,
};
use tokio::sync::{broadcast, Mutex as AsyncMutex, OnceCell};
use tracing::{info, warn};

use crate::error::VoiceBridgeError;

/// Non-owning view of one guild's backend session.
#[derive(Clone)]
pub struct SessionHandle {
    pub backend: Arc<dyn AudioBackend>,
    pub player: Arc<dyn BackendPlayer>,
}

struct RegisteredBackend {
    backend: Arc<dyn AudioBackend>,
    // Subscribed before the node is added so NodeReady is never missed.
    events: Mutex<Option<broadcast::Receiver<BackendEvent>>>,
    node_registered: AsyncMutex<bool>,
}

pub struct SessionRegistry {
    connector: Arc<dyn AudioBackendConnector>,
    node: NodeConfig,
    backend: OnceCell<RegisteredBackend>,
}

impl SessionRegistry {
    pub fn new(connector: Arc<dyn AudioBackendConnector>, node: NodeConfig) -> Self {
        Self {
            connector,
            node,
            backend: OnceCell::new(),
        }
    }

    pub async fn backend(
        &self,
        client_identity: UserId,
    ) -> Result<Arc<dyn AudioBackend>, VoiceBridgeError> {
        let registered = self
            .backend
            .get_or_try_init(|| self.create_backend(client_identity))
            .await?;

        if registered.backend.user_id() != client_identity {
            warn!(
                requested = %client_identity,
                existing = %registered.backend.user_id(),
                "voice: backend client already exists for a different identity"
            );
        }

        self.register_node(registered).await?;
        Ok(Arc::clone(&registered.backend))
    }

    async fn create_backend(
        &self,
        client_identity: UserId,
    ) -> Result<RegisteredBackend, VoiceBridgeError> {
        let backend = self
            .connector
            .connect(client_identity)
            .await
            .map_err(VoiceBridgeError::backend)?;
        let events = backend.subscribe_events();

        info!(user_id = %client_identity, "voice: audio backend client created");

        Ok(RegisteredBackend {
            backend,
            events: Mutex::new(Some(events)),
            node_registered: AsyncMutex::new(false),
        })
    }

    async fn register_node(&self, registered: &RegisteredBackend) -> Result<(), VoiceBridgeError> {
        let mut node_registered = registered.node_registered.lock().await;
        if *node_registered {
            return Ok(());
        }

        registered
            .backend
            .add_node(self.node.clone())
            .await
            .map_err(|source| {
                warn!(label = %self.node.label, error = %source, "voice: node registration failed");
                VoiceBridgeError::backend(source)
            })?;
        *node_registered = true;

        info!(
            host = %self.node.host,
            port = self.node.port,
            region = %self.node.region,
            label = %self.node.label,
            "voice: audio node registered"
        );
        Ok(())
    }

    /// Returns the guild's session, creating the backend client and the
    /// player if either is missing.
    pub async fn get_or_create(
        &self,
        client_identity: UserId,
        guild_id: GuildId,
    ) -> Result<SessionHandle, VoiceBridgeError> {
        let backend = self.backend(client_identity).await?;
        let player = backend
            .create_player(guild_id)
            .await
            .map_err(VoiceBridgeError::backend)?;
        Ok(SessionHandle { backend, player })
    }

    /// Looks up an existing session without creating anything.
    pub async fn lookup(
        &self,
        guild_id: GuildId,
    ) -> Result<Option<SessionHandle>, VoiceBridgeError> {
        let Some(backend) = self.existing_backend() else {
            return Ok(None);
        };
        let player = backend
            .get_player(guild_id)
            .await
            .map_err(VoiceBridgeError::backend)?;
        Ok(player.map(|player| SessionHandle { backend, player }))
    }

    pub fn existing_backend(&self) -> Option<Arc<dyn AudioBackend>> {
        self.backend
            .get()
            .map(|registered| Arc::clone(&registered.backend))
    }

    /// Hands out the backend's event stream. Only the first caller gets it.
    pub fn take_event_receiver(&self) -> Option<broadcast::Receiver<BackendEvent>> {
        self.backend.get()?.events.lock().take()
    }

    pub async fn remove(&self, guild_id: GuildId) -> Result<bool, VoiceBridgeError> {
        let Some(backend) = self.existing_backend() else {
            return Ok(false);
        };
        backend
            .destroy_player(guild_id)
            .await
            .map_err(VoiceBridgeError::backend)
    }

    pub async fn shutdown(&self) -> Result<(), VoiceBridgeError> {
        if let Some(backend) = self.existing_backend() {
            backend.shutdown().await.map_err(VoiceBridgeError::backend)?;
            info!("voice: audio backend client shut down");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
