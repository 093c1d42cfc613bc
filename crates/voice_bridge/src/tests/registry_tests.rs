use super::*;
use anyhow::anyhow;
use async_trait::async_trait;
use audio_backend::{MemoryBackend, MemoryConnector};
use std::sync::atomic::{AtomicUsize, Ordering};

const BOT: UserId = UserId(555);

fn node() -> NodeConfig {
    NodeConfig {
        host: "localhost".into(),
        port: 2333,
        password: "test".into(),
        region: "us".into(),
        label: "default-node".into(),
    }
}

struct FlakyConnector {
    inner: MemoryConnector,
    failures_left: AtomicUsize,
}

#[async_trait]
impl AudioBackendConnector for FlakyConnector {
    async fn connect(&self, user_id: UserId) -> anyhow::Result<Arc<dyn AudioBackend>> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            return Err(anyhow!("node unreachable"));
        }
        self.inner.connect(user_id).await
    }
}

#[tokio::test]
async fn same_identity_yields_same_backend_and_registers_node_once() {
    let connector = Arc::new(MemoryConnector::new());
    let registry = SessionRegistry::new(connector.clone(), node());

    let first = registry.backend(BOT).await.expect("backend");
    let second = registry.backend(BOT).await.expect("backend");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(connector.connect_calls(), 1);
    assert_eq!(first.nodes(), vec![node()]);
}

#[tokio::test]
async fn concurrent_first_use_creates_one_backend() {
    let connector = Arc::new(MemoryConnector::new());
    let registry = Arc::new(SessionRegistry::new(connector.clone(), node()));

    let mut tasks = Vec::new();
    for guild in 0..16u64 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            registry
                .get_or_create(BOT, GuildId(guild))
                .await
                .map(|session| session.player.guild_id())
        }));
    }
    for task in tasks {
        task.await.expect("join").expect("session");
    }

    assert_eq!(connector.connect_calls(), 1);
    let backend = connector.last_backend().expect("backend");
    assert_eq!(backend.nodes().len(), 1);
}

#[tokio::test]
async fn get_or_create_reuses_the_guild_player() {
    let registry = SessionRegistry::new(Arc::new(MemoryConnector::new()), node());

    let first = registry.get_or_create(BOT, GuildId(1)).await.expect("session");
    let again = registry.get_or_create(BOT, GuildId(1)).await.expect("session");
    let other = registry.get_or_create(BOT, GuildId(2)).await.expect("session");

    assert!(Arc::ptr_eq(&first.player, &again.player));
    assert!(!Arc::ptr_eq(&first.player, &other.player));
}

#[tokio::test]
async fn lookup_never_creates() {
    let connector = Arc::new(MemoryConnector::new());
    let registry = SessionRegistry::new(connector.clone(), node());

    assert!(registry.lookup(GuildId(1)).await.expect("lookup").is_none());
    assert_eq!(connector.connect_calls(), 0);

    registry.backend(BOT).await.expect("backend");
    assert!(registry.lookup(GuildId(1)).await.expect("lookup").is_none());
}

#[tokio::test]
async fn failed_creation_can_be_retried() {
    let connector = Arc::new(FlakyConnector {
        inner: MemoryConnector::new(),
        failures_left: AtomicUsize::new(1),
    });
    let registry = SessionRegistry::new(connector.clone(), node());

    let err = registry.backend(BOT).await.err().expect("first attempt fails");
    assert!(matches!(err, VoiceBridgeError::Backend { .. }));
    assert!(registry.existing_backend().is_none());

    registry.backend(BOT).await.expect("retry succeeds");
    assert_eq!(connector.inner.connect_calls(), 1);
}

/// Always hands out the same prepared backend and counts how often it did.
struct PreparedConnector {
    backend: Arc<MemoryBackend>,
    connect_calls: AtomicUsize,
}

#[async_trait]
impl AudioBackendConnector for PreparedConnector {
    async fn connect(&self, _user_id: UserId) -> anyhow::Result<Arc<dyn AudioBackend>> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.backend.clone())
    }
}

#[tokio::test]
async fn failed_node_registration_keeps_the_client() {
    let backend = Arc::new(MemoryBackend::new(BOT));
    backend.add_node(node()).await.expect("preexisting node");
    let connector = Arc::new(PreparedConnector {
        backend,
        connect_calls: AtomicUsize::new(0),
    });
    let registry = SessionRegistry::new(connector.clone(), node());

    let err = registry.backend(BOT).await.err().expect("duplicate node");
    assert!(matches!(err, VoiceBridgeError::Backend { .. }));
    assert!(registry.existing_backend().is_some());

    let err = registry.get_or_create(BOT, GuildId(1)).await.err().expect("still rejected");
    assert!(matches!(err, VoiceBridgeError::Backend { .. }));

    assert_eq!(connector.connect_calls.load(Ordering::SeqCst), 1);
    assert_eq!(connector.backend.nodes().len(), 1);
}

#[tokio::test]
async fn event_receiver_is_handed_out_once() {
    let registry = SessionRegistry::new(Arc::new(MemoryConnector::new()), node());
    assert!(registry.take_event_receiver().is_none());

    registry.backend(BOT).await.expect("backend");
    let mut events = registry.take_event_receiver().expect("receiver");
    assert!(registry.take_event_receiver().is_none());

    assert_eq!(
        events.recv().await.expect("node ready"),
        BackendEvent::NodeReady {
            label: "default-node".into()
        }
    );
}

#[tokio::test]
async fn remove_destroys_the_player() {
    let registry = SessionRegistry::new(Arc::new(MemoryConnector::new()), node());
    registry.get_or_create(BOT, GuildId(8)).await.expect("session");

    assert!(registry.remove(GuildId(8)).await.expect("remove"));
    assert!(registry.lookup(GuildId(8)).await.expect("lookup").is_none());
    assert!(!registry.remove(GuildId(8)).await.expect("remove again"));
}
