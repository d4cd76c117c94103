//! Node assembly.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use shared_crypto::EddsaKeyPair;
use shared_types::BlockType;

use r5n_blocks::BlockHandlerRegistry;
use r5n_engine::{
    EngineConfig, MemoryStore, MessageEngine, StoreConfig, SystemTimeSource, TimeSource, Transport,
};
use r5n_revocation::RevocationHandler;

/// Top-level node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub engine: EngineConfig,
    pub store: StoreConfig,
    /// Heartbeat period in seconds.
    pub heartbeat_interval_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            store: StoreConfig::default(),
            heartbeat_interval_secs: 60,
        }
    }
}

impl NodeConfig {
    pub fn for_testing() -> Self {
        Self {
            engine: EngineConfig::for_testing(),
            store: StoreConfig::default(),
            heartbeat_interval_secs: 1,
        }
    }
}

/// A fully wired node.
pub struct Node {
    engine: Arc<MessageEngine>,
}

impl Node {
    /// Assemble a node around a transport, with all built-in block
    /// handlers registered (HELLO, TEST and REVOCATION).
    pub fn new(keypair: EddsaKeyPair, config: NodeConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_time(keypair, config, transport, Arc::new(SystemTimeSource))
    }

    /// Assembly with an injected clock, for deterministic tests.
    pub fn with_time(
        keypair: EddsaKeyPair,
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let mut handlers = BlockHandlerRegistry::new();
        handlers.register(BlockType::REVOCATION, Arc::new(RevocationHandler));

        let engine = MessageEngine::new(
            keypair,
            config.engine,
            Arc::new(MemoryStore::new(config.store)),
            Arc::new(handlers),
            transport,
            time,
        );
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &Arc<MessageEngine> {
        &self.engine
    }

    /// Run the shared heartbeat timer.
    pub fn spawn_heartbeat(&self, interval_secs: u64) -> JoinHandle<()> {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
            // The first tick fires immediately; skip it so startup
            // does not race the wiring.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                engine.heartbeat();
            }
        })
    }
}

/// Log a one-line startup banner.
pub fn log_startup(node: &Node) {
    info!(peer = %node.engine().local_peer_id(), "R5N node assembled");
}
