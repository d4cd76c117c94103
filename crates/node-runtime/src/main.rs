//! # R5N Node Runtime
//!
//! Entry point for a standalone node. The transport here is the
//! in-process channel hub; production deployments plug a real
//! transport multiplexer into the same [`r5n_engine::Transport`]
//! port.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use node_runtime::{ChannelHub, ConnectionManager, Node, NodeConfig};
use shared_crypto::EddsaKeyPair;
use shared_types::PeerId;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let keypair = EddsaKeyPair::generate();
    let local = PeerId::new(*keypair.public_key().as_bytes());
    info!(peer = %local, "starting R5N node");

    let config = NodeConfig::default();
    let heartbeat_secs = config.heartbeat_interval_secs;

    let hub = ChannelHub::new();
    let (transport, frames) = hub.register(local);
    let transport = std::sync::Arc::new(transport);

    let node = Node::new(keypair, config, transport.clone());
    node_runtime::node::log_startup(&node);

    let heartbeat = node.spawn_heartbeat(heartbeat_secs);
    let inbound = ConnectionManager::spawn_frame_loop(node.engine().clone(), transport, frames);

    info!("node is running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    heartbeat.abort();
    inbound.abort();
    Ok(())
}
