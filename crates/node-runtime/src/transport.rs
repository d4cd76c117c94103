//! In-process channel transport.
//!
//! A [`ChannelHub`] plays the role of the network: every node
//! registers a bounded frame channel under its identity, and sends
//! route through the hub. Outbound writes carry the one-second
//! deadline the engine expects; an expired deadline surfaces as the
//! non-fatal "maybe sent" error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use shared_types::PeerId;

use r5n_engine::{EngineError, Message, Transport};

/// Outbound write deadline.
const SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-peer inbound queue depth before sends start blocking.
const FRAME_QUEUE_DEPTH: usize = 64;

/// An encoded frame together with its sender.
pub type Frame = (PeerId, Vec<u8>);

/// The shared "network": peer registry plus address book.
#[derive(Default)]
pub struct ChannelHub {
    peers: Mutex<HashMap<PeerId, mpsc::Sender<Frame>>>,
    addresses: Mutex<HashMap<PeerId, Vec<String>>>,
}

impl ChannelHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a node and hand back its inbound frame stream.
    pub fn register(self: &Arc<Self>, peer: PeerId) -> (ChannelTransport, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        self.peers.lock().insert(peer, tx);
        let transport = ChannelTransport {
            hub: self.clone(),
            local: peer,
        };
        (transport, rx)
    }

    fn sender_for(&self, peer: &PeerId) -> Option<mpsc::Sender<Frame>> {
        self.peers.lock().get(peer).cloned()
    }
}

/// One node's view of the hub.
pub struct ChannelTransport {
    hub: Arc<ChannelHub>,
    local: PeerId,
}

#[async_trait]
impl Transport for ChannelTransport {
    fn peer_id(&self) -> PeerId {
        self.local
    }

    async fn send(&self, peer: &PeerId, msg: Message) -> Result<(), EngineError> {
        let Some(tx) = self.hub.sender_for(peer) else {
            return Err(EngineError::ReceiverUnknown(*peer));
        };
        let frame = msg.encode()?;
        trace!(from = %self.local, to = %peer, bytes = frame.len(), "hub send");
        match tokio::time::timeout(SEND_TIMEOUT, tx.send((self.local, frame))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(EngineError::ReceiverUnknown(*peer)),
            Err(_) => Err(EngineError::MaybeSent),
        }
    }

    async fn try_connect(&self, peer: &PeerId, _address: &str) -> Result<(), EngineError> {
        if self.hub.sender_for(peer).is_some() {
            Ok(())
        } else {
            Err(EngineError::Resource("peer not reachable on hub"))
        }
    }

    fn learn(&self, peer: &PeerId, addresses: &[String]) -> bool {
        let mut book = self.hub.addresses.lock();
        let known = book.contains_key(peer);
        book.entry(*peer)
            .or_default()
            .extend(addresses.iter().cloned());
        !known
    }
}
