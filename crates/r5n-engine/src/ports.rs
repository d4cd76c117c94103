//! Ports the engine consumes: transport, responders and time.
//!
//! The transport collaborator owns endpoint multiplexing and
//! connection state; the engine only ever sees these traits. Result
//! delivery is unified behind [`Responder`] with two concrete
//! implementations: one forwarding over the transport, one feeding a
//! local channel.

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::{PeerId, Timestamp};
use tokio::sync::mpsc;

use crate::errors::EngineError;
use crate::wire::{Message, ResultMsg};

/// Where a responder delivers. Used for coalescing duplicate result
/// handler registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recipient {
    /// A remote peer, reached through the transport.
    Peer(PeerId),
    /// A local consumer, identified by channel id.
    Local(u64),
}

/// Back-channel for RESULT delivery to a query's originator.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Deliver one result.
    async fn respond(&self, msg: ResultMsg) -> Result<(), EngineError>;

    /// The delivery target, for registration coalescing.
    fn recipient(&self) -> Recipient;
}

/// Responder that forwards results to a remote peer.
pub struct PeerResponder {
    peer: PeerId,
    transport: Arc<dyn Transport>,
}

impl PeerResponder {
    pub fn new(peer: PeerId, transport: Arc<dyn Transport>) -> Self {
        Self { peer, transport }
    }
}

#[async_trait]
impl Responder for PeerResponder {
    async fn respond(&self, msg: ResultMsg) -> Result<(), EngineError> {
        self.transport.send(&self.peer, Message::Result(msg)).await
    }

    fn recipient(&self) -> Recipient {
        Recipient::Peer(self.peer)
    }
}

/// Responder that feeds results into a local channel.
pub struct LocalResponder {
    id: u64,
    tx: mpsc::UnboundedSender<ResultMsg>,
}

impl LocalResponder {
    /// Create a responder plus the receiving end of its channel.
    pub fn channel(id: u64) -> (Self, mpsc::UnboundedReceiver<ResultMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }
}

#[async_trait]
impl Responder for LocalResponder {
    async fn respond(&self, msg: ResultMsg) -> Result<(), EngineError> {
        self.tx
            .send(msg)
            .map_err(|_| EngineError::Resource("local result consumer gone"))
    }

    fn recipient(&self) -> Recipient {
        Recipient::Local(self.id)
    }
}

/// The transport collaborator.
///
/// Outbound writes carry a one-second deadline inside the
/// implementation; an expired deadline surfaces as
/// [`EngineError::MaybeSent`], which callers treat as non-fatal.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The local node's identity.
    fn peer_id(&self) -> PeerId;

    /// Send a message to a peer.
    async fn send(&self, peer: &PeerId, msg: Message) -> Result<(), EngineError>;

    /// Attempt a connection to one advertised address of a peer.
    async fn try_connect(&self, peer: &PeerId, address: &str) -> Result<(), EngineError>;

    /// Record addresses for a peer. Returns `true` when the peer was
    /// previously unknown to the transport.
    fn learn(&self, peer: &PeerId, addresses: &[String]) -> bool;
}

/// Clock abstraction so expiry logic is testable.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Production time source.
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::hash;
    use shared_types::BlockType;

    fn result_msg() -> ResultMsg {
        ResultMsg {
            block_type: BlockType::TEST,
            flags: 0,
            expire: Timestamp::new(10),
            query_key: hash(b"q"),
            truncated_origin: None,
            put_path: vec![],
            get_path: vec![],
            block_data: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn test_local_responder_delivers() {
        let (responder, mut rx) = LocalResponder::channel(7);
        responder.respond(result_msg()).await.unwrap();

        let received = rx.recv().await.expect("one result");
        assert_eq!(received.block_data, vec![1, 2, 3]);
        assert_eq!(responder.recipient(), Recipient::Local(7));
    }

    #[tokio::test]
    async fn test_local_responder_closed_channel() {
        let (responder, rx) = LocalResponder::channel(1);
        drop(rx);
        assert_eq!(
            responder.respond(result_msg()).await,
            Err(EngineError::Resource("local result consumer gone"))
        );
    }

    #[test]
    fn test_recipient_equality() {
        assert_eq!(Recipient::Local(1), Recipient::Local(1));
        assert_ne!(Recipient::Local(1), Recipient::Local(2));
        assert_ne!(Recipient::Peer(PeerId::zero()), Recipient::Local(0));
    }
}
