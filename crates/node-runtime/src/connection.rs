//! Connection fan-out.
//!
//! A single acceptor task owns the stream of new connections and
//! spawns one task per accepted connection; each connection task
//! decodes frames and feeds the engine, answering through a
//! peer-directed responder.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shared_types::PeerId;

use r5n_engine::{Message, MessageEngine, PeerResponder, Responder, Transport};

/// An accepted connection: the remote identity and its frame stream.
pub struct Connection {
    pub peer: PeerId,
    pub frames: mpsc::Receiver<Vec<u8>>,
}

/// Spawns per-connection tasks off a single acceptor.
pub struct ConnectionManager {
    engine: Arc<MessageEngine>,
    transport: Arc<dyn Transport>,
}

impl ConnectionManager {
    pub fn new(engine: Arc<MessageEngine>, transport: Arc<dyn Transport>) -> Self {
        Self { engine, transport }
    }

    /// Run the acceptor until the connection stream closes.
    pub fn spawn_acceptor(self: Arc<Self>, mut connections: mpsc::Receiver<Connection>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(connection) = connections.recv().await {
                info!(peer = %connection.peer, "accepted connection");
                let manager = self.clone();
                tokio::spawn(async move {
                    manager.serve(connection).await;
                });
            }
            debug!("acceptor stream closed");
        })
    }

    /// Drive one connection until its frame stream ends.
    async fn serve(&self, mut connection: Connection) {
        let responder: Arc<dyn Responder> = Arc::new(PeerResponder::new(
            connection.peer,
            self.transport.clone(),
        ));
        while let Some(frame) = connection.frames.recv().await {
            let msg = match Message::decode(&frame) {
                Ok(msg) => msg,
                Err(err) => {
                    warn!(peer = %connection.peer, %err, "undecodable frame, dropping");
                    continue;
                }
            };
            self.engine
                .handle_message(connection.peer, msg, responder.clone())
                .await;
        }
        debug!(peer = %connection.peer, "connection closed");
    }

    /// Convenience loop for hub transports: treat every distinct
    /// frame sender as its own logical connection.
    pub fn spawn_frame_loop(
        engine: Arc<MessageEngine>,
        transport: Arc<dyn Transport>,
        mut frames: mpsc::Receiver<(PeerId, Vec<u8>)>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some((sender, frame)) = frames.recv().await {
                let msg = match Message::decode(&frame) {
                    Ok(msg) => msg,
                    Err(err) => {
                        warn!(peer = %sender, %err, "undecodable frame, dropping");
                        continue;
                    }
                };
                let responder: Arc<dyn Responder> =
                    Arc::new(PeerResponder::new(sender, transport.clone()));
                engine.handle_message(sender, msg, responder).await;
            }
        })
    }
}
