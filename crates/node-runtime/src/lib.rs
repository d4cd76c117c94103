//! # Node Runtime
//!
//! Assembly of a complete R5N node: the message engine with all
//! built-in block handlers, a quota-bounded store, the heartbeat
//! task, and the connection manager that fans inbound connections
//! out into per-connection tasks.
//!
//! The transport collaborator is pluggable; [`transport`] ships an
//! in-process channel transport used by the binary's single-node
//! mode and by the integration suite to wire multi-node overlays
//! without sockets.

pub mod connection;
pub mod node;
pub mod transport;

pub use connection::{Connection, ConnectionManager};
pub use node::{Node, NodeConfig};
pub use transport::{ChannelHub, ChannelTransport};
