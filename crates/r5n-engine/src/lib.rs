//! # R5N Message Engine
//!
//! The state machine at the heart of the node. The transport
//! collaborator delivers typed messages together with the sender's
//! identity and an opaque responder back-channel; the engine
//! dispatches by message variant, consults the routing table and the
//! block store, emits zero or more outbound messages, and registers
//! or consumes entries in the result-handler registry.
//!
//! ## Layers
//!
//! - [`wire`]: byte-exact big-endian codec for the four P2P
//!   message variants.
//! - [`path`]: signed route recording with
//!   truncate-on-failure verification.
//! - [`store`]: the block store port and a quota-bounded memory
//!   implementation.
//! - [`registry`]: per-query result handlers with expiry and
//!   coalescing.
//! - [`ports`]: the transport, responder and time-source traits the
//!   engine consumes.
//! - [`engine`]: GET/PUT/RESULT/HELLO processing and the
//!   forward/store decision logic.

pub mod engine;
pub mod errors;
pub mod path;
pub mod ports;
pub mod registry;
pub mod store;
pub mod wire;

pub use engine::{EngineConfig, MessageEngine, RoutingState};
pub use errors::EngineError;
pub use path::{Path, PathElement};
pub use ports::{
    LocalResponder, PeerResponder, Recipient, Responder, SystemTimeSource, TimeSource, Transport,
};
pub use registry::{ResultHandler, ResultHandlerRegistry};
pub use store::{DhtEntry, DhtResult, MemoryStore, Store, StoreConfig, MAX_SORT_RESULTS};
pub use wire::{GetMsg, HelloMsg, Message, PutMsg, ResultMsg, MAX_MESSAGE_SIZE};
