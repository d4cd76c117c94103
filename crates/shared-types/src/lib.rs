//! # Shared Types
//!
//! Domain types every subsystem of the R5N node speaks: peer
//! identities, time, block type tags and route flags. This crate has
//! no protocol logic; it exists so the routing, block and engine
//! crates agree on vocabulary without depending on each other.

pub mod entities;
pub mod time;

pub use entities::{routeflags, BlockType, PeerId, PEER_ID_SIZE};
pub use time::{RelativeTime, Timestamp};
