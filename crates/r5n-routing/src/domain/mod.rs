//! Routing domain: addresses, distance, buckets and the table.

mod address;
mod bucket;
mod config;
mod table;

pub use address::{bucket_index, closer_to, distance, xor_distance, PeerAddress};
pub use bucket::{KBucket, PeerEntry};
pub use config::{RoutingConfig, K, NUM_BUCKETS};
pub use table::{PeerCheck, RoutingTable, RoutingTableStats, SelectionMode};
