//! # R5N Routing
//!
//! The routing table of the overlay: 512-bit peer addresses derived
//! by SHA-512 from peer identities, XOR distance, 512 k-buckets, and
//! the peer-selection rules R5N forwarding runs on.
//!
//! ## Architecture
//!
//! - **Address layer:** [`PeerAddress`] derivation and XOR distance
//!   over 512-bit unsigned integers.
//! - **Table layer:** [`RoutingTable`] with k-buckets, a fast
//!   known-peer set, eviction and selection.
//! - **HELLO cache:** a bounded cache of signed address
//!   advertisements, living beside the buckets under the same lock
//!   discipline.
//!
//! The table itself is synchronous and single-writer; callers wrap it
//! in their own reader-writer lock.

pub mod domain;
pub mod hello_cache;

pub use domain::{
    bucket_index, closer_to, distance, xor_distance, KBucket, PeerAddress, PeerCheck, PeerEntry,
    RoutingConfig, RoutingTable, RoutingTableStats, SelectionMode, K, NUM_BUCKETS,
};
pub use hello_cache::{CachedHello, HelloCache};
