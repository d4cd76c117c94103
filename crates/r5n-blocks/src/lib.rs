//! # R5N Blocks
//!
//! The typed-block pipeline: content blocks, per-type validation and
//! key derivation, and the bloom filters that bound flooding.
//!
//! - [`Block`] / [`Query`]: the type-agnostic data model. Payloads
//!   are opaque here; meaning comes from the registered handler.
//! - [`BloomFilter`]: SHA-512 double-hashing filter with an optional
//!   mutator, the base of both wire filters.
//! - [`PeerFilter`]: fixed 1024-bit filter of peers already on a
//!   request's forwarding path.
//! - [`ResultFilter`]: per-query filter of results already returned.
//! - [`BlockHandler`] / [`BlockHandlerRegistry`]: the per-type
//!   operation table with a generic fallback for unknown types.
//! - [`HelloBlock`]: signed address advertisement.

pub mod block;
pub mod bloomfilter;
pub mod errors;
pub mod filters;
pub mod handlers;
pub mod hello;

pub use block::{Block, Query};
pub use bloomfilter::BloomFilter;
pub use errors::BlockError;
pub use filters::{PeerFilter, ResultFilter, PEER_FILTER_BITS, RESULT_FILTER_BITS};
pub use handlers::{BlockHandler, BlockHandlerRegistry, FilterResult, GenericHandler, HelloHandler};
pub use hello::{decode_addresses, encode_addresses, HelloBlock};
