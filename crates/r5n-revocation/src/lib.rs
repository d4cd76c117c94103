//! # R5N Revocation
//!
//! Verifiable zone-key revocation. Revoking a key requires 32
//! strictly-ascending proof-of-work nonces over a memory-hard hash,
//! a signature under the revoked key itself, and yields a lifetime
//! that grows with the difficulty actually achieved: spending more
//! work buys a longer-lived revocation.
//!
//! - [`pow`]: the Argon2 proof-of-work: nonce search with
//!   cooperative cancellation and resumable state.
//! - [`block`]: the revocation block: wire layout, signature and
//!   the verification status ladder.
//! - [`handler`]: plugs revocations into the DHT block pipeline so
//!   they flood like any other block.

pub mod block;
pub mod errors;
pub mod handler;
pub mod pow;

pub use block::{RevocationBlock, RevocationStatus, EPOCH, MIN_DIFFICULTY, POW_COUNT};
pub use errors::RevocationError;
pub use handler::RevocationHandler;
pub use pow::{compute_task, CancelToken, PowCalculation};
