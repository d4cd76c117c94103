//! Peer addresses and XOR distance.
//!
//! A peer's routing address is the SHA-512 hash of its identity key.
//! Distance between two addresses is their XOR read as a 512-bit
//! unsigned integer; the bucket index of a remote address is the
//! number of leading zero bits of that distance (512 minus the bit
//! length), so closer peers land in higher-numbered buckets.

use primitive_types::U512;
use shared_crypto::{hash, HashCode};
use shared_types::PeerId;
use std::cmp::Ordering;

use super::config::NUM_BUCKETS;

/// 64-byte routing address of a peer.
///
/// Immutable once derived: the address is a pure function of the
/// peer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerAddress(pub HashCode);

impl PeerAddress {
    /// Derive the routing address for a peer identity.
    pub fn from_peer_id(peer_id: &PeerId) -> Self {
        Self(hash(peer_id.as_bytes()))
    }

    /// Wrap an existing hash code as an address.
    ///
    /// Query keys share the address space, so lookups wrap them here
    /// before distance comparisons.
    pub fn from_hash(code: HashCode) -> Self {
        Self(code)
    }

    /// The underlying hash code.
    pub fn as_hash(&self) -> &HashCode {
        &self.0
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &hex::encode(self.0.as_bytes())[..16])
    }
}

/// XOR distance between two addresses as a 512-bit unsigned integer.
pub fn xor_distance(a: &PeerAddress, b: &PeerAddress) -> U512 {
    U512::from_big_endian(a.0.xor(&b.0).as_bytes())
}

/// Distance plus the derived bucket index.
///
/// Returns `(distance, bucket_index)`; the bucket index is `None`
/// when the addresses are identical (distance zero has no bucket).
pub fn distance(a: &PeerAddress, b: &PeerAddress) -> (U512, Option<usize>) {
    let d = xor_distance(a, b);
    (d, bucket_index_of(d))
}

/// Bucket index for a remote address relative to a local one.
///
/// `None` when the addresses are identical.
pub fn bucket_index(local: &PeerAddress, remote: &PeerAddress) -> Option<usize> {
    bucket_index_of(xor_distance(local, remote))
}

fn bucket_index_of(d: U512) -> Option<usize> {
    if d.is_zero() {
        return None;
    }
    let idx = (d.leading_zeros() as usize).min(NUM_BUCKETS - 1);
    Some(idx)
}

/// Order two addresses by proximity to an origin, closest first.
///
/// On equal distance the lexicographically larger raw address is
/// considered farther, which keeps closest-peer selection from
/// oscillating between candidates.
pub fn closer_to(a: &PeerAddress, b: &PeerAddress, origin: &PeerAddress) -> Ordering {
    let da = xor_distance(a, origin);
    let db = xor_distance(b, origin);
    match da.cmp(&db) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    }
}
