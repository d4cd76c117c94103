//! Peer identities, block type tags and route flags.

use serde::{Deserialize, Serialize};

/// Size of a peer identity in bytes.
pub const PEER_ID_SIZE: usize = 32;

/// 32-byte public-key identifier of a peer.
///
/// The identity doubles as the peer's Ed25519 verification key; the
/// crypto crate validates the point when a signature is checked, so
/// carrying raw bytes here is safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub [u8; PEER_ID_SIZE]);

impl PeerId {
    /// Create a peer identity from raw bytes.
    pub fn new(bytes: [u8; PEER_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; PEER_ID_SIZE] {
        &self.0
    }

    /// The all-zero identity (for tests and sentinels).
    pub fn zero() -> Self {
        Self([0u8; PEER_ID_SIZE])
    }
}

impl AsRef<[u8]> for PeerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..16])
    }
}

/// A u32 tag identifying the schema and semantics of a block payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockType(pub u32);

impl BlockType {
    /// Wildcard: matches any block type in queries.
    pub const ANY: BlockType = BlockType(0);
    /// Legacy binary HELLO.
    pub const DHT_HELLO: BlockType = BlockType(7);
    /// Opaque test payload.
    pub const TEST: BlockType = BlockType(8);
    /// Zone name record.
    pub const GNS_NAMERECORD: BlockType = BlockType(11);
    /// Zone-key revocation assertion.
    pub const REVOCATION: BlockType = BlockType(12);
    /// HELLO with URI address list.
    pub const DHT_URL_HELLO: BlockType = BlockType(58);

    /// The raw tag value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Whether this tag is the wildcard.
    pub fn is_any(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            BlockType::ANY => write!(f, "ANY"),
            BlockType::DHT_HELLO => write!(f, "DHT_HELLO"),
            BlockType::TEST => write!(f, "TEST"),
            BlockType::GNS_NAMERECORD => write!(f, "GNS_NAMERECORD"),
            BlockType::REVOCATION => write!(f, "REVOCATION"),
            BlockType::DHT_URL_HELLO => write!(f, "DHT_URL_HELLO"),
            BlockType(other) => write!(f, "BLOCK_TYPE_{}", other),
        }
    }
}

/// Route flags carried on GET and PUT messages.
pub mod routeflags {
    /// Every node on the forwarding path satisfies the request if able.
    pub const DEMULTIPLEX: u32 = 1;
    /// Record the signed forwarding path.
    pub const RECORD_ROUTE: u32 = 2;
    /// Approximate (nearest-neighbor) results are acceptable.
    pub const FIND_APPROXIMATE: u32 = 4;
    /// The recorded path lost its head; a truncated-origin field is
    /// present on the wire.
    pub const TRUNCATED: u32 = 8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_equality() {
        assert_eq!(PeerId::new([1u8; 32]), PeerId::new([1u8; 32]));
        assert_ne!(PeerId::new([1u8; 32]), PeerId::new([2u8; 32]));
    }

    #[test]
    fn test_block_type_display() {
        assert_eq!(BlockType::DHT_URL_HELLO.to_string(), "DHT_URL_HELLO");
        assert_eq!(BlockType(999).to_string(), "BLOCK_TYPE_999");
    }

    #[test]
    fn test_route_flags_are_disjoint() {
        assert_eq!(
            routeflags::DEMULTIPLEX & routeflags::RECORD_ROUTE & routeflags::FIND_APPROXIMATE,
            0
        );
    }
}
