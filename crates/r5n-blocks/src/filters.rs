//! The two wire filters: peer filter and result filter.

use shared_crypto::HashCode;
use shared_types::PeerId;
use tracing::debug;

use crate::bloomfilter::BloomFilter;

/// Peer filter size in bits. The wire carries exactly 128 bytes.
pub const PEER_FILTER_BITS: usize = 1024;

/// Peer filter size in bytes on the wire.
pub const PEER_FILTER_SIZE: usize = PEER_FILTER_BITS / 8;

/// Hash positions per element in the peer filter.
const PEER_FILTER_K: usize = 16;

/// Default result filter size in bits.
pub const RESULT_FILTER_BITS: usize = 128;

/// Hash positions per element in result filters.
const RESULT_FILTER_K: usize = 7;

/// Largest result filter accepted off the wire (bytes).
const RESULT_FILTER_MAX_SIZE: usize = 8 * 1024;

/// Bloom filter of peers already on a request's forwarding path.
///
/// Every hop adds itself before forwarding; loops die at the filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerFilter {
    inner: BloomFilter,
}

impl Default for PeerFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerFilter {
    pub fn new() -> Self {
        Self {
            inner: BloomFilter::new(PEER_FILTER_BITS, PEER_FILTER_K),
        }
    }

    /// Reconstruct from the 128 wire bytes.
    pub fn from_wire(bytes: &[u8; PEER_FILTER_SIZE]) -> Self {
        Self {
            inner: BloomFilter::from_raw(bytes, PEER_FILTER_K, 0),
        }
    }

    /// The 128 wire bytes.
    pub fn to_wire(&self) -> [u8; PEER_FILTER_SIZE] {
        let bytes = self.inner.to_bytes();
        let mut out = [0u8; PEER_FILTER_SIZE];
        out.copy_from_slice(&bytes);
        out
    }

    pub fn insert(&mut self, peer: &PeerId) {
        self.inner.insert(peer.as_bytes());
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.inner.contains(peer.as_bytes())
    }
}

/// Per-query bloom filter of results already returned.
///
/// Carried on GET messages with a mutator so repeated queries rotate
/// their bit patterns; replies whose hash is matched are suppressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultFilter {
    inner: BloomFilter,
}

impl ResultFilter {
    /// Create a filter of `nbits` (0 picks the default size).
    pub fn new(nbits: usize, mutator: u32) -> Self {
        let nbits = if nbits == 0 { RESULT_FILTER_BITS } else { nbits };
        Self {
            inner: BloomFilter::with_mutator(nbits, RESULT_FILTER_K, mutator),
        }
    }

    /// Reconstruct from wire bytes.
    ///
    /// An empty or oversized payload falls back to a fresh filter of
    /// default size rather than failing the message.
    pub fn parse(bytes: &[u8], mutator: u32) -> Self {
        if bytes.is_empty() || bytes.len() > RESULT_FILTER_MAX_SIZE {
            debug!(
                len = bytes.len(),
                "result filter payload unusable, starting fresh"
            );
            return Self::new(RESULT_FILTER_BITS, mutator);
        }
        Self {
            inner: BloomFilter::from_raw(bytes, RESULT_FILTER_K, mutator),
        }
    }

    /// Wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner.to_bytes()
    }

    pub fn insert(&mut self, result: &HashCode) {
        self.inner.insert(result.as_bytes());
    }

    pub fn contains(&self, result: &HashCode) -> bool {
        self.inner.contains(result.as_bytes())
    }

    pub fn mutator(&self) -> u32 {
        self.inner.mutator()
    }

    pub fn size_bits(&self) -> usize {
        self.inner.size_bits()
    }
}

impl Default for ResultFilter {
    fn default() -> Self {
        Self::new(RESULT_FILTER_BITS, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::hash;

    #[test]
    fn test_peer_filter_roundtrip() {
        let mut filter = PeerFilter::new();
        let peer = PeerId::new([7u8; 32]);
        filter.insert(&peer);

        let restored = PeerFilter::from_wire(&filter.to_wire());
        assert!(restored.contains(&peer));
        assert!(!restored.contains(&PeerId::new([8u8; 32])));
    }

    #[test]
    fn test_peer_filter_wire_size() {
        assert_eq!(PeerFilter::new().to_wire().len(), 128);
    }

    #[test]
    fn test_result_filter_suppresses_seen() {
        let mut filter = ResultFilter::default();
        let result = hash(b"block payload");

        assert!(!filter.contains(&result));
        filter.insert(&result);
        assert!(filter.contains(&result));
    }

    #[test]
    fn test_result_filter_parse_fallback() {
        let fresh = ResultFilter::parse(&[], 5);
        assert_eq!(fresh.size_bits(), RESULT_FILTER_BITS);
        assert_eq!(fresh.mutator(), 5);

        let oversized = vec![0u8; RESULT_FILTER_MAX_SIZE + 1];
        let fresh = ResultFilter::parse(&oversized, 0);
        assert_eq!(fresh.size_bits(), RESULT_FILTER_BITS);
    }

    #[test]
    fn test_result_filter_wire_roundtrip() {
        let mut filter = ResultFilter::new(256, 9);
        let result = hash(b"seen");
        filter.insert(&result);

        let restored = ResultFilter::parse(&filter.to_bytes(), 9);
        assert!(restored.contains(&result));
        assert_eq!(restored.size_bits(), 256);
    }

    #[test]
    fn test_zero_bits_picks_default() {
        assert_eq!(ResultFilter::new(0, 0).size_bits(), RESULT_FILTER_BITS);
    }
}
