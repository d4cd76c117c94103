//! Core bloom filter.
//!
//! Probabilistic membership with no false negatives. Positions are
//! derived from a single SHA-512 of the element via double hashing,
//! with an optional mutator mixed in so independently created filters
//! for the same elements set different bits.

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// Bloom filter over opaque byte elements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomFilter {
    #[serde(with = "bitvec_serde")]
    bits: BitVec<u8, Lsb0>,
    /// Number of hash positions per element.
    k: usize,
    /// Size in bits.
    m: usize,
    /// Hash mutator (0 = none).
    mutator: u32,
}

/// Serde support for BitVec.
mod bitvec_serde {
    use bitvec::prelude::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bits: &BitVec<u8, Lsb0>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bytes: Vec<u8> = bits.as_raw_slice().to_vec();
        (bytes, bits.len()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BitVec<u8, Lsb0>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (bytes, len): (Vec<u8>, usize) = Deserialize::deserialize(deserializer)?;
        let mut bits = BitVec::<u8, Lsb0>::from_vec(bytes);
        bits.truncate(len);
        Ok(bits)
    }
}

impl BloomFilter {
    /// Create a filter of `m` bits (rounded up to a whole byte) with
    /// `k` hash positions per element.
    pub fn new(m: usize, k: usize) -> Self {
        Self::with_mutator(m, k, 0)
    }

    /// Create a filter with a hash mutator.
    pub fn with_mutator(m: usize, k: usize, mutator: u32) -> Self {
        let m = m.div_ceil(8) * 8;
        let m = m.max(8);
        Self {
            bits: bitvec![u8, Lsb0; 0; m],
            k: k.max(1),
            m,
            mutator,
        }
    }

    /// Reconstruct a filter from its raw bit array.
    pub fn from_raw(bytes: &[u8], k: usize, mutator: u32) -> Self {
        let bits = BitVec::<u8, Lsb0>::from_slice(bytes);
        let m = bits.len();
        Self {
            bits,
            k: k.max(1),
            m: m.max(8),
            mutator,
        }
    }

    /// Insert an element. Afterwards `contains` returns true for it.
    pub fn insert(&mut self, element: &[u8]) {
        for pos in self.positions(element) {
            self.bits.set(pos, true);
        }
    }

    /// Test membership: `false` means definitely absent, `true`
    /// means present or a false positive.
    pub fn contains(&self, element: &[u8]) -> bool {
        self.positions(element).into_iter().all(|pos| self.bits[pos])
    }

    /// OR another filter into this one. Both sides must have the
    /// same geometry.
    pub fn merge(&mut self, other: &BloomFilter) {
        debug_assert_eq!(self.m, other.m);
        debug_assert_eq!(self.k, other.k);
        let self_raw = self.bits.as_raw_mut_slice();
        for (s, o) in self_raw.iter_mut().zip(other.bits.as_raw_slice()) {
            *s |= *o;
        }
    }

    /// Raw bit array for the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits.as_raw_slice().to_vec()
    }

    pub fn size_bits(&self) -> usize {
        self.m
    }

    pub fn hash_count(&self) -> usize {
        self.k
    }

    pub fn mutator(&self) -> u32 {
        self.mutator
    }

    pub fn bits_set(&self) -> usize {
        self.bits.count_ones()
    }

    /// Derive the k bit positions for an element.
    ///
    /// One SHA-512 over (mutator || element), then double hashing
    /// over the first two 64-bit words of the digest.
    fn positions(&self, element: &[u8]) -> Vec<usize> {
        let mut hasher = Sha512::new();
        hasher.update(self.mutator.to_be_bytes());
        hasher.update(element);
        let digest = hasher.finalize();

        let h1 = u64::from_be_bytes(digest[0..8].try_into().expect("digest is 64 bytes"));
        // Force h2 odd so every position stream cycles the full range.
        let h2 = u64::from_be_bytes(digest[8..16].try_into().expect("digest is 64 bytes")) | 1;

        (0..self.k)
            .map(|i| {
                let mixed = h1.wrapping_add((i as u64).wrapping_mul(h2));
                (mixed % self.m as u64) as usize
            })
            .collect()
    }
}
