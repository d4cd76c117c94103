//! # SHA-512 Hash Codes
//!
//! The routing hash of the overlay. Peer addresses are derived from
//! peer identities with this hash, and query keys are 64-byte hash
//! codes in the same space.

use sha2::{Digest, Sha512};

use crate::CryptoError;

/// Size of a hash code in bytes.
pub const HASH_SIZE: usize = 64;

/// A 512-bit hash code.
///
/// Ordering is lexicographic over the raw bytes, which is what the
/// routing layer's tie-break rule relies on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashCode(pub [u8; HASH_SIZE]);

impl HashCode {
    /// Create a hash code from raw bytes.
    pub fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a hash code from a byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != HASH_SIZE {
            return Err(CryptoError::InvalidLength {
                expected: HASH_SIZE,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// The all-zero hash code (for tests and sentinels).
    pub fn zero() -> Self {
        Self([0u8; HASH_SIZE])
    }

    /// Bitwise XOR with another hash code.
    pub fn xor(&self, other: &HashCode) -> HashCode {
        let mut out = [0u8; HASH_SIZE];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        HashCode(out)
    }

    /// Count the leading zero bits of this hash code.
    pub fn leading_zero_bits(&self) -> u32 {
        let mut count = 0u32;
        for byte in &self.0 {
            if *byte == 0 {
                count += 8;
            } else {
                count += byte.leading_zeros();
                break;
            }
        }
        count
    }
}

impl std::fmt::Debug for HashCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HashCode({}…)", &hex::encode(&self.0[..8]))
    }
}

impl std::fmt::Display for HashCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for HashCode {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Hash data with SHA-512 (one-shot).
pub fn hash(data: &[u8]) -> HashCode {
    let digest = Sha512::digest(data);
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&digest);
    HashCode(out)
}

/// Hash multiple inputs as one stream.
pub fn hash_many(inputs: &[&[u8]]) -> HashCode {
    let mut hasher = Sha512::new();
    for input in inputs {
        hasher.update(input);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&digest);
    HashCode(out)
}
