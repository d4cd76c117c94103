//! The revocation block: layout, signature and verification.
//!
//! Wire layout (big-endian):
//!
//! ```text
//! timestamp:u64 || ttl:u64 || pow[0]:u64 .. pow[31]:u64 ||
//! signature[64] || zone_key[32]
//! ```
//!
//! The signature covers `(zone_key || timestamp || ttl)` under the
//! revocation purpose tag and must be produced by the revoked key
//! itself: only the key's owner can kill it.

use shared_crypto::{hash, purpose, EddsaKeyPair, EddsaPublicKey, EddsaSignature, HashCode};
use shared_types::{RelativeTime, Timestamp};

use crate::errors::RevocationError;
use crate::pow::{pow_zero_bits, PowCalculation};

/// Number of proof-of-work slots.
pub const POW_COUNT: usize = 32;

/// Minimum acceptable average difficulty.
pub const MIN_DIFFICULTY: u32 = 23;

/// One lifetime epoch: 365 days.
pub const EPOCH: RelativeTime = RelativeTime(365 * 86_400);

/// Encoded size of a revocation block.
pub const REVOCATION_WIRE_SIZE: usize = 8 + 8 + 8 * POW_COUNT + 64 + 32;

/// Outcome of verifying a revocation block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationStatus {
    /// Difficulty requirement met; carries the average difficulty.
    Valid(u32),
    /// Signature missing or invalid.
    InvalidSignature,
    /// The block's lifetime has elapsed.
    Expired,
    /// The proof sequence is not strictly ascending.
    NotAscending,
    /// Structurally sound but below the difficulty floor; carries
    /// the measured average. Accepted only by test tooling.
    Underdifficulty(u32),
}

impl RevocationStatus {
    /// Numeric form: the difficulty when non-negative, otherwise
    /// −1 (signature), −2 (expired) or −3 (ordering).
    pub fn code(&self) -> i64 {
        match self {
            RevocationStatus::Valid(d) => i64::from(*d),
            RevocationStatus::InvalidSignature => -1,
            RevocationStatus::Expired => -2,
            RevocationStatus::NotAscending => -3,
            RevocationStatus::Underdifficulty(d) => i64::from(*d),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, RevocationStatus::Valid(_))
    }
}

/// A zone-key revocation assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationBlock {
    pub timestamp: Timestamp,
    pub ttl: RelativeTime,
    pub pows: [u64; POW_COUNT],
    pub signature: EddsaSignature,
    pub zone_key: EddsaPublicKey,
}

impl RevocationBlock {
    /// Build a signed block from a finished computation.
    ///
    /// The keypair must be the zone key being revoked.
    pub fn from_pow(
        calc: &PowCalculation,
        keypair: &EddsaKeyPair,
    ) -> Result<Self, RevocationError> {
        if !calc.is_complete() {
            return Err(RevocationError::Malformed("proof-of-work incomplete"));
        }
        debug_assert_eq!(
            keypair.public_key(),
            *calc.zone_key(),
            "revocations are signed by the revoked key"
        );

        let mut pows = [0u64; POW_COUNT];
        pows.copy_from_slice(calc.solved());

        let mut block = Self {
            timestamp: calc.timestamp(),
            ttl: RelativeTime::zero(),
            pows,
            signature: EddsaSignature::zero(),
            zone_key: *calc.zone_key(),
        };
        block.ttl = derived_ttl(block.average_difficulty());
        block.sign(keypair);
        Ok(block)
    }

    /// Sign `(zone_key || timestamp || ttl)` under the revocation
    /// purpose.
    pub fn sign(&mut self, keypair: &EddsaKeyPair) {
        self.signature = keypair.sign(purpose::REVOCATION, &self.signed_payload());
    }

    fn signed_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(48);
        payload.extend_from_slice(self.zone_key.as_bytes());
        payload.extend_from_slice(&self.timestamp.as_secs().to_be_bytes());
        payload.extend_from_slice(&self.ttl.as_secs().to_be_bytes());
        payload
    }

    /// Check the signature against the zone key.
    pub fn verify_signature(&self) -> bool {
        self.zone_key
            .verify(purpose::REVOCATION, &self.signed_payload(), &self.signature)
            .is_ok()
    }

    /// Average leading-zero count over all 32 proofs.
    pub fn average_difficulty(&self) -> u32 {
        let total: u64 = self
            .pows
            .iter()
            .map(|n| u64::from(pow_zero_bits(&self.zone_key, self.timestamp, *n)))
            .sum();
        (total / POW_COUNT as u64) as u32
    }

    /// Full verification ladder.
    ///
    /// Ordering is checked first (it is cheap), then the signature
    /// when required, then the expensive difficulty measurement, and
    /// finally expiration, whose deadline derives from the measured
    /// difficulty (capped by the signed `ttl` field).
    pub fn verify(&self, require_signature: bool, now: Timestamp) -> RevocationStatus {
        for pair in self.pows.windows(2) {
            if pair[0] >= pair[1] {
                return RevocationStatus::NotAscending;
            }
        }

        if require_signature && !self.verify_signature() {
            return RevocationStatus::InvalidSignature;
        }

        let average = self.average_difficulty();
        if average < MIN_DIFFICULTY {
            return RevocationStatus::Underdifficulty(average);
        }

        let lifetime = self.effective_ttl(average);
        if self.timestamp.add(lifetime).is_expired(now) {
            return RevocationStatus::Expired;
        }

        RevocationStatus::Valid(average)
    }

    /// Lifetime actually honored: the difficulty-derived span, or
    /// the signed `ttl` when the signer chose a shorter one.
    pub fn effective_ttl(&self, average_difficulty: u32) -> RelativeTime {
        let derived = derived_ttl(average_difficulty);
        RelativeTime::from_secs(derived.as_secs().min(self.ttl.as_secs()))
    }

    /// The query key revocations are stored and found under.
    pub fn derive_key(&self) -> HashCode {
        hash(self.zone_key.as_bytes())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(REVOCATION_WIRE_SIZE);
        out.extend_from_slice(&self.timestamp.as_secs().to_be_bytes());
        out.extend_from_slice(&self.ttl.as_secs().to_be_bytes());
        for pow in &self.pows {
            out.extend_from_slice(&pow.to_be_bytes());
        }
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(self.zone_key.as_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, RevocationError> {
        if data.len() != REVOCATION_WIRE_SIZE {
            return Err(RevocationError::Malformed("wrong revocation size"));
        }
        let timestamp = u64::from_be_bytes(data[0..8].try_into().expect("sized slice"));
        let ttl = u64::from_be_bytes(data[8..16].try_into().expect("sized slice"));

        let mut pows = [0u64; POW_COUNT];
        for (i, pow) in pows.iter_mut().enumerate() {
            let start = 16 + i * 8;
            *pow = u64::from_be_bytes(data[start..start + 8].try_into().expect("sized slice"));
        }

        let mut signature = [0u8; 64];
        signature.copy_from_slice(&data[272..336]);
        let mut zone_key = [0u8; 32];
        zone_key.copy_from_slice(&data[336..368]);

        Ok(Self {
            timestamp: Timestamp::new(timestamp),
            ttl: RelativeTime::from_secs(ttl),
            pows,
            signature: EddsaSignature::from_bytes(signature),
            zone_key: EddsaPublicKey::from_bytes_unchecked(zone_key),
        })
    }
}

/// Lifetime bought by an average difficulty: one epoch per bit past
/// 24, floored at one epoch once the minimum is met. Below the
/// minimum a revocation earns no lifetime at all.
pub fn derived_ttl(average_difficulty: u32) -> RelativeTime {
    if average_difficulty < MIN_DIFFICULTY {
        return RelativeTime::zero();
    }
    let epochs = u64::from(average_difficulty.saturating_sub(24)).max(1);
    RelativeTime::from_secs(epochs * EPOCH.as_secs())
}
