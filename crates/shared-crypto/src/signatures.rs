//! # Purpose-Tagged Ed25519 Signatures
//!
//! Every signature in the protocol covers a fixed envelope:
//!
//! ```text
//! purpose:u32 (BE) || payload_len:u32 (BE) || payload
//! ```
//!
//! Binding the purpose tag and length into the signed bytes means a
//! HELLO signature can never be presented as a path-element or
//! revocation signature, even when the payloads happen to collide.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroize;

use crate::CryptoError;

/// Size of a signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Well-known signature purpose tags.
pub mod purpose {
    /// Zone-key revocation assertions.
    pub const REVOCATION: u32 = 3;
    /// HELLO address advertisements.
    pub const HELLO: u32 = 7;
    /// Per-hop path elements on recorded routes.
    pub const DHT_HOP: u32 = 16;
}

/// Build the signed envelope for a purpose and payload.
pub fn signed_payload(purpose: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + payload.len());
    buf.extend_from_slice(&purpose.to_be_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Ed25519 public key (32 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EddsaPublicKey([u8; 32]);

impl EddsaPublicKey {
    /// Create from bytes, validating the curve point.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    /// Create from bytes without point validation.
    ///
    /// Wire decoding uses this so a malformed key surfaces as a
    /// verification failure rather than a decode failure.
    pub fn from_bytes_unchecked(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify a purpose-tagged signature.
    pub fn verify(
        &self,
        purpose: u32,
        payload: &[u8],
        signature: &EddsaSignature,
    ) -> Result<(), CryptoError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);

        verifying_key
            .verify(&signed_payload(purpose, payload), &sig)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

impl std::fmt::Display for EddsaPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Ed25519 signature (64 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EddsaSignature(pub [u8; SIGNATURE_SIZE]);

impl EddsaSignature {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// The all-zero signature.
    ///
    /// Used as the sentinel for the first unverifiable hop of a
    /// truncated path.
    pub fn zero() -> Self {
        Self([0u8; SIGNATURE_SIZE])
    }

    /// Whether this is the all-zero sentinel.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl std::fmt::Debug for EddsaSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EddsaSignature({}…)", hex::encode(&self.0[..8]))
    }
}

/// Ed25519 keypair.
pub struct EddsaKeyPair {
    signing_key: SigningKey,
}

impl EddsaKeyPair {
    /// Generate a random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from a secret seed (32 bytes).
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        Self { signing_key }
    }

    /// Get the public key.
    pub fn public_key(&self) -> EddsaPublicKey {
        EddsaPublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a payload under a purpose tag (deterministic, no RNG).
    pub fn sign(&self, purpose: u32, payload: &[u8]) -> EddsaSignature {
        let sig = self.signing_key.sign(&signed_payload(purpose, payload));
        EddsaSignature(sig.to_bytes())
    }

    /// Get the secret seed (for persistence).
    pub fn to_seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl Drop for EddsaKeyPair {
    fn drop(&mut self) {
        let mut bytes = self.signing_key.to_bytes();
        bytes.zeroize();
    }
}
