//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors surfaced by hashing and signature primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The supplied bytes are not a valid Ed25519 public key point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signature verification failed for the given message.
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// A byte slice had the wrong length for the requested type.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
