//! Error types for the revocation engine.

use thiserror::Error;

/// Errors surfaced by proof-of-work computation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RevocationError {
    /// The computation was cancelled; state is preserved and the
    /// caller may resume from the last tested nonce.
    #[error("proof-of-work computation cancelled")]
    Cancelled,

    /// The blocking worker died without reporting a result.
    #[error("proof-of-work worker failed")]
    WorkerFailed,

    /// A wire payload did not have the fixed revocation layout.
    #[error("malformed revocation block: {0}")]
    Malformed(&'static str),
}
