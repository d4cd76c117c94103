//! Error types for the block pipeline.

use thiserror::Error;

/// Errors surfaced by block parsing and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    /// The payload is shorter than its fixed header.
    #[error("block payload truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    /// A length or count field disagrees with the payload size.
    #[error("malformed block payload: {0}")]
    Malformed(&'static str),

    /// An address entry is not valid UTF-8.
    #[error("address list entry is not valid UTF-8")]
    BadAddress,

    /// The embedded signature does not verify.
    #[error("block signature invalid")]
    BadSignature,

    /// The block is past its expiration.
    #[error("block expired")]
    Expired,
}
