//! Engine error taxonomy.
//!
//! Inbound protocol violations are logged and the offending message
//! dropped; the sender is never informed. Transient send failures do
//! not abort forwarding loops. Cancellation bubbles up unchanged.

use shared_types::PeerId;
use thiserror::Error;

/// Errors surfaced by the message engine and its ports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed wire data, bad signature where required, or a
    /// block-key mismatch in exact mode.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The outbound write deadline expired; the message may or may
    /// not have reached the peer. Non-fatal.
    #[error("send deadline expired, message possibly sent")]
    MaybeSent,

    /// The transport has no route to the peer yet.
    #[error("receiver not yet known: {0}")]
    ReceiverUnknown(PeerId),

    /// The store refused an insertion for capacity reasons.
    #[error("store over quota")]
    StoreFull,

    /// An endpoint or backing resource could not be acquired.
    #[error("resource unavailable: {0}")]
    Resource(&'static str),

    /// Cooperative cancellation of a long-running operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Caller-supplied parameters out of range.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}

impl EngineError {
    /// Transient failures are logged and skipped, never fatal to a
    /// forwarding loop.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::MaybeSent | EngineError::ReceiverUnknown(_) | EngineError::StoreFull
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::MaybeSent.is_transient());
        assert!(EngineError::StoreFull.is_transient());
        assert!(EngineError::ReceiverUnknown(PeerId::zero()).is_transient());
        assert!(!EngineError::ProtocolViolation("x").is_transient());
        assert!(!EngineError::Cancelled.is_transient());
    }
}
