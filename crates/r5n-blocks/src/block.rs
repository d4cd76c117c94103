//! The type-agnostic block and query model.

use shared_crypto::HashCode;
use shared_types::{BlockType, Timestamp};

/// A content-addressed block.
///
/// The payload format is type-specific; everything here treats it as
/// opaque bytes and leaves interpretation to the registered handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub block_type: BlockType,
    pub expire: Timestamp,
    pub payload: Vec<u8>,
}

impl Block {
    pub fn new(block_type: BlockType, expire: Timestamp, payload: Vec<u8>) -> Self {
        Self {
            block_type,
            expire,
            payload,
        }
    }

    /// Whether the block is past its expiration at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expire.is_expired(now)
    }
}

/// A lookup request. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub key: HashCode,
    pub block_type: BlockType,
    pub flags: u32,
    pub xquery: Vec<u8>,
}

impl Query {
    pub fn new(key: HashCode, block_type: BlockType, flags: u32, xquery: Vec<u8>) -> Self {
        Self {
            key,
            block_type,
            flags,
            xquery,
        }
    }

    /// Whether the given route flag is set.
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::routeflags;

    #[test]
    fn test_block_expiry() {
        let block = Block::new(BlockType::TEST, Timestamp::new(100), vec![1, 2, 3]);
        assert!(!block.is_expired(Timestamp::new(99)));
        assert!(block.is_expired(Timestamp::new(100)));
    }

    #[test]
    fn test_query_flags() {
        let query = Query::new(
            HashCode::zero(),
            BlockType::ANY,
            routeflags::DEMULTIPLEX | routeflags::RECORD_ROUTE,
            vec![],
        );
        assert!(query.has_flag(routeflags::DEMULTIPLEX));
        assert!(query.has_flag(routeflags::RECORD_ROUTE));
        assert!(!query.has_flag(routeflags::FIND_APPROXIMATE));
    }
}
