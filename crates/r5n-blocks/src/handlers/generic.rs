//! Fallback handler for unknown block types.

use shared_crypto::{hash, HashCode};
use shared_types::{BlockType, Timestamp};

use crate::block::Block;
use crate::filters::ResultFilter;

use super::{BlockHandler, FilterResult};

/// Handler used when no dedicated handler is registered.
///
/// Payload semantics are never validated; deduplication runs on the
/// payload hash so the result filter still bounds flooding.
pub struct GenericHandler;

impl BlockHandler for GenericHandler {
    fn validate_block_query(&self, _key: &HashCode, _xquery: &[u8]) -> bool {
        true
    }

    fn parse_block(&self, block_type: BlockType, expire: Timestamp, data: &[u8]) -> Option<Block> {
        Some(Block::new(block_type, expire, data.to_vec()))
    }

    fn validate_block_key(&self, _block: &Block, _expected_key: &HashCode) -> bool {
        // Without payload semantics there is no key to derive, so
        // nothing to contradict.
        true
    }

    fn validate_block_store_request(&self, _block: &Block) -> bool {
        true
    }

    fn derive_block_key(&self, _block: &Block) -> Option<HashCode> {
        None
    }

    fn filter_result(
        &self,
        block: &Block,
        _query_key: &HashCode,
        rf: &mut ResultFilter,
        _xquery: &[u8],
    ) -> FilterResult {
        let digest = hash(&block.payload);
        if rf.contains(&digest) {
            return FilterResult::Duplicate;
        }
        rf.insert(&digest);
        FilterResult::More
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_payload() {
        let block = GenericHandler
            .parse_block(BlockType(77), Timestamp::new(5), b"opaque")
            .expect("generic parse never fails");
        assert_eq!(block.block_type, BlockType(77));
        assert_eq!(block.payload, b"opaque");
    }

    #[test]
    fn test_filter_deduplicates_by_payload() {
        let block = Block::new(BlockType(77), Timestamp::new(5), b"payload".to_vec());
        let mut rf = ResultFilter::default();

        assert_eq!(
            GenericHandler.filter_result(&block, &HashCode::zero(), &mut rf, &[]),
            FilterResult::More
        );
        assert_eq!(
            GenericHandler.filter_result(&block, &HashCode::zero(), &mut rf, &[]),
            FilterResult::Duplicate
        );
    }

    #[test]
    fn test_no_key_derivation() {
        let block = Block::new(BlockType(77), Timestamp::new(5), vec![]);
        assert_eq!(GenericHandler.derive_block_key(&block), None);
    }
}
