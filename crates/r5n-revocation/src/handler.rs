//! Block handler plugging revocations into the DHT pipeline.
//!
//! Revocation blocks flood the overlay like any other block type;
//! storing one requires the full proof-of-work and signature to
//! check out, so a node never wastes space on forgeries.

use shared_crypto::{hash, HashCode};
use shared_types::{BlockType, Timestamp};
use tracing::debug;

use r5n_blocks::{Block, BlockHandler, FilterResult, ResultFilter};

use crate::block::{RevocationBlock, RevocationStatus};

/// Handler for [`BlockType::REVOCATION`] blocks.
pub struct RevocationHandler;

impl BlockHandler for RevocationHandler {
    fn validate_block_query(&self, _key: &HashCode, xquery: &[u8]) -> bool {
        // Revocation queries carry no extended query data.
        xquery.is_empty()
    }

    fn parse_block(&self, block_type: BlockType, expire: Timestamp, data: &[u8]) -> Option<Block> {
        match RevocationBlock::decode(data) {
            Ok(_) => Some(Block::new(block_type, expire, data.to_vec())),
            Err(err) => {
                debug!(%err, "rejecting malformed revocation block");
                None
            }
        }
    }

    fn validate_block_key(&self, block: &Block, expected_key: &HashCode) -> bool {
        match RevocationBlock::decode(&block.payload) {
            Ok(revocation) => revocation.derive_key() == *expected_key,
            Err(_) => false,
        }
    }

    fn validate_block_store_request(&self, block: &Block) -> bool {
        let Ok(revocation) = RevocationBlock::decode(&block.payload) else {
            return false;
        };
        // Expiry is enforced against the difficulty-derived lifetime
        // at the block's own birth time; the engine separately drops
        // messages whose envelope expiration has passed.
        match revocation.verify(true, revocation.timestamp) {
            RevocationStatus::Valid(_) => true,
            status => {
                debug!(?status, "refusing to store revocation");
                false
            }
        }
    }

    fn derive_block_key(&self, block: &Block) -> Option<HashCode> {
        RevocationBlock::decode(&block.payload)
            .ok()
            .map(|r| r.derive_key())
    }

    fn filter_result(
        &self,
        block: &Block,
        query_key: &HashCode,
        rf: &mut ResultFilter,
        _xquery: &[u8],
    ) -> FilterResult {
        let Ok(revocation) = RevocationBlock::decode(&block.payload) else {
            return FilterResult::Irrelevant;
        };
        if revocation.derive_key() != *query_key {
            return FilterResult::Irrelevant;
        }

        let digest = hash(&block.payload);
        if rf.contains(&digest) {
            return FilterResult::Duplicate;
        }
        rf.insert(&digest);
        // One verifiable revocation fully answers the query.
        FilterResult::Last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::{CancelToken, PowCalculation};
    use shared_crypto::EddsaKeyPair;

    const TS: Timestamp = Timestamp(1_700_000_000);

    fn low_difficulty_block() -> RevocationBlock {
        let keypair = EddsaKeyPair::from_seed([5; 32]);
        let mut calc = PowCalculation::new(keypair.public_key(), TS);
        calc.compute(0, &CancelToken::new()).unwrap();
        RevocationBlock::from_pow(&calc, &keypair).unwrap()
    }

    fn as_block(revocation: &RevocationBlock) -> Block {
        Block::new(BlockType::REVOCATION, TS.add_secs(1_000), revocation.encode())
    }

    #[test]
    fn test_query_requires_empty_xquery() {
        assert!(RevocationHandler.validate_block_query(&HashCode::zero(), &[]));
        assert!(!RevocationHandler.validate_block_query(&HashCode::zero(), b"x"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(RevocationHandler
            .parse_block(BlockType::REVOCATION, TS, b"short")
            .is_none());
    }

    #[test]
    fn test_key_derivation() {
        let revocation = low_difficulty_block();
        let block = as_block(&revocation);

        let derived = RevocationHandler.derive_block_key(&block).expect("derivable");
        assert_eq!(derived, revocation.derive_key());
        assert!(RevocationHandler.validate_block_key(&block, &derived));
        assert!(!RevocationHandler.validate_block_key(&block, &HashCode::zero()));
    }

    #[test]
    fn test_store_rejects_underdifficulty() {
        // A zero-target proof never clears the difficulty floor, so
        // the store refuses it outside test tooling.
        let revocation = low_difficulty_block();
        assert!(!RevocationHandler.validate_block_store_request(&as_block(&revocation)));
    }

    #[test]
    fn test_filter_returns_last_and_dedups() {
        let revocation = low_difficulty_block();
        let block = as_block(&revocation);
        let key = revocation.derive_key();
        let mut rf = ResultFilter::default();

        assert_eq!(
            RevocationHandler.filter_result(&block, &key, &mut rf, &[]),
            FilterResult::Last
        );
        assert_eq!(
            RevocationHandler.filter_result(&block, &key, &mut rf, &[]),
            FilterResult::Duplicate
        );
        assert_eq!(
            RevocationHandler.filter_result(&block, &HashCode::zero(), &mut rf, &[]),
            FilterResult::Irrelevant
        );
    }
}
