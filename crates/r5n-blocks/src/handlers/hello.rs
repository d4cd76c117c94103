//! Handler for URL HELLO blocks.

use shared_crypto::{hash, HashCode};
use shared_types::{BlockType, Timestamp};
use tracing::debug;

use crate::block::Block;
use crate::filters::ResultFilter;
use crate::hello::HelloBlock;

use super::{BlockHandler, FilterResult};

/// Handler for [`BlockType::DHT_URL_HELLO`] blocks.
pub struct HelloHandler;

impl BlockHandler for HelloHandler {
    fn validate_block_query(&self, _key: &HashCode, xquery: &[u8]) -> bool {
        // HELLO queries carry no extended query data.
        xquery.is_empty()
    }

    fn parse_block(&self, block_type: BlockType, expire: Timestamp, data: &[u8]) -> Option<Block> {
        match HelloBlock::decode(data) {
            Ok(_) => Some(Block::new(block_type, expire, data.to_vec())),
            Err(err) => {
                debug!(%err, "rejecting malformed HELLO block");
                None
            }
        }
    }

    fn validate_block_key(&self, block: &Block, expected_key: &HashCode) -> bool {
        match HelloBlock::decode(&block.payload) {
            Ok(hello) => hello.derive_key() == *expected_key,
            Err(_) => false,
        }
    }

    fn validate_block_store_request(&self, block: &Block) -> bool {
        match HelloBlock::decode(&block.payload) {
            Ok(hello) => hello.verify_signature().is_ok(),
            Err(_) => false,
        }
    }

    fn derive_block_key(&self, block: &Block) -> Option<HashCode> {
        HelloBlock::decode(&block.payload).ok().map(|h| h.derive_key())
    }

    fn filter_result(
        &self,
        block: &Block,
        query_key: &HashCode,
        rf: &mut ResultFilter,
        _xquery: &[u8],
    ) -> FilterResult {
        let Ok(hello) = HelloBlock::decode(&block.payload) else {
            return FilterResult::Irrelevant;
        };
        if hello.derive_key() != *query_key {
            return FilterResult::Irrelevant;
        }

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
    use shared_crypto::EddsaKeyPair;

    fn hello() -> HelloBlock {
        HelloBlock::sign(
            &EddsaKeyPair::from_seed([0x33; 32]),
            Timestamp::new(10_000),
            vec!["udp://192.0.2.5:2086".to_string()],
        )
    }

    #[test]
    fn test_query_requires_empty_xquery() {
        assert!(HelloHandler.validate_block_query(&HashCode::zero(), &[]));
        assert!(!HelloHandler.validate_block_query(&HashCode::zero(), b"extra"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(HelloHandler
            .parse_block(BlockType::DHT_URL_HELLO, Timestamp::new(1), b"junk")
            .is_none());
    }

    #[test]
    fn test_store_validation_checks_signature() {
        let good = hello().to_block();
        assert!(HelloHandler.validate_block_store_request(&good));

        let mut tampered = hello();
        tampered.addresses[0] = "udp://198.51.100.1:1".to_string();
        assert!(!HelloHandler.validate_block_store_request(&tampered.to_block()));
    }

    #[test]
    fn test_key_derivation_matches() {
        let hello = hello();
        let block = hello.to_block();

        let derived = HelloHandler.derive_block_key(&block).expect("derivable");
        assert_eq!(derived, hello.derive_key());
        assert!(HelloHandler.validate_block_key(&block, &derived));
        assert!(!HelloHandler.validate_block_key(&block, &HashCode::zero()));
    }

    #[test]
    fn test_filter_flow() {
        let hello = hello();
        let block = hello.to_block();
        let key = hello.derive_key();
        let mut rf = ResultFilter::default();

        assert_eq!(
            HelloHandler.filter_result(&block, &key, &mut rf, &[]),
            FilterResult::More
        );
        assert_eq!(
            HelloHandler.filter_result(&block, &key, &mut rf, &[]),
            FilterResult::Duplicate
        );
        assert_eq!(
            HelloHandler.filter_result(&block, &HashCode::zero(), &mut rf, &[]),
            FilterResult::Irrelevant
        );
    }
}
