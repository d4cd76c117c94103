//! Per-type block handlers.
//!
//! Every recognized block type registers an object implementing
//! [`BlockHandler`]; unknown types fall through to the generic
//! handler, which never validates payload semantics but still keeps
//! result deduplication working.

mod generic;
mod hello;

pub use generic::GenericHandler;
pub use hello::HelloHandler;

use std::collections::HashMap;
use std::sync::Arc;

use shared_crypto::HashCode;
use shared_types::{BlockType, Timestamp};

use crate::block::Block;
use crate::filters::ResultFilter;

/// Verdict of running a candidate result through a query's filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    /// Valid result; the query is fully answered by it.
    Last,
    /// Valid result; more may follow.
    More,
    /// Already returned for this query.
    Duplicate,
    /// Not a valid result for this query at all.
    Irrelevant,
}

/// The per-type operation table.
pub trait BlockHandler: Send + Sync {
    /// Check a query against type-specific constraints before any
    /// routing work happens.
    fn validate_block_query(&self, key: &HashCode, xquery: &[u8]) -> bool;

    /// Parse a raw payload into a typed block; `None` on malformed
    /// input.
    fn parse_block(&self, block_type: BlockType, expire: Timestamp, data: &[u8]) -> Option<Block>;

    /// Check that a block belongs under `expected_key`.
    fn validate_block_key(&self, block: &Block, expected_key: &HashCode) -> bool;

    /// Check that a block is acceptable for local storage.
    fn validate_block_store_request(&self, block: &Block) -> bool;

    /// Derive the query key a result block answers, when the type
    /// supports derivation.
    fn derive_block_key(&self, block: &Block) -> Option<HashCode>;

    /// Build a fresh result filter for a query of this type.
    fn setup_result_filter(&self, nbits: usize, mutator: u32) -> ResultFilter {
        ResultFilter::new(nbits, mutator)
    }

    /// Reconstruct a result filter from wire bytes.
    fn parse_result_filter(&self, data: &[u8]) -> ResultFilter {
        ResultFilter::parse(data, 0)
    }

    /// Classify a candidate result against the query and its filter,
    /// recording it in the filter when it goes through.
    fn filter_result(
        &self,
        block: &Block,
        query_key: &HashCode,
        rf: &mut ResultFilter,
        xquery: &[u8],
    ) -> FilterResult;
}

/// Registry mapping block types to their handlers.
///
/// Lookup never fails: unregistered types resolve to the generic
/// fallback.
pub struct BlockHandlerRegistry {
    handlers: HashMap<u32, Arc<dyn BlockHandler>>,
    fallback: Arc<dyn BlockHandler>,
}

impl BlockHandlerRegistry {
    /// Registry with the built-in handlers (HELLO and TEST).
    pub fn new() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
            fallback: Arc::new(GenericHandler),
        };
        registry.register(BlockType::DHT_URL_HELLO, Arc::new(HelloHandler));
        registry.register(BlockType::TEST, Arc::new(GenericHandler));
        registry
    }

    /// Register (or replace) the handler for a block type.
    pub fn register(&mut self, block_type: BlockType, handler: Arc<dyn BlockHandler>) {
        self.handlers.insert(block_type.as_u32(), handler);
    }

    /// The handler for a block type, or the generic fallback.
    pub fn get(&self, block_type: BlockType) -> &Arc<dyn BlockHandler> {
        self.handlers
            .get(&block_type.as_u32())
            .unwrap_or(&self.fallback)
    }

    /// Whether a dedicated (non-fallback) handler exists.
    pub fn is_registered(&self, block_type: BlockType) -> bool {
        self.handlers.contains_key(&block_type.as_u32())
    }
}

impl Default for BlockHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_types_have_handlers() {
        let registry = BlockHandlerRegistry::new();
        assert!(registry.is_registered(BlockType::DHT_URL_HELLO));
        assert!(registry.is_registered(BlockType::TEST));
        assert!(!registry.is_registered(BlockType(4242)));
    }

    #[test]
    fn test_result_filter_setup_and_parse() {
        let registry = BlockHandlerRegistry::new();
        let handler = registry.get(BlockType::DHT_URL_HELLO);

        let fresh = handler.setup_result_filter(256, 7);
        assert_eq!(fresh.size_bits(), 256);
        assert_eq!(fresh.mutator(), 7);

        let parsed = handler.parse_result_filter(&fresh.to_bytes());
        assert_eq!(parsed.size_bits(), 256);
    }

    #[test]
    fn test_unknown_type_falls_back() {
        let registry = BlockHandlerRegistry::new();
        let handler = registry.get(BlockType(4242));

        // The fallback accepts anything structurally.
        let block = handler
            .parse_block(BlockType(4242), Timestamp::new(10), &[1, 2, 3])
            .map(|b| b.block_type);
        assert_eq!(block, Some(BlockType(4242)));
    }
}
