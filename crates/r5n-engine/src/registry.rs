//! Per-query result handlers.
//!
//! Before forwarding a GET, the engine registers a handler capturing
//! the query parameters and the responder back-channel; incoming
//! RESULTs are matched against these and proxied back. Handlers die
//! one hour after creation or on explicit completion. Registrations
//! that would duplicate an existing handler (same type, flags,
//! filter, xquery and recipient) coalesce into it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use shared_crypto::HashCode;
use shared_types::{BlockType, Timestamp};
use tracing::trace;

use r5n_blocks::ResultFilter;

use crate::ports::Responder;

/// Handler lifetime in seconds.
pub const HANDLER_LIFETIME_SECS: u64 = 3600;

/// A registered consumer of RESULTs for one query.
pub struct ResultHandler {
    pub id: u64,
    pub query_key: HashCode,
    pub block_type: BlockType,
    pub flags: u32,
    pub result_filter: ResultFilter,
    pub xquery: Vec<u8>,
    pub started_at: Timestamp,
    pub responder: Arc<dyn Responder>,
}

impl ResultHandler {
    /// Equality for coalescing: the tuple (block_type, flags,
    /// result_filter, xquery, recipient). Id and start time are
    /// excluded.
    fn coalesces_with(&self, other: &ResultHandler) -> bool {
        self.block_type == other.block_type
            && self.flags == other.flags
            && self.result_filter == other.result_filter
            && self.xquery == other.xquery
            && self.responder.recipient() == other.responder.recipient()
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.started_at.add_secs(HANDLER_LIFETIME_SECS).is_expired(now)
    }
}

impl std::fmt::Debug for ResultHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultHandler")
            .field("id", &self.id)
            .field("block_type", &self.block_type)
            .field("recipient", &self.responder.recipient())
            .finish()
    }
}

/// Concurrent map from query-key string to handler list.
pub struct ResultHandlerRegistry {
    inner: Mutex<HashMap<String, Vec<Arc<Mutex<ResultHandler>>>>>,
    next_id: AtomicU64,
}

impl ResultHandlerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn key_of(query_key: &HashCode) -> String {
        hex::encode(query_key.as_bytes())
    }

    /// Register a handler, coalescing duplicates. Returns the
    /// handler id (the existing one on coalescing).
    pub fn register(&self, mut handler: ResultHandler) -> u64 {
        let key = Self::key_of(&handler.query_key);
        let mut inner = self.inner.lock();
        let list = inner.entry(key).or_default();

        for existing in list.iter() {
            let mut existing = existing.lock();
            if existing.coalesces_with(&handler) {
                // Refresh the clock instead of stacking a duplicate.
                existing.started_at = handler.started_at;
                trace!(id = existing.id, "coalesced result handler registration");
                return existing.id;
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        handler.id = id;
        list.push(Arc::new(Mutex::new(handler)));
        id
    }

    /// All handlers registered for a query key.
    pub fn lookup(&self, query_key: &HashCode) -> Vec<Arc<Mutex<ResultHandler>>> {
        let inner = self.inner.lock();
        inner
            .get(&Self::key_of(query_key))
            .map(|list| list.to_vec())
            .unwrap_or_default()
    }

    /// Remove one handler on completion. Returns whether it existed.
    pub fn complete(&self, query_key: &HashCode, id: u64) -> bool {
        let key = Self::key_of(query_key);
        let mut inner = self.inner.lock();
        let Some(list) = inner.get_mut(&key) else {
            return false;
        };
        let before = list.len();
        list.retain(|h| h.lock().id != id);
        let removed = list.len() < before;
        if list.is_empty() {
            inner.remove(&key);
        }
        removed
    }

    /// Drop handlers past their lifetime; returns how many died.
    pub fn expire(&self, now: Timestamp) -> usize {
        let mut inner = self.inner.lock();
        let mut removed = 0;
        inner.retain(|_, list| {
            let before = list.len();
            list.retain(|h| !h.lock().is_expired(now));
            removed += before - list.len();
            !list.is_empty()
        });
        removed
    }

    /// Total registered handlers.
    pub fn len(&self) -> usize {
        self.inner.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResultHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::LocalResponder;
    use shared_crypto::hash;

    const NOW: Timestamp = Timestamp(1_000);

    fn handler(key: HashCode, responder_id: u64) -> ResultHandler {
        let (responder, _rx) = LocalResponder::channel(responder_id);
        ResultHandler {
            id: 0,
            query_key: key,
            block_type: BlockType::TEST,
            flags: 0,
            result_filter: ResultFilter::default(),
            xquery: vec![],
            started_at: NOW,
            responder: Arc::new(responder),
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ResultHandlerRegistry::new();
        let key = hash(b"query");

        let id = registry.register(handler(key, 1));
        assert!(id > 0);

        let found = registry.lookup(&key);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].lock().id, id);
        assert!(registry.lookup(&hash(b"other")).is_empty());
    }

    #[test]
    fn test_duplicate_registration_coalesces() {
        let registry = ResultHandlerRegistry::new();
        let key = hash(b"query");

        let first = registry.register(handler(key, 1));
        let second = registry.register(handler(key, 1));
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);

        // Different recipient: genuinely new handler.
        let third = registry.register(handler(key, 2));
        assert_ne!(first, third);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_complete_removes() {
        let registry = ResultHandlerRegistry::new();
        let key = hash(b"query");
        let id = registry.register(handler(key, 1));

        assert!(registry.complete(&key, id));
        assert!(!registry.complete(&key, id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_expiry_after_one_hour() {
        let registry = ResultHandlerRegistry::new();
        let key = hash(b"query");
        registry.register(handler(key, 1));

        assert_eq!(registry.expire(NOW.add_secs(HANDLER_LIFETIME_SECS - 1)), 0);
        assert_eq!(registry.expire(NOW.add_secs(HANDLER_LIFETIME_SECS)), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_coalescing_refreshes_clock() {
        let registry = ResultHandlerRegistry::new();
        let key = hash(b"query");
        registry.register(handler(key, 1));

        // Re-register shortly before expiry.
        let mut refreshed = handler(key, 1);
        refreshed.started_at = NOW.add_secs(3_000);
        registry.register(refreshed);

        // The original deadline passes without the handler dying.
        assert_eq!(registry.expire(NOW.add_secs(HANDLER_LIFETIME_SECS)), 0);
        assert_eq!(registry.len(), 1);
    }
}
