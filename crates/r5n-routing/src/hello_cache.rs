//! Bounded cache of HELLO advertisements.
//!
//! The cache stores the encoded HELLO block per peer address so GET
//! requests for HELLO types can be answered without touching the
//! block store. It lives beside the routing table and shares its
//! locking discipline. Capacity-bounded LRU; entries additionally
//! die at their advertised expiration.

use std::num::NonZeroUsize;

use lru::LruCache;
use shared_types::Timestamp;
use tracing::trace;

use crate::domain::{closer_to, PeerAddress};

/// A cached HELLO: the advertised expiration and the encoded block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedHello {
    pub address: PeerAddress,
    pub expire: Timestamp,
    pub block: Vec<u8>,
}

/// LRU cache of encoded HELLO blocks keyed by peer address.
pub struct HelloCache {
    entries: LruCache<PeerAddress, CachedHello>,
}

impl HelloCache {
    /// Create a cache bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cache a HELLO. Returns `false` when the block is already
    /// expired or an entry with the same or later expiration exists
    /// (a re-announced HELLO is only taken when strictly fresher).
    pub fn insert(
        &mut self,
        address: PeerAddress,
        expire: Timestamp,
        block: Vec<u8>,
        now: Timestamp,
    ) -> bool {
        if expire.is_expired(now) {
            return false;
        }
        if let Some(existing) = self.entries.peek(&address) {
            if existing.expire >= expire {
                trace!(%address, "HELLO not re-cached, no fresher expiration");
                return false;
            }
        }
        self.entries.put(
            address,
            CachedHello {
                address,
                expire,
                block,
            },
        );
        true
    }

    /// Exact lookup by address, skipping expired entries.
    pub fn get(&mut self, address: &PeerAddress, now: Timestamp) -> Option<CachedHello> {
        let expired = self.entries.peek(address)?.expire.is_expired(now);
        if expired {
            self.entries.pop(address);
            return None;
        }
        self.entries.get(address).cloned()
    }

    /// Up to `max` live entries nearest to `target`, closest first.
    pub fn lookup_closest(
        &self,
        target: &PeerAddress,
        max: usize,
        now: Timestamp,
    ) -> Vec<CachedHello> {
        let mut live: Vec<&CachedHello> = self
            .entries
            .iter()
            .map(|(_, v)| v)
            .filter(|v| !v.expire.is_expired(now))
            .collect();
        live.sort_by(|a, b| closer_to(&a.address, &b.address, target));
        live.into_iter().take(max).cloned().collect()
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn gc(&mut self, now: Timestamp) -> usize {
        let dead: Vec<PeerAddress> = self
            .entries
            .iter()
            .filter(|(_, v)| v.expire.is_expired(now))
            .map(|(k, _)| *k)
            .collect();
        for key in &dead {
            self.entries.pop(key);
        }
        dead.len()
    }
}

impl std::fmt::Debug for HelloCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelloCache")
            .field("len", &self.entries.len())
            .field("cap", &self.entries.cap())
            .finish()
    }
}
