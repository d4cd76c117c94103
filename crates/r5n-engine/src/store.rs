//! The block store port and its in-memory implementation.
//!
//! Exact lookups filter against the query's result filter and feed
//! every returned hit back into it; approximate lookups walk the
//! keyspace by XOR distance, bounded by [`MAX_SORT_RESULTS`].
//! Persistent SQL/filesystem backends implement the same [`Store`]
//! trait outside the core.

use std::collections::HashMap;

use parking_lot::Mutex;
use shared_crypto::{hash, HashCode};
use shared_types::Timestamp;
use tracing::debug;

use r5n_blocks::{Block, Query, ResultFilter};

use crate::errors::EngineError;
use crate::path::Path;

/// Upper bound on approximate lookup results.
pub const MAX_SORT_RESULTS: usize = 10;

/// A stored block plus its recorded route, when the originator asked
/// for one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtEntry {
    pub block: Block,
    pub path: Option<Path>,
}

/// An approximate lookup hit with its key distance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtResult {
    pub entry: DhtEntry,
    /// Bit length of the XOR between the stored key and the query
    /// key; zero for an exact hit.
    pub distance: u32,
}

/// The storage interface the engine consumes.
pub trait Store: Send + Sync {
    /// Exact-key lookup, excluding entries matched by `rf`. Every
    /// returned hit is added to `rf` first.
    fn get(&self, query: &Query, rf: &mut ResultFilter, now: Timestamp) -> Vec<DhtEntry>;

    /// Nearest-neighbor lookup by key distance, bounded by
    /// [`MAX_SORT_RESULTS`], with the same filter discipline.
    fn get_approx(&self, query: &Query, rf: &mut ResultFilter, now: Timestamp) -> Vec<DhtResult>;

    /// Insert an entry under a key. Expired entries are dropped
    /// outright; quota pressure evicts replaceable entries but never
    /// the last live entry of a key.
    fn put(&self, key: &HashCode, entry: DhtEntry, now: Timestamp) -> Result<(), EngineError>;

    /// Discard expired entries; returns how many were removed.
    fn expire_entries(&self, now: Timestamp) -> usize;

    /// Total number of stored entries.
    fn len(&self) -> usize;
}

/// Store quotas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Global entry quota.
    pub max_entries: usize,
    /// Per-key entry cap.
    pub max_entries_per_key: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_entries: 4096,
            max_entries_per_key: 16,
        }
    }
}

impl StoreConfig {
    pub fn for_testing() -> Self {
        Self {
            max_entries: 8,
            max_entries_per_key: 2,
        }
    }
}

/// Quota-bounded in-memory store.
pub struct MemoryStore {
    inner: Mutex<HashMap<HashCode, Vec<DhtEntry>>>,
    config: StoreConfig,
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn matches(query: &Query, entry: &DhtEntry, now: Timestamp) -> bool {
        if entry.block.is_expired(now) {
            return false;
        }
        query.block_type.is_any() || entry.block.block_type == query.block_type
    }

    fn key_distance(a: &HashCode, b: &HashCode) -> u32 {
        512 - a.xor(b).leading_zero_bits()
    }
}

impl Store for MemoryStore {
    fn get(&self, query: &Query, rf: &mut ResultFilter, now: Timestamp) -> Vec<DhtEntry> {
        let inner = self.inner.lock();
        let Some(entries) = inner.get(&query.key) else {
            return Vec::new();
        };

        let mut hits = Vec::new();
        for entry in entries {
            if !Self::matches(query, entry, now) {
                continue;
            }
            let digest = hash(&entry.block.payload);
            if rf.contains(&digest) {
                continue;
            }
            rf.insert(&digest);
            hits.push(entry.clone());
        }
        hits
    }

    fn get_approx(&self, query: &Query, rf: &mut ResultFilter, now: Timestamp) -> Vec<DhtResult> {
        let inner = self.inner.lock();

        let mut keys: Vec<&HashCode> = inner.keys().collect();
        keys.sort_by_key(|k| Self::key_distance(k, &query.key));

        let mut hits = Vec::new();
        'keys: for key in keys {
            let distance = Self::key_distance(key, &query.key);
            for entry in &inner[key] {
                if !Self::matches(query, entry, now) {
                    continue;
                }
                let digest = hash(&entry.block.payload);
                if rf.contains(&digest) {
                    continue;
                }
                rf.insert(&digest);
                hits.push(DhtResult {
                    entry: entry.clone(),
                    distance,
                });
                if hits.len() >= MAX_SORT_RESULTS {
                    break 'keys;
                }
            }
        }
        hits
    }

    fn put(&self, key: &HashCode, entry: DhtEntry, now: Timestamp) -> Result<(), EngineError> {
        if entry.block.is_expired(now) {
            debug!("dropping expired block on put");
            return Ok(());
        }

        let mut inner = self.inner.lock();

        // Replace an identical payload in place: repeated puts of the
        // same entry keep exactly one copy.
        let digest = hash(&entry.block.payload);
        let slot = inner.entry(*key).or_default();
        if let Some(existing) = slot
            .iter_mut()
            .find(|e| hash(&e.block.payload) == digest)
        {
            *existing = entry;
            return Ok(());
        }

        // Per-key cap: drop the earliest-expiring sibling.
        if slot.len() >= self.config.max_entries_per_key {
            if let Some(pos) = slot
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.block.expire)
                .map(|(pos, _)| pos)
            {
                slot.remove(pos);
            }
        }
        slot.push(entry);

        // Global quota: purge expired entries first, then shrink a
        // key that still has spares. The last live entry of a key is
        // never evicted.
        let total: usize = inner.values().map(Vec::len).sum();
        if total > self.config.max_entries {
            let mut freed = 0;
            for entries in inner.values_mut() {
                let before = entries.len();
                entries.retain(|e| !e.block.is_expired(now));
                freed += before - entries.len();
            }
            inner.retain(|_, v| !v.is_empty());

            if freed == 0 {
                let victim = inner
                    .iter()
                    .filter(|(k, v)| v.len() > 1 && *k != key)
                    .max_by_key(|(_, v)| v.len())
                    .map(|(k, v)| {
                        let pos = v
                            .iter()
                            .enumerate()
                            .min_by_key(|(_, e)| e.block.expire)
                            .map(|(pos, _)| pos)
                            .unwrap_or(0);
                        (*k, pos)
                    });
                if let Some((victim_key, pos)) = victim {
                    if let Some(entries) = inner.get_mut(&victim_key) {
                        entries.remove(pos);
                    }
                } else {
                    // Roll back the insertion we just made.
                    if let Some(slot) = inner.get_mut(key) {
                        slot.pop();
                        if slot.is_empty() {
                            inner.remove(key);
                        }
                    }
                    return Err(EngineError::StoreFull);
                }
            }
        }

        Ok(())
    }

    fn expire_entries(&self, now: Timestamp) -> usize {
        let mut inner = self.inner.lock();
        let mut removed = 0;
        for entries in inner.values_mut() {
            let before = entries.len();
            entries.retain(|e| !e.block.is_expired(now));
            removed += before - entries.len();
        }
        inner.retain(|_, v| !v.is_empty());
        removed
    }

    fn len(&self) -> usize {
        self.inner.lock().values().map(Vec::len).sum()
    }
}
