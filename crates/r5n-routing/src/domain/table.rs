//! The routing table.
//!
//! 512 k-buckets indexed by XOR distance from the local address,
//! plus a fast map of every known peer. Mutations are synchronous;
//! concurrent use goes through the caller's reader-writer lock.

use std::cmp::Ordering;
use std::collections::HashMap;

use rand::Rng;
use shared_types::{PeerId, Timestamp};
use tracing::trace;

use super::address::{bucket_index, closer_to, xor_distance, PeerAddress};
use super::bucket::{KBucket, PeerEntry};
use super::config::{RoutingConfig, NUM_BUCKETS};

/// Result of probing a peer's slot before insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerCheck {
    /// Peer is absent and its bucket has room.
    Vacant,
    /// Peer is already in the table.
    Present,
    /// Peer is absent and its bucket is full.
    BucketFull,
}

impl PeerCheck {
    /// Numeric state: 0 means an insertion would succeed outright.
    pub fn as_state(&self) -> u32 {
        match self {
            PeerCheck::Vacant => 0,
            PeerCheck::Present => 1,
            PeerCheck::BucketFull => 2,
        }
    }
}

/// How `select_peer` picks among eligible peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Weighted-random below the network-size estimate, closest above.
    #[default]
    Auto,
    /// Always weighted-random (initial fan-out behavior).
    WeightedRandom,
    /// Always the closest non-excluded peer.
    Closest,
}

/// Point-in-time counters for logging and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTableStats {
    pub total_peers: usize,
    pub connected_peers: usize,
    pub buckets_used: usize,
    pub size_estimate_log: u32,
}

/// The R5N routing table.
#[derive(Debug)]
pub struct RoutingTable {
    local_id: PeerId,
    local_address: PeerAddress,
    buckets: Vec<KBucket>,
    /// Fast set of all known peers, mapping to their bucket index.
    known: HashMap<PeerId, usize>,
    config: RoutingConfig,
}

impl RoutingTable {
    /// Create an empty table around the local identity.
    pub fn new(local_id: PeerId, config: RoutingConfig) -> Self {
        Self {
            local_id,
            local_address: PeerAddress::from_peer_id(&local_id),
            buckets: (0..NUM_BUCKETS).map(|_| KBucket::new()).collect(),
            known: HashMap::new(),
            config,
        }
    }

    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn local_address(&self) -> &PeerAddress {
        &self.local_address
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Total number of known peers.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Iterate over every peer entry in the table.
    pub fn peers(&self) -> impl Iterator<Item = &PeerEntry> {
        self.buckets.iter().flat_map(|b| b.peers().iter())
    }

    /// Crude log2 estimate of the network size from the known-peer
    /// count. Feeds the random-vs-greedy switch in `select_peer` and
    /// the fan-out ceiling in `compute_out_degree`.
    pub fn size_estimate_log(&self) -> u32 {
        let n = self.known.len() + 1;
        n.next_power_of_two().trailing_zeros()
    }

    /// Learn a peer, or refresh it if already known.
    ///
    /// Returns `true` only when the peer was actually inserted. A
    /// full bucket refuses insertion unless it holds a disconnected
    /// entry, in which case the least-recently-seen disconnected
    /// entry is replaced. Connected entries are never evicted.
    pub fn add(&mut self, peer_id: PeerId, connected: bool, now: Timestamp) -> bool {
        if peer_id == self.local_id {
            return false;
        }

        if self.known.contains_key(&peer_id) {
            self.update_state(&peer_id, connected, now);
            return false;
        }

        let entry = PeerEntry::new(peer_id, connected, now);
        let Some(idx) = bucket_index(&self.local_address, &entry.address) else {
            // Address collision with ourselves; refuse.
            return false;
        };

        let capacity = self.config.bucket_size;
        let bucket = &mut self.buckets[idx];

        if bucket.is_full(capacity) {
            let Some(victim) = bucket.eviction_candidate().map(|p| p.peer_id) else {
                trace!(bucket = idx, "bucket full of connected peers, refusing {}", peer_id);
                return false;
            };
            bucket.remove(&victim);
            self.known.remove(&victim);
        }

        bucket.push(entry);
        self.known.insert(peer_id, idx);
        true
    }

    /// Forget a peer. Returns `false` when it was not present.
    pub fn remove(&mut self, peer_id: &PeerId) -> bool {
        let Some(idx) = self.known.remove(peer_id) else {
            return false;
        };
        self.buckets[idx].remove(peer_id).is_some()
    }

    /// Probe the peer's slot: vacant, present, or blocked by a full
    /// bucket.
    pub fn check(&self, peer_id: &PeerId) -> PeerCheck {
        if self.known.contains_key(peer_id) {
            return PeerCheck::Present;
        }
        let address = PeerAddress::from_peer_id(peer_id);
        match bucket_index(&self.local_address, &address) {
            Some(idx) if self.buckets[idx].is_full(self.config.bucket_size) => {
                PeerCheck::BucketFull
            }
            _ => PeerCheck::Vacant,
        }
    }

    /// Look up a peer entry.
    pub fn lookup(&self, peer_id: &PeerId) -> Option<&PeerEntry> {
        let idx = *self.known.get(peer_id)?;
        self.buckets[idx].get(peer_id)
    }

    /// Update connection state and recency for a known peer.
    pub fn update_state(&mut self, peer_id: &PeerId, connected: bool, now: Timestamp) {
        let Some(idx) = self.known.get(peer_id).copied() else {
            return;
        };
        if let Some(entry) = self.buckets[idx].get_mut(peer_id) {
            if entry.connected && !connected {
                entry.disconnect_at = Some(now);
            }
            entry.connected = connected;
            entry.last_seen = now;
        }
    }

    /// Refresh a peer's `last_seen`.
    pub fn touch(&mut self, peer_id: &PeerId, now: Timestamp) {
        let Some(idx) = self.known.get(peer_id).copied() else {
            return;
        };
        if let Some(entry) = self.buckets[idx].get_mut(peer_id) {
            entry.last_seen = now;
        }
    }

    /// Decide whether (candidate or local) is the closest node to
    /// `target` among everything this table knows, ignoring peers
    /// matched by `exclude`.
    pub fn is_closest_peer(
        &self,
        candidate: Option<&PeerAddress>,
        target: &PeerAddress,
        exclude: &dyn Fn(&PeerId) -> bool,
        hop_count: u16,
    ) -> bool {
        let reference = candidate.unwrap_or(&self.local_address);
        for entry in self.peers() {
            if exclude(&entry.peer_id) {
                continue;
            }
            if closer_to(&entry.address, reference, target) == Ordering::Less {
                trace!(
                    hop_count,
                    closer = %entry.peer_id,
                    "closest-peer check failed"
                );
                return false;
            }
        }
        true
    }

    /// Pick a forwarding target for a message headed to `target`.
    ///
    /// During the initial hops (hop_count at or below the network
    /// size estimate) the pick is weighted-random to spread load and
    /// escape local minima; afterwards it is greedy. Only connected,
    /// non-excluded peers are eligible.
    pub fn select_peer(
        &self,
        target: &PeerAddress,
        hop_count: u16,
        exclude: &dyn Fn(&PeerId) -> bool,
        mode: SelectionMode,
    ) -> Option<PeerEntry> {
        let eligible: Vec<&PeerEntry> = self
            .peers()
            .filter(|p| p.connected && !exclude(&p.peer_id))
            .collect();
        if eligible.is_empty() {
            return None;
        }

        let random_phase = match mode {
            SelectionMode::Auto => u32::from(hop_count) <= self.size_estimate_log(),
            SelectionMode::WeightedRandom => true,
            SelectionMode::Closest => false,
        };

        if random_phase {
            Some(Self::weighted_pick(&eligible, target).clone())
        } else {
            eligible
                .into_iter()
                .min_by(|a, b| closer_to(&a.address, &b.address, target))
                .cloned()
        }
    }

    /// Uniformly random connected peer outside `exclude`.
    pub fn select_random_peer(&self, exclude: &dyn Fn(&PeerId) -> bool) -> Option<PeerEntry> {
        let eligible: Vec<&PeerEntry> = self
            .peers()
            .filter(|p| p.connected && !exclude(&p.peer_id))
            .collect();
        if eligible.is_empty() {
            return None;
        }
        let pick = rand::thread_rng().gen_range(0..eligible.len());
        Some(eligible[pick].clone())
    }

    /// Number of peers a message should be forwarded to.
    ///
    /// Decreases monotonically with hop count and grows with the
    /// requested replication level; far-travelled messages fan out to
    /// a single peer and eventually to none.
    pub fn compute_out_degree(&self, repl_level: u32, hop_count: u16) -> usize {
        let log_n = self.size_estimate_log();
        let hops = u32::from(hop_count);

        if hops > 4 * log_n {
            return 0;
        }
        if hops > 2 * log_n {
            return 1;
        }
        let degree = 1 + (repl_level as usize) / (hops as usize + 1);
        degree.min(self.config.max_out_degree)
    }

    /// Counters for diagnostics.
    pub fn stats(&self) -> RoutingTableStats {
        RoutingTableStats {
            total_peers: self.known.len(),
            connected_peers: self.peers().filter(|p| p.connected).count(),
            buckets_used: self.buckets.iter().filter(|b| !b.is_empty()).count(),
            size_estimate_log: self.size_estimate_log(),
        }
    }

    /// Access a bucket by index (diagnostics and tests).
    pub fn bucket(&self, index: usize) -> Option<&KBucket> {
        self.buckets.get(index)
    }

    /// Bucket index a peer lives in, if known.
    pub fn bucket_of(&self, peer_id: &PeerId) -> Option<usize> {
        self.known.get(peer_id).copied()
    }

    fn weighted_pick<'a>(eligible: &[&'a PeerEntry], target: &PeerAddress) -> &'a PeerEntry {
        // Weight by bucket index relative to the target, so the
        // random phase still drifts toward the key.
        let weights: Vec<u64> = eligible
            .iter()
            .map(|p| match bucket_index(&p.address, target) {
                Some(idx) => idx as u64 + 1,
                None => NUM_BUCKETS as u64 + 1,
            })
            .collect();
        let total: u64 = weights.iter().sum();
        let mut roll = rand::thread_rng().gen_range(0..total);
        for (entry, weight) in eligible.iter().copied().zip(weights) {
            if roll < weight {
                return entry;
            }
            roll -= weight;
        }
        eligible[eligible.len() - 1]
    }
}

impl std::fmt::Display for PeerCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerCheck::Vacant => write!(f, "vacant"),
            PeerCheck::Present => write!(f, "present"),
            PeerCheck::BucketFull => write!(f, "bucket full"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::HashCode;

    fn table() -> RoutingTable {
        RoutingTable::new(PeerId::new([0u8; 32]), RoutingConfig::for_testing())
    }

    fn peer(fill: u8) -> PeerId {
        PeerId::new([fill; 32])
    }

    const NOW: Timestamp = Timestamp(1_000);

    #[test]
    fn test_add_and_lookup() {
        let mut rt = table();
        assert!(rt.add(peer(1), true, NOW));
        assert_eq!(rt.len(), 1);

        let entry = rt.lookup(&peer(1)).expect("peer present");
        assert!(entry.connected);
        assert_eq!(entry.last_seen, NOW);
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut rt = table();
        assert!(rt.add(peer(1), true, NOW));
        assert!(!rt.add(peer(1), true, NOW.add_secs(5)));
        assert_eq!(rt.len(), 1);
        // The re-add still refreshed recency.
        assert_eq!(rt.lookup(&peer(1)).unwrap().last_seen, NOW.add_secs(5));
    }

    #[test]
    fn test_cannot_add_self() {
        let mut rt = table();
        let local = *rt.local_peer_id();
        assert!(!rt.add(local, true, NOW));
        assert!(rt.is_empty());
    }

    #[test]
    fn test_remove_restores_prior_set() {
        let mut rt = table();
        rt.add(peer(1), true, NOW);
        rt.add(peer(2), false, NOW);

        assert!(rt.remove(&peer(2)));
        assert!(!rt.remove(&peer(2)));

        let remaining: Vec<PeerId> = rt.peers().map(|p| p.peer_id).collect();
        assert_eq!(remaining, vec![peer(1)]);
    }

    #[test]
    fn test_bucket_invariant_holds_for_all_peers() {
        let mut rt = table();
        for fill in 1..60u8 {
            rt.add(peer(fill), fill % 2 == 0, NOW);
        }

        for entry in rt.peers() {
            let expected = bucket_index(rt.local_address(), &entry.address).unwrap();
            assert_eq!(rt.bucket_of(&entry.peer_id), Some(expected));
            assert!(rt.bucket(expected).unwrap().contains(&entry.peer_id));
        }
    }

    #[test]
    fn test_full_bucket_refuses_connected_peers() {
        let mut rt = table();
        // Find peers that share one bucket by brute force.
        let mut in_bucket: Vec<PeerId> = Vec::new();
        let mut target_bucket = None;
        for fill in 1..255u8 {
            let address = PeerAddress::from_peer_id(&peer(fill));
            let idx = bucket_index(rt.local_address(), &address).unwrap();
            match target_bucket {
                None => {
                    target_bucket = Some(idx);
                    in_bucket.push(peer(fill));
                }
                Some(t) if t == idx => in_bucket.push(peer(fill)),
                _ => {}
            }
            if in_bucket.len() > rt.config().bucket_size {
                break;
            }
        }
        assert!(in_bucket.len() > rt.config().bucket_size, "need K+1 colliding peers");

        // Fill the bucket with connected peers.
        for id in &in_bucket[..rt.config().bucket_size] {
            assert!(rt.add(*id, true, NOW));
        }
        // K+1-th insertion fails: nothing is evictable.
        let overflow = in_bucket[rt.config().bucket_size];
        assert!(!rt.add(overflow, true, NOW));
        assert_eq!(rt.check(&overflow), PeerCheck::BucketFull);

        // Disconnect one entry; now the same insertion evicts it.
        rt.update_state(&in_bucket[0], false, NOW);
        assert!(rt.add(overflow, true, NOW.add_secs(1)));
        assert!(rt.lookup(&in_bucket[0]).is_none());
        assert!(rt.lookup(&overflow).is_some());
    }

    #[test]
    fn test_check_states() {
        let mut rt = table();
        assert_eq!(rt.check(&peer(1)), PeerCheck::Vacant);
        assert_eq!(rt.check(&peer(1)).as_state(), 0);

        rt.add(peer(1), true, NOW);
        assert_eq!(rt.check(&peer(1)), PeerCheck::Present);
        assert!(rt.check(&peer(1)).as_state() > 0);
    }

    #[test]
    fn test_is_closest_peer_empty_table() {
        let rt = table();
        let target = PeerAddress::from_hash(HashCode::new([0xAB; 64]));
        assert!(rt.is_closest_peer(None, &target, &|_| false, 0));
    }

    #[test]
    fn test_is_closest_peer_detects_closer_entry() {
        let mut rt = table();
        // Target equal to a peer's address: that peer is at distance
        // zero, strictly closer than the local node.
        let other = peer(9);
        let other_address = PeerAddress::from_peer_id(&other);
        rt.add(other, true, NOW);

        assert!(!rt.is_closest_peer(None, &other_address, &|_| false, 0));
        // Excluding the peer flips the verdict.
        assert!(rt.is_closest_peer(None, &other_address, &|p| *p == other, 0));
    }

    #[test]
    fn test_select_peer_respects_exclusion() {
        let mut rt = table();
        rt.add(peer(1), true, NOW);
        rt.add(peer(2), true, NOW);

        let target = PeerAddress::from_hash(HashCode::new([0x55; 64]));
        let excluded = peer(1);
        for _ in 0..20 {
            let picked = rt
                .select_peer(&target, 0, &|p| *p == excluded, SelectionMode::Auto)
                .expect("one eligible peer");
            assert_eq!(picked.peer_id, peer(2));
        }
    }

    #[test]
    fn test_select_peer_greedy_picks_closest() {
        let mut rt = table();
        for fill in 1..30u8 {
            rt.add(peer(fill), true, NOW);
        }
        let target = PeerAddress::from_peer_id(&peer(17));

        let picked = rt
            .select_peer(&target, 60, &|_| false, SelectionMode::Closest)
            .expect("table not empty");
        assert_eq!(picked.peer_id, peer(17));
    }

    #[test]
    fn test_select_peer_ignores_disconnected() {
        let mut rt = table();
        rt.add(peer(1), false, NOW);

        let target = PeerAddress::from_hash(HashCode::new([0x55; 64]));
        assert!(rt.select_peer(&target, 0, &|_| false, SelectionMode::Auto).is_none());
        assert!(rt.select_random_peer(&|_| false).is_none());
    }

    #[test]
    fn test_out_degree_monotone_in_hops() {
        let mut rt = table();
        for fill in 1..40u8 {
            rt.add(peer(fill), true, NOW);
        }

        let mut previous = usize::MAX;
        for hops in 0..64u16 {
            let degree = rt.compute_out_degree(4, hops);
            assert!(degree <= previous, "degree must not grow with hops");
            previous = degree;
        }
        // Far-travelled messages stop being forwarded at all.
        assert_eq!(rt.compute_out_degree(4, 1000), 0);
    }

    #[test]
    fn test_out_degree_grows_with_replication() {
        let mut rt = table();
        for fill in 1..40u8 {
            rt.add(peer(fill), true, NOW);
        }
        assert!(rt.compute_out_degree(8, 0) >= rt.compute_out_degree(1, 0));
    }

    #[test]
    fn test_stats() {
        let mut rt = table();
        rt.add(peer(1), true, NOW);
        rt.add(peer(2), false, NOW);

        let stats = rt.stats();
        assert_eq!(stats.total_peers, 2);
        assert_eq!(stats.connected_peers, 1);
        assert!(stats.buckets_used >= 1);
    }
}
