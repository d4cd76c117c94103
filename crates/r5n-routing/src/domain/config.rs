//! Routing table configuration.

/// Number of k-buckets, one per possible leading-zero count of a
/// nonzero 512-bit distance.
pub const NUM_BUCKETS: usize = 512;

/// Default bucket capacity.
pub const K: usize = 20;

/// Tunables for the routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    /// Bucket capacity (default: 20).
    pub bucket_size: usize,
    /// Capacity of the HELLO cache (entries).
    pub hello_cache_size: usize,
    /// Hard ceiling on forwarding fan-out per message.
    pub max_out_degree: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            bucket_size: K,
            hello_cache_size: 1024,
            max_out_degree: 16,
        }
    }
}

impl RoutingConfig {
    /// Smaller limits for deterministic tests.
    pub fn for_testing() -> Self {
        Self {
            bucket_size: 3,
            hello_cache_size: 8,
            max_out_degree: 4,
        }
    }
}
