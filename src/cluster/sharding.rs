//! Sharding Module
//!
//! Static hash partitioning: a key lives on shard `crc32(key) % N`, where N
//! is fixed when the router is built. Shards are never rebalanced.

use std::fmt::Write as _;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{ClusterError, Result};
use crate::storage::Store;

/// Simulated disk latency of a shard write
pub const DEFAULT_WRITE_LATENCY: Duration = Duration::from_millis(10);

/// Width of the widest bar in [`ShardRouter::distribution_report`]
const REPORT_BAR_WIDTH: usize = 20;

/// Shard index for a key given `shard_count` partitions
pub fn shard_index(key: &str, shard_count: usize) -> usize {
    debug_assert!(shard_count > 0);
    crc32fast::hash(key.as_bytes()) as usize % shard_count
}

/// A single partition holding a subset of the keys
#[derive(Debug)]
pub struct ShardNode {
    id: usize,
    store: Store,
    write_latency: Duration,
}

impl ShardNode {
    pub fn new(id: usize) -> Self {
        Self::with_write_latency(id, DEFAULT_WRITE_LATENCY)
    }

    pub fn with_write_latency(id: usize, write_latency: Duration) -> Self {
        Self {
            id,
            store: Store::new(),
            write_latency,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Store a key after the simulated write latency
    pub async fn write(&self, key: &str, value: &str) {
        if !self.write_latency.is_zero() {
            tokio::time::sleep(self.write_latency).await;
        }
        self.store.set(key, value);
        info!(shard_id = self.id, key, value, "Data written to shard");
    }

    pub fn read(&self, key: &str) -> Option<String> {
        let value = self.store.get(key);
        if value.is_some() {
            debug!(shard_id = self.id, key, "Data read from shard");
        } else {
            debug!(shard_id = self.id, key, "Key not found in shard");
        }
        value
    }

    /// Number of keys stored on this shard
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

/// Key count of one shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardStats {
    pub shard_id: usize,
    pub keys: usize,
}

/// Routes keys to a fixed set of shards
#[derive(Debug)]
pub struct ShardRouter {
    shards: Vec<ShardNode>,
}

impl ShardRouter {
    pub fn new(shard_count: usize) -> Result<Self> {
        Self::with_write_latency(shard_count, DEFAULT_WRITE_LATENCY)
    }

    pub fn with_write_latency(shard_count: usize, write_latency: Duration) -> Result<Self> {
        if shard_count == 0 {
            return Err(ClusterError::InvalidShardCount);
        }
        let shards = (0..shard_count)
            .map(|id| ShardNode::with_write_latency(id, write_latency))
            .collect();
        Ok(Self { shards })
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Resolve the shard owning `key`
    pub fn shard_for(&self, key: &str) -> (&ShardNode, usize) {
        let shard_id = shard_index(key, self.shards.len());
        debug!(key, shard_id, "Routing request");
        (&self.shards[shard_id], shard_id)
    }

    /// Get a shard by index
    pub fn shard(&self, shard_id: usize) -> Option<&ShardNode> {
        self.shards.get(shard_id)
    }

    /// Route a write to the owning shard, returning its index
    pub async fn add_key(&self, key: &str, value: &str) -> usize {
        let (shard, shard_id) = self.shard_for(key);
        shard.write(key, value).await;
        shard_id
    }

    /// Route a read to the owning shard
    pub fn get_key(&self, key: &str) -> Option<String> {
        let (shard, _) = self.shard_for(key);
        shard.read(key)
    }

    /// Key count per shard, ordered by shard index
    pub fn stats(&self) -> Vec<ShardStats> {
        self.shards
            .iter()
            .map(|shard| ShardStats {
                shard_id: shard.id(),
                keys: shard.len(),
            })
            .collect()
    }

    /// Text histogram of keys per shard
    pub fn distribution_report(&self) -> String {
        let stats = self.stats();
        let max = stats.iter().map(|s| s.keys).max().unwrap_or(0);

        let mut out = String::from("=== Shard Distribution Stats ===\n");
        for s in &stats {
            let bar_len = if max == 0 {
                0
            } else {
                (s.keys * REPORT_BAR_WIDTH).div_ceil(max)
            };
            let bar = "█".repeat(bar_len);
            // Padding is by char count since the bar glyph is multi-byte
            let pad = " ".repeat(REPORT_BAR_WIDTH - bar_len);
            if writeln!(out, "Shard {}: [{}{}] {} keys", s.shard_id, bar, pad, s.keys).is_err() {
                warn!("Failed to render shard distribution");
                break;
            }
        }
        out.push_str("================================");
        out
    }
}
