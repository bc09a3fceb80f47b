//! Simulation Configuration

use std::time::Duration;

use crate::cluster::ReplicationConfig;
use crate::cluster::sharding::DEFAULT_WRITE_LATENCY;

/// Leader/follower simulation configuration
#[derive(Debug, Clone)]
pub struct ReplicationSimConfig {
    /// Number of followers behind the single leader
    pub followers: usize,

    /// Writes issued by the workload
    pub write_count: usize,

    /// Upper bound (exclusive) of the think time between writes
    pub max_write_delay: Duration,

    /// Pause between two client reads
    pub read_interval: Duration,

    /// Time left for replication to finish once the writes are done
    pub settle_time: Duration,

    /// Key the reader polls on random followers
    pub probe_key: String,

    /// Per-node replication settings
    pub replication: ReplicationConfig,

    /// Seed for the workload generators (None = from entropy)
    pub seed: Option<u64>,
}

impl Default for ReplicationSimConfig {
    fn default() -> Self {
        Self {
            followers: 3,
            write_count: 5,
            max_write_delay: Duration::from_millis(800),
            read_interval: Duration::from_millis(500),
            settle_time: Duration::from_secs(1),
            probe_key: "user:100".to_string(),
            replication: ReplicationConfig::default(),
            seed: None,
        }
    }
}

impl ReplicationSimConfig {
    pub fn with_followers(mut self, followers: usize) -> Self {
        self.followers = followers;
        self
    }

    pub fn with_write_count(mut self, count: usize) -> Self {
        self.write_count = count;
        self
    }

    pub fn with_max_write_delay(mut self, delay: Duration) -> Self {
        self.max_write_delay = delay;
        self
    }

    pub fn with_read_interval(mut self, interval: Duration) -> Self {
        self.read_interval = interval;
        self
    }

    pub fn with_settle_time(mut self, settle: Duration) -> Self {
        self.settle_time = settle;
        self
    }

    pub fn with_replication(mut self, replication: ReplicationConfig) -> Self {
        self.replication = replication;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Sharding simulation configuration
#[derive(Debug, Clone)]
pub struct ShardingSimConfig {
    /// Number of shards
    pub shards: usize,

    /// Keys written, named `{key_prefix}:{i}`
    pub total_keys: usize,

    pub key_prefix: String,

    /// Pause between two writes
    pub write_delay: Duration,

    /// Simulated disk latency per shard write
    pub write_latency: Duration,

    /// Reader pause is drawn from [read_delay_min, read_delay_max)
    pub read_delay_min: Duration,
    pub read_delay_max: Duration,

    /// Time left for the reader once the writes are done
    pub settle_time: Duration,

    /// Seed for the reader's key choice (None = from entropy)
    pub seed: Option<u64>,
}

impl Default for ShardingSimConfig {
    fn default() -> Self {
        Self {
            shards: 4,
            total_keys: 50,
            key_prefix: "user".to_string(),
            write_delay: Duration::from_millis(50),
            write_latency: DEFAULT_WRITE_LATENCY,
            read_delay_min: Duration::from_millis(20),
            read_delay_max: Duration::from_millis(100),
            settle_time: Duration::from_secs(1),
            seed: None,
        }
    }
}

impl ShardingSimConfig {
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn with_total_keys(mut self, total: usize) -> Self {
        self.total_keys = total;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    pub fn with_write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = latency;
        self
    }

    pub fn with_read_delay(mut self, min: Duration, max: Duration) -> Self {
        self.read_delay_min = min;
        self.read_delay_max = max;
        self
    }

    pub fn with_settle_time(mut self, settle: Duration) -> Self {
        self.settle_time = settle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
