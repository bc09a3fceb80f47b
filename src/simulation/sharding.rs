//! Sharding Simulation

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{pause, random_duration, workload_rng, ShardingSimConfig};
use crate::cluster::{ShardRouter, ShardStats};
use crate::error::Result;

/// Outcome of a sharding simulation run
#[derive(Debug, Clone, Default)]
pub struct ShardingReport {
    pub writes: u64,
    pub read_hits: u64,
    pub read_misses: u64,
    pub shards: Vec<ShardStats>,
    /// Rendered histogram of keys per shard
    pub distribution: String,
    pub cancelled: bool,
}

impl fmt::Display for ShardingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Writes: {} | Reads: {} hit, {} miss",
            self.writes, self.read_hits, self.read_misses
        )?;
        f.write_str(&self.distribution)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ReadTally {
    hits: u64,
    misses: u64,
}

/// A router over N shards, a writer and a reader
pub struct ShardingSimulation {
    config: ShardingSimConfig,
    router: Arc<ShardRouter>,
}

impl ShardingSimulation {
    pub fn new(config: ShardingSimConfig) -> Result<Self> {
        let router = ShardRouter::with_write_latency(config.shards, config.write_latency)?;
        info!("Topology ready: {} Shards", router.shard_count());
        Ok(Self {
            config,
            router: Arc::new(router),
        })
    }

    pub fn router(&self) -> &Arc<ShardRouter> {
        &self.router
    }

    /// Write `{prefix}:{i}` for every i while a reader probes random keys,
    /// some of which don't exist yet.
    pub async fn run(&self, shutdown: CancellationToken) -> ShardingReport {
        let tasks = shutdown.child_token();

        let reader = tokio::spawn(run_reader(
            Arc::clone(&self.router),
            self.config.clone(),
            workload_rng(self.config.seed, 1),
            tasks.clone(),
        ));

        info!("Starting workload");
        let mut writes = 0;
        for i in 0..self.config.total_keys {
            if shutdown.is_cancelled() {
                break;
            }
            let key = format!("{}:{}", self.config.key_prefix, i);
            let value = format!("data-{}", i);

            let shard_id = self.router.add_key(&key, &value).await;
            writes += 1;
            info!(key = %key, shard_id, "Write routed");

            if !pause(&shutdown, self.config.write_delay).await {
                break;
            }
        }

        if !shutdown.is_cancelled() {
            info!("Workload complete, letting readers settle");
            pause(&shutdown, self.config.settle_time).await;
        }

        tasks.cancel();
        let reads = match reader.await {
            Ok(tally) => tally,
            Err(err) => {
                warn!(error = %err, "Reader task failed");
                ReadTally::default()
            }
        };

        ShardingReport {
            writes,
            read_hits: reads.hits,
            read_misses: reads.misses,
            shards: self.router.stats(),
            distribution: self.router.distribution_report(),
            cancelled: shutdown.is_cancelled(),
        }
    }
}

async fn run_reader(
    router: Arc<ShardRouter>,
    config: ShardingSimConfig,
    mut rng: StdRng,
    shutdown: CancellationToken,
) -> ReadTally {
    let mut tally = ReadTally::default();
    if config.total_keys == 0 {
        return tally;
    }

    while !shutdown.is_cancelled() {
        let key = format!("{}:{}", config.key_prefix, rng.gen_range(0..config.total_keys));
        let (_, shard_id) = router.shard_for(&key);
        match router.get_key(&key) {
            Some(value) => {
                tally.hits += 1;
                info!(key = %key, shard_id, %value, "Read hit");
            }
            None => {
                tally.misses += 1;
                debug!(key = %key, shard_id, "Read miss");
            }
        }

        let delay = random_duration(&mut rng, config.read_delay_min, config.read_delay_max);
        if !pause(&shutdown, delay).await {
            break;
        }
    }

    tally
}
