//! Simulation Module
//!
//! Orchestrators that build a topology, drive a synthetic workload against
//! it and tear everything down on cancellation.

mod config;
mod replication;
mod sharding;

pub use config::{ReplicationSimConfig, ShardingSimConfig};
pub use replication::{ReplicationReport, ReplicationSimulation};
pub use sharding::{ShardingReport, ShardingSimulation};

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

/// Workload RNG, reproducible when a seed is given. `stream` separates the
/// writer and reader sequences drawn from the same seed.
pub(crate) fn workload_rng(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
        None => StdRng::from_entropy(),
    }
}

/// Uniform duration in [min, max); `min` when the range is empty
pub(crate) fn random_duration(rng: &mut StdRng, min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rng.gen_range(min..max)
}

/// Sleep unless cancelled first. Returns false if cancelled.
pub(crate) async fn pause(shutdown: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
