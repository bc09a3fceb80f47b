//! Leader/Follower Simulation

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{pause, random_duration, workload_rng, ReplicationSimConfig};
use crate::cluster::{replication_channel, Node, NodeId, ReplicaReceiver};
use crate::error::Result;
use crate::metrics::Metrics;

/// Keys the writer picks from
const WRITE_KEYS: [&str; 3] = ["user:100", "product:550", "order:999"];

const LEADER_ID: NodeId = 0;

/// Outcome of a replication simulation run
#[derive(Debug, Clone, Default)]
pub struct ReplicationReport {
    pub writes: u64,
    pub failed_writes: u64,
    pub read_hits: u64,
    pub read_misses: u64,
    pub delivered: u64,
    pub applied: u64,
    pub timeouts: u64,
    /// Whether each follower's map matched the leader's at teardown
    pub converged: Vec<(NodeId, bool)>,
    pub cancelled: bool,
}

impl ReplicationReport {
    pub fn all_converged(&self) -> bool {
        self.converged.iter().all(|(_, ok)| *ok)
    }
}

impl fmt::Display for ReplicationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Writes: {} ({} failed) | Reads: {} hit, {} miss",
            self.writes, self.failed_writes, self.read_hits, self.read_misses
        )?;
        writeln!(
            f,
            "Delivered: {} | Applied: {} | Timeouts: {}",
            self.delivered, self.applied, self.timeouts
        )?;
        for (id, ok) in &self.converged {
            let status = if *ok { "in sync" } else { "diverged" };
            writeln!(f, "Follower {}: {}", id, status)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ReadTally {
    hits: u64,
    misses: u64,
}

/// One leader, N followers, a writer and a reader
pub struct ReplicationSimulation {
    config: ReplicationSimConfig,
    leader: Arc<Node>,
    followers: Vec<Arc<Node>>,
    /// Handed to the follower loops on the first run
    receivers: Vec<ReplicaReceiver>,
    metrics: Arc<Metrics>,
}

impl ReplicationSimulation {
    /// Build the topology: leader 0 and followers 1..=N, one channel each
    pub fn new(config: ReplicationSimConfig) -> Result<Self> {
        let metrics = Arc::new(Metrics::new());
        let leader = Arc::new(
            Node::leader(LEADER_ID)
                .with_config(config.replication.clone())
                .with_metrics(metrics.clone()),
        );

        let mut followers = Vec::with_capacity(config.followers);
        let mut receivers = Vec::with_capacity(config.followers);
        for i in 0..config.followers {
            let id = i as NodeId + 1;
            let follower = Node::follower(id)
                .with_config(config.replication.clone())
                .with_metrics(metrics.clone());
            let (tx, rx) = replication_channel(id, config.replication.channel_capacity);
            leader.add_replica(tx)?;
            followers.push(Arc::new(follower));
            receivers.push(rx);
        }

        info!("Topology ready: 1 Leader + {} Followers", followers.len());

        Ok(Self {
            config,
            leader,
            followers,
            receivers,
            metrics,
        })
    }

    pub fn leader(&self) -> &Arc<Node> {
        &self.leader
    }

    pub fn followers(&self) -> &[Arc<Node>] {
        &self.followers
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run the workload until it completes or `shutdown` fires.
    ///
    /// Follower loops only run during the first call; a later call still
    /// writes to the leader but nothing replicates.
    pub async fn run(&mut self, shutdown: CancellationToken) -> ReplicationReport {
        let tasks = shutdown.child_token();

        let listeners: Vec<JoinHandle<()>> = self
            .followers
            .iter()
            .zip(std::mem::take(&mut self.receivers))
            .map(|(follower, rx)| {
                let follower = Arc::clone(follower);
                let token = tasks.clone();
                tokio::spawn(async move { follower.run_follower(token, rx).await })
            })
            .collect();

        let reader = tokio::spawn(run_reader(
            self.followers.clone(),
            self.config.clone(),
            workload_rng(self.config.seed, 1),
            tasks.clone(),
        ));

        info!("Starting workload and readers");
        let mut rng = workload_rng(self.config.seed, 0);
        let (writes, failed_writes) = self.run_writer(&mut rng, &shutdown).await;

        if !shutdown.is_cancelled() {
            info!("Workload complete, waiting for final replication");
            pause(&shutdown, self.config.settle_time).await;
        }

        tasks.cancel();
        for listener in listeners {
            if let Err(err) = listener.await {
                warn!(error = %err, "Follower listener task failed");
            }
        }
        let reads = match reader.await {
            Ok(tally) => tally,
            Err(err) => {
                warn!(error = %err, "Reader task failed");
                ReadTally::default()
            }
        };

        let leader_view = self.leader.snapshot();
        let converged = self
            .followers
            .iter()
            .map(|f| (f.id(), f.snapshot() == leader_view))
            .collect();

        let report = ReplicationReport {
            writes,
            failed_writes,
            read_hits: reads.hits,
            read_misses: reads.misses,
            delivered: self.metrics.deliveries(),
            applied: self.metrics.applied(),
            timeouts: self.metrics.timeouts(),
            converged,
            cancelled: shutdown.is_cancelled(),
        };
        info!("{}", self.metrics.summary());
        report
    }

    async fn run_writer(&self, rng: &mut StdRng, shutdown: &CancellationToken) -> (u64, u64) {
        let mut written = 0;
        let mut failed = 0;

        for i in 0..self.config.write_count {
            if shutdown.is_cancelled() {
                break;
            }

            let key = WRITE_KEYS.choose(rng).copied().unwrap_or(WRITE_KEYS[0]);
            let value = format!("v{}-{}", i, rng.gen_range(0..1000));

            match self.leader.write(key, &value) {
                Ok(_) => written += 1,
                Err(err) => {
                    failed += 1;
                    warn!(error = %err, "Error writing to leader");
                }
            }

            // Client think time
            let think = random_duration(rng, Duration::ZERO, self.config.max_write_delay);
            if !pause(shutdown, think).await {
                break;
            }
        }

        (written, failed)
    }
}

async fn run_reader(
    followers: Vec<Arc<Node>>,
    config: ReplicationSimConfig,
    mut rng: StdRng,
    shutdown: CancellationToken,
) -> ReadTally {
    let mut tally = ReadTally::default();
    if followers.is_empty() {
        return tally;
    }

    while !shutdown.is_cancelled() {
        if let Some(follower) = followers.choose(&mut rng) {
            match follower.read(&config.probe_key) {
                Some(value) => {
                    tally.hits += 1;
                    info!(node_id = follower.id(), key = %config.probe_key, %value, "Client read served");
                }
                None => {
                    tally.misses += 1;
                    info!(node_id = follower.id(), key = %config.probe_key, "Client read miss (not propagated yet)");
                }
            }
        }

        if !pause(&shutdown, config.read_interval).await {
            break;
        }
    }

    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{FollowerState, ReplicationConfig};
    use tokio::time::timeout;

    fn quick_config() -> ReplicationSimConfig {
        ReplicationSimConfig::default()
            .with_write_count(10)
            .with_max_write_delay(Duration::from_millis(10))
            .with_read_interval(Duration::from_millis(5))
            .with_settle_time(Duration::from_millis(500))
            .with_replication(
                ReplicationConfig::default()
                    .with_processing_delay(Duration::from_millis(2), Duration::from_millis(5)),
            )
            .with_seed(11)
    }

    #[tokio::test]
    async fn test_topology() {
        let sim = ReplicationSimulation::new(ReplicationSimConfig::default()).unwrap();
        assert!(sim.leader().is_leader());
        assert_eq!(sim.leader().replica_count(), 3);
        let ids: Vec<_> = sim.followers().iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_run_converges() {
        let mut sim = ReplicationSimulation::new(quick_config()).unwrap();
        let report = timeout(Duration::from_secs(5), sim.run(CancellationToken::new()))
            .await
            .unwrap();

        assert_eq!(report.writes, 10);
        assert_eq!(report.failed_writes, 0);
        assert_eq!(report.delivered, 30);
        assert_eq!(report.applied, 30);
        assert_eq!(report.timeouts, 0);
        assert!(report.all_converged(), "{}", report);
        assert!(!report.cancelled);
        assert!(report.read_hits + report.read_misses > 0);

        for follower in sim.followers() {
            assert_eq!(follower.follower_state(), Some(FollowerState::Stopped));
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_everything() {
        let config = quick_config()
            .with_write_count(1000)
            .with_max_write_delay(Duration::from_millis(20));
        let mut sim = ReplicationSimulation::new(config).unwrap();

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let report = timeout(Duration::from_secs(5), sim.run(shutdown))
            .await
            .unwrap();
        assert!(report.cancelled);
        assert!(report.writes < 1000);
        for follower in sim.followers() {
            assert_eq!(follower.follower_state(), Some(FollowerState::Stopped));
        }
    }

    #[test]
    fn test_report_display() {
        let report = ReplicationReport {
            writes: 2,
            converged: vec![(1, true), (2, false)],
            ..Default::default()
        };
        let text = report.to_string();
        assert!(text.contains("Follower 1: in sync"));
        assert!(text.contains("Follower 2: diverged"));
        assert!(!report.all_converged());
    }
}
