//! Cluster Node
//!
//! A leader or follower holding its own copy of the data. Leaders fan every
//! write out to their followers without waiting for them; followers apply
//! whatever arrives on their channel, in arrival order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::replication::{
    spawn_delivery, Broadcast, ReplicaReceiver, ReplicaSender, ReplicationConfig, ReplicationEvent,
};
use crate::error::{ClusterError, Result};
use crate::metrics::Metrics;
use crate::storage::Store;

/// Unique node identifier
pub type NodeId = u64;

/// Node role in the topology, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Accepts writes and replicates them
    Leader,
    /// Read-only replica fed by the leader
    Follower,
}

impl Default for NodeRole {
    fn default() -> Self {
        Self::Follower
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leader => f.write_str("Leader"),
            Self::Follower => f.write_str("Follower"),
        }
    }
}

/// Lifecycle of a follower's consumption loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowerState {
    Running,
    /// Terminal; the loop cannot be restarted
    Stopped,
}

const LOOP_IDLE: u8 = 0;
const LOOP_RUNNING: u8 = 1;
const LOOP_STOPPED: u8 = 2;

/// A replication node
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    role: NodeRole,
    store: Store,
    /// Outbound channels, leader only
    replicas: RwLock<Vec<ReplicaSender>>,
    config: ReplicationConfig,
    metrics: Arc<Metrics>,
    loop_state: AtomicU8,
}

impl Node {
    pub fn new(id: NodeId, role: NodeRole) -> Self {
        Self {
            id,
            role,
            store: Store::new(),
            replicas: RwLock::new(Vec::new()),
            config: ReplicationConfig::default(),
            metrics: Arc::new(Metrics::new()),
            loop_state: AtomicU8::new(LOOP_IDLE),
        }
    }

    /// Create a leader node
    pub fn leader(id: NodeId) -> Self {
        Self::new(id, NodeRole::Leader)
    }

    /// Create a follower node
    pub fn follower(id: NodeId) -> Self {
        Self::new(id, NodeRole::Follower)
    }

    pub fn with_config(mut self, config: ReplicationConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a metrics collector with the rest of the topology
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn is_leader(&self) -> bool {
        self.role == NodeRole::Leader
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Register a follower's channel. Setup time only: followers added once
    /// traffic has started miss every earlier write.
    pub fn add_replica(&self, sender: ReplicaSender) -> Result<()> {
        if !self.is_leader() {
            return Err(ClusterError::NotLeader { node_id: self.id });
        }
        info!(
            node_id = self.id,
            follower_id = sender.follower_id(),
            "Registered replica"
        );
        self.replicas.write().push(sender);
        Ok(())
    }

    /// Number of registered follower channels
    pub fn replica_count(&self) -> usize {
        self.replicas.read().len()
    }

    /// Commit a write locally and start replicating it.
    ///
    /// Returns as soon as one delivery task per follower has been spawned;
    /// nothing here waits on a follower. Must be called from within a Tokio
    /// runtime.
    pub fn write(&self, key: &str, value: &str) -> Result<Broadcast> {
        if !self.is_leader() {
            return Err(ClusterError::NotLeader { node_id: self.id });
        }

        self.store.set(key, value);
        self.metrics.record_write();
        let event = ReplicationEvent::new(key, value);

        info!(node_id = self.id, role = %self.role, key, value, "Persisted data");

        let mut broadcast = Broadcast::default();
        for sender in self.replicas.read().iter() {
            let handle = spawn_delivery(
                sender.clone(),
                event.clone(),
                self.config.timeout,
                Arc::clone(&self.metrics),
            );
            broadcast.push(sender.follower_id(), handle);
        }
        Ok(broadcast)
    }

    /// Read from the local view. On a follower this may be stale or missing.
    pub fn read(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    /// Copy of the local map
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.store.snapshot()
    }

    /// Number of keys held locally
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// State of the follower loop, `None` if it was never started
    pub fn follower_state(&self) -> Option<FollowerState> {
        match self.loop_state.load(Ordering::Acquire) {
            LOOP_RUNNING => Some(FollowerState::Running),
            LOOP_STOPPED => Some(FollowerState::Stopped),
            _ => None,
        }
    }

    /// Consume replication events until `shutdown` fires or the channel
    /// closes.
    ///
    /// Events are applied strictly in arrival order, so the last event to
    /// arrive for a key wins regardless of its timestamp. Events still queued
    /// when the loop exits are dropped.
    pub async fn run_follower(&self, shutdown: CancellationToken, mut updates: ReplicaReceiver) {
        if self.is_leader() {
            error!(node_id = self.id, "Attempted to start follower loop on a leader node");
            return;
        }
        if self
            .loop_state
            .compare_exchange(LOOP_IDLE, LOOP_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(node_id = self.id, "Follower loop already started, ignoring");
            return;
        }

        info!(node_id = self.id, role = %self.role, "Starting replication listener");

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = updates.recv() => match next {
                    Some(event) => event,
                    None => {
                        info!(node_id = self.id, "Replication channel closed");
                        break;
                    }
                },
            };

            // Simulate network and disk latency
            let delay = self.config.processing_delay_for(&event);
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            self.store.set(event.key.as_str(), event.value.as_str());

            let lag = event.lag();
            self.metrics.record_applied(self.id, lag);
            info!(
                node_id = self.id,
                key = %event.key,
                value = %event.value,
                lag_ms = lag.as_millis() as u64,
                "Replicated data"
            );
        }

        self.loop_state.store(LOOP_STOPPED, Ordering::Release);
        info!(node_id = self.id, "Stopping replication listener");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::replication::replication_channel;
    use std::time::{Duration, Instant};
    use tokio::time::{sleep, timeout};

    fn fast_config() -> ReplicationConfig {
        ReplicationConfig::default()
            .with_processing_delay(Duration::from_millis(5), Duration::from_millis(10))
    }

    /// Wire followers to a leader and start their loops
    fn spawn_followers(
        leader: &Node,
        count: u64,
        config: &ReplicationConfig,
        shutdown: &CancellationToken,
    ) -> Vec<Arc<Node>> {
        (1..=count)
            .map(|id| {
                let follower = Arc::new(Node::follower(id).with_config(config.clone()));
                let (tx, rx) = replication_channel(id, config.channel_capacity);
                leader.add_replica(tx).unwrap();
                let node = follower.clone();
                let token = shutdown.clone();
                tokio::spawn(async move { node.run_follower(token, rx).await });
                follower
            })
            .collect()
    }

    #[tokio::test]
    async fn test_leader_reads_its_own_write() {
        let leader = Node::leader(1);
        let broadcast = leader.write("test_key", "test_val").unwrap();

        assert!(broadcast.is_empty());
        assert_eq!(leader.read("test_key"), Some("test_val".to_string()));
        assert_eq!(leader.metrics().writes(), 1);
    }

    #[tokio::test]
    async fn test_write_on_follower_fails() {
        let follower = Node::follower(2);
        let err = follower.write("k", "v").unwrap_err();
        assert_eq!(err, ClusterError::NotLeader { node_id: 2 });
        assert!(follower.is_empty());
        assert_eq!(follower.read("k"), None);
    }

    #[test]
    fn test_follower_rejects_replicas() {
        let follower = Node::follower(2);
        let (tx, _rx) = replication_channel(3, 1);
        assert_eq!(
            follower.add_replica(tx),
            Err(ClusterError::NotLeader { node_id: 2 })
        );
        assert_eq!(follower.replica_count(), 0);
    }

    #[test]
    fn test_roles() {
        assert!(Node::leader(1).is_leader());
        assert_eq!(Node::follower(2).role(), NodeRole::Follower);
        assert_eq!(NodeRole::default(), NodeRole::Follower);
        assert_eq!(NodeRole::Leader.to_string(), "Leader");
    }

    #[tokio::test]
    async fn test_followers_converge() {
        let config = fast_config();
        let shutdown = CancellationToken::new();
        let leader = Node::leader(0).with_config(config.clone());
        let followers = spawn_followers(&leader, 3, &config, &shutdown);

        leader.write("user:100", "v1").unwrap();
        sleep(Duration::from_secs(1)).await;

        for follower in &followers {
            assert_eq!(follower.read("user:100"), Some("v1".to_string()));
            assert_eq!(follower.follower_state(), Some(FollowerState::Running));
        }
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_default_delays_converge_within_a_second() {
        let shutdown = CancellationToken::new();
        let leader = Node::leader(0);
        let followers = spawn_followers(&leader, 3, &ReplicationConfig::default(), &shutdown);

        let broadcast = leader.write("user:100", "v1").unwrap();
        assert_eq!(broadcast.len(), 3);
        sleep(Duration::from_secs(1)).await;

        for follower in &followers {
            assert_eq!(follower.read("user:100"), Some("v1".to_string()));
        }
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_blocked_follower_does_not_delay_writes() {
        let config = fast_config().with_timeout(Duration::from_millis(200));
        let shutdown = CancellationToken::new();
        let leader = Node::leader(0).with_config(config.clone());

        // Follower 9 never consumes; its single slot fills on the first write
        let (blocked_tx, _blocked_rx) = replication_channel(9, 1);
        leader.add_replica(blocked_tx).unwrap();
        let healthy = spawn_followers(&leader, 1, &config, &shutdown);

        let mut broadcasts = Vec::new();
        for i in 0..3 {
            let start = Instant::now();
            broadcasts.push(leader.write("k", &format!("v{}", i)).unwrap());
            assert!(start.elapsed() < Duration::from_millis(50));
        }

        let mut timed_out = 0;
        for broadcast in broadcasts {
            for (follower_id, outcome) in broadcast.outcomes().await {
                match outcome {
                    Ok(()) => {}
                    Err(ClusterError::ReplicationTimeout { follower_id: 9, .. }) => timed_out += 1,
                    Err(err) => panic!("unexpected outcome for {}: {}", follower_id, err),
                }
            }
        }
        assert_eq!(timed_out, 2);
        assert_eq!(leader.metrics().timeouts(), 2);

        sleep(Duration::from_millis(200)).await;
        assert!(healthy[0].read("k").is_some());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_last_arrival_wins() {
        let follower = Arc::new(Node::follower(1).with_config(fast_config()));
        let (tx, rx) = replication_channel(1, 4);

        // E2 is stamped before E1 but arrives after it
        let older = ReplicationEvent::new("user:100", "second");
        sleep(Duration::from_millis(5)).await;
        let newer = ReplicationEvent::new("user:100", "first");
        assert!(older.timestamp < newer.timestamp);

        tx.send(newer).await.unwrap();
        tx.send(older).await.unwrap();
        drop(tx);

        let shutdown = CancellationToken::new();
        timeout(Duration::from_secs(2), follower.run_follower(shutdown, rx))
            .await
            .unwrap();

        assert_eq!(follower.read("user:100"), Some("second".to_string()));
        assert_eq!(follower.metrics().follower(1).unwrap().applied, 2);
    }

    #[tokio::test]
    async fn test_follower_stops_on_cancel_and_cannot_restart() {
        let follower = Arc::new(Node::follower(1).with_config(fast_config()));
        let (tx, rx) = replication_channel(1, 4);
        let shutdown = CancellationToken::new();

        let node = follower.clone();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { node.run_follower(token, rx).await });

        tx.send(ReplicationEvent::new("a", "1")).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(follower.read("a"), Some("1".to_string()));

        shutdown.cancel();
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(follower.follower_state(), Some(FollowerState::Stopped));

        // A stopped loop returns immediately and consumes nothing
        let (tx2, rx2) = replication_channel(1, 4);
        tx2.send(ReplicationEvent::new("b", "2")).await.unwrap();
        timeout(
            Duration::from_secs(1),
            follower.run_follower(CancellationToken::new(), rx2),
        )
        .await
        .unwrap();
        assert_eq!(follower.read("b"), None);
        assert_eq!(follower.follower_state(), Some(FollowerState::Stopped));
    }

    #[tokio::test]
    async fn test_follower_loop_refuses_leader() {
        let leader = Node::leader(0);
        let (_tx, rx) = replication_channel(0, 1);
        timeout(
            Duration::from_secs(1),
            leader.run_follower(CancellationToken::new(), rx),
        )
        .await
        .unwrap();
        assert_eq!(leader.follower_state(), None);
    }
}
