//! Replication Stream
//!
//! Replication events, the bounded leader→follower channel and the
//! timeout-bounded delivery attempt the leader spawns for every follower.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::node::NodeId;
use crate::error::{ClusterError, Result};
use crate::metrics::Metrics;

/// Replication configuration
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Deadline for enqueueing one event onto one follower channel
    pub timeout: Duration,
    /// Buffered events per follower channel
    pub channel_capacity: usize,
    /// Fixed part of the simulated apply latency on followers
    pub processing_delay: Duration,
    /// Upper bound (exclusive) of the per-event latency added on top
    pub processing_jitter: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            channel_capacity: 10,
            processing_delay: Duration::from_millis(50),
            processing_jitter: Duration::from_millis(100),
        }
    }
}

impl ReplicationConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the simulated follower apply latency
    pub fn with_processing_delay(mut self, delay: Duration, jitter: Duration) -> Self {
        self.processing_delay = delay;
        self.processing_jitter = jitter;
        self
    }

    /// Apply latency for one event: the fixed delay plus a jitter derived
    /// from the event contents, so a given write always costs the same.
    pub fn processing_delay_for(&self, event: &ReplicationEvent) -> Duration {
        let jitter_ms = self.processing_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.processing_delay;
        }
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(event.key.as_bytes());
        hasher.update(event.value.as_bytes());
        let extra = hasher.finalize() as u64 % jitter_ms;
        self.processing_delay + Duration::from_millis(extra)
    }
}

/// A committed leader write travelling to followers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationEvent {
    pub key: String,
    pub value: String,
    /// When the leader committed the write
    pub timestamp: Instant,
}

impl ReplicationEvent {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            timestamp: Instant::now(),
        }
    }

    /// Time elapsed since the leader committed this event
    pub fn lag(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// Sending half of a replication channel, registered on the leader
#[derive(Debug, Clone)]
pub struct ReplicaSender {
    follower_id: NodeId,
    tx: mpsc::Sender<ReplicationEvent>,
}

/// Receiving half of a replication channel, consumed by the follower loop
#[derive(Debug)]
pub struct ReplicaReceiver {
    follower_id: NodeId,
    rx: mpsc::Receiver<ReplicationEvent>,
}

/// Create the bounded channel feeding one follower
pub fn replication_channel(follower_id: NodeId, capacity: usize) -> (ReplicaSender, ReplicaReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ReplicaSender { follower_id, tx },
        ReplicaReceiver { follower_id, rx },
    )
}

impl ReplicaSender {
    pub fn follower_id(&self) -> NodeId {
        self.follower_id
    }

    /// Enqueue an event, waiting for channel capacity
    pub async fn send(&self, event: ReplicationEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| ClusterError::ChannelClosed {
                follower_id: self.follower_id,
            })
    }

    /// Enqueue an event, giving up once `timeout` elapses
    pub async fn send_timeout(&self, event: ReplicationEvent, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.send(event)).await {
            Ok(result) => result,
            Err(_) => Err(ClusterError::ReplicationTimeout {
                follower_id: self.follower_id,
                timeout,
            }),
        }
    }
}

impl ReplicaReceiver {
    pub fn follower_id(&self) -> NodeId {
        self.follower_id
    }

    /// Next event in FIFO order, `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<ReplicationEvent> {
        self.rx.recv().await
    }
}

/// Spawn one independent delivery attempt. Failures are logged and counted
/// here; nothing is retried.
pub(crate) fn spawn_delivery(
    sender: ReplicaSender,
    event: ReplicationEvent,
    timeout: Duration,
    metrics: Arc<Metrics>,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let follower_id = sender.follower_id();
        let result = sender.send_timeout(event, timeout).await;
        match &result {
            Ok(()) => {
                metrics.record_delivery();
                debug!(follower_id, "Replication event enqueued");
            }
            Err(err @ ClusterError::ReplicationTimeout { .. }) => {
                metrics.record_timeout(follower_id);
                warn!(follower_id, error = %err, "Replication timed out for a follower");
            }
            Err(err) => {
                metrics.record_closed();
                warn!(follower_id, error = %err, "Replication channel closed");
            }
        }
        result
    })
}

/// Handles to the delivery attempts started by one leader write.
///
/// Dropping it detaches the attempts; they still run to completion.
#[derive(Debug, Default)]
pub struct Broadcast {
    deliveries: Vec<(NodeId, JoinHandle<Result<()>>)>,
}

impl Broadcast {
    pub(crate) fn push(&mut self, follower_id: NodeId, handle: JoinHandle<Result<()>>) {
        self.deliveries.push((follower_id, handle));
    }

    /// Number of followers the write was dispatched to
    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    /// Wait for every delivery attempt and collect its outcome, in
    /// registration order.
    pub async fn outcomes(self) -> Vec<(NodeId, Result<()>)> {
        let (ids, handles): (Vec<_>, Vec<_>) = self.deliveries.into_iter().unzip();
        let joined = join_all(handles).await;
        ids.into_iter()
            .zip(joined)
            .map(|(follower_id, joined)| {
                // A delivery task only ends early if the runtime shuts down
                let outcome = joined.unwrap_or(Err(ClusterError::ChannelClosed { follower_id }));
                (follower_id, outcome)
            })
            .collect()
    }
}
