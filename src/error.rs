//! Error Types

use std::time::Duration;

use thiserror::Error;

use crate::cluster::NodeId;

/// Errors raised by nodes, replication deliveries and the shard router
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    /// Write or replica registration attempted on a follower
    #[error("node {node_id} is not a leader")]
    NotLeader { node_id: NodeId },

    /// A delivery attempt did not enqueue before its deadline
    #[error("replication to follower {follower_id} timed out after {timeout:?}")]
    ReplicationTimeout {
        follower_id: NodeId,
        timeout: Duration,
    },

    /// The follower's receiving half was dropped
    #[error("replication channel to follower {follower_id} is closed")]
    ChannelClosed { follower_id: NodeId },

    #[error("shard count must be greater than zero")]
    InvalidShardCount,
}

pub type Result<T> = std::result::Result<T, ClusterError>;
