//! Cluster Module
//!
//! Leader/follower replication and hash-based sharding.

pub mod node;
pub mod replication;
pub mod sharding;

pub use node::{FollowerState, Node, NodeId, NodeRole};
pub use replication::{
    replication_channel, Broadcast, ReplicaReceiver, ReplicaSender, ReplicationConfig,
    ReplicationEvent,
};
pub use sharding::{shard_index, ShardNode, ShardRouter, ShardStats};
