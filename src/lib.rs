//! replishard - Replication and Sharding Simulator
//!
//! A leader that commits writes locally and fans them out to followers
//! without waiting, followers that converge eventually, and a router that
//! spreads keys over a fixed set of shards by CRC32.

pub mod cluster;
pub mod error;
pub mod metrics;
pub mod simulation;
pub mod storage;

pub use cluster::{
    replication_channel, FollowerState, Node, NodeId, NodeRole, ReplicationConfig,
    ReplicationEvent, ShardNode, ShardRouter,
};
pub use error::ClusterError;
pub use metrics::Metrics;
pub use simulation::{
    ReplicationReport, ReplicationSimConfig, ReplicationSimulation, ShardingReport,
    ShardingSimConfig, ShardingSimulation,
};
pub use storage::Store;
