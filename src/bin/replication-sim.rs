//! Replication Simulator Binary
//!
//! One leader fanning writes out to N followers asynchronously, with a
//! client reading from random followers while replication catches up.

use std::time::Duration;

use clap::Parser;
use replishard::{ReplicationConfig, ReplicationSimConfig, ReplicationSimulation};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Leader/follower asynchronous replication simulator
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of followers
    #[arg(short, long, default_value_t = 3)]
    followers: usize,

    /// Number of writes issued to the leader
    #[arg(short, long, default_value_t = 5)]
    writes: usize,

    /// Upper bound of the think time between writes, in milliseconds
    #[arg(long, default_value_t = 800)]
    max_delay_ms: u64,

    /// Per-follower delivery deadline, in milliseconds
    #[arg(long, default_value_t = 500)]
    timeout_ms: u64,

    /// Seed for the workload generator
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("replishard=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = ReplicationSimConfig::default()
        .with_followers(args.followers)
        .with_write_count(args.writes)
        .with_max_write_delay(Duration::from_millis(args.max_delay_ms))
        .with_replication(
            ReplicationConfig::default().with_timeout(Duration::from_millis(args.timeout_ms)),
        );
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to install ctrl-c handler");
            return;
        }
        info!("Shutting down simulation...");
        on_signal.cancel();
    });

    let mut sim = ReplicationSimulation::new(config)?;
    let report = sim.run(shutdown).await;

    println!("{}", report);
    println!("{}", sim.metrics().summary());
    info!("Simulation finished");

    Ok(())
}
