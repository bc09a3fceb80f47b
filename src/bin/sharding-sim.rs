//! Sharding Simulator Binary
//!
//! Writes a run of keys through a CRC32 router and shows how they spread
//! over the shards.

use std::time::Duration;

use clap::Parser;
use replishard::{ShardingSimConfig, ShardingSimulation};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Hash-based sharding simulator
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of shards
    #[arg(short, long, default_value_t = 4)]
    shards: usize,

    /// Number of keys written
    #[arg(short, long, default_value_t = 50)]
    keys: usize,

    /// Pause between writes, in milliseconds
    #[arg(long, default_value_t = 50)]
    write_delay_ms: u64,

    /// Seed for the reader's key choice
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

    let mut config = ShardingSimConfig::default()
        .with_shards(args.shards)
        .with_total_keys(args.keys)
        .with_write_delay(Duration::from_millis(args.write_delay_ms));
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

    let sim = ShardingSimulation::new(config)?;
    let report = sim.run(shutdown).await;

    println!("{}", report);
    info!("Simulation finished");

    Ok(())
}
