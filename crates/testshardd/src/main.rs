//! testshard history daemon.
//!
//! Owns the on-disk repository store: builds a [`RepoFactory`] over the
//! data directory and runs the retention sweep until interrupted, then
//! flushes whatever is still dirty before exiting.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use testshard_core::init_tracing;
use testshard_server::{sweep_loop, RepoFactory, SweepConfig};

#[derive(Parser)]
#[command(name = "testshardd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "testshard history daemon", long_about = None)]
struct Args {
    /// Directory the repository store persists under
    #[arg(long, env = "TESTSHARD_DATA_DIR", default_value = ".testshard")]
    data_dir: PathBuf,

    /// Days an untouched run snapshot is kept before the sweep purges it
    #[arg(long, env = "TESTSHARD_RETENTION_DAYS", default_value_t = 7)]
    retention_days: u32,

    /// Seconds between retention sweeps
    #[arg(long, env = "TESTSHARD_SWEEP_INTERVAL_SECS", default_value_t = 86_400)]
    sweep_interval_secs: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(args.json, level);

    let factory = Arc::new(RepoFactory::new(&args.data_dir).with_context(|| {
        format!(
            "opening repository store under {}",
            args.data_dir.display()
        )
    })?);
    info!(
        data_dir = %args.data_dir.display(),
        retention_days = args.retention_days,
        "testshardd started"
    );

    let sweep = SweepConfig {
        retention_days: args.retention_days,
        interval: Duration::from_secs(args.sweep_interval_secs),
    };
    tokio::select! {
        _ = sweep_loop(Arc::clone(&factory), sweep) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for shutdown signal")?;
            info!("shutdown requested");
        }
    }

    let written = factory
        .flush()
        .await
        .context("flushing repositories on shutdown")?;
    info!(written, "testshardd stopped");
    Ok(())
}
