//! Background retention sweep.
//!
//! One task per factory: purge versions past the retention window, then
//! flush dirty repositories, on a fixed interval. The daemon runs this
//! until shutdown and performs a final flush itself.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::factory::RepoFactory;

/// Knobs for the retention sweep.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// History versions untouched for this many days are purged.
    pub retention_days: u32,
    /// Time between sweeps.
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            retention_days: 7,
            interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Purge and flush on every interval tick, forever.
pub async fn sweep_loop(factory: Arc<RepoFactory>, config: SweepConfig) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // an interval fires immediately; consume that so the first sweep
    // happens one full period in
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match factory
            .purge_versions_older_than(config.retention_days)
            .await
        {
            Ok(removed) if removed > 0 => info!(removed, "retention sweep complete"),
            Ok(_) => {}
            Err(err) => error!(error = %err, "retention purge failed"),
        }
        if let Err(err) = factory.flush().await {
            error!(error = %err, "flush failed");
        }
    }
}
