//! Backend for a testshard history server.
//!
//! The server keeps namespaced entry repositories and the run's
//! universal set, so peers are synthesized from the configured partition
//! count instead of discovered from a feed, history reads hit the run's
//! frozen snapshot, and every record is one immediate append. All three
//! reconciliation operations are supported.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use testshard_core::{
    latest_times, render_set, AgentConfig, ConfigError, OperationResult, SmoothingFactor,
    SuiteFile, SuiteResultEntry, SuiteTimeEntry,
};

use crate::error::Result;
use crate::service::CiServer;
use crate::transport::Transport;

/// [`CiServer`] over a testshard history server.
pub struct ShardServer {
    transport: Arc<dyn Transport>,
    config: AgentConfig,
    own_name: String,
    peers: Vec<String>,
    baseline: Mutex<Option<HashMap<String, u64>>>,
}

impl fmt::Debug for ShardServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardServer")
            .field("config", &self.config)
            .field("own_name", &self.own_name)
            .field("peers", &self.peers)
            .finish_non_exhaustive()
    }
}

impl ShardServer {
    /// Build from a config carrying `total_partitions` and
    /// `partition_number` (1-based, at most the total).
    pub fn from_config(transport: Arc<dyn Transport>, config: AgentConfig) -> Result<Self> {
        let total = config
            .total_partitions
            .ok_or(ConfigError::MissingSetting {
                key: "total_partitions",
            })?;
        let number = config
            .partition_number
            .ok_or(ConfigError::MissingSetting {
                key: "partition_number",
            })?;
        if total == 0 || number == 0 || number > total {
            return Err(ConfigError::InvalidPartition { number, total }.into());
        }
        let own_name = format!("{}-{}", config.job, number);
        let peers = (1..=total)
            .map(|index| format!("{}-{}", config.job, index))
            .collect();
        Ok(ShardServer {
            transport,
            config,
            own_name,
            peers,
            baseline: Mutex::new(None),
        })
    }

    fn repo_url(&self, kind: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url, self.config.namespace, kind
        )
    }

    fn run_url(&self, kind: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.base_url, self.config.namespace, kind, self.config.run_label
        )
    }

    /// Durations from this run's frozen snapshot, fetched once. An
    /// unavailable baseline only disables smoothing for this process.
    async fn baseline_time(&self, suite: &str) -> Option<u64> {
        if self.config.smoothing == SmoothingFactor::OFF {
            return None;
        }
        let mut baseline = self.baseline.lock().await;
        if baseline.is_none() {
            let times = match self.last_run_times(&[]).await {
                Ok(entries) => latest_times(&entries),
                Err(err) => {
                    warn!(error = %err, "recording without smoothing baseline");
                    HashMap::new()
                }
            };
            *baseline = Some(times);
        }
        baseline.as_ref().and_then(|times| times.get(suite).copied())
    }
}

#[async_trait]
impl CiServer for ShardServer {
    fn job_name(&self) -> &str {
        &self.own_name
    }

    async fn peer_jobs(&self) -> Result<Vec<String>> {
        Ok(self.peers.clone())
    }

    /// History comes from the run label's frozen snapshot, so every
    /// partition of this run reads identical data no matter how many
    /// appends land in the meantime. A fresh namespace reads empty.
    async fn last_run_times(&self, _jobs: &[String]) -> Result<Vec<SuiteTimeEntry>> {
        let url = self.run_url("suite_times");
        Ok(SuiteTimeEntry::parse_list(&self.transport.get(&url).await?)?)
    }

    async fn last_run_failures(&self, _jobs: &[String]) -> Result<Vec<SuiteResultEntry>> {
        let url = self.run_url("failed_suites");
        Ok(SuiteResultEntry::parse_list(&self.transport.get(&url).await?)?)
    }

    async fn record_suite_time(&self, suite: &str, millis: u64) -> Result<()> {
        let previous = self.baseline_time(suite).await;
        let smoothed = self.config.smoothing.smooth(previous, millis);
        debug!(suite = %suite, millis, smoothed, "recording suite run time");
        let entry = SuiteTimeEntry::new(suite, smoothed);
        self.transport
            .put(&self.repo_url("suite_times"), format!("{entry}\n"))
            .await?;
        Ok(())
    }

    async fn record_suite_result(&self, suite: &str, failed: bool) -> Result<()> {
        let entry = SuiteResultEntry::new(suite, failed);
        self.transport
            .put(&self.repo_url("failed_suites"), format!("{entry}\n"))
            .await?;
        Ok(())
    }

    async fn publish_subset_size(&self, count: u64) -> Result<()> {
        info!(count, job = %self.own_name, "publishing balanced subset size");
        self.transport
            .put(&self.repo_url("subset_size"), format!("{count}\n"))
            .await?;
        Ok(())
    }

    async fn submit_universe(&self, universe: &[SuiteFile]) -> Result<OperationResult> {
        let url = self.run_url("universe");
        debug!(files = universe.len(), url = %url, "submitting universal set");
        let response = self.transport.put(&url, render_set(universe)).await?;
        Ok(OperationResult::parse(&response)?)
    }

    async fn submit_subset(&self, subset: &[SuiteFile]) -> Result<OperationResult> {
        let url = format!(
            "{}/{}/subset/{}/{}",
            self.config.base_url, self.config.namespace, self.config.run_label, self.own_name
        );
        debug!(files = subset.len(), url = %url, "claiming subset");
        let response = self.transport.put(&url, render_set(subset)).await?;
        Ok(OperationResult::parse(&response)?)
    }

    async fn verify_complete(&self) -> Result<OperationResult> {
        let url = self.run_url("verify");
        let response = self.transport.get(&url).await?;
        Ok(OperationResult::parse(&response)?)
    }
}
