//! The balancing flow every agent runs.
//!
//! Derive the job family and this agent's position from the current
//! peer list, split the universe, order the assigned slice, publish its
//! size. Everything here is deterministic given the same universe and
//! peers, which is what lets each agent compute its slice alone.

use std::sync::Arc;

use tracing::info;

use testshard_core::{AgentConfig, JobFamily, SuiteFile};

use crate::error::{BalanceError, Result};
use crate::order::{orderer, SuiteOrderer};
use crate::service::CiServer;
use crate::split::{splitter, PartitionSlot, SuiteSplitter};

/// Computes one agent's ordered share of the test universe.
pub struct BalancingEngine {
    server: Arc<dyn CiServer>,
    splitter: Arc<dyn SuiteSplitter>,
    orderer: Arc<dyn SuiteOrderer>,
}

impl BalancingEngine {
    pub fn new(
        server: Arc<dyn CiServer>,
        splitter: Arc<dyn SuiteSplitter>,
        orderer: Arc<dyn SuiteOrderer>,
    ) -> Self {
        BalancingEngine {
            server,
            splitter,
            orderer,
        }
    }

    /// Build with the strategies named in `config`.
    pub fn from_config(server: Arc<dyn CiServer>, config: &AgentConfig) -> Result<Self> {
        Ok(BalancingEngine {
            server,
            splitter: splitter(&config.splitter)?,
            orderer: orderer(&config.orderer)?,
        })
    }

    /// Compute this agent's subset of `universe`, in execution order,
    /// and publish its size.
    ///
    /// Ordering applies within the assigned slice only; it never moves
    /// files across partitions.
    pub async fn balance(&self, universe: &[SuiteFile]) -> Result<Vec<SuiteFile>> {
        let job = self.server.job_name().to_string();
        let peers = self.server.peer_jobs().await?;
        let family = JobFamily::derive(&job, &peers);
        let position = family.position(&job).ok_or_else(|| BalanceError::NotFound {
            what: format!("job {job} among current stage jobs"),
        })?;
        let slot = PartitionSlot {
            family: family.jobs().to_vec(),
            position,
        };

        let mut subset = self
            .splitter
            .split(self.server.as_ref(), universe, &slot)
            .await?;
        self.orderer
            .order(self.server.as_ref(), &slot.family, &mut subset)
            .await?;
        self.server.publish_subset_size(subset.len() as u64).await?;

        info!(
            job = %job,
            splitter = self.splitter.name(),
            orderer = self.orderer.name(),
            partitions = slot.partitions(),
            position = slot.position,
            total = universe.len(),
            assigned = subset.len(),
            "balanced test universe"
        );
        Ok(subset)
    }
}
