//! Agent-side driver for the reconciliation protocol.
//!
//! Partitioning is verified after the fact: every agent submits the full
//! universe (first one primes it, the rest re-check it), then claims its
//! own subset. Once all agents have claimed, a verify call reports any
//! file the run never covered.

use std::sync::Arc;

use tracing::{info, warn};

use testshard_core::{OperationResult, SuiteFile};

use crate::error::{BalanceError, Result};
use crate::service::CiServer;

/// Submits a run's universe and subset claims and checks coverage.
pub struct CorrectnessChecker {
    server: Arc<dyn CiServer>,
}

impl CorrectnessChecker {
    pub fn new(server: Arc<dyn CiServer>) -> Self {
        CorrectnessChecker { server }
    }

    /// Submit the run's universe, then claim `subset` from it.
    ///
    /// A rejected universe or claim is a
    /// [`BalanceError::Mismatch`]: either the agents disagree on the
    /// universe or two partitions computed overlapping subsets, and the
    /// run must not pretend its coverage is sound.
    pub async fn claim(&self, universe: &[SuiteFile], subset: &[SuiteFile]) -> Result<()> {
        let primed = self.server.submit_universe(universe).await?;
        if !primed.success {
            warn!(job = %self.server.job_name(), detail = %primed.message, "universal set rejected");
            return Err(BalanceError::Mismatch {
                message: primed.message,
            });
        }
        let claimed = self.server.submit_subset(subset).await?;
        if !claimed.success {
            warn!(job = %self.server.job_name(), detail = %claimed.message, "subset claim rejected");
            return Err(BalanceError::Mismatch {
                message: claimed.message,
            });
        }
        info!(job = %self.server.job_name(), files = subset.len(), "claimed subset");
        Ok(())
    }

    /// Ask the server whether every universe file has been claimed.
    ///
    /// Unclaimed files come back as a conflict result, not an error;
    /// callers decide whether an incomplete run is fatal.
    pub async fn verify(&self) -> Result<OperationResult> {
        self.server.verify_complete().await
    }
}
