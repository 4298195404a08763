//! Execution-order strategies for an assigned subset.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use testshard_core::{latest_results, ConfigError, SuiteFile};

use crate::error::{BalanceError, Result};
use crate::service::CiServer;

/// Reorders a job's assigned files in place.
///
/// Ordering never adds or drops files; it only permutes the slice the
/// splitter produced.
#[async_trait]
pub trait SuiteOrderer: std::fmt::Debug + Send + Sync {
    /// Identifier this orderer is selected by in configuration.
    fn name(&self) -> &'static str;

    /// Permute `subset` for execution.
    async fn order(
        &self,
        server: &dyn CiServer,
        jobs: &[String],
        subset: &mut Vec<SuiteFile>,
    ) -> Result<()>;
}

/// Leaves the splitter's order untouched.
#[derive(Debug)]
pub struct NoOpOrderer;

#[async_trait]
impl SuiteOrderer for NoOpOrderer {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn order(
        &self,
        _server: &dyn CiServer,
        _jobs: &[String],
        _subset: &mut Vec<SuiteFile>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Moves suites that failed in the last run to the front.
///
/// The sort is stable: relative order is preserved among previously
/// failed suites and among the rest, and suites with no failure history
/// count as not failed.
#[derive(Debug)]
pub struct FailedFirstOrderer;

#[async_trait]
impl SuiteOrderer for FailedFirstOrderer {
    fn name(&self) -> &'static str {
        "failed-first"
    }

    async fn order(
        &self,
        server: &dyn CiServer,
        jobs: &[String],
        subset: &mut Vec<SuiteFile>,
    ) -> Result<()> {
        let entries = match server.last_run_failures(jobs).await {
            Ok(entries) => entries,
            Err(BalanceError::NotFound { what }) => {
                warn!(missing = %what, "no failure history, keeping split order");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let failed = latest_results(&entries);
        subset.sort_by_key(|file| !failed.get(file.as_str()).copied().unwrap_or(false));
        debug!(
            known_failures = failed.values().filter(|&&flag| flag).count(),
            "applied failed-first order"
        );
        Ok(())
    }
}

/// Look up an orderer by its configured identifier.
///
/// The empty identifier selects the default, no reordering.
pub fn orderer(name: &str) -> Result<Arc<dyn SuiteOrderer>> {
    match name {
        "" | "noop" => Ok(Arc::new(NoOpOrderer)),
        "failed-first" => Ok(Arc::new(FailedFirstOrderer)),
        other => Err(ConfigError::UnknownStrategy {
            role: "orderer",
            name: other.to_string(),
            known: "noop, failed-first",
        }
        .into()),
    }
}
