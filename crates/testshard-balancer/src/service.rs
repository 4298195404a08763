//! The capability a balancing agent needs from its CI server.
//!
//! Two backends implement it: [`PipelineServer`](crate::PipelineServer)
//! works against a plain CI server's feed and artifact store, and
//! [`ShardServer`](crate::ShardServer) against a testshard history
//! server. Splitters and orderers only ever see this trait.

use async_trait::async_trait;

use testshard_core::{OperationResult, SuiteFile, SuiteResultEntry, SuiteTimeEntry};

use crate::error::Result;

/// Artifact path a job's recorded suite times are published under.
pub const SUITE_TIMES_ARTIFACT: &str = "testshard/suite_times";

/// Artifact path a job's failed suites are published under.
pub const FAILED_SUITES_ARTIFACT: &str = "testshard/failed_suites";

/// Artifact path a job's published subset sizes are appended under.
pub const SUBSET_SIZE_ARTIFACT: &str = "testshard/subset_size";

/// Agent-side view of the CI server.
///
/// History reads cover the last comparable run; recording writes feed
/// the next one. The three reconciliation operations are only supported
/// by backends with a server-held universal set and return
/// [`BalanceError::Unsupported`](crate::BalanceError::Unsupported)
/// elsewhere.
#[async_trait]
pub trait CiServer: Send + Sync {
    /// Name this agent's job runs under, partition suffix included.
    fn job_name(&self) -> &str;

    /// Names of every job in the current stage run, this one included.
    async fn peer_jobs(&self) -> Result<Vec<String>>;

    /// Suite timings recorded by `jobs` in the last comparable run.
    async fn last_run_times(&self, jobs: &[String]) -> Result<Vec<SuiteTimeEntry>>;

    /// Pass/fail outcomes recorded by `jobs` in the last comparable run.
    async fn last_run_failures(&self, jobs: &[String]) -> Result<Vec<SuiteResultEntry>>;

    /// Record one suite's wall-clock duration for future runs.
    async fn record_suite_time(&self, suite: &str, millis: u64) -> Result<()>;

    /// Record one suite's outcome for future runs.
    async fn record_suite_result(&self, suite: &str, failed: bool) -> Result<()>;

    /// Publish how many suites this job was assigned.
    async fn publish_subset_size(&self, count: u64) -> Result<()>;

    /// Reconciliation: prime or re-check the run's universal set.
    async fn submit_universe(&self, universe: &[SuiteFile]) -> Result<OperationResult>;

    /// Reconciliation: claim this job's subset from the universal set.
    async fn submit_subset(&self, subset: &[SuiteFile]) -> Result<OperationResult>;

    /// Reconciliation: check that every universe file was claimed.
    async fn verify_complete(&self) -> Result<OperationResult>;
}
