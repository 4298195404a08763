//! Backend for plain CI servers: history through the stage feed and job
//! artifacts, recording through per-job artifact PUTs.
//!
//! Recorded entries accumulate in memory and are published in one PUT
//! once their count reaches the most recently published subset size, so
//! the artifact is written exactly once per balanced batch. Reads of a
//! prior run's artifacts degrade per job: an unreadable artifact is
//! skipped with a warning, because balancing works without it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use testshard_core::{
    latest_times, AgentConfig, JobFamily, OperationResult, SmoothingFactor, SuiteFile,
    SuiteResultEntry, SuiteTimeEntry,
};

use crate::error::{BalanceError, Result};
use crate::feed::StageDetail;
use crate::locator::HistoryLocator;
use crate::service::{
    CiServer, FAILED_SUITES_ARTIFACT, SUBSET_SIZE_ARTIFACT, SUITE_TIMES_ARTIFACT,
};
use crate::transport::Transport;

#[derive(Default)]
struct RecordingState {
    times: Vec<SuiteTimeEntry>,
    failures: Vec<SuiteResultEntry>,
    subset_sizes: Vec<u64>,
    baseline: Option<HashMap<String, u64>>,
}

impl RecordingState {
    fn batch_complete(&self, count: usize) -> bool {
        self.subset_sizes.last() == Some(&(count as u64))
    }
}

/// [`CiServer`] over a CI server's feed and artifact store.
///
/// Reconciliation is not supported here; the artifact store holds no
/// universal set to claim against.
pub struct PipelineServer {
    transport: Arc<dyn Transport>,
    config: AgentConfig,
    locator: HistoryLocator,
    state: Mutex<RecordingState>,
}

impl PipelineServer {
    pub fn new(transport: Arc<dyn Transport>, config: AgentConfig) -> Self {
        let locator = HistoryLocator::from_config(Arc::clone(&transport), &config);
        PipelineServer {
            transport,
            config,
            locator,
            state: Mutex::new(RecordingState::default()),
        }
    }

    fn current_stage_url(&self) -> String {
        format!(
            "{}/api/stages/{}/{}/{}/{}.json",
            self.config.base_url,
            self.config.pipeline,
            self.config.pipeline_counter,
            self.config.stage,
            self.config.stage_counter
        )
    }

    fn publish_url(&self, artifact: &str) -> String {
        format!(
            "{}/files/{}/{}/{}/{}/{}/{}",
            self.config.base_url,
            self.config.pipeline,
            self.config.pipeline_counter,
            self.config.stage,
            self.config.stage_counter,
            self.config.job,
            artifact
        )
    }

    async fn family_jobs(&self) -> Result<Vec<String>> {
        let peers = self.peer_jobs().await?;
        Ok(JobFamily::derive(&self.config.job, &peers).jobs().to_vec())
    }

    /// Fetch one artifact of the located run for each named job,
    /// skipping jobs whose artifact cannot be read.
    async fn historical_artifacts(&self, jobs: &[String], artifact: &str) -> Result<Vec<String>> {
        let run = self.locator.locate().await?;
        let mut bodies = Vec::new();
        for job in run.jobs_named(jobs) {
            let url = format!("{}/{}", job.artifact_base_url, artifact);
            match self.transport.get(&url).await {
                Ok(body) => bodies.push(body),
                Err(err) => {
                    warn!(job = %job.name, url = %url, error = %err, "skipping unreadable history artifact");
                }
            }
        }
        Ok(bodies)
    }

    /// Last-run durations per suite, fetched once per process. Smoothing
    /// still works without them, observations just pass through.
    async fn smoothing_baseline(&self) -> HashMap<String, u64> {
        let entries = async {
            let family = self.family_jobs().await?;
            self.last_run_times(&family).await
        };
        match entries.await {
            Ok(entries) => latest_times(&entries),
            Err(err) => {
                warn!(error = %err, "recording without smoothing baseline");
                HashMap::new()
            }
        }
    }
}

#[async_trait]
impl CiServer for PipelineServer {
    fn job_name(&self) -> &str {
        &self.config.job
    }

    async fn peer_jobs(&self) -> Result<Vec<String>> {
        let url = self.current_stage_url();
        let detail = StageDetail::parse(&self.transport.get(&url).await?)?;
        let jobs: Vec<String> = detail.jobs.into_iter().map(|job| job.name).collect();
        debug!(stage = %self.config.stage, jobs = ?jobs, "resolved current stage jobs");
        Ok(jobs)
    }

    async fn last_run_times(&self, jobs: &[String]) -> Result<Vec<SuiteTimeEntry>> {
        let mut entries = Vec::new();
        for body in self.historical_artifacts(jobs, SUITE_TIMES_ARTIFACT).await? {
            match SuiteTimeEntry::parse_list(&body) {
                Ok(parsed) => entries.extend(parsed),
                Err(err) => warn!(error = %err, "skipping malformed suite-time artifact"),
            }
        }
        Ok(entries)
    }

    async fn last_run_failures(&self, jobs: &[String]) -> Result<Vec<SuiteResultEntry>> {
        let fetched = self.historical_artifacts(jobs, FAILED_SUITES_ARTIFACT).await;
        let bodies = match fetched {
            Ok(bodies) => bodies,
            Err(err) => {
                warn!(error = %err, "couldn't find tests that failed in the last run");
                return Ok(Vec::new());
            }
        };
        let mut entries = Vec::new();
        for body in bodies {
            match SuiteResultEntry::parse_list(&body) {
                Ok(parsed) => entries.extend(parsed),
                Err(err) => warn!(error = %err, "skipping malformed failed-suite artifact"),
            }
        }
        Ok(entries)
    }

    async fn record_suite_time(&self, suite: &str, millis: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.baseline.is_none() {
            let baseline = if self.config.smoothing == SmoothingFactor::OFF {
                HashMap::new()
            } else {
                self.smoothing_baseline().await
            };
            state.baseline = Some(baseline);
        }
        let previous = state
            .baseline
            .as_ref()
            .and_then(|baseline| baseline.get(suite).copied());
        let smoothed = self.config.smoothing.smooth(previous, millis);
        debug!(suite = %suite, millis, smoothed, "recording suite run time");
        state.times.push(SuiteTimeEntry::new(suite, smoothed));

        if state.batch_complete(state.times.len()) {
            let url = self.publish_url(SUITE_TIMES_ARTIFACT);
            info!(count = state.times.len(), url = %url, "publishing suite run times");
            let body = SuiteTimeEntry::render_list(&state.times);
            self.transport.put(&url, body).await?;
            state.times.clear();
        }
        Ok(())
    }

    async fn record_suite_result(&self, suite: &str, failed: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.failures.push(SuiteResultEntry::new(suite, failed));

        if state.batch_complete(state.failures.len()) {
            let failed_suites: Vec<SuiteResultEntry> = state
                .failures
                .iter()
                .filter(|entry| entry.failed)
                .cloned()
                .collect();
            let url = self.publish_url(FAILED_SUITES_ARTIFACT);
            info!(
                failed = failed_suites.len(),
                ran = state.failures.len(),
                url = %url,
                "publishing failed suites"
            );
            let body = SuiteResultEntry::render_list(&failed_suites);
            self.transport.put(&url, body).await?;
            state.failures.clear();
        }
        Ok(())
    }

    async fn publish_subset_size(&self, count: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.subset_sizes.push(count);
        let url = self.publish_url(SUBSET_SIZE_ARTIFACT);
        info!(count, url = %url, "publishing balanced subset size");
        self.transport.put(&url, format!("{count}\n")).await?;
        Ok(())
    }

    async fn submit_universe(&self, _universe: &[SuiteFile]) -> Result<OperationResult> {
        Err(BalanceError::Unsupported {
            operation: "universe submission",
            backend: "pipeline feed",
        })
    }

    async fn submit_subset(&self, _subset: &[SuiteFile]) -> Result<OperationResult> {
        Err(BalanceError::Unsupported {
            operation: "subset submission",
            backend: "pipeline feed",
        })
    }

    async fn verify_complete(&self) -> Result<OperationResult> {
        Err(BalanceError::Unsupported {
            operation: "run verification",
            backend: "pipeline feed",
        })
    }
}
