//! Historical-run discovery over the CI server's stage feed.
//!
//! The feed is paged newest-first. Starting at the head, the locator
//! scans each page for a completed run of its pipeline/stage that is not
//! the run in flight, following `?before=<oldest id>` cursors backwards
//! until it finds one, runs off the end of history, or spends its page
//! budget. Any failed page or detail fetch fails the whole attempt.

use std::sync::Arc;

use tracing::{debug, info};

use testshard_core::AgentConfig;

use crate::error::{BalanceError, Result};
use crate::feed::{FeedPage, JobRef, StageDetail, StageInstance};
use crate::transport::Transport;

/// Counters identifying the in-flight run. The locator never matches
/// these; an agent balancing against its own half-written artifacts
/// would read garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunIdentity {
    pub pipeline_counter: u64,
    pub stage_counter: u64,
}

/// A completed prior run of the stage, with its jobs resolved.
#[derive(Debug, Clone)]
pub struct HistoricalRun {
    pub stage: StageInstance,
    pub jobs: Vec<JobRef>,
}

impl HistoricalRun {
    /// Jobs of the run whose names appear in `names`.
    pub fn jobs_named(&self, names: &[String]) -> Vec<&JobRef> {
        self.jobs
            .iter()
            .filter(|job| names.iter().any(|name| name == &job.name))
            .collect()
    }
}

/// Finds the most recent completed run of one pipeline/stage.
pub struct HistoryLocator {
    transport: Arc<dyn Transport>,
    base_url: String,
    pipeline: String,
    stage: String,
    current: RunIdentity,
    max_depth: usize,
}

impl HistoryLocator {
    pub fn from_config(transport: Arc<dyn Transport>, config: &AgentConfig) -> Self {
        HistoryLocator {
            transport,
            base_url: config.base_url.clone(),
            pipeline: config.pipeline.clone(),
            stage: config.stage.clone(),
            current: RunIdentity {
                pipeline_counter: config.pipeline_counter,
                stage_counter: config.stage_counter,
            },
            max_depth: config.search_depth,
        }
    }

    /// Walk the feed backwards for the most recent comparable run.
    ///
    /// An empty page means the feed has no further history and there is
    /// genuinely no prior run ([`BalanceError::NotFound`], recoverable).
    /// Spending the whole page budget without a match is
    /// [`BalanceError::ExhaustedSearch`].
    pub async fn locate(&self) -> Result<HistoricalRun> {
        let mut before = None;
        for page_number in 0..self.max_depth {
            let url = self.feed_url(before);
            debug!(url = %url, page = page_number, "fetching stage feed page");
            let page = FeedPage::parse(&self.transport.get(&url).await?)?;
            if page.stages.is_empty() {
                return Err(BalanceError::NotFound {
                    what: format!("prior completed run of stage {}", self.stage),
                });
            }
            if let Some(instance) = page.stages.iter().find(|stage| self.matches(stage)) {
                info!(
                    stage = %self.stage,
                    pipeline_counter = instance.pipeline_counter,
                    stage_counter = instance.stage_counter,
                    "located historical run"
                );
                return self.resolve(instance).await;
            }
            before = page.oldest_id();
        }
        Err(BalanceError::ExhaustedSearch {
            stage: self.stage.clone(),
            depth: self.max_depth,
        })
    }

    fn feed_url(&self, before: Option<u64>) -> String {
        let base = format!(
            "{}/api/pipelines/{}/stages.json",
            self.base_url, self.pipeline
        );
        match before {
            Some(id) => format!("{base}?before={id}"),
            None => base,
        }
    }

    fn matches(&self, instance: &StageInstance) -> bool {
        instance.pipeline == self.pipeline
            && instance.stage == self.stage
            && instance.result.is_complete()
            && !(instance.pipeline_counter == self.current.pipeline_counter
                && instance.stage_counter == self.current.stage_counter)
    }

    async fn resolve(&self, instance: &StageInstance) -> Result<HistoricalRun> {
        let url = format!("{}/api/stages/{}.json", self.base_url, instance.id);
        let detail = StageDetail::parse(&self.transport.get(&url).await?)?;
        if detail.jobs.is_empty() {
            return Err(BalanceError::NotFound {
                what: format!("jobs of historical stage instance {}", instance.id),
            });
        }
        Ok(HistoricalRun {
            stage: instance.clone(),
            jobs: detail.jobs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedTransport;
    use crate::feed::StageResult;

    fn locator() -> HistoryLocator {
        let config =
            AgentConfig::new("http://go:8153", "app", "units", "units-1").at_run(7, 1);
        HistoryLocator::from_config(Arc::new(ScriptedTransport::new()), &config)
    }

    fn instance(
        id: u64,
        stage: &str,
        pipeline_counter: u64,
        stage_counter: u64,
        result: StageResult,
    ) -> StageInstance {
        StageInstance {
            id,
            pipeline: "app".to_string(),
            stage: stage.to_string(),
            pipeline_counter,
            stage_counter,
            result,
        }
    }

    #[test]
    fn test_feed_url_carries_paging_cursor() {
        let locator = locator();
        assert_eq!(
            locator.feed_url(None),
            "http://go:8153/api/pipelines/app/stages.json"
        );
        assert_eq!(
            locator.feed_url(Some(40)),
            "http://go:8153/api/pipelines/app/stages.json?before=40"
        );
    }

    #[test]
    fn test_matches_wants_a_completed_foreign_run_of_this_stage() {
        let locator = locator();
        assert!(locator.matches(&instance(5, "units", 6, 1, StageResult::Passed)));
        assert!(locator.matches(&instance(5, "units", 6, 1, StageResult::Failed)));
        assert!(!locator.matches(&instance(5, "build", 6, 1, StageResult::Passed)));
        assert!(!locator.matches(&instance(5, "units", 6, 1, StageResult::Building)));
        assert!(!locator.matches(&instance(5, "units", 6, 1, StageResult::Cancelled)));
        // the run in flight
        assert!(!locator.matches(&instance(5, "units", 7, 1, StageResult::Passed)));
    }

    #[test]
    fn test_jobs_named_filters_by_family() {
        let run = HistoricalRun {
            stage: instance(5, "units", 6, 1, StageResult::Passed),
            jobs: vec![
                JobRef {
                    name: "units-1".to_string(),
                    artifact_base_url: "http://go/files/app/6/units/1/units-1".to_string(),
                },
                JobRef {
                    name: "smoke".to_string(),
                    artifact_base_url: "http://go/files/app/6/units/1/smoke".to_string(),
                },
            ],
        };
        let family = vec!["units-1".to_string(), "units-2".to_string()];
        let picked = run.jobs_named(&family);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name, "units-1");
    }
}
