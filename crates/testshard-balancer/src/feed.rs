//! Documents served by the CI server's stage feed.
//!
//! The feed is paged newest-first: each page lists stage instances and
//! the next page is requested with `?before=<oldest id on this page>`.
//! A stage instance only carries identity and outcome; the jobs that
//! ran in it come from the per-stage detail document.

use serde::Deserialize;

use crate::error::Result;

/// Outcome of a stage instance as reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageResult {
    Passed,
    Failed,
    Cancelled,
    Building,
}

impl StageResult {
    /// Whether the stage ran to completion. Cancelled and in-flight
    /// runs have no usable history.
    pub fn is_complete(&self) -> bool {
        matches!(self, StageResult::Passed | StageResult::Failed)
    }
}

/// One stage instance on a feed page.
#[derive(Debug, Clone, Deserialize)]
pub struct StageInstance {
    pub id: u64,
    pub pipeline: String,
    pub stage: String,
    pub pipeline_counter: u64,
    pub stage_counter: u64,
    pub result: StageResult,
}

/// A page of the stage feed, newest instance first.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedPage {
    pub stages: Vec<StageInstance>,
}

impl FeedPage {
    pub fn parse(document: &str) -> Result<Self> {
        Ok(serde_json::from_str(document)?)
    }

    /// Paging cursor: the smallest id on this page, if any.
    pub fn oldest_id(&self) -> Option<u64> {
        self.stages.iter().map(|stage| stage.id).min()
    }
}

/// One job of a historical stage instance, with the base URL its
/// artifacts are read from.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRef {
    pub name: String,
    pub artifact_base_url: String,
}

/// Detail document for a single stage instance.
#[derive(Debug, Clone, Deserialize)]
pub struct StageDetail {
    pub jobs: Vec<JobRef>,
}

impl StageDetail {
    pub fn parse(document: &str) -> Result<Self> {
        Ok(serde_json::from_str(document)?)
    }
}
