//! Agent configuration and variable resolution.
//!
//! Configuration arrives here already parsed; reading environment or CLI
//! flags is the host's concern. [`VarResolver`] handles the one resolution
//! concern that stays in the domain: `${key}` references inside
//! environment-shaped values (namespaces, artifact URLs), resolved
//! recursively with a fixed budget.

use std::collections::HashMap;

use crate::smoothing::SmoothingFactor;

/// Default number of feed pages a historical-run search may visit.
pub const DEFAULT_SEARCH_DEPTH: usize = 10;

/// Resolved settings for one balancing agent.
///
/// `pipeline_counter` / `stage_counter` identify the in-flight run so the
/// locator never matches it; `run_label` tags the frozen history snapshot
/// all agents of this run read. `total_partitions` / `partition_number`
/// are only meaningful against the history-server backend, which
/// synthesizes peer jobs from them.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub base_url: String,
    pub pipeline: String,
    pub stage: String,
    pub job: String,
    pub pipeline_counter: u64,
    pub stage_counter: u64,
    pub run_label: String,
    pub search_depth: usize,
    pub smoothing: SmoothingFactor,
    pub splitter: String,
    pub orderer: String,
    pub namespace: String,
    pub total_partitions: Option<u64>,
    pub partition_number: Option<u64>,
}

impl AgentConfig {
    pub fn new(
        base_url: impl Into<String>,
        pipeline: impl Into<String>,
        stage: impl Into<String>,
        job: impl Into<String>,
    ) -> Self {
        let pipeline = pipeline.into();
        let stage = stage.into();
        AgentConfig {
            base_url: base_url.into(),
            namespace: format!("{pipeline}-{stage}"),
            pipeline,
            stage,
            job: job.into(),
            pipeline_counter: 1,
            stage_counter: 1,
            run_label: "1-1".to_string(),
            search_depth: DEFAULT_SEARCH_DEPTH,
            smoothing: SmoothingFactor::OFF,
            splitter: "count".to_string(),
            orderer: "noop".to_string(),
            total_partitions: None,
            partition_number: None,
        }
    }

    /// Tag this config with its run identity and derive the run label.
    pub fn at_run(mut self, pipeline_counter: u64, stage_counter: u64) -> Self {
        self.pipeline_counter = pipeline_counter;
        self.stage_counter = stage_counter;
        self.run_label = format!("{pipeline_counter}-{stage_counter}");
        self
    }
}

const MAX_RESOLUTION_DEPTH: usize = 16;

/// Key/value lookup with recursive `${key}` reference resolution.
///
/// References resolve through other entries up to a fixed budget; text
/// that never resolves (unknown key, unterminated brace, budget spent)
/// passes through literally.
#[derive(Debug, Clone, Default)]
pub struct VarResolver {
    vars: HashMap<String, String>,
}

impl VarResolver {
    pub fn new(vars: HashMap<String, String>) -> Self {
        VarResolver { vars }
    }

    /// Look up `key` and resolve references inside its value.
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.vars.get(key).map(|value| self.resolve(value))
    }

    /// Look up `key`, falling back to `default` when absent.
    pub fn lookup_or(&self, key: &str, default: &str) -> String {
        self.lookup(key).unwrap_or_else(|| default.to_string())
    }

    /// First present key of a fallback chain, resolved.
    pub fn lookup_first(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.lookup(key))
    }

    /// Resolve `${key}` references inside arbitrary text.
    pub fn resolve(&self, text: &str) -> String {
        self.resolve_with_budget(text, MAX_RESOLUTION_DEPTH)
    }

    fn resolve_with_budget(&self, text: &str, budget: usize) -> String {
        if budget == 0 || !text.contains("${") {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let key = &after[..end];
                    match self.vars.get(key) {
                        Some(value) => {
                            out.push_str(&self.resolve_with_budget(value, budget - 1));
                        }
                        None => {
                            out.push_str("${");
                            out.push_str(key);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    // unterminated reference stays literal
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}
