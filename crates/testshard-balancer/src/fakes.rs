//! In-memory test doubles.
//!
//! `ScriptedTransport` serves canned responses keyed by exact URL and
//! records every `put`, so backends can be exercised without a server.
//! `StaticServer` fakes the whole [`CiServer`] seam with fixed history,
//! so splitters, orderers and the engine can be exercised without a
//! backend. Public because integration tests and downstream consumers
//! script against the same contracts.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use testshard_core::{OperationResult, SuiteFile, SuiteResultEntry, SuiteTimeEntry};

use crate::error::{BalanceError, Result};
use crate::service::CiServer;
use crate::transport::Transport;

/// One recorded `put` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecord {
    pub url: String,
    pub body: String,
}

enum Scripted {
    Respond(String),
    Fail(String),
}

/// Transport fake driven entirely by scripted URL responses.
#[derive(Default)]
pub struct ScriptedTransport {
    gets: Mutex<HashMap<String, Scripted>>,
    put_responses: Mutex<HashMap<String, Scripted>>,
    puts: Mutex<Vec<PutRecord>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for GETs of `url`.
    pub fn on_get(&self, url: impl Into<String>, body: impl Into<String>) {
        self.gets
            .lock()
            .unwrap()
            .insert(url.into(), Scripted::Respond(body.into()));
    }

    /// Fail GETs of `url` with a transport error.
    pub fn fail_get(&self, url: impl Into<String>, message: impl Into<String>) {
        self.gets
            .lock()
            .unwrap()
            .insert(url.into(), Scripted::Fail(message.into()));
    }

    /// Respond to PUTs of `url` with `body` (default response is empty).
    pub fn on_put(&self, url: impl Into<String>, body: impl Into<String>) {
        self.put_responses
            .lock()
            .unwrap()
            .insert(url.into(), Scripted::Respond(body.into()));
    }

    /// Fail PUTs of `url` with a transport error.
    pub fn fail_put(&self, url: impl Into<String>, message: impl Into<String>) {
        self.put_responses
            .lock()
            .unwrap()
            .insert(url.into(), Scripted::Fail(message.into()));
    }

    /// Every recorded `put`, in call order.
    pub fn puts(&self) -> Vec<PutRecord> {
        self.puts.lock().unwrap().clone()
    }

    /// Bodies of recorded `put`s to one URL, in call order.
    pub fn put_bodies(&self, url: &str) -> Vec<String> {
        self.puts
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.url == url)
            .map(|record| record.body.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<String> {
        match self.gets.lock().unwrap().get(url) {
            Some(Scripted::Respond(body)) => Ok(body.clone()),
            Some(Scripted::Fail(message)) => Err(BalanceError::Transport {
                url: url.to_string(),
                message: message.clone(),
            }),
            None => Err(BalanceError::Transport {
                url: url.to_string(),
                message: "no scripted response".to_string(),
            }),
        }
    }

    async fn put(&self, url: &str, body: String) -> Result<String> {
        self.puts.lock().unwrap().push(PutRecord {
            url: url.to_string(),
            body,
        });
        match self.put_responses.lock().unwrap().get(url) {
            Some(Scripted::Respond(body)) => Ok(body.clone()),
            Some(Scripted::Fail(message)) => Err(BalanceError::Transport {
                url: url.to_string(),
                message: message.clone(),
            }),
            None => Ok(String::new()),
        }
    }
}

/// `CiServer` fake with fixed peers and history, recording every write.
pub struct StaticServer {
    job: String,
    peers: Vec<String>,
    times: Vec<SuiteTimeEntry>,
    failures: Vec<SuiteResultEntry>,
    history_missing: bool,
    recorded_times: Mutex<Vec<SuiteTimeEntry>>,
    recorded_results: Mutex<Vec<SuiteResultEntry>>,
    published_sizes: Mutex<Vec<u64>>,
}

impl StaticServer {
    pub fn new(job: impl Into<String>, peers: &[&str]) -> Self {
        StaticServer {
            job: job.into(),
            peers: peers.iter().map(|peer| peer.to_string()).collect(),
            times: Vec::new(),
            failures: Vec::new(),
            history_missing: false,
            recorded_times: Mutex::new(Vec::new()),
            recorded_results: Mutex::new(Vec::new()),
            published_sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_times(mut self, times: Vec<SuiteTimeEntry>) -> Self {
        self.times = times;
        self
    }

    pub fn with_failures(mut self, failures: Vec<SuiteResultEntry>) -> Self {
        self.failures = failures;
        self
    }

    /// Make both history reads fail as a genuinely absent prior run.
    pub fn without_history(mut self) -> Self {
        self.history_missing = true;
        self
    }

    pub fn recorded_times(&self) -> Vec<SuiteTimeEntry> {
        self.recorded_times.lock().unwrap().clone()
    }

    pub fn recorded_results(&self) -> Vec<SuiteResultEntry> {
        self.recorded_results.lock().unwrap().clone()
    }

    pub fn published_sizes(&self) -> Vec<u64> {
        self.published_sizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl CiServer for StaticServer {
    fn job_name(&self) -> &str {
        &self.job
    }

    async fn peer_jobs(&self) -> Result<Vec<String>> {
        Ok(self.peers.clone())
    }

    async fn last_run_times(&self, _jobs: &[String]) -> Result<Vec<SuiteTimeEntry>> {
        if self.history_missing {
            return Err(BalanceError::NotFound {
                what: "prior run in static fixture".to_string(),
            });
        }
        Ok(self.times.clone())
    }

    async fn last_run_failures(&self, _jobs: &[String]) -> Result<Vec<SuiteResultEntry>> {
        if self.history_missing {
            return Err(BalanceError::NotFound {
                what: "prior run in static fixture".to_string(),
            });
        }
        Ok(self.failures.clone())
    }

    async fn record_suite_time(&self, suite: &str, millis: u64) -> Result<()> {
        self.recorded_times
            .lock()
            .unwrap()
            .push(SuiteTimeEntry::new(suite, millis));
        Ok(())
    }

    async fn record_suite_result(&self, suite: &str, failed: bool) -> Result<()> {
        self.recorded_results
            .lock()
            .unwrap()
            .push(SuiteResultEntry::new(suite, failed));
        Ok(())
    }

    async fn publish_subset_size(&self, count: u64) -> Result<()> {
        self.published_sizes.lock().unwrap().push(count);
        Ok(())
    }

    async fn submit_universe(&self, _universe: &[SuiteFile]) -> Result<OperationResult> {
        Err(BalanceError::Unsupported {
            operation: "universe submission",
            backend: "static fixture",
        })
    }

    async fn submit_subset(&self, _subset: &[SuiteFile]) -> Result<OperationResult> {
        Err(BalanceError::Unsupported {
            operation: "subset submission",
            backend: "static fixture",
        })
    }

    async fn verify_complete(&self) -> Result<OperationResult> {
        Err(BalanceError::Unsupported {
            operation: "run verification",
            backend: "static fixture",
        })
    }
}
