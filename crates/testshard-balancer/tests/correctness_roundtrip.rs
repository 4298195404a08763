//! End-to-end reconciliation: shard-server agents balancing against a
//! real [`RepoFactory`], with the HTTP hop replaced by in-process routing.

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;

use testshard_balancer::{
    BalanceError, BalancingEngine, CiServer, CorrectnessChecker, Result, ShardServer, Transport,
};
use testshard_core::{AgentConfig, SuiteFile};
use testshard_server::{RepoFactory, RepoKind};

/// Routes shard-server URLs straight into a [`RepoFactory`], mirroring
/// the daemon's surface: `{ns}/{kind}` appends and latest reads,
/// `{ns}/{kind}/{label}` frozen reads, `{ns}/universe/{label}` and
/// `{ns}/subset/{label}/{claimer}` reconciliation, `{ns}/verify/{label}`.
struct InProcessShard {
    factory: Arc<RepoFactory>,
}

const BASE: &str = "http://repos";

impl InProcessShard {
    fn route(url: &str) -> Result<Vec<&str>> {
        url.strip_prefix(BASE)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(|path| path.split('/').collect())
            .ok_or_else(|| unroutable(url))
    }

    fn kind(name: &str) -> Option<RepoKind> {
        match name {
            "suite_times" => Some(RepoKind::SuiteTimes),
            "failed_suites" => Some(RepoKind::FailedSuites),
            "subset_size" => Some(RepoKind::SubsetSize),
            _ => None,
        }
    }
}

fn unroutable(url: &str) -> BalanceError {
    BalanceError::Transport {
        url: url.to_string(),
        message: "no such route".to_string(),
    }
}

fn storage(url: &str, err: impl ToString) -> BalanceError {
    BalanceError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl Transport for InProcessShard {
    async fn get(&self, url: &str) -> Result<String> {
        let segments = Self::route(url)?;
        match segments.as_slice() {
            [namespace, kind_name] => {
                let kind = Self::kind(kind_name).ok_or_else(|| unroutable(url))?;
                let repo = self
                    .factory
                    .entry_repo(namespace, kind)
                    .await
                    .map_err(|err| storage(url, err))?;
                Ok(repo.render())
            }
            [namespace, "verify", run_label] => {
                let result = self
                    .factory
                    .verify_run(namespace, run_label)
                    .await
                    .map_err(|err| storage(url, err))?;
                Ok(result.render())
            }
            [namespace, kind_name, run_label] => {
                let kind = Self::kind(kind_name).ok_or_else(|| unroutable(url))?;
                let repo = self
                    .factory
                    .frozen_repo(namespace, kind, run_label)
                    .await
                    .map_err(|err| storage(url, err))?;
                Ok(repo.render())
            }
            _ => Err(unroutable(url)),
        }
    }

    async fn put(&self, url: &str, body: String) -> Result<String> {
        let segments = Self::route(url)?;
        match segments.as_slice() {
            [namespace, kind_name] => {
                let kind = Self::kind(kind_name).ok_or_else(|| unroutable(url))?;
                let repo = self
                    .factory
                    .entry_repo(namespace, kind)
                    .await
                    .map_err(|err| storage(url, err))?;
                repo.append(&body).map_err(|err| storage(url, err))?;
                Ok(String::new())
            }
            [namespace, "universe", run_label] => {
                let result = self
                    .factory
                    .submit_universe(namespace, run_label, &body)
                    .await
                    .map_err(|err| storage(url, err))?;
                Ok(result.render())
            }
            [namespace, "subset", run_label, claimer] => {
                let result = self
                    .factory
                    .claim_subset(namespace, run_label, claimer, &body)
                    .await
                    .map_err(|err| storage(url, err))?;
                Ok(result.render())
            }
            _ => Err(unroutable(url)),
        }
    }
}

fn agent(number: u64, total: u64) -> AgentConfig {
    let mut config = AgentConfig::new(BASE, "app", "units", "units");
    config.total_partitions = Some(total);
    config.partition_number = Some(number);
    config
}

fn universe(names: &[&str]) -> Vec<SuiteFile> {
    names.iter().map(|name| SuiteFile::from(*name)).collect()
}

fn shard(transport: &Arc<InProcessShard>, config: AgentConfig) -> Arc<ShardServer> {
    Arc::new(ShardServer::from_config(transport.clone(), config).unwrap())
}

/// Test: three partitions balance, claim, and verify one run; together
/// they cover the universe exactly and the verify call says so.
#[tokio::test]
async fn three_partitions_reconcile_a_full_run() {
    let dir = tempdir().unwrap();
    let factory = Arc::new(RepoFactory::new(dir.path()).unwrap());
    let transport = Arc::new(InProcessShard {
        factory: Arc::clone(&factory),
    });
    let all = universe(&["a.rb", "b.rb", "c.rb", "d.rb", "e.rb", "f.rb", "g.rb"]);

    let mut covered = Vec::new();
    for number in 1..=3 {
        let server = shard(&transport, agent(number, 3));
        let engine = BalancingEngine::from_config(server.clone(), &agent(number, 3))
            .unwrap();
        let subset = engine.balance(&all).await.unwrap();
        CorrectnessChecker::new(server.clone())
            .claim(&all, &subset)
            .await
            .unwrap();
        covered.extend(subset);
    }

    assert_eq!(covered, all);

    let checker = CorrectnessChecker::new(shard(&transport, agent(1, 3)));
    let verdict = checker.verify().await.unwrap();
    assert!(verdict.success);
    assert_eq!(verdict.message, "all 7 files claimed");

    let sizes = factory
        .entry_repo("app-units", RepoKind::SubsetSize)
        .await
        .unwrap()
        .load();
    assert_eq!(sizes, ["2", "2", "3"]);
}

/// Test: a subset overlapping an earlier claim is rejected whole, and
/// the agent surfaces it as a mismatch naming the holder.
#[tokio::test]
async fn overlapping_claims_are_rejected() {
    let dir = tempdir().unwrap();
    let factory = Arc::new(RepoFactory::new(dir.path()).unwrap());
    let transport = Arc::new(InProcessShard { factory });
    let all = universe(&["a.rb", "b.rb", "c.rb", "d.rb"]);

    let first = CorrectnessChecker::new(shard(&transport, agent(1, 2)));
    first.claim(&all, &universe(&["a.rb", "b.rb"])).await.unwrap();

    let second = CorrectnessChecker::new(shard(&transport, agent(2, 2)));
    let err = second
        .claim(&all, &universe(&["b.rb", "c.rb"]))
        .await
        .unwrap_err();
    assert!(matches!(err, BalanceError::Mismatch { .. }));
    assert!(err.to_string().contains("already claimed by units-1"));
}

/// Test: agents disagreeing on the universe cannot both proceed.
#[tokio::test]
async fn conflicting_universes_are_rejected() {
    let dir = tempdir().unwrap();
    let factory = Arc::new(RepoFactory::new(dir.path()).unwrap());
    let transport = Arc::new(InProcessShard { factory });

    let first = CorrectnessChecker::new(shard(&transport, agent(1, 2)));
    first
        .claim(&universe(&["a.rb", "b.rb"]), &universe(&["a.rb"]))
        .await
        .unwrap();

    let second = CorrectnessChecker::new(shard(&transport, agent(2, 2)));
    let err = second
        .claim(&universe(&["a.rb", "stray.rb"]), &universe(&["stray.rb"]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("universe mismatch"));
}

/// Test: verifying before every partition has claimed reports exactly
/// the unclaimed files as a conflict, not an error.
#[tokio::test]
async fn verify_reports_unclaimed_files() {
    let dir = tempdir().unwrap();
    let factory = Arc::new(RepoFactory::new(dir.path()).unwrap());
    let transport = Arc::new(InProcessShard { factory });
    let all = universe(&["a.rb", "b.rb", "c.rb"]);

    let checker = CorrectnessChecker::new(shard(&transport, agent(1, 2)));
    checker.claim(&all, &universe(&["a.rb"])).await.unwrap();

    let verdict = checker.verify().await.unwrap();
    assert!(!verdict.success);
    assert_eq!(verdict.message, "unclaimed files: b.rb, c.rb");
}

/// Test: durations recorded in one run drive the next run's time-based
/// split through its frozen snapshot.
#[tokio::test]
async fn recorded_times_balance_the_next_run() {
    let dir = tempdir().unwrap();
    let factory = Arc::new(RepoFactory::new(dir.path()).unwrap());
    let transport = Arc::new(InProcessShard { factory });
    let all = universe(&["slow.rb", "quick.rb", "tiny.rb", "little.rb"]);

    let recorder = shard(&transport, agent(1, 2).at_run(1, 1));
    recorder.record_suite_time("slow.rb", 400).await.unwrap();
    recorder.record_suite_time("quick.rb", 100).await.unwrap();
    recorder.record_suite_time("tiny.rb", 50).await.unwrap();
    recorder.record_suite_time("little.rb", 50).await.unwrap();

    let mut subsets = Vec::new();
    for number in 1..=2 {
        let mut config = agent(number, 2).at_run(2, 1);
        config.splitter = "time".to_string();
        let server = shard(&transport, config.clone());
        let engine = BalancingEngine::from_config(server, &config).unwrap();
        subsets.push(engine.balance(&all).await.unwrap());
    }

    assert_eq!(subsets[0], universe(&["slow.rb"]));
    assert_eq!(subsets[1], universe(&["quick.rb", "tiny.rb", "little.rb"]));
}
