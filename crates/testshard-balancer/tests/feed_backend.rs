//! Integration tests for the pipeline-feed backend over a scripted
//! transport: paging, history aggregation, batch publication, smoothing.

use std::sync::Arc;

use testshard_balancer::{
    BalanceError, BalancingEngine, CiServer, PipelineServer, ScriptedTransport,
};
use testshard_core::{AgentConfig, SmoothingFactor, SuiteFile};

const CURRENT_STAGE: &str = "http://go:8153/api/stages/app/7/units/1.json";
const FEED_HEAD: &str = "http://go:8153/api/pipelines/app/stages.json";
const TIMES_ARTIFACT: &str = "http://go:8153/files/app/7/units/1/units-2/testshard/suite_times";
const FAILURES_ARTIFACT: &str =
    "http://go:8153/files/app/7/units/1/units-2/testshard/failed_suites";
const SUBSET_SIZE_ARTIFACT: &str =
    "http://go:8153/files/app/7/units/1/units-2/testshard/subset_size";

fn config() -> AgentConfig {
    AgentConfig::new("http://go:8153", "app", "units", "units-2").at_run(7, 1)
}

fn family() -> Vec<String> {
    vec![
        "units-1".to_string(),
        "units-2".to_string(),
        "units-3".to_string(),
    ]
}

fn universe(names: &[&str]) -> Vec<SuiteFile> {
    names.iter().map(|name| SuiteFile::from(*name)).collect()
}

/// Jobs of the in-flight run, deliberately out of order.
fn script_current_stage(transport: &ScriptedTransport) {
    transport.on_get(
        CURRENT_STAGE,
        r#"{"jobs":[
            {"name":"units-3","artifact_base_url":"http://go:8153/files/app/7/units/1/units-3"},
            {"name":"rails","artifact_base_url":"http://go:8153/files/app/7/units/1/rails"},
            {"name":"units-1","artifact_base_url":"http://go:8153/files/app/7/units/1/units-1"},
            {"name":"smoke","artifact_base_url":"http://go:8153/files/app/7/units/1/smoke"},
            {"name":"units-2","artifact_base_url":"http://go:8153/files/app/7/units/1/units-2"}
        ]}"#,
    );
}

/// Two feed pages. The head page holds this very run (counters 7/1,
/// never a match even though complete) and a cancelled older run; the
/// prior completed run sits one page back.
fn script_feed_history(transport: &ScriptedTransport) {
    transport.on_get(
        FEED_HEAD,
        r#"{"stages":[
            {"id":42,"pipeline":"app","stage":"units","pipeline_counter":7,"stage_counter":1,"result":"passed"},
            {"id":40,"pipeline":"app","stage":"units","pipeline_counter":6,"stage_counter":2,"result":"cancelled"}
        ]}"#,
    );
    transport.on_get(
        format!("{FEED_HEAD}?before=40"),
        r#"{"stages":[
            {"id":33,"pipeline":"app","stage":"units","pipeline_counter":6,"stage_counter":1,"result":"passed"},
            {"id":30,"pipeline":"app","stage":"build","pipeline_counter":6,"stage_counter":1,"result":"passed"}
        ]}"#,
    );
    transport.on_get(
        "http://go:8153/api/stages/33.json",
        r#"{"jobs":[
            {"name":"units-1","artifact_base_url":"http://go:8153/files/app/6/units/1/units-1"},
            {"name":"units-2","artifact_base_url":"http://go:8153/files/app/6/units/1/units-2"},
            {"name":"units-3","artifact_base_url":"http://go:8153/files/app/6/units/1/units-3"},
            {"name":"rails","artifact_base_url":"http://go:8153/files/app/6/units/1/rails"}
        ]}"#,
    );
}

fn script_time_artifacts(transport: &ScriptedTransport) {
    transport.on_get(
        "http://go:8153/files/app/6/units/1/units-1/testshard/suite_times",
        "one.rb: 10\ntwo.rb: 20\n",
    );
    transport.on_get(
        "http://go:8153/files/app/6/units/1/units-2/testshard/suite_times",
        "three.rb: 30\nfour.rb: 40\n",
    );
    transport.on_get(
        "http://go:8153/files/app/6/units/1/units-3/testshard/suite_times",
        "",
    );
}

/// Test: peer jobs come from the current run's stage detail, order kept.
#[tokio::test]
async fn peer_jobs_come_from_the_current_stage() {
    let transport = Arc::new(ScriptedTransport::new());
    script_current_stage(&transport);
    let server = PipelineServer::new(transport.clone(), config());

    let jobs = server.peer_jobs().await.unwrap();
    assert_eq!(jobs, ["units-3", "rails", "units-1", "smoke", "units-2"]);
}

/// Test: the locator pages backwards past the in-flight run and
/// incomplete instances, then family artifacts aggregate; an empty
/// artifact contributes nothing.
#[tokio::test]
async fn history_aggregates_family_artifacts_across_pages() {
    let transport = Arc::new(ScriptedTransport::new());
    script_feed_history(&transport);
    script_time_artifacts(&transport);
    let server = PipelineServer::new(transport.clone(), config());

    let times = server.last_run_times(&family()).await.unwrap();
    let rendered: Vec<String> = times.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        ["one.rb: 10", "two.rb: 20", "three.rb: 30", "four.rb: 40"]
    );
}

/// Test: the search gives up after the configured number of pages with
/// an error naming that budget, and never requests a page beyond it.
#[tokio::test]
async fn search_stops_at_the_configured_page_budget() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.on_get(
        FEED_HEAD,
        r#"{"stages":[
            {"id":40,"pipeline":"app","stage":"build","pipeline_counter":6,"stage_counter":1,"result":"passed"}
        ]}"#,
    );
    transport.on_get(
        format!("{FEED_HEAD}?before=40"),
        r#"{"stages":[
            {"id":30,"pipeline":"app","stage":"build","pipeline_counter":5,"stage_counter":1,"result":"passed"}
        ]}"#,
    );
    let mut config = config();
    config.search_depth = 2;
    let server = PipelineServer::new(transport.clone(), config);

    let err = server.last_run_times(&family()).await.unwrap_err();
    assert!(matches!(err, BalanceError::ExhaustedSearch { .. }));
    assert!(err.to_string().contains("'2' pages"));
}

/// Test: an empty feed page means genuinely no prior run; time-based
/// balancing proceeds with uniform weights instead of failing.
#[tokio::test]
async fn missing_history_falls_back_to_uniform_split() {
    let transport = Arc::new(ScriptedTransport::new());
    script_current_stage(&transport);
    transport.on_get(FEED_HEAD, r#"{"stages":[]}"#);
    let mut config = config();
    config.splitter = "time".to_string();
    let server = Arc::new(PipelineServer::new(transport.clone(), config.clone()));
    let engine = BalancingEngine::from_config(server, &config).unwrap();

    let subset = engine
        .balance(&universe(&["a.rb", "b.rb", "c.rb", "d.rb"]))
        .await
        .unwrap();

    // units-2 holds position 1 of 3 under uniform weights
    assert_eq!(subset, universe(&["b.rb"]));
    assert_eq!(transport.put_bodies(SUBSET_SIZE_ARTIFACT), ["1\n"]);
}

/// Test: one family job's unreadable artifact is skipped, the rest count.
#[tokio::test]
async fn unreadable_artifact_is_skipped() {
    let transport = Arc::new(ScriptedTransport::new());
    script_feed_history(&transport);
    script_time_artifacts(&transport);
    transport.fail_get(
        "http://go:8153/files/app/6/units/1/units-2/testshard/suite_times",
        "410 gone",
    );
    let server = PipelineServer::new(transport.clone(), config());

    let times = server.last_run_times(&family()).await.unwrap();
    let suites: Vec<&str> = times.iter().map(|entry| entry.suite.as_str()).collect();
    assert_eq!(suites, ["one.rb", "two.rb"]);
}

/// Test: failure history can never fail the run; any trouble finding it
/// degrades to an empty list.
#[tokio::test]
async fn failure_history_degrades_to_empty() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.fail_get(FEED_HEAD, "connection refused");
    let server = PipelineServer::new(transport.clone(), config());

    let failures = server.last_run_failures(&family()).await.unwrap();
    assert!(failures.is_empty());
}

/// Test: recorded times accumulate and publish in one PUT when the last
/// assigned suite reports, per the most recently published subset size.
#[tokio::test]
async fn times_publish_once_per_balanced_batch() {
    let transport = Arc::new(ScriptedTransport::new());
    let server = PipelineServer::new(transport.clone(), config());

    server.publish_subset_size(3).await.unwrap();
    assert_eq!(transport.put_bodies(SUBSET_SIZE_ARTIFACT), ["3\n"]);

    server.record_suite_time("a.rb", 12).await.unwrap();
    server.record_suite_time("b.rb", 15).await.unwrap();
    assert!(transport.put_bodies(TIMES_ARTIFACT).is_empty());

    server.record_suite_time("c.rb", 10).await.unwrap();
    assert_eq!(
        transport.put_bodies(TIMES_ARTIFACT),
        ["a.rb: 12\nb.rb: 15\nc.rb: 10\n"]
    );
}

/// Test: recorded times blend into the last run's baseline before they
/// are cached or published.
#[tokio::test]
async fn times_smooth_against_last_run_baseline() {
    let transport = Arc::new(ScriptedTransport::new());
    script_current_stage(&transport);
    script_feed_history(&transport);
    transport.on_get(
        "http://go:8153/files/app/6/units/1/units-1/testshard/suite_times",
        "one.rb: 10\ntwo.rb: 20\n",
    );
    transport.on_get(
        "http://go:8153/files/app/6/units/1/units-2/testshard/suite_times",
        "three.rb: 30\n",
    );
    transport.on_get(
        "http://go:8153/files/app/6/units/1/units-3/testshard/suite_times",
        "",
    );
    let mut config = config();
    config.smoothing = SmoothingFactor::new(0.5).unwrap();
    let server = PipelineServer::new(transport.clone(), config);

    server.publish_subset_size(3).await.unwrap();
    server.record_suite_time("one.rb", 100).await.unwrap();
    server.record_suite_time("two.rb", 40).await.unwrap();
    server.record_suite_time("three.rb", 10).await.unwrap();

    assert_eq!(
        transport.put_bodies(TIMES_ARTIFACT),
        ["one.rb: 55\ntwo.rb: 30\nthree.rb: 20\n"]
    );
}

/// Test: every result is recorded, only the failed suites are published.
#[tokio::test]
async fn only_failed_suites_are_published() {
    let transport = Arc::new(ScriptedTransport::new());
    let server = PipelineServer::new(transport.clone(), config());

    server.publish_subset_size(3).await.unwrap();
    server.record_suite_result("ok.rb", false).await.unwrap();
    server.record_suite_result("broken.rb", true).await.unwrap();
    assert!(transport.put_bodies(FAILURES_ARTIFACT).is_empty());

    server.record_suite_result("fine.rb", false).await.unwrap();
    assert_eq!(transport.put_bodies(FAILURES_ARTIFACT), ["broken.rb: true\n"]);
}

/// Test: reconciliation against this backend fails loudly, never as a
/// silent no-op.
#[tokio::test]
async fn correctness_is_refused_loudly() {
    let transport = Arc::new(ScriptedTransport::new());
    let server = PipelineServer::new(transport, config());

    let err = server
        .submit_universe(&universe(&["a.rb"]))
        .await
        .unwrap_err();
    assert!(matches!(err, BalanceError::Unsupported { .. }));
    assert!(err.to_string().contains("pipeline feed"));
}
