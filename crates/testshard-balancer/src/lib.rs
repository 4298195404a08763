//! # testshard-balancer
//!
//! The agent-side library: everything a CI job needs to compute its own
//! share of a shared test universe without a central scheduler.
//!
//! - Opaque text transport to the CI server ([`transport`])
//! - Stage feed documents and paging ([`feed`])
//! - Backward search for the last comparable run ([`locator`])
//! - The backend seam and its two implementations ([`service`],
//!   [`pipeline_server`], [`shard_server`])
//! - Partition and ordering strategies ([`split`], [`order`])
//! - The balancing flow itself ([`engine`])
//! - After-the-fact coverage reconciliation ([`correctness`])
//!
//! Each agent independently derives its family and position from the
//! peer-job list, recomputes the full partition table from shared
//! history, and takes its own slice. No agent ever talks to another.

pub mod correctness;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod feed;
pub mod locator;
pub mod order;
pub mod pipeline_server;
pub mod service;
pub mod shard_server;
pub mod split;
pub mod transport;

pub use correctness::CorrectnessChecker;
pub use engine::BalancingEngine;
pub use error::{BalanceError, Result};
pub use fakes::{PutRecord, ScriptedTransport, StaticServer};
pub use feed::{FeedPage, JobRef, StageDetail, StageInstance, StageResult};
pub use locator::{HistoricalRun, HistoryLocator, RunIdentity};
pub use order::{orderer, FailedFirstOrderer, NoOpOrderer, SuiteOrderer};
pub use pipeline_server::PipelineServer;
pub use service::{
    CiServer, FAILED_SUITES_ARTIFACT, SUBSET_SIZE_ARTIFACT, SUITE_TIMES_ARTIFACT,
};
pub use shard_server::ShardServer;
pub use split::{splitter, CountBasedSplitter, PartitionSlot, SuiteSplitter, TimeBasedSplitter};
pub use transport::{HttpTransport, Transport};
