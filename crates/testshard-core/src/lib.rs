//! # testshard-core
//!
//! Domain model shared by the balancing agents and the history server:
//!
//! - Suite entries and their line-oriented wire format ([`entry`])
//! - Suite-file sets and set payloads ([`suite`])
//! - Partition-suffixed job families ([`family`])
//! - Exponential smoothing of recorded durations ([`smoothing`])
//! - Agent configuration and `${key}` resolution ([`config`])
//! - Reconciliation operation results ([`result`])
//!
//! This crate performs no I/O; transports and stores live in
//! `testshard-balancer` and `testshard-server`.

pub mod config;
pub mod entry;
pub mod error;
pub mod family;
pub mod result;
pub mod smoothing;
pub mod suite;
pub mod telemetry;

pub use config::{AgentConfig, VarResolver, DEFAULT_SEARCH_DEPTH};
pub use entry::{latest_results, latest_times, SuiteResultEntry, SuiteTimeEntry};
pub use error::{ConfigError, ParseError};
pub use family::JobFamily;
pub use result::OperationResult;
pub use smoothing::SmoothingFactor;
pub use suite::{parse_set, render_set, SuiteFile};
pub use telemetry::init_tracing;

/// testshard domain version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
