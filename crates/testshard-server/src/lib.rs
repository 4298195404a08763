//! # testshard-server
//!
//! Server-side storage for the testshard history server:
//!
//! - Append-only entry repositories addressed by (namespace, kind, version)
//!   with frozen per-run snapshots ([`repo`], [`factory`])
//! - Universe priming and subset claiming for post-hoc partition
//!   reconciliation ([`set_repo`])
//! - Disk persistence and the retention sweep ([`factory`], [`sweep`])
//!
//! Request routing and transport live outside this crate; callers hand in
//! already-extracted namespaces, run labels and payloads.

pub mod error;
pub mod factory;
pub mod repo;
pub mod set_repo;
pub mod sweep;

pub use error::{Result, StorageError};
pub use factory::RepoFactory;
pub use repo::{EntryRepo, RepoKey, RepoKind, RepoVersion};
pub use set_repo::{SetRepo, SetSnapshot};
pub use sweep::{sweep_loop, SweepConfig};
