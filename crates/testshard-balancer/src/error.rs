//! Agent-side error taxonomy.

use testshard_core::{ConfigError, ParseError};

/// Errors surfaced while balancing.
///
/// Transport failures are fatal for the operation that hit them and are
/// never retried. `NotFound` is recoverable; callers that can fall back
/// to defaults (empty history) do so. `ExhaustedSearch` and
/// `Unsupported` are not recoverable.
#[derive(Debug, thiserror::Error)]
pub enum BalanceError {
    #[error("transport failure for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("couldn't find a historical run for stage {stage} in '{depth}' pages of the stage feed")]
    ExhaustedSearch { stage: String, depth: usize },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("{operation} is only available against a reconciliation-capable server, not the {backend} backend")]
    Unsupported {
        operation: &'static str,
        backend: &'static str,
    },

    #[error("correctness mismatch: {message}")]
    Mismatch { message: String },

    #[error("bad wire payload: {0}")]
    Parse(#[from] ParseError),

    #[error("bad feed document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("bad configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for balancing operations.
pub type Result<T> = std::result::Result<T, BalanceError>;
