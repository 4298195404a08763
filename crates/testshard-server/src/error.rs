//! Storage-side error taxonomy.

use std::path::PathBuf;

use testshard_core::ParseError;

/// Errors surfaced by the repository store.
///
/// Reconciliation outcomes (priming conflicts, rejected claims) are not
/// errors; they travel as [`testshard_core::OperationResult`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt repository file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("rejected payload: {0}")]
    Rejected(#[from] ParseError),
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StorageError::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::corrupt("/data/x.json", "not valid json");
        let msg = err.to_string();
        assert!(msg.contains("/data/x.json"));
        assert!(msg.contains("not valid json"));
    }

    #[test]
    fn test_rejected_wraps_parse_error() {
        let parse = ParseError::MalformedLine {
            kind: "suite time",
            line: "garbage".to_string(),
        };
        let err = StorageError::from(parse);
        assert!(err.to_string().contains("rejected payload"));
    }
}
