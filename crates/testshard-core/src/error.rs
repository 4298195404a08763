//! Domain-level error taxonomy for testshard.

/// Errors produced when parsing wire-format lines and payloads.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed {kind} line: {line:?}")]
    MalformedLine { kind: &'static str, line: String },

    #[error("empty suite id in {kind} line: {line:?}")]
    EmptySuiteId { kind: &'static str, line: String },
}

/// Errors produced when resolving agent configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("smoothing factor must be within (0.0, 1.0], got {value}")]
    InvalidSmoothingFactor { value: f64 },

    #[error("unknown {role} identifier {name:?} (known: {known})")]
    UnknownStrategy {
        role: &'static str,
        name: String,
        known: &'static str,
    },

    #[error("missing required setting: {key}")]
    MissingSetting { key: &'static str },

    #[error("partition number {number} out of range for {total} partitions")]
    InvalidPartition { number: u64, total: u64 },
}
