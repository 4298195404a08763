//! Suite files and set payloads.
//!
//! A universe or subset crosses the wire as newline-joined file names,
//! order preserved. File names are opaque; blank lines are skipped.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one test suite file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuiteFile(pub String);

impl SuiteFile {
    pub fn new(name: impl Into<String>) -> Self {
        SuiteFile(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SuiteFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SuiteFile {
    fn from(name: &str) -> Self {
        SuiteFile(name.to_string())
    }
}

/// Render a set payload, one file name per line, newline-terminated.
pub fn render_set(files: &[SuiteFile]) -> String {
    let mut out = String::new();
    for file in files {
        out.push_str(file.as_str());
        out.push('\n');
    }
    out
}

/// Parse a set payload, skipping blank lines, order preserved.
pub fn parse_set(payload: &str) -> Vec<SuiteFile> {
    payload
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(SuiteFile::from)
        .collect()
}
