//! Suite entries and their wire format.
//!
//! Entries cross process boundaries as delimited text lines:
//! `<suiteId>: <durationMillis>` for times and `<suiteId>: <true|false>`
//! for results. Multi-entry payloads are newline-joined; blank lines are
//! skipped on parse. Suite ids may themselves contain `": "`, so parsing
//! splits on the last occurrence.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// A recorded wall-clock duration for one suite file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteTimeEntry {
    /// Suite identifier, opaque to the balancer.
    pub suite: String,

    /// Observed (possibly smoothed) duration in milliseconds.
    pub millis: u64,
}

impl SuiteTimeEntry {
    pub fn new(suite: impl Into<String>, millis: u64) -> Self {
        SuiteTimeEntry {
            suite: suite.into(),
            millis,
        }
    }

    /// Parse a single `<suiteId>: <durationMillis>` line.
    pub fn parse_line(line: &str) -> Result<Self, ParseError> {
        let (suite, value) = split_wire_line(line, "suite time")?;
        let millis = value
            .parse::<u64>()
            .map_err(|_| ParseError::MalformedLine {
                kind: "suite time",
                line: line.to_string(),
            })?;
        Ok(SuiteTimeEntry::new(suite, millis))
    }

    /// Parse a newline-delimited payload, skipping blank lines.
    pub fn parse_list(payload: &str) -> Result<Vec<Self>, ParseError> {
        payload
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Self::parse_line)
            .collect()
    }

    /// Render a payload, one line per entry, newline-terminated.
    pub fn render_list(entries: &[Self]) -> String {
        let mut out = String::new();
        for entry in entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for SuiteTimeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.suite, self.millis)
    }
}

/// A recorded pass/fail outcome for one suite file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteResultEntry {
    /// Suite identifier, opaque to the balancer.
    pub suite: String,

    /// True when the suite failed in the recorded run.
    pub failed: bool,
}

impl SuiteResultEntry {
    pub fn new(suite: impl Into<String>, failed: bool) -> Self {
        SuiteResultEntry {
            suite: suite.into(),
            failed,
        }
    }

    /// Parse a single `<suiteId>: <true|false>` line.
    pub fn parse_line(line: &str) -> Result<Self, ParseError> {
        let (suite, value) = split_wire_line(line, "suite result")?;
        let failed = match value {
            "true" => true,
            "false" => false,
            _ => {
                return Err(ParseError::MalformedLine {
                    kind: "suite result",
                    line: line.to_string(),
                })
            }
        };
        Ok(SuiteResultEntry::new(suite, failed))
    }

    /// Parse a newline-delimited payload, skipping blank lines.
    pub fn parse_list(payload: &str) -> Result<Vec<Self>, ParseError> {
        payload
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Self::parse_line)
            .collect()
    }

    /// Render a payload, one line per entry, newline-terminated.
    pub fn render_list(entries: &[Self]) -> String {
        let mut out = String::new();
        for entry in entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for SuiteResultEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.suite, self.failed)
    }
}

/// Fold time entries in append order down to the most recent value per suite.
pub fn latest_times(entries: &[SuiteTimeEntry]) -> HashMap<String, u64> {
    let mut latest = HashMap::new();
    for entry in entries {
        latest.insert(entry.suite.clone(), entry.millis);
    }
    latest
}

/// Fold result entries in append order down to the most recent flag per suite.
pub fn latest_results(entries: &[SuiteResultEntry]) -> HashMap<String, bool> {
    let mut latest = HashMap::new();
    for entry in entries {
        latest.insert(entry.suite.clone(), entry.failed);
    }
    latest
}

fn split_wire_line<'a>(
    line: &'a str,
    kind: &'static str,
) -> Result<(&'a str, &'a str), ParseError> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let (suite, value) = trimmed.rsplit_once(": ").ok_or_else(|| ParseError::MalformedLine {
        kind,
        line: line.to_string(),
    })?;
    if suite.is_empty() {
        return Err(ParseError::EmptySuiteId {
            kind,
            line: line.to_string(),
        });
    }
    Ok((suite, value))
}
