//! Append-only entry repositories.
//!
//! A repository is addressed by (namespace, kind, version). The `latest`
//! version is live and mutable; labeled versions are frozen snapshots
//! taken by the factory so every agent of one run reads identical data.
//! Records are stored as their wire lines and validated per kind on the
//! way in, so a repository file on disk is exactly the payloads it served.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use testshard_core::{SuiteResultEntry, SuiteTimeEntry};

use crate::error::Result;

/// What a repository stores, and therefore how its lines are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepoKind {
    /// `<suiteId>: <durationMillis>` lines.
    SuiteTimes,
    /// `<suiteId>: <true|false>` lines.
    FailedSuites,
    /// Plain partition-size integers, one per balance call.
    SubsetSize,
}

impl RepoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoKind::SuiteTimes => "suite_times",
            RepoKind::FailedSuites => "failed_suites",
            RepoKind::SubsetSize => "subset_size",
        }
    }

    /// Validate one record line for this kind.
    pub(crate) fn check_line(&self, line: &str) -> Result<()> {
        match self {
            RepoKind::SuiteTimes => {
                SuiteTimeEntry::parse_line(line)?;
            }
            RepoKind::FailedSuites => {
                SuiteResultEntry::parse_line(line)?;
            }
            RepoKind::SubsetSize => {
                line.trim().parse::<u64>().map_err(|_| {
                    testshard_core::ParseError::MalformedLine {
                        kind: "subset size",
                        line: line.to_string(),
                    }
                })?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for RepoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version coordinate of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepoVersion {
    /// The live, mutable head.
    Latest,
    /// A frozen snapshot tagged with a run label.
    Label(String),
}

impl RepoVersion {
    pub fn label(label: impl Into<String>) -> Self {
        RepoVersion::Label(label.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            RepoVersion::Latest => "latest",
            RepoVersion::Label(label) => label,
        }
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, RepoVersion::Latest)
    }
}

impl fmt::Display for RepoVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full address of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoKey {
    pub namespace: String,
    pub kind: RepoKind,
    pub version: RepoVersion,
}

impl RepoKey {
    pub fn new(namespace: impl Into<String>, kind: RepoKind, version: RepoVersion) -> Self {
        RepoKey {
            namespace: namespace.into(),
            kind,
            version,
        }
    }

    /// Canonical identifier, also the factory's registry and lock token.
    pub fn identifier(&self) -> String {
        format!("{}|{}|{}", self.namespace, self.kind, self.version)
    }
}

#[derive(Debug)]
struct EntryState {
    lines: Vec<String>,
    last_write: DateTime<Utc>,
    dirty: bool,
}

/// Append-only record store for one (namespace, kind, version).
#[derive(Debug)]
pub struct EntryRepo {
    key: RepoKey,
    state: Mutex<EntryState>,
}

impl EntryRepo {
    /// Fresh, empty repository.
    pub(crate) fn new(key: RepoKey) -> Self {
        EntryRepo {
            key,
            state: Mutex::new(EntryState {
                lines: Vec::new(),
                last_write: Utc::now(),
                dirty: false,
            }),
        }
    }

    /// Repository rebuilt from validated lines (disk load, snapshot copy).
    pub(crate) fn with_lines(key: RepoKey, lines: Vec<String>, last_write: DateTime<Utc>) -> Self {
        EntryRepo {
            key,
            state: Mutex::new(EntryState {
                lines,
                last_write,
                dirty: false,
            }),
        }
    }

    pub fn key(&self) -> &RepoKey {
        &self.key
    }

    pub fn identifier(&self) -> String {
        self.key.identifier()
    }

    /// Append one or more newline-delimited records, validating each line
    /// against the repository kind. Atomic per call: a rejected line
    /// leaves the store untouched. Returns the number of records added.
    pub fn append(&self, payload: &str) -> Result<usize> {
        let incoming: Vec<&str> = payload
            .lines()
            .filter(|line| !line.trim().is_empty())
            .collect();
        for line in &incoming {
            self.key.kind.check_line(line)?;
        }
        let mut state = self.locked();
        for line in &incoming {
            state.lines.push(line.trim_end_matches('\r').to_string());
        }
        state.last_write = Utc::now();
        state.dirty = true;
        Ok(incoming.len())
    }

    /// All records of this version, in append order.
    pub fn load(&self) -> Vec<String> {
        self.locked().lines.clone()
    }

    /// Records rendered as one newline-terminated payload.
    pub fn render(&self) -> String {
        let state = self.locked();
        let mut out = String::new();
        for line in &state.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.locked().lines.is_empty()
    }

    pub fn last_write(&self) -> DateTime<Utc> {
        self.locked().last_write
    }

    pub(crate) fn take_dirty(&self) -> bool {
        let mut state = self.locked();
        std::mem::take(&mut state.dirty)
    }

    pub(crate) fn mark_dirty(&self) {
        self.locked().dirty = true;
    }

    fn locked(&self) -> MutexGuard<'_, EntryState> {
        // a poisoned lock still holds consistent line state
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times_repo() -> EntryRepo {
        EntryRepo::new(RepoKey::new("checkout-units", RepoKind::SuiteTimes, RepoVersion::Latest))
    }

    #[test]
    fn test_identifier_is_canonical() {
        let key = RepoKey::new("checkout-units", RepoKind::SuiteTimes, RepoVersion::label("26-1"));
        assert_eq!(key.identifier(), "checkout-units|suite_times|26-1");
        let latest = RepoKey::new("checkout-units", RepoKind::SubsetSize, RepoVersion::Latest);
        assert_eq!(latest.identifier(), "checkout-units|subset_size|latest");
    }

    #[test]
    fn test_append_preserves_order() {
        let repo = times_repo();
        repo.append("a.rb: 10\nb.rb: 20\n").unwrap();
        repo.append("a.rb: 35").unwrap();
        assert_eq!(repo.load(), ["a.rb: 10", "b.rb: 20", "a.rb: 35"]);
        assert_eq!(repo.render(), "a.rb: 10\nb.rb: 20\na.rb: 35\n");
    }

    #[test]
    fn test_append_rejects_malformed_payload_atomically() {
        let repo = times_repo();
        let err = repo.append("a.rb: 10\nbogus line\n");
        assert!(err.is_err());
        assert!(repo.is_empty(), "rejected payload must not partially apply");
    }

    #[test]
    fn test_kind_validation_differs() {
        let results = EntryRepo::new(RepoKey::new(
            "checkout-units",
            RepoKind::FailedSuites,
            RepoVersion::Latest,
        ));
        results.append("a.rb: true\n").unwrap();
        assert!(results.append("a.rb: 12\n").is_err());

        let sizes = EntryRepo::new(RepoKey::new(
            "checkout-units",
            RepoKind::SubsetSize,
            RepoVersion::Latest,
        ));
        sizes.append("5\n10\n").unwrap();
        assert!(sizes.append("five\n").is_err());
        assert_eq!(sizes.load(), ["5", "10"]);
    }

    #[test]
    fn test_append_marks_dirty_once() {
        let repo = times_repo();
        repo.append("a.rb: 10\n").unwrap();
        assert!(repo.take_dirty());
        assert!(!repo.take_dirty());
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let repo = times_repo();
        let added = repo.append("\na.rb: 10\n\n").unwrap();
        assert_eq!(added, 1);
    }
}
