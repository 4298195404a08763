//! Universe priming and subset claiming for one run.
//!
//! A set repository belongs to (namespace, run label). The first universe
//! submission primes it; a universe submitted to an already-primed
//! repository is matched for equality and never overwrites. Subsets claim
//! files out of the remaining pool all-or-nothing, so accepted subsets are
//! pairwise disjoint by construction.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use testshard_core::{parse_set, OperationResult, SuiteFile};

#[derive(Debug)]
struct SetState {
    primed: bool,
    universe: Vec<SuiteFile>,
    /// file name -> claimer that holds it
    claimed: HashMap<String, String>,
    last_write: DateTime<Utc>,
    dirty: bool,
}

/// Serialized form of a set repository, one JSON file on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSnapshot {
    pub primed: bool,
    pub universe: Vec<SuiteFile>,
    pub claimed: HashMap<String, String>,
    pub last_write: DateTime<Utc>,
}

/// Reconciliation state for one (namespace, run label).
#[derive(Debug)]
pub struct SetRepo {
    namespace: String,
    run_label: String,
    state: Mutex<SetState>,
}

impl SetRepo {
    pub(crate) fn new(namespace: impl Into<String>, run_label: impl Into<String>) -> Self {
        SetRepo {
            namespace: namespace.into(),
            run_label: run_label.into(),
            state: Mutex::new(SetState {
                primed: false,
                universe: Vec::new(),
                claimed: HashMap::new(),
                last_write: Utc::now(),
                dirty: false,
            }),
        }
    }

    pub(crate) fn from_snapshot(
        namespace: impl Into<String>,
        run_label: impl Into<String>,
        snapshot: SetSnapshot,
    ) -> Self {
        SetRepo {
            namespace: namespace.into(),
            run_label: run_label.into(),
            state: Mutex::new(SetState {
                primed: snapshot.primed,
                universe: snapshot.universe,
                claimed: snapshot.claimed,
                last_write: snapshot.last_write,
                dirty: false,
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn run_label(&self) -> &str {
        &self.run_label
    }

    /// Registry and lock token; `universe` stands in for the entry kinds.
    pub fn identifier(&self) -> String {
        format!("{}|universe|{}", self.namespace, self.run_label)
    }

    /// Whether a universe has been primed. Non-blocking read.
    pub fn is_primed(&self) -> bool {
        self.locked().primed
    }

    /// Submit a universe payload.
    ///
    /// Unprimed: parses the newline-joined file list (duplicates collapse,
    /// order preserved) and primes. Primed: routes to an equality match
    /// against the existing universe; the stored set and the claimed pool
    /// are never touched.
    pub fn load(&self, payload: &str) -> OperationResult {
        let incoming = dedup_preserving_order(parse_set(payload));
        let mut state = self.locked();
        if !state.primed {
            let count = incoming.len();
            state.universe = incoming;
            state.primed = true;
            state.last_write = Utc::now();
            state.dirty = true;
            return OperationResult::ok(format!("universe primed with {count} files"));
        }
        match_universe(&state.universe, &incoming)
    }

    /// Attempt to claim a subset for `claimer` out of the remaining pool.
    ///
    /// All-or-nothing: internal duplicates, files outside the universe, or
    /// files already claimed reject the whole candidate and claim nothing.
    pub fn try_matching(&self, payload: &str, claimer: &str) -> OperationResult {
        let candidate = parse_set(payload);
        let mut state = self.locked();
        if !state.primed {
            return OperationResult::conflict(format!(
                "no universe primed for {}@{}",
                self.namespace, self.run_label
            ));
        }

        let mut seen = HashSet::new();
        let mut duplicates: Vec<&str> = Vec::new();
        for file in &candidate {
            if !seen.insert(file.as_str()) {
                duplicates.push(file.as_str());
            }
        }
        if !duplicates.is_empty() {
            duplicates.sort_unstable();
            duplicates.dedup();
            return OperationResult::conflict(format!(
                "duplicate files in subset: {}",
                duplicates.join(", ")
            ));
        }

        let universe: HashSet<&str> = state.universe.iter().map(SuiteFile::as_str).collect();
        let mut offences: Vec<String> = Vec::new();
        for file in &candidate {
            if !universe.contains(file.as_str()) {
                offences.push(format!("{} (not in universe)", file));
            } else if let Some(holder) = state.claimed.get(file.as_str()) {
                offences.push(format!("{} (already claimed by {})", file, holder));
            }
        }
        if !offences.is_empty() {
            offences.sort_unstable();
            return OperationResult::conflict(format!("cannot claim: {}", offences.join(", ")));
        }

        for file in &candidate {
            state.claimed.insert(file.as_str().to_string(), claimer.to_string());
        }
        state.last_write = Utc::now();
        state.dirty = true;
        OperationResult::ok(format!("claimed {} files for {}", candidate.len(), claimer))
    }

    /// Check that claimed subsets cover the whole universe.
    pub fn verify_complete(&self) -> OperationResult {
        let state = self.locked();
        if !state.primed {
            return OperationResult::conflict(format!(
                "no universe primed for {}@{}",
                self.namespace, self.run_label
            ));
        }
        let mut unclaimed: Vec<&str> = state
            .universe
            .iter()
            .map(SuiteFile::as_str)
            .filter(|file| !state.claimed.contains_key(*file))
            .collect();
        if unclaimed.is_empty() {
            OperationResult::ok(format!("all {} files claimed", state.universe.len()))
        } else {
            unclaimed.sort_unstable();
            OperationResult::conflict(format!("unclaimed files: {}", unclaimed.join(", ")))
        }
    }

    /// Serialized form for the factory's disk writes.
    pub(crate) fn snapshot(&self) -> SetSnapshot {
        let state = self.locked();
        SetSnapshot {
            primed: state.primed,
            universe: state.universe.clone(),
            claimed: state.claimed.clone(),
            last_write: state.last_write,
        }
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

    fn locked(&self) -> MutexGuard<'_, SetState> {
        // a poisoned lock still holds consistent set state
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn dedup_preserving_order(files: Vec<SuiteFile>) -> Vec<SuiteFile> {
    let mut seen = HashSet::new();
    files
        .into_iter()
        .filter(|file| seen.insert(file.as_str().to_string()))
        .collect()
}

fn match_universe(existing: &[SuiteFile], incoming: &[SuiteFile]) -> OperationResult {
    let have: HashSet<&str> = existing.iter().map(SuiteFile::as_str).collect();
    let got: HashSet<&str> = incoming.iter().map(SuiteFile::as_str).collect();
    let mut unexpected: Vec<&str> = got.difference(&have).copied().collect();
    let mut missing: Vec<&str> = have.difference(&got).copied().collect();
    if unexpected.is_empty() && missing.is_empty() {
        return OperationResult::ok(format!("universe matches ({} files)", existing.len()));
    }
    unexpected.sort_unstable();
    missing.sort_unstable();
    let mut parts = Vec::new();
    if !unexpected.is_empty() {
        parts.push(format!("unexpected [{}]", unexpected.join(", ")));
    }
    if !missing.is_empty() {
        parts.push(format!("missing [{}]", missing.join(", ")));
    }
    OperationResult::conflict(format!("universe mismatch: {}", parts.join("; ")))
}
