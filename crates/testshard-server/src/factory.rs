//! Repository factory: registry, namespace locks, persistence, retention.
//!
//! One factory owns every repository the server knows about. Repositories
//! are created lazily and handed out as shared handles, so two lookups of
//! the same key see the same store. Check-then-act sequences (universe
//! priming, snapshot freezing) run under an explicit per-namespace lock
//! table; everything else relies on per-call atomicity inside the repos.
//!
//! Persistence is deliberately plain: one file per repository under the
//! data dir, entry repos as their wire lines, set repos as JSON, written
//! atomically (temp file in the same directory, then rename) by `flush`.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use testshard_core::OperationResult;

use crate::error::{Result, StorageError};
use crate::repo::{EntryRepo, RepoKey, RepoKind, RepoVersion};
use crate::set_repo::{SetRepo, SetSnapshot};

/// Owner of all repositories, keyed by their canonical identifiers.
pub struct RepoFactory {
    data_dir: PathBuf,
    entries: Mutex<HashMap<String, Arc<EntryRepo>>>,
    sets: Mutex<HashMap<String, Arc<SetRepo>>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RepoFactory {
    /// Open a factory over `data_dir`, creating the directory if needed.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|e| StorageError::io(&data_dir, e))?;
        Ok(RepoFactory {
            data_dir,
            entries: Mutex::new(HashMap::new()),
            sets: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// The lock guarding check-then-act sequences for one namespace.
    pub async fn namespace_lock(&self, namespace: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(namespace.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// The live `latest` repository for (namespace, kind).
    pub async fn entry_repo(&self, namespace: &str, kind: RepoKind) -> Result<Arc<EntryRepo>> {
        self.entry_repo_for(RepoKey::new(namespace, kind, RepoVersion::Latest))
            .await
    }

    /// The frozen repository for (namespace, kind, run label).
    ///
    /// First access copies the live data under the namespace lock; every
    /// later access, from any agent of that run, reads the same snapshot.
    pub async fn frozen_repo(
        &self,
        namespace: &str,
        kind: RepoKind,
        run_label: &str,
    ) -> Result<Arc<EntryRepo>> {
        let key = RepoKey::new(namespace, kind, RepoVersion::label(run_label));
        {
            let entries = self.entries.lock().await;
            if let Some(repo) = entries.get(&key.identifier()) {
                return Ok(Arc::clone(repo));
            }
        }

        let ns_lock = self.namespace_lock(namespace).await;
        let _guard = ns_lock.lock().await;
        {
            let entries = self.entries.lock().await;
            if let Some(repo) = entries.get(&key.identifier()) {
                return Ok(Arc::clone(repo));
            }
        }

        let path = self.entry_path(&key);
        let repo = if path.exists() {
            self.read_entry_file(key.clone(), &path)?
        } else {
            let latest = self
                .entry_repo_for(RepoKey::new(namespace, kind, RepoVersion::Latest))
                .await?;
            let lines = latest.load();
            info!(
                repo = %key.identifier(),
                records = lines.len(),
                "froze history snapshot"
            );
            let frozen = EntryRepo::with_lines(key.clone(), lines, Utc::now());
            frozen.mark_dirty();
            frozen
        };
        let repo = Arc::new(repo);
        self.entries
            .lock()
            .await
            .insert(key.identifier(), Arc::clone(&repo));
        Ok(repo)
    }

    /// The reconciliation state for (namespace, run label).
    pub async fn set_repo(&self, namespace: &str, run_label: &str) -> Result<Arc<SetRepo>> {
        let identifier = format!("{namespace}|universe|{run_label}");
        let mut sets = self.sets.lock().await;
        if let Some(repo) = sets.get(&identifier) {
            return Ok(Arc::clone(repo));
        }
        let path = self.set_path(namespace, run_label);
        let repo = if path.exists() {
            let snapshot = self.read_set_file(&path)?;
            debug!(repo = %identifier, path = %path.display(), "loaded set repository from disk");
            SetRepo::from_snapshot(namespace, run_label, snapshot)
        } else {
            SetRepo::new(namespace, run_label)
        };
        let repo = Arc::new(repo);
        sets.insert(identifier, Arc::clone(&repo));
        Ok(repo)
    }

    /// Submit a universe for one run: prime when unprimed, equality-match
    /// otherwise. Runs under the namespace lock.
    pub async fn submit_universe(
        &self,
        namespace: &str,
        run_label: &str,
        payload: &str,
    ) -> Result<OperationResult> {
        let ns_lock = self.namespace_lock(namespace).await;
        let _guard = ns_lock.lock().await;
        let repo = self.set_repo(namespace, run_label).await?;
        let result = repo.load(payload);
        if result.success {
            info!(namespace = %namespace, run = %run_label, "{}", result.message);
        } else {
            warn!(namespace = %namespace, run = %run_label, "{}", result.message);
        }
        Ok(result)
    }

    /// Claim a subset for one agent out of the run's remaining pool.
    pub async fn claim_subset(
        &self,
        namespace: &str,
        run_label: &str,
        claimer: &str,
        payload: &str,
    ) -> Result<OperationResult> {
        let repo = self.set_repo(namespace, run_label).await?;
        let result = repo.try_matching(payload, claimer);
        if result.success {
            info!(namespace = %namespace, run = %run_label, claimer = %claimer, "{}", result.message);
        } else {
            warn!(namespace = %namespace, run = %run_label, claimer = %claimer, "{}", result.message);
        }
        Ok(result)
    }

    /// Check that the run's claimed subsets cover its universe.
    pub async fn verify_run(&self, namespace: &str, run_label: &str) -> Result<OperationResult> {
        let repo = self.set_repo(namespace, run_label).await?;
        Ok(repo.verify_complete())
    }

    /// Write every dirty repository to disk. Returns how many files were
    /// written; a failed write re-marks the repository dirty.
    pub async fn flush(&self) -> Result<usize> {
        let mut written = 0;

        let entry_repos: Vec<Arc<EntryRepo>> =
            self.entries.lock().await.values().cloned().collect();
        for repo in entry_repos {
            if repo.take_dirty() {
                let path = self.entry_path(repo.key());
                if let Err(err) = self.write_atomic(&path, repo.render().as_bytes()) {
                    repo.mark_dirty();
                    return Err(err);
                }
                written += 1;
            }
        }

        let set_repos: Vec<Arc<SetRepo>> = self.sets.lock().await.values().cloned().collect();
        for repo in set_repos {
            if repo.take_dirty() {
                let path = self.set_path(repo.namespace(), repo.run_label());
                let written_file = serde_json::to_string_pretty(&repo.snapshot())
                    .map_err(|e| StorageError::corrupt(&path, e.to_string()))
                    .and_then(|json| self.write_atomic(&path, json.as_bytes()));
                if let Err(err) = written_file {
                    repo.mark_dirty();
                    return Err(err);
                }
                written += 1;
            }
        }

        if written > 0 {
            debug!(written, "flushed dirty repositories");
        }
        Ok(written)
    }

    /// Drop frozen versions and run reconciliation state whose last write
    /// is older than the retention window. Live `latest` repositories are
    /// kept. Purging a run's set repository resets its universe.
    pub async fn purge_versions_older_than(&self, days: u32) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let mut removed = 0;

        {
            let mut entries = self.entries.lock().await;
            let stale: Vec<String> = entries
                .values()
                .filter(|repo| !repo.key().version.is_latest() && repo.last_write() < cutoff)
                .map(|repo| repo.identifier())
                .collect();
            for identifier in stale {
                if let Some(repo) = entries.remove(&identifier) {
                    self.remove_file(&self.entry_path(repo.key()))?;
                    info!(repo = %identifier, "purged stale history version");
                    removed += 1;
                }
            }
        }

        {
            let mut sets = self.sets.lock().await;
            let stale: Vec<String> = sets
                .values()
                .filter(|repo| repo.last_write() < cutoff)
                .map(|repo| repo.identifier())
                .collect();
            for identifier in stale {
                if let Some(repo) = sets.remove(&identifier) {
                    self.remove_file(&self.set_path(repo.namespace(), repo.run_label()))?;
                    info!(repo = %identifier, "purged run reconciliation state");
                    removed += 1;
                }
            }
        }

        removed += self.purge_disk(cutoff).await?;
        Ok(removed)
    }

    /// Remove stale repository files that were never loaded this process.
    async fn purge_disk(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let live = self.live_paths().await;
        let mut removed = 0;
        let dir = fs::read_dir(&self.data_dir).map_err(|e| StorageError::io(&self.data_dir, e))?;
        for dir_entry in dir {
            let dir_entry = dir_entry.map_err(|e| StorageError::io(&self.data_dir, e))?;
            let path = dir_entry.path();
            if live.contains(&path) || is_latest_file(&path) {
                continue;
            }
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("log") | Some("json") => {}
                _ => continue,
            }
            let meta = dir_entry.metadata().map_err(|e| StorageError::io(&path, e))?;
            let modified: DateTime<Utc> = meta
                .modified()
                .map_err(|e| StorageError::io(&path, e))?
                .into();
            if modified < cutoff {
                self.remove_file(&path)?;
                info!(path = %path.display(), "purged stale repository file");
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn live_paths(&self) -> HashSet<PathBuf> {
        let mut live = HashSet::new();
        for repo in self.entries.lock().await.values() {
            live.insert(self.entry_path(repo.key()));
        }
        for repo in self.sets.lock().await.values() {
            live.insert(self.set_path(repo.namespace(), repo.run_label()));
        }
        live
    }

    async fn entry_repo_for(&self, key: RepoKey) -> Result<Arc<EntryRepo>> {
        let mut entries = self.entries.lock().await;
        if let Some(repo) = entries.get(&key.identifier()) {
            return Ok(Arc::clone(repo));
        }
        let path = self.entry_path(&key);
        let repo = if path.exists() {
            let repo = self.read_entry_file(key.clone(), &path)?;
            debug!(repo = %key.identifier(), path = %path.display(), "loaded repository from disk");
            repo
        } else {
            EntryRepo::new(key.clone())
        };
        let repo = Arc::new(repo);
        entries.insert(key.identifier(), Arc::clone(&repo));
        Ok(repo)
    }

    fn read_entry_file(&self, key: RepoKey, path: &Path) -> Result<EntryRepo> {
        let text = fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
        let mut lines = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            key.kind
                .check_line(line)
                .map_err(|err| StorageError::corrupt(path, err.to_string()))?;
            lines.push(line.to_string());
        }
        let modified: DateTime<Utc> = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(|e| StorageError::io(path, e))?
            .into();
        Ok(EntryRepo::with_lines(key, lines, modified))
    }

    fn read_set_file(&self, path: &Path) -> Result<SetSnapshot> {
        let text = fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| StorageError::corrupt(path, e.to_string()))
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        // temp file in the same directory, then rename
        let mut tmp =
            NamedTempFile::new_in(&self.data_dir).map_err(|e| StorageError::io(&self.data_dir, e))?;
        tmp.write_all(data).map_err(|e| StorageError::io(path, e))?;
        tmp.persist(path).map_err(|e| StorageError::io(path, e.error))?;
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    fn entry_path(&self, key: &RepoKey) -> PathBuf {
        let stem = format!(
            "{}_{}_{}-{}",
            sanitize(&key.namespace),
            key.kind.as_str(),
            sanitize(key.version.as_str()),
            short_hash(&key.identifier()),
        );
        self.data_dir.join(format!("{stem}.log"))
    }

    fn set_path(&self, namespace: &str, run_label: &str) -> PathBuf {
        let stem = format!(
            "{}_universe_{}-{}",
            sanitize(namespace),
            sanitize(run_label),
            short_hash(&format!("{namespace}|universe|{run_label}")),
        );
        self.data_dir.join(format!("{stem}.json"))
    }
}

/// Readable file stems: alphanumerics kept, everything else becomes `_`.
/// The short hash keeps distinct keys from colliding after sanitizing.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn short_hash(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..4])
}

/// Live heads are never purged by the disk scan; their version segment
/// (last `_`-separated piece before the hash suffix) is `latest`.
fn is_latest_file(path: &Path) -> bool {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    let Some((head, _hash)) = stem.rsplit_once('-') else {
        return false;
    };
    match head.rsplit_once('_') {
        Some((_, version)) => version == "latest",
        None => false,
    }
}
