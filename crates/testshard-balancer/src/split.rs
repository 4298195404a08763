//! Partition strategies.
//!
//! Every agent of a family runs the same strategy over the same universe
//! and peer list, so each one independently computes the same partition
//! table and takes its own slice. Determinism is the whole contract:
//! same inputs, same buckets, on every agent, with no coordinator.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use testshard_core::{latest_times, ConfigError, SuiteFile};

use crate::error::{BalanceError, Result};
use crate::service::CiServer;

/// This agent's place within its job family.
#[derive(Debug, Clone)]
pub struct PartitionSlot {
    /// Family members in deterministic order, this job included.
    pub family: Vec<String>,

    /// 0-based index of this job within `family`.
    pub position: usize,
}

impl PartitionSlot {
    pub fn partitions(&self) -> usize {
        self.family.len()
    }
}

/// Splits the universe into one subset per family member.
#[async_trait]
pub trait SuiteSplitter: std::fmt::Debug + Send + Sync {
    /// Identifier this splitter is selected by in configuration.
    fn name(&self) -> &'static str;

    /// Compute the subset belonging to `slot`, in universe order.
    async fn split(
        &self,
        server: &dyn CiServer,
        universe: &[SuiteFile],
        slot: &PartitionSlot,
    ) -> Result<Vec<SuiteFile>>;
}

/// Contiguous near-equal slices by file count, no history needed.
#[derive(Debug)]
pub struct CountBasedSplitter;

/// Start index of partition `index` when `total` files go to `partitions`.
///
/// Remainder files spread across the table instead of piling onto the
/// last slice, so no partition is more than one file off balance.
fn slice_boundary(total: usize, partitions: usize, index: usize) -> usize {
    index * (total / partitions) + (total % partitions) * index / partitions
}

#[async_trait]
impl SuiteSplitter for CountBasedSplitter {
    fn name(&self) -> &'static str {
        "count"
    }

    async fn split(
        &self,
        _server: &dyn CiServer,
        universe: &[SuiteFile],
        slot: &PartitionSlot,
    ) -> Result<Vec<SuiteFile>> {
        let partitions = slot.partitions();
        if partitions == 0 {
            return Ok(Vec::new());
        }
        let total = universe.len();
        let start = if slot.position == 0 {
            0
        } else {
            slice_boundary(total, partitions, slot.position)
        };
        let end = if slot.position == partitions - 1 {
            total
        } else {
            slice_boundary(total, partitions, slot.position + 1)
        };
        debug!(start, end, total, "count-based slice");
        Ok(universe[start..end].to_vec())
    }
}

/// Greedy longest-first assignment balanced by recorded durations.
#[derive(Debug)]
pub struct TimeBasedSplitter;

#[async_trait]
impl SuiteSplitter for TimeBasedSplitter {
    fn name(&self) -> &'static str {
        "time"
    }

    async fn split(
        &self,
        server: &dyn CiServer,
        universe: &[SuiteFile],
        slot: &PartitionSlot,
    ) -> Result<Vec<SuiteFile>> {
        let partitions = slot.partitions();
        if partitions == 0 {
            return Ok(Vec::new());
        }
        let entries = match server.last_run_times(&slot.family).await {
            Ok(entries) => entries,
            Err(BalanceError::NotFound { what }) => {
                warn!(missing = %what, "no timing history, splitting with uniform weights");
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        let times = latest_times(&entries);

        // suites the last run never saw weigh in at the mean of the known
        let fallback = if times.is_empty() {
            1
        } else {
            times.values().sum::<u64>() / times.len() as u64
        };
        let mut ranked: Vec<(&SuiteFile, u64)> = universe
            .iter()
            .map(|file| (file, *times.get(file.as_str()).unwrap_or(&fallback)))
            .collect();
        // stable, so equal durations keep universe order on every agent
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let mut loads = vec![0u64; partitions];
        let mut buckets: Vec<Vec<&SuiteFile>> = vec![Vec::new(); partitions];
        for (file, millis) in ranked {
            let target = (0..partitions)
                .min_by_key(|&bucket| loads[bucket])
                .unwrap_or(0);
            loads[target] += millis;
            buckets[target].push(file);
        }
        debug!(?loads, "time-based bucket loads");

        let mine: HashSet<&SuiteFile> = buckets[slot.position].iter().copied().collect();
        Ok(universe
            .iter()
            .filter(|file| mine.contains(file))
            .cloned()
            .collect())
    }
}

/// Look up a splitter by its configured identifier.
///
/// The empty identifier selects the default, count-based splitting.
pub fn splitter(name: &str) -> Result<Arc<dyn SuiteSplitter>> {
    match name {
        "" | "count" => Ok(Arc::new(CountBasedSplitter)),
        "time" => Ok(Arc::new(TimeBasedSplitter)),
        other => Err(ConfigError::UnknownStrategy {
            role: "splitter",
            name: other.to_string(),
            known: "count, time",
        }
        .into()),
    }
}
