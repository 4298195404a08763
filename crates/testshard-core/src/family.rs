//! Partition-suffixed job families.
//!
//! Peer jobs that differ only by a partition suffix form a family:
//! `build-1`, `build-2`, ... (numeric) or `build-<uuid>` (36-char RFC 4122
//! tail). Every agent derives the same ordered family from the same peer
//! list, which fixes its partition index without any coordination.

use uuid::Uuid;

/// Partition suffix carried by a job name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suffix {
    /// Trailing `-<digits>`, ordered numerically.
    Index(u64),
    /// Trailing `-<uuid>`, ordered lexicographically by full name.
    Tag,
}

/// Split a job name into its family base and partition suffix, if any.
///
/// The base may itself contain `-` (`a-b-3` has base `a-b`); a trailing
/// segment with non-digit characters (`job-12x`) is not a suffix.
fn split_suffix(name: &str) -> Option<(&str, Suffix)> {
    // uuid tail: "<base>-xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx"
    if name.len() > 37 && name.is_char_boundary(name.len() - 37) {
        let (base, tail) = name.split_at(name.len() - 37);
        if let Some(candidate) = tail.strip_prefix('-') {
            if Uuid::try_parse(candidate).is_ok() {
                return Some((base, Suffix::Tag));
            }
        }
    }
    let (base, tail) = name.rsplit_once('-')?;
    if base.is_empty() || tail.is_empty() {
        return None;
    }
    if tail.bytes().all(|b| b.is_ascii_digit()) {
        return tail.parse().ok().map(|index| (base, Suffix::Index(index)));
    }
    None
}

/// The ordered family a job belongs to within a peer-job list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFamily {
    jobs: Vec<String>,
}

impl JobFamily {
    /// Derive the family of `job` from the full peer list.
    ///
    /// Members share the base name and the suffix scheme; a job without a
    /// partition suffix is a family of one. Numeric families are ordered
    /// by index ascending, uuid families lexicographically by full name.
    /// Duplicate peer names collapse to one member.
    pub fn derive(job: &str, peers: &[String]) -> Self {
        let jobs = match split_suffix(job) {
            None => vec![job.to_string()],
            Some((base, Suffix::Index(_))) => {
                let mut members: Vec<(u64, &str)> = peers
                    .iter()
                    .filter_map(|peer| match split_suffix(peer) {
                        Some((peer_base, Suffix::Index(index))) if peer_base == base => {
                            Some((index, peer.as_str()))
                        }
                        _ => None,
                    })
                    .collect();
                members.sort_by_key(|(index, _)| *index);
                members.dedup_by_key(|(index, _)| *index);
                members.into_iter().map(|(_, name)| name.to_string()).collect()
            }
            Some((base, Suffix::Tag)) => {
                let mut members: Vec<&str> = peers
                    .iter()
                    .filter_map(|peer| match split_suffix(peer) {
                        Some((peer_base, Suffix::Tag)) if peer_base == base => {
                            Some(peer.as_str())
                        }
                        _ => None,
                    })
                    .collect();
                members.sort_unstable();
                members.dedup();
                members.into_iter().map(str::to_string).collect()
            }
        };
        JobFamily { jobs }
    }

    /// Family members in deterministic order.
    pub fn jobs(&self) -> &[String] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// 0-based position of `job` within the family, if it is a member.
    pub fn position(&self, job: &str) -> Option<usize> {
        self.jobs.iter().position(|member| member == job)
    }
}
