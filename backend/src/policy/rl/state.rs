//! State discretization and cluster layout for the hierarchical policy

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::policy::SystemSnapshot;

/// Number of request-type buckets
pub const TYPE_BUCKETS: u8 = 4;

/// Number of occupancy buckets (quartiles of the pool)
pub const OCCUPANCY_BUCKETS: u8 = 4;

/// Servers split into `cluster_count` contiguous, near-equal clusters
///
/// With `n` servers and `k` clusters, cluster `c` covers
/// `[c·n/k, (c+1)·n/k)`. `k` is capped at `n` so no cluster is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterLayout {
    server_count: usize,
    cluster_count: usize,
}

impl ClusterLayout {
    pub fn new(server_count: usize, cluster_count: usize) -> Self {
        Self {
            server_count,
            cluster_count: cluster_count.clamp(1, server_count.max(1)),
        }
    }

    pub fn server_count(&self) -> usize {
        self.server_count
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    /// Server indices of cluster `c`
    pub fn range(&self, c: usize) -> Range<usize> {
        let n = self.server_count;
        let k = self.cluster_count;
        (c * n / k)..((c + 1) * n / k)
    }

    pub fn cluster_of(&self, server: usize) -> usize {
        (0..self.cluster_count)
            .find(|&c| self.range(c).contains(&server))
            .unwrap_or(self.cluster_count - 1)
    }
}

/// Discretized features of a decision point
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub backlog_bucket: u8,
    pub occupancy_bucket: u8,
    pub type_bucket: u8,
}

impl StateKey {
    pub fn observe(snapshot: &SystemSnapshot<'_>, request_type: &str) -> Self {
        Self {
            backlog_bucket: backlog_bucket(snapshot.backlog_len()),
            occupancy_bucket: occupancy_bucket(snapshot.occupied_count(), snapshot.server_count()),
            type_bucket: (stable_type_hash(request_type) % TYPE_BUCKETS as u64) as u8,
        }
    }
}

/// Low-level state: the high-level state plus the cluster actually used
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LowKey {
    pub state: StateKey,
    pub cluster: usize,
}

/// 0: ≤1, 1: 2-3, 2: 4-7, 3: ≥8
pub fn backlog_bucket(backlog_len: usize) -> u8 {
    match backlog_len {
        0..=1 => 0,
        2..=3 => 1,
        4..=7 => 2,
        _ => 3,
    }
}

pub fn occupancy_bucket(occupied: usize, server_count: usize) -> u8 {
    if server_count == 0 {
        return 0;
    }
    let bucket = occupied * OCCUPANCY_BUCKETS as usize / server_count;
    bucket.min(OCCUPANCY_BUCKETS as usize - 1) as u8
}

/// FNV-1a over the type name; stable across runs and platforms
pub fn stable_type_hash(request_type: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    request_type
        .bytes()
        .fold(OFFSET, |hash, b| (hash ^ b as u64).wrapping_mul(PRIME))
}
