//! Wii partition hash-tree (H0..H4) verification.
//!
//! Each 0x8000-byte cluster carries its own hash table in the first 0x400
//! bytes: 31 H0 hashes (one per 0x400-byte data sub-block) at 0x000, the 8
//! H1 hashes of the cluster's subgroup at 0x280, and the 8 H2 hashes of the
//! cluster's group at 0x340. One H3 entry per 64-cluster group lives in the
//! partition's plaintext H3 table, and the SHA-1 of that whole table ("H4")
//! is bound in the TMD's first content record.

use std::fmt;

use tracing::instrument;

use crate::{
    common::{HashBytes, KeyBytes},
    disc::CLUSTER_SIZE,
    util::{aes::decrypt_cluster_b2b, array_ref, digest::sha1_hash, div_rem},
    wii::{CLUSTER_DATA_SIZE, H3_TABLE_SIZE, HASHES_SIZE},
    Error, Result,
};

/// Number of H0 hashes (data sub-blocks) per cluster.
pub const NUM_H0_HASHES: usize = CLUSTER_DATA_SIZE / HASHES_SIZE; // 31

const H0_TABLE_LEN: usize = NUM_H0_HASHES * 20; // 0x26C
const H1_TABLE_OFFSET: usize = 0x280;
const H1_TABLE_LEN: usize = 8 * 20; // 0xA0
const H2_TABLE_OFFSET: usize = 0x340;
const H2_TABLE_LEN: usize = 8 * 20; // 0xA0

/// The hash-tree level at which a cluster first diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HashLevel {
    /// Per-sub-block data hash.
    H0,
    /// Hash of a subgroup's H0 tables.
    H1,
    /// Hash of a group's H1 tables.
    H2,
    /// Per-group entry of the partition's H3 table.
    H3,
}

impl fmt::Display for HashLevel {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H0 => write!(f, "H0"),
            Self::H1 => write!(f, "H1"),
            Self::H2 => write!(f, "H2"),
            Self::H3 => write!(f, "H3"),
        }
    }
}

/// One failed cluster, recorded at the lowest level where it diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterMismatch {
    /// Cluster index within the partition's data area.
    pub cluster: u32,
    /// Lowest diverging hash level.
    pub level: HashLevel,
}

/// Result of hash-verifying one partition.
#[derive(Debug, Clone)]
pub struct HashOutcome {
    /// Failed clusters, ascending by cluster index.
    pub cluster_mismatches: Vec<ClusterMismatch>,
    /// Whether the H3 table hashes to the TMD-bound value. Independent of
    /// the per-cluster results: a tampered-but-self-consistent partition
    /// fails only here.
    pub h4_ok: bool,
    /// Number of clusters checked.
    pub clusters: u32,
}

impl HashOutcome {
    /// Clean iff there are no cluster mismatches and H4 matches.
    #[inline]
    pub fn is_clean(&self) -> bool { self.cluster_mismatches.is_empty() && self.h4_ok }
}

/// Verifies a partition's hash tree cluster by cluster.
///
/// `key` is `None` for unencrypted partitions. Each cluster is recorded at
/// the lowest level where it diverges and verification continues, so one
/// run reports the complete mismatch set. `threads` > 1 fans clusters out
/// to a worker pool; the mismatch list is re-sorted by cluster index before
/// return.
#[instrument(skip_all, fields(len = clusters.len()))]
pub fn verify_partition(
    key: Option<&KeyBytes>,
    clusters: &[u8],
    h3_table: &[u8],
    expected_h4: &HashBytes,
    threads: usize,
) -> Result<HashOutcome> {
    if clusters.len() % CLUSTER_SIZE != 0 {
        return Err(Error::Format(format!(
            "partition data size {:#x} is not a multiple of the cluster size",
            clusters.len()
        )));
    }
    if h3_table.len() != H3_TABLE_SIZE {
        return Err(Error::Format(format!("H3 table size {:#x} is invalid", h3_table.len())));
    }
    let count = (clusters.len() / CLUSTER_SIZE) as u32;
    let h4_ok = sha1_hash(h3_table) == *expected_h4;

    let mut cluster_mismatches = if threads > 1 && count > 1 {
        verify_clusters_parallel(key, clusters, h3_table, count, threads)
    } else {
        (0..count)
            .filter_map(|i| {
                verify_cluster(key, array_ref![clusters, i as usize * CLUSTER_SIZE, CLUSTER_SIZE], i, h3_table)
                    .map(|level| ClusterMismatch { cluster: i, level })
            })
            .collect()
    };
    // Reporting contract: ascending cluster order regardless of which
    // worker finished first.
    cluster_mismatches.sort_by_key(|m| m.cluster);
    Ok(HashOutcome { cluster_mismatches, h4_ok, clusters: count })
}

fn verify_clusters_parallel(
    key: Option<&KeyBytes>,
    clusters: &[u8],
    h3_table: &[u8],
    count: u32,
    threads: usize,
) -> Vec<ClusterMismatch> {
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<u32>();
    let (result_tx, result_rx) = crossbeam_channel::unbounded::<ClusterMismatch>();
    for i in 0..count {
        job_tx.send(i).expect("Failed to queue cluster");
    }
    drop(job_tx);
    std::thread::scope(|s| {
        for _ in 0..threads.min(count as usize) {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            s.spawn(move || {
                while let Ok(i) = job_rx.recv() {
                    let cluster = array_ref![clusters, i as usize * CLUSTER_SIZE, CLUSTER_SIZE];
                    if let Some(level) = verify_cluster(key, cluster, i, h3_table) {
                        let _ = result_tx.send(ClusterMismatch { cluster: i, level });
                    }
                }
            });
        }
    });
    drop(result_tx);
    result_rx.iter().collect()
}

/// Verifies one cluster bottom-up, returning the lowest diverging level.
fn verify_cluster(
    key: Option<&KeyBytes>,
    cluster: &[u8; CLUSTER_SIZE],
    index: u32,
    h3_table: &[u8],
) -> Option<HashLevel> {
    let mut decrypted = [0u8; CLUSTER_SIZE];
    let cluster = match key {
        Some(key) => {
            decrypt_cluster_b2b(cluster, &mut decrypted, key);
            &decrypted
        }
        None => cluster,
    };
    let hashes = &cluster[..HASHES_SIZE];
    let data = &cluster[HASHES_SIZE..];

    let (subgroup_index, h1_slot) = div_rem(index as usize, 8);
    let (group, h2_slot) = div_rem(subgroup_index, 8);

    // H0: one hash per 0x400-byte data sub-block.
    for i in 0..NUM_H0_HASHES {
        let expected = array_ref![hashes, i * 20, 20];
        if sha1_hash(array_ref![data, i * HASHES_SIZE, HASHES_SIZE]) != *expected {
            return Some(HashLevel::H0);
        }
    }
    // H1: hash of the H0 table, stored at this cluster's subgroup slot.
    let expected = array_ref![hashes, H1_TABLE_OFFSET + h1_slot * 20, 20];
    if sha1_hash(&hashes[..H0_TABLE_LEN]) != *expected {
        return Some(HashLevel::H1);
    }
    // H2: hash of the H1 table, stored at this cluster's group slot.
    let expected = array_ref![hashes, H2_TABLE_OFFSET + h2_slot * 20, 20];
    if sha1_hash(&hashes[H1_TABLE_OFFSET..H1_TABLE_OFFSET + H1_TABLE_LEN]) != *expected {
        return Some(HashLevel::H2);
    }
    // H3: hash of the H2 table, stored in the partition's H3 table.
    let expected = array_ref![h3_table, group * 20, 20];
    if sha1_hash(&hashes[H2_TABLE_OFFSET..H2_TABLE_OFFSET + H2_TABLE_LEN]) != *expected {
        return Some(HashLevel::H3);
    }
    None
}
