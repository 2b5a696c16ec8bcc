//! Cluster-aware train/validation/test partitioning.
//!
//! Whole clusters are assigned to a split, so near-duplicate plasmids never
//! end up on both sides of an evaluation boundary. Clusters are visited from
//! largest to smallest (ties broken by a seeded shuffle) and each one goes to
//! the split currently furthest below its target share of records.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cluster::ClusterAssignments;
use crate::config::{SplitConfig, SplitRatios};
use crate::dataset::{DatasetSplit, write_fasta};
use crate::sequence::PlasmidRecord;

pub const MANIFEST_FILE: &str = "split_manifest.json";

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    splits: [Vec<PlasmidRecord>; 3],
    clusters: [Vec<String>; 3],
    ratios: SplitRatios,
    seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub split: DatasetSplit,
    pub records: usize,
    pub clusters: usize,
    pub bases: usize,
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitManifest {
    pub seed: u64,
    pub ratios: SplitRatios,
    pub total_records: usize,
    pub total_clusters: usize,
    pub splits: Vec<SplitSummary>,
    pub files: Vec<PathBuf>,
}

impl Partition {
    pub fn records(&self, split: DatasetSplit) -> &[PlasmidRecord] {
        &self.splits[split.index()]
    }

    /// Representatives of the clusters assigned to `split`.
    pub fn cluster_ids(&self, split: DatasetSplit) -> &[String] {
        &self.clusters[split.index()]
    }

    pub fn total_records(&self) -> usize {
        self.splits.iter().map(Vec::len).sum()
    }

    pub fn total_clusters(&self) -> usize {
        self.clusters.iter().map(Vec::len).sum()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn summary(&self) -> Vec<SplitSummary> {
        let total = self.total_records().max(1) as f64;
        DatasetSplit::ALL
            .iter()
            .map(|&split| {
                let records = self.records(split);
                SplitSummary {
                    split,
                    records: records.len(),
                    clusters: self.cluster_ids(split).len(),
                    bases: records.iter().map(PlasmidRecord::len).sum(),
                    fraction: records.len() as f64 / total,
                }
            })
            .collect()
    }

    /// Write one FASTA per split plus a JSON manifest into `out_dir`.
    pub fn write(&self, out_dir: &Path, line_width: usize) -> Result<SplitManifest> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;

        let mut files = Vec::with_capacity(DatasetSplit::ALL.len());
        for split in DatasetSplit::ALL {
            let path = split_fasta_path(out_dir, split);
            write_fasta(&path, self.records(split), line_width)
                .with_context(|| format!("failed to write {}", path.display()))?;
            files.push(path);
        }

        let manifest = SplitManifest {
            seed: self.seed,
            ratios: self.ratios,
            total_records: self.total_records(),
            total_clusters: self.total_clusters(),
            splits: self.summary(),
            files,
        };
        let json =
            serde_json::to_string_pretty(&manifest).context("failed to serialize manifest")?;
        let manifest_path = out_dir.join(MANIFEST_FILE);
        fs::write(&manifest_path, json)
            .with_context(|| format!("failed to write {}", manifest_path.display()))?;

        Ok(manifest)
    }
}

pub fn split_fasta_path(out_dir: &Path, split: DatasetSplit) -> PathBuf {
    out_dir.join(format!("{}.fasta", split.name()))
}

/// Partition `records` so that every cluster lands in exactly one split.
///
/// Records without an assignment are treated as singleton clusters. The
/// result depends only on the input order, the assignments and the seed.
pub fn partition(
    records: Vec<PlasmidRecord>,
    assignments: &ClusterAssignments,
    cfg: &SplitConfig,
) -> Result<Partition> {
    if !cfg.ratios.is_valid() {
        bail!("split ratios must be finite, non-negative and sum to more than 0");
    }
    let ratios = cfg.ratios.normalized();
    let targets = [ratios.train, ratios.val, ratios.test];

    // Group record indices by cluster, clusters in order of first appearance.
    let mut cluster_index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        let key = assignments.cluster_of(&record.id).unwrap_or(record.id.as_str());
        let slot = *cluster_index.entry(key).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(idx);
    }

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    groups.shuffle(&mut rng);
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let total = records.len() as f64;
    let mut assigned = [0usize; 3];
    let mut destination = vec![0usize; records.len()];
    let mut clusters: [Vec<String>; 3] = Default::default();

    for (representative, members) in &groups {
        let split = neediest_split(&targets, &assigned, total);
        assigned[split] += members.len();
        for &idx in members {
            destination[idx] = split;
        }
        clusters[split].push((*representative).to_string());
    }

    let mut splits: [Vec<PlasmidRecord>; 3] = Default::default();
    for (record, split) in records.into_iter().zip(destination) {
        splits[split].push(record);
    }

    let partition = Partition {
        splits,
        clusters,
        ratios,
        seed: cfg.seed,
    };
    for summary in partition.summary() {
        info!(
            "{} split: {} records in {} clusters ({:.1}%)",
            summary.split,
            summary.records,
            summary.clusters,
            summary.fraction * 100.0
        );
    }
    Ok(partition)
}

/// Index of the split with the largest shortfall against its target.
/// Ties resolve in train, val, test order.
fn neediest_split(targets: &[f64; 3], assigned: &[usize; 3], total: f64) -> usize {
    let mut best = 0;
    let mut best_deficit = f64::NEG_INFINITY;
    for (idx, (&target, &count)) in targets.iter().zip(assigned).enumerate() {
        if target <= 0.0 {
            continue;
        }
        let deficit = target * total - count as f64;
        if deficit > best_deficit {
            best = idx;
            best_deficit = deficit;
        }
    }
    best
}
