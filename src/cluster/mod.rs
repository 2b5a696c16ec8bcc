mod mmseqs;

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use tracing::warn;

use crate::config::ClusterConfig;
use crate::sequence::PlasmidRecord;

pub use mmseqs::MmseqsClusterer;

/// Something that groups the sequences of a FASTA file into clusters.
pub trait Clusterer {
    fn cluster(&self, fasta: &Path, work_dir: &Path) -> Result<ClusterAssignments>;

    fn name(&self) -> &'static str;
}

/// Member id to cluster representative id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterAssignments {
    representative_of: IndexMap<String, String>,
}

impl ClusterAssignments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `member` to `representative`. Reassigning a member to a
    /// different representative is an error.
    pub fn assign(
        &mut self,
        representative: impl Into<String>,
        member: impl Into<String>,
    ) -> io::Result<()> {
        let representative = representative.into();
        let member = member.into();
        match self.representative_of.get(&member) {
            Some(existing) if *existing != representative => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "member `{member}` assigned to both `{existing}` and `{representative}`"
                ),
            )),
            Some(_) => Ok(()),
            None => {
                self.representative_of.insert(member, representative);
                Ok(())
            }
        }
    }

    pub fn cluster_of(&self, member: &str) -> Option<&str> {
        self.representative_of.get(member).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.representative_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.representative_of.is_empty()
    }

    /// Representative to members, ordered by first appearance.
    pub fn clusters(&self) -> IndexMap<&str, Vec<&str>> {
        let mut clusters: IndexMap<&str, Vec<&str>> = IndexMap::new();
        for (member, representative) in &self.representative_of {
            clusters
                .entry(representative.as_str())
                .or_default()
                .push(member.as_str());
        }
        clusters
    }

    pub fn num_clusters(&self) -> usize {
        self.clusters().len()
    }

    /// Restrict the assignments to `records`. Records missing from the
    /// assignments become singleton clusters.
    pub fn covering(&self, records: &[PlasmidRecord]) -> Self {
        let mut covered = Self::new();
        let mut missing = 0usize;
        for record in records {
            let representative = match self.cluster_of(&record.id) {
                Some(representative) => representative.to_string(),
                None => {
                    missing += 1;
                    record.id.clone()
                }
            };
            covered
                .representative_of
                .insert(record.id.clone(), representative);
        }
        if missing > 0 {
            warn!("{missing} record(s) had no cluster assignment; treating them as singletons");
        }
        covered
    }
}

/// Parse a two-column `representative<TAB>member` table as written by
/// `mmseqs easy-cluster` (`*_cluster.tsv`).
pub fn parse_cluster_tsv<R: BufRead>(reader: R) -> io::Result<ClusterAssignments> {
    let mut assignments = ClusterAssignments::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let mut columns = line.split('\t');
        let (Some(representative), Some(member)) = (columns.next(), columns.next()) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected two tab-separated columns on line {}", line_no + 1),
            ));
        };
        assignments.assign(representative.trim(), member.trim())?;
    }
    Ok(assignments)
}

pub fn read_cluster_tsv(path: impl AsRef<Path>) -> io::Result<ClusterAssignments> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!("failed to open cluster table {}: {err}", path.display()),
        )
    })?;
    parse_cluster_tsv(BufReader::new(file))
}

/// Write assignments in the same two-column layout `parse_cluster_tsv` reads.
pub fn write_cluster_tsv(
    path: impl AsRef<Path>,
    assignments: &ClusterAssignments,
) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for (representative, members) in assignments.clusters() {
        for member in members {
            writeln!(writer, "{representative}\t{member}")?;
        }
    }
    writer.flush()
}

/// Assignments read from an existing cluster table.
#[derive(Debug, Clone)]
pub struct PrecomputedClusters {
    tsv: PathBuf,
}

impl PrecomputedClusters {
    pub fn new(tsv: impl Into<PathBuf>) -> Self {
        Self { tsv: tsv.into() }
    }
}

impl Clusterer for PrecomputedClusters {
    fn cluster(&self, _fasta: &Path, _work_dir: &Path) -> Result<ClusterAssignments> {
        read_cluster_tsv(&self.tsv)
            .with_context(|| format!("failed to load clusters from {}", self.tsv.display()))
    }

    fn name(&self) -> &'static str {
        "precomputed"
    }
}

pub fn build_clusterer(cfg: &ClusterConfig) -> Box<dyn Clusterer> {
    match cfg {
        ClusterConfig::Mmseqs(mmseqs) => Box::new(MmseqsClusterer::new(mmseqs.clone())),
        ClusterConfig::Precomputed { tsv } => Box::new(PrecomputedClusters::new(tsv.clone())),
    }
}
