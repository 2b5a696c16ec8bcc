//! Stage orchestration: fetch, filter, cluster, split and token export.
//!
//! Each cached stage writes a small JSON stamp next to its output holding
//! the config it ran with, plus the size and mtime of a local source file.
//! A later run reuses the output only while the stamp still matches.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cluster::{
    ClusterAssignments, Clusterer, build_clusterer, read_cluster_tsv, write_cluster_tsv,
};
use crate::config::{ClusterConfig, DatasetSourceConfig, FilterConfig, PipelineConfig};
use crate::dataset::{describe_source, fetch_records, read_fasta, write_fasta};
use crate::export::{TokenShard, export_token_shards};
use crate::filter::{FilterReport, filter_records};
use crate::sequence::PlasmidRecord;
use crate::split::{Partition, SplitManifest, partition};
use crate::tokenizer::NucleotideTokenizer;

pub const RUN_MANIFEST_FILE: &str = "run_manifest.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Filter,
    Cluster,
    Split,
    Export,
}

/// Locations of every stage output under the work directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPaths {
    pub root: PathBuf,
}

impl WorkPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn raw_fasta(&self) -> PathBuf {
        self.root.join("raw.fasta")
    }

    pub fn raw_stamp(&self) -> PathBuf {
        self.root.join("raw.json")
    }

    pub fn filtered_fasta(&self) -> PathBuf {
        self.root.join("filtered.fasta")
    }

    pub fn filter_report(&self) -> PathBuf {
        self.root.join("filter_report.json")
    }

    pub fn cluster_dir(&self) -> PathBuf {
        self.root.join("clusters")
    }

    pub fn assignments(&self) -> PathBuf {
        self.cluster_dir().join("assignments.tsv")
    }

    pub fn cluster_stamp(&self) -> PathBuf {
        self.cluster_dir().join("config.json")
    }

    pub fn split_dir(&self) -> PathBuf {
        self.root.join("splits")
    }

    pub fn token_dir(&self) -> PathBuf {
        self.root.join("tokens")
    }

    pub fn run_manifest(&self) -> PathBuf {
        self.root.join(RUN_MANIFEST_FILE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub cached: bool,
    pub records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub config: PipelineConfig,
    pub stages: Vec<StageOutcome>,
    pub filter: Option<FilterReport>,
    pub clusters: Option<usize>,
    pub split: Option<SplitManifest>,
    pub tokens: Vec<TokenShard>,
}

/// Inputs a cached stage output was produced from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StageKey {
    source: DatasetSourceConfig,
    #[serde(default)]
    source_file: Option<FileFingerprint>,
    filter: Option<FilterConfig>,
    cluster: Option<ClusterConfig>,
}

/// Size and modification time of a local dataset file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct FileFingerprint {
    len: u64,
    modified_secs: u64,
    modified_nanos: u32,
}

impl FileFingerprint {
    fn of(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();
        Some(Self {
            len: metadata.len(),
            modified_secs: modified.as_secs(),
            modified_nanos: modified.subsec_nanos(),
        })
    }
}

#[derive(Deserialize)]
struct Stamp<R> {
    key: StageKey,
    report: Option<R>,
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    paths: WorkPaths,
    clusterer: Box<dyn Clusterer>,
    force: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            paths: WorkPaths::new(&config.work_dir),
            clusterer: build_clusterer(&config.cluster),
            force: false,
        }
    }

    pub fn with_clusterer(mut self, clusterer: Box<dyn Clusterer>) -> Self {
        self.clusterer = clusterer;
        self
    }

    /// Re-run cached stages even when their outputs are current.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn paths(&self) -> &WorkPaths {
        &self.paths
    }

    fn stage_key(&self, stage: Stage) -> StageKey {
        let source_file = match &self.config.dataset.source {
            DatasetSourceConfig::Local { path } => FileFingerprint::of(path),
            DatasetSourceConfig::Url { .. } | DatasetSourceConfig::HuggingFace(_) => None,
        };
        StageKey {
            source: self.config.dataset.source.clone(),
            source_file,
            filter: (stage >= Stage::Filter).then(|| self.config.filter.clone()),
            cluster: (stage >= Stage::Cluster).then(|| self.config.cluster.clone()),
        }
    }

    /// Run every stage up to and including `until`.
    pub fn run(&self, until: Stage) -> Result<RunManifest> {
        fs::create_dir_all(&self.paths.root)
            .with_context(|| format!("failed to create {}", self.paths.root.display()))?;

        let mut manifest = RunManifest {
            config: self.config.clone(),
            stages: Vec::new(),
            filter: None,
            clusters: None,
            split: None,
            tokens: Vec::new(),
        };

        let (raw, cached) = self.fetch()?;
        manifest.stages.push(StageOutcome {
            stage: Stage::Fetch,
            cached,
            records: raw.len(),
        });

        if until >= Stage::Filter {
            let (filtered, report, cached) = self.filter(raw)?;
            manifest.stages.push(StageOutcome {
                stage: Stage::Filter,
                cached,
                records: filtered.len(),
            });
            manifest.filter = Some(report);

            if until >= Stage::Cluster {
                let (assignments, cached) = self.cluster(&filtered)?;
                manifest.stages.push(StageOutcome {
                    stage: Stage::Cluster,
                    cached,
                    records: assignments.len(),
                });
                manifest.clusters = Some(assignments.num_clusters());

                if until >= Stage::Split {
                    let partition = self.split(filtered, &assignments)?;
                    manifest.stages.push(StageOutcome {
                        stage: Stage::Split,
                        cached: false,
                        records: partition.total_records(),
                    });
                    manifest.split = Some(
                        partition.write(&self.paths.split_dir(), self.config.split.line_width)?,
                    );

                    if until >= Stage::Export {
                        if self.config.export.enabled {
                            manifest.tokens = self.export(&partition)?;
                            manifest.stages.push(StageOutcome {
                                stage: Stage::Export,
                                cached: false,
                                records: partition.total_records(),
                            });
                        } else {
                            info!("token export disabled; skipping");
                        }
                    }
                }
            }
        }

        let path = self.paths.run_manifest();
        let json =
            serde_json::to_string_pretty(&manifest).context("failed to serialize run manifest")?;
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(manifest)
    }

    fn fetch(&self) -> Result<(Vec<PlasmidRecord>, bool)> {
        let raw_path = self.paths.raw_fasta();
        let stamp_path = self.paths.raw_stamp();
        let key = self.stage_key(Stage::Fetch);

        if self.is_current::<()>(&raw_path, &stamp_path, &key) {
            let records = read_fasta(&raw_path)
                .with_context(|| format!("failed to read {}", raw_path.display()))?;
            info!("fetch: reusing {} records from {}", records.len(), raw_path.display());
            return Ok((records, true));
        }

        info!("fetch: loading {}", describe_source(&self.config.dataset));
        let records = fetch_records(&self.config.dataset)?;
        write_fasta(&raw_path, &records, self.config.split.line_width)
            .with_context(|| format!("failed to write {}", raw_path.display()))?;
        write_stamp::<()>(&stamp_path, &key, None)?;
        info!("fetch: {} records", records.len());
        Ok((records, false))
    }

    fn filter(
        &self,
        raw: Vec<PlasmidRecord>,
    ) -> Result<(Vec<PlasmidRecord>, FilterReport, bool)> {
        let filtered_path = self.paths.filtered_fasta();
        let report_path = self.paths.filter_report();
        let key = self.stage_key(Stage::Filter);

        if self.is_current::<FilterReport>(&filtered_path, &report_path, &key) {
            if let Some(report) = read_stamp::<FilterReport>(&report_path)
                .and_then(|stamp| stamp.report)
            {
                let records = read_fasta(&filtered_path)
                    .with_context(|| format!("failed to read {}", filtered_path.display()))?;
                info!(
                    "filter: reusing {} records from {}",
                    records.len(),
                    filtered_path.display()
                );
                return Ok((records, report, true));
            }
        }

        let (kept, report) = filter_records(raw, &self.config.filter)?;
        info!(
            "filter: kept {} of {} records (too short {}, too long {}, invalid {}, ambiguous {})",
            report.kept,
            report.input,
            report.too_short,
            report.too_long,
            report.invalid,
            report.too_ambiguous
        );
        if kept.is_empty() {
            warn!("filter removed every record; later stages will produce empty splits");
        }
        write_fasta(&filtered_path, &kept, self.config.split.line_width)
            .with_context(|| format!("failed to write {}", filtered_path.display()))?;
        write_stamp(&report_path, &key, Some(&report))?;
        Ok((kept, report, false))
    }

    fn cluster(&self, records: &[PlasmidRecord]) -> Result<(ClusterAssignments, bool)> {
        let assignments_path = self.paths.assignments();
        let stamp_path = self.paths.cluster_stamp();
        let key = self.stage_key(Stage::Cluster);

        if self.is_current::<()>(&assignments_path, &stamp_path, &key) {
            let assignments = read_cluster_tsv(&assignments_path)
                .with_context(|| format!("failed to read {}", assignments_path.display()))?;
            let assignments = assignments.covering(records);
            info!(
                "cluster: reusing {} clusters from {}",
                assignments.num_clusters(),
                assignments_path.display()
            );
            return Ok((assignments, true));
        }

        let assignments = if records.is_empty() {
            ClusterAssignments::new()
        } else {
            let cluster_dir = self.paths.cluster_dir();
            info!("cluster: running {} clusterer", self.clusterer.name());
            self.clusterer
                .cluster(&self.paths.filtered_fasta(), &cluster_dir)?
                .covering(records)
        };
        info!(
            "cluster: {} records in {} clusters",
            assignments.len(),
            assignments.num_clusters()
        );
        write_cluster_tsv(&assignments_path, &assignments)
            .with_context(|| format!("failed to write {}", assignments_path.display()))?;
        write_stamp::<()>(&stamp_path, &key, None)?;
        Ok((assignments, false))
    }

    fn split(
        &self,
        records: Vec<PlasmidRecord>,
        assignments: &ClusterAssignments,
    ) -> Result<Partition> {
        partition(records, assignments, &self.config.split)
    }

    fn export(&self, partition: &Partition) -> Result<Vec<TokenShard>> {
        export_token_shards(
            partition,
            &NucleotideTokenizer::new(),
            &self.paths.token_dir(),
            &self.config.export,
        )
    }

    fn is_current<R>(&self, output: &Path, stamp: &Path, key: &StageKey) -> bool
    where
        R: DeserializeOwned,
    {
        if self.force || !output.is_file() {
            return false;
        }
        read_stamp::<R>(stamp).is_some_and(|stamp| stamp.key == *key)
    }
}

fn read_stamp<R: DeserializeOwned>(path: &Path) -> Option<Stamp<R>> {
    let data = fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

fn write_stamp<R: Serialize>(path: &Path, key: &StageKey, report: Option<&R>) -> Result<()> {
    #[derive(Serialize)]
    struct StampRef<'a, R> {
        key: &'a StageKey,
        report: Option<&'a R>,
    }

    let json = serde_json::to_string_pretty(&StampRef { key, report })
        .context("failed to serialize stage stamp")?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}
