use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use super::{ClusterAssignments, Clusterer, read_cluster_tsv};
use crate::config::MmseqsConfig;

const RESULT_PREFIX: &str = "clusters";

/// Runs `mmseqs easy-cluster` as a subprocess and reads its cluster table.
#[derive(Debug, Clone)]
pub struct MmseqsClusterer {
    config: MmseqsConfig,
}

impl MmseqsClusterer {
    pub fn new(config: MmseqsConfig) -> Self {
        Self { config }
    }

    pub fn result_prefix(work_dir: &Path) -> PathBuf {
        work_dir.join(RESULT_PREFIX)
    }

    pub fn cluster_tsv(work_dir: &Path) -> PathBuf {
        work_dir.join(format!("{RESULT_PREFIX}_cluster.tsv"))
    }

    /// Arguments passed after the binary name.
    pub fn command_args(&self, fasta: &Path, work_dir: &Path) -> Vec<OsString> {
        let cfg = &self.config;
        let mut args: Vec<OsString> = vec![
            "easy-cluster".into(),
            fasta.into(),
            Self::result_prefix(work_dir).into(),
            work_dir.join("tmp").into(),
            "--min-seq-id".into(),
            cfg.min_seq_id.to_string().into(),
            "-c".into(),
            cfg.coverage.to_string().into(),
            "--cov-mode".into(),
            cfg.cov_mode.to_string().into(),
            "--cluster-mode".into(),
            cfg.cluster_mode.to_string().into(),
        ];
        if let Some(threads) = cfg.threads {
            args.push("--threads".into());
            args.push(threads.to_string().into());
        }
        args.extend(cfg.extra_args.iter().map(OsString::from));
        args
    }
}

impl Clusterer for MmseqsClusterer {
    fn cluster(&self, fasta: &Path, work_dir: &Path) -> Result<ClusterAssignments> {
        fs::create_dir_all(work_dir)
            .with_context(|| format!("failed to create {}", work_dir.display()))?;

        let args = self.command_args(fasta, work_dir);
        info!(
            "running {} {}",
            self.config.binary.display(),
            args.iter()
                .map(|arg| arg.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let output = Command::new(&self.config.binary)
            .args(&args)
            .output()
            .with_context(|| {
                format!(
                    "failed to launch {}; is MMseqs2 installed?",
                    self.config.binary.display()
                )
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            debug!(target: "mmseqs", "{line}");
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
            warn!(target: "mmseqs", "{line}");
        }
        if !output.status.success() {
            bail!(
                "mmseqs easy-cluster exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        let tsv = Self::cluster_tsv(work_dir);
        read_cluster_tsv(&tsv)
            .with_context(|| format!("failed to read mmseqs output {}", tsv.display()))
    }

    fn name(&self) -> &'static str {
        "mmseqs"
    }
}
