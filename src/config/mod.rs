pub mod core;
pub mod dataset;
pub mod job;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub use self::core::{
    ClusterConfig, ExportConfig, FilterConfig, MmseqsConfig, SplitConfig, SplitRatios,
};
pub use self::dataset::{
    DatasetConfig, DatasetSourceConfig, HuggingFaceDatasetConfig, HuggingFaceRecordFormat,
};
pub use self::job::JobConfig;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub job: JobConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(contents).context("failed to parse pipeline config")?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if let (Some(min), Some(max)) = (self.filter.min_length, self.filter.max_length) {
            if min > max {
                errors.push(format!(
                    "filter.min_length ({min}) must not exceed filter.max_length ({max})"
                ));
            }
        }
        if let Some(fraction) = self.filter.max_ambiguous_fraction {
            if !(0.0..=1.0).contains(&fraction) {
                errors.push("filter.max_ambiguous_fraction must be within [0, 1]".to_string());
            }
        }

        if let ClusterConfig::Mmseqs(mmseqs) = &self.cluster {
            if !(0.0..=1.0).contains(&mmseqs.min_seq_id) {
                errors.push("cluster.min_seq_id must be within [0, 1]".to_string());
            }
            if !(0.0..=1.0).contains(&mmseqs.coverage) {
                errors.push("cluster.coverage must be within [0, 1]".to_string());
            }
            if mmseqs.threads == Some(0) {
                errors.push("cluster.threads must be greater than 0".to_string());
            }
        }

        if !self.split.ratios.is_valid() {
            errors.push(
                "split.ratios must be finite, non-negative and sum to more than 0".to_string(),
            );
        }
        if self.split.line_width == 0 {
            errors.push("split.line_width must be greater than 0".to_string());
        }

        if self.job.nodes == 0 {
            errors.push("job.nodes must be greater than 0".to_string());
        }
        if self.job.gpus_per_node == 0 {
            errors.push("job.gpus_per_node must be greater than 0".to_string());
        }
        if self.job.cpus_per_task == 0 {
            errors.push("job.cpus_per_task must be greater than 0".to_string());
        }
        if self.job.tasks_per_node == Some(0) {
            errors.push("job.tasks_per_node must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("invalid configuration:\n  - {}", errors.join("\n  - ")))
        }
    }
}

/// Load and merge config files in order; later files override earlier ones.
pub fn load_pipeline_config(paths: &[PathBuf]) -> Result<PipelineConfig> {
    let mut merged: Option<toml::Value> = None;

    for path in paths {
        let layer = read_layer(path)?;
        match merged.as_mut() {
            Some(base) => merge_values(base, layer),
            None => merged = Some(layer),
        }
    }

    let merged = merged.ok_or_else(|| anyhow!("no configuration files provided"))?;
    let config = merged
        .try_into::<PipelineConfig>()
        .context("failed to deserialize merged pipeline config")?;
    config.validate()?;
    Ok(config)
}

fn read_layer(path: &Path) -> Result<toml::Value> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let table: toml::Table = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(toml::Value::Table(table))
}

fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("work")
}
