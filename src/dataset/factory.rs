use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::config::{DatasetConfig, DatasetSourceConfig, HuggingFaceDatasetConfig};
use crate::sequence::PlasmidRecord;

use super::fasta::read_fasta;
use super::remote::fetch_cached;

/// Load every record from the configured source, downloading when needed.
pub fn fetch_records(cfg: &DatasetConfig) -> Result<Vec<PlasmidRecord>> {
    let records = match &cfg.source {
        DatasetSourceConfig::Local { path } => read_fasta(path)
            .with_context(|| format!("failed to read local dataset {}", path.display()))?,
        DatasetSourceConfig::Url { url, file_name } => {
            let path = fetch_cached(&cfg.cache_dir, url, file_name.as_deref())
                .with_context(|| format!("failed to download {url}"))?;
            read_fasta(&path)
                .with_context(|| format!("failed to read downloaded dataset {}", path.display()))?
        }
        DatasetSourceConfig::HuggingFace(hf_cfg) => fetch_hub_records(&cfg.cache_dir, hf_cfg)?,
    };

    ensure_unique_ids(&records)?;
    Ok(records)
}

pub fn describe_source(cfg: &DatasetConfig) -> String {
    match &cfg.source {
        DatasetSourceConfig::Local { path } => format!("local FASTA {}", path.display()),
        DatasetSourceConfig::Url { url, .. } => format!("remote FASTA {url}"),
        DatasetSourceConfig::HuggingFace(hf_cfg) => format!(
            "Hugging Face dataset {} (rev: {}, {} file(s))",
            hf_cfg.repo_id,
            hf_cfg.revision.as_deref().unwrap_or("main"),
            hf_cfg.files.len()
        ),
    }
}

#[cfg(feature = "hub")]
fn fetch_hub_records(
    cache_dir: &Path,
    cfg: &HuggingFaceDatasetConfig,
) -> Result<Vec<PlasmidRecord>> {
    super::huggingface::fetch_huggingface_records(cache_dir, cfg)
        .with_context(|| format!("failed to prepare Hugging Face dataset {}", cfg.repo_id))
}

#[cfg(not(feature = "hub"))]
fn fetch_hub_records(
    _cache_dir: &Path,
    cfg: &HuggingFaceDatasetConfig,
) -> Result<Vec<PlasmidRecord>> {
    bail!(
        "dataset {} requires the `hub` feature; rebuild with `--features hub`",
        cfg.repo_id
    )
}

/// Cluster assignments are keyed by id, so ids must be unique and must
/// survive a FASTA header and a tab-separated cluster table unchanged.
fn ensure_unique_ids(records: &[PlasmidRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if record.id.is_empty() || record.id.chars().any(char::is_whitespace) {
            bail!(
                "record id {:?} must be non-empty without whitespace",
                record.id
            );
        }
        if !seen.insert(record.id.as_str()) {
            bail!("duplicate record id `{}` in dataset", record.id);
        }
    }
    Ok(())
}
