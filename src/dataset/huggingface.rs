use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Cache, Repo, RepoType};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::RowAccessor;
use serde_json::Value;
use tracing::{info, warn};

use super::fasta::read_fasta;
use crate::config::{HuggingFaceDatasetConfig, HuggingFaceRecordFormat};
use crate::sequence::PlasmidRecord;

/// Download the configured files from a Hugging Face dataset repo and read
/// their plasmid records.
pub fn fetch_huggingface_records(
    cache_dir: impl AsRef<Path>,
    cfg: &HuggingFaceDatasetConfig,
) -> io::Result<Vec<PlasmidRecord>> {
    if cfg.files.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "huggingface dataset requires at least one file",
        ));
    }

    let cache_dir = cache_dir.as_ref();
    let hf_cache_dir = cache_dir.join("huggingface");
    fs::create_dir_all(&hf_cache_dir)?;

    let token = std::env::var("HF_TOKEN")
        .ok()
        .or_else(|| Cache::from_env().token());

    let mut api_builder = ApiBuilder::new().with_cache_dir(hf_cache_dir);
    if let Some(token) = token {
        api_builder = api_builder.with_token(Some(token));
    }
    let api = api_builder.build().map_err(io::Error::other)?;

    let repo = if let Some(revision) = &cfg.revision {
        Repo::with_revision(cfg.repo_id.clone(), RepoType::Dataset, revision.clone())
    } else {
        Repo::new(cfg.repo_id.clone(), RepoType::Dataset)
    };
    let repo = api.repo(repo);

    let mut paths = Vec::with_capacity(cfg.files.len());
    for file in &cfg.files {
        let path = repo
            .get(file)
            .map_err(|err| io::Error::other(format!("failed to download {file}: {err}")))?;
        info!("fetched {file} from {}", cfg.repo_id);
        paths.push(path);
    }

    read_downloaded_files(&paths, cfg)
}

/// Read already-downloaded dataset files, honouring `max_records`.
pub fn read_downloaded_files(
    paths: &[PathBuf],
    cfg: &HuggingFaceDatasetConfig,
) -> io::Result<Vec<PlasmidRecord>> {
    let mut records = Vec::new();
    for path in paths {
        if cfg.max_records.is_some_and(|limit| records.len() >= limit) {
            break;
        }
        collect_records(path, cfg, &mut records)?;
    }

    if records.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("huggingface dataset {} contains no records", cfg.repo_id),
        ));
    }
    Ok(records)
}

fn collect_records(
    path: &Path,
    cfg: &HuggingFaceDatasetConfig,
    records: &mut Vec<PlasmidRecord>,
) -> io::Result<()> {
    match cfg.format {
        HuggingFaceRecordFormat::Jsonl => collect_jsonl_records(path, cfg, records),
        HuggingFaceRecordFormat::Parquet => collect_parquet_records(path, cfg, records),
        HuggingFaceRecordFormat::Fasta => {
            for record in read_fasta(path)? {
                if cfg.max_records.is_some_and(|limit| records.len() >= limit) {
                    break;
                }
                records.push(record);
            }
            Ok(())
        }
    }
}

fn collect_jsonl_records(
    path: &Path,
    cfg: &HuggingFaceDatasetConfig,
    records: &mut Vec<PlasmidRecord>,
) -> io::Result<()> {
    let reader = BufReader::new(File::open(path)?);

    for line in reader.lines() {
        if cfg.max_records.is_some_and(|limit| records.len() >= limit) {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to parse JSON record from {}: {err}", path.display()),
            )
        })?;

        let sequence = match value.get(&cfg.sequence_field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => {
                warn!(
                    "skipping record without `{}` in {}",
                    cfg.sequence_field,
                    path.display()
                );
                continue;
            }
            Some(other) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("field `{}` is not a string: {other}", cfg.sequence_field),
                ));
            }
        };
        let id = cfg
            .id_field
            .as_ref()
            .and_then(|field| value.get(field))
            .and_then(|value| match value {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .map(|id| record_id(&id, records.len()))
            .unwrap_or_else(|| fallback_id(records.len()));

        records.push(PlasmidRecord::new(id, sequence));
    }

    Ok(())
}

fn collect_parquet_records(
    path: &Path,
    cfg: &HuggingFaceDatasetConfig,
    records: &mut Vec<PlasmidRecord>,
) -> io::Result<()> {
    let file = File::open(path)?;
    let reader = SerializedFileReader::new(file).map_err(io::Error::other)?;
    let schema = reader.metadata().file_metadata().schema_descr();

    let mut index_map = HashMap::new();
    for (idx, column) in schema.columns().iter().enumerate() {
        index_map.insert(column.path().string(), idx);
    }

    let missing_field = |field: &str| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("missing field `{field}` in parquet file {}", path.display()),
        )
    };
    let sequence_idx = *index_map
        .get(cfg.sequence_field.as_str())
        .ok_or_else(|| missing_field(&cfg.sequence_field))?;
    let id_idx = match &cfg.id_field {
        Some(field) => Some(
            *index_map
                .get(field.as_str())
                .ok_or_else(|| missing_field(field))?,
        ),
        None => None,
    };

    let row_iter = reader.get_row_iter(None).map_err(io::Error::other)?;
    for row in row_iter {
        if cfg.max_records.is_some_and(|limit| records.len() >= limit) {
            break;
        }
        let row = row.map_err(io::Error::other)?;

        let sequence = if let Ok(s) = row.get_string(sequence_idx) {
            s.clone()
        } else if let Ok(bytes) = row.get_bytes(sequence_idx) {
            String::from_utf8_lossy(bytes.data()).to_string()
        } else {
            warn!(
                "skipping parquet row without `{}` in {}",
                cfg.sequence_field,
                path.display()
            );
            continue;
        };

        let id = id_idx
            .and_then(|idx| {
                row.get_string(idx).ok().cloned().or_else(|| {
                    row.get_column_iter()
                        .nth(idx)
                        .map(|(_, field)| field.to_string())
                })
            })
            .map(|id| record_id(&id, records.len()))
            .unwrap_or_else(|| fallback_id(records.len()));

        records.push(PlasmidRecord::new(id, sequence));
    }

    Ok(())
}

/// FASTA headers and cluster tables end an id at the first whitespace, so
/// inner whitespace becomes `_` and blank ids are numbered.
fn record_id(raw: &str, index: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return fallback_id(index);
    }
    trimmed
        .chars()
        .map(|ch| if ch.is_whitespace() { '_' } else { ch })
        .collect()
}

fn fallback_id(index: usize) -> String {
    format!("record_{index}")
}
