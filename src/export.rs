use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ExportConfig;
use crate::dataset::DatasetSplit;
use crate::split::Partition;
use crate::tokenizer::{Tokenizer, random_roll};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenShard {
    pub split: DatasetSplit,
    pub path: PathBuf,
    pub records: usize,
    pub tokens: usize,
}

pub fn token_shard_path(out_dir: &Path, split: DatasetSplit) -> PathBuf {
    out_dir.join(format!("{}.tokens", split.name()))
}

/// Encode every split into a flat byte stream of token ids, one byte per
/// token, each record terminated by the tokenizer's end-of-sequence id.
pub fn export_token_shards(
    partition: &Partition,
    tokenizer: &dyn Tokenizer,
    out_dir: &Path,
    cfg: &ExportConfig,
) -> Result<Vec<TokenShard>> {
    if tokenizer.len() > usize::from(u8::MAX) + 1 {
        bail!(
            "tokenizer with {} ids does not fit one byte per token",
            tokenizer.len()
        );
    }
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut shards = Vec::with_capacity(DatasetSplit::ALL.len());

    for split in DatasetSplit::ALL {
        let path = token_shard_path(out_dir, split);
        let file =
            File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let mut token_count = 0usize;

        let records = partition.records(split);
        for record in records {
            let mut tokens = tokenizer
                .encode(&record.sequence, false, &mut rng)
                .with_context(|| format!("failed to encode {}", record.id))?;
            if cfg.roll {
                random_roll(&mut tokens, &mut rng);
            }
            if let Some(eos) = tokenizer.eos_id() {
                tokens.push(eos);
            }
            let bytes: Vec<u8> = tokens.iter().map(|&id| id as u8).collect();
            writer.write_all(&bytes)?;
            token_count += bytes.len();
        }
        writer
            .flush()
            .with_context(|| format!("failed to write {}", path.display()))?;

        info!("{split}: wrote {token_count} tokens to {}", path.display());
        shards.push(TokenShard {
            split,
            path,
            records: records.len(),
            tokens: token_count,
        });
    }

    Ok(shards)
}
