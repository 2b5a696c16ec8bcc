use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DatasetConfig {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    pub source: DatasetSourceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatasetSourceConfig {
    /// FASTA file already on disk.
    Local { path: PathBuf },
    /// FASTA file fetched once over HTTP(S) into the cache directory.
    Url {
        url: String,
        #[serde(default)]
        file_name: Option<String>,
    },
    #[serde(rename = "huggingface", alias = "hugging_face")]
    HuggingFace(HuggingFaceDatasetConfig),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HuggingFaceDatasetConfig {
    pub repo_id: String,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub format: HuggingFaceRecordFormat,
    pub files: Vec<String>,
    /// Column holding the record identifier. Rows without one are numbered.
    #[serde(default)]
    pub id_field: Option<String>,
    #[serde(default = "default_sequence_field")]
    pub sequence_field: String,
    #[serde(default)]
    pub max_records: Option<usize>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HuggingFaceRecordFormat {
    #[default]
    Parquet,
    Jsonl,
    Fasta,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

fn default_sequence_field() -> String {
    "sequence".to_string()
}
