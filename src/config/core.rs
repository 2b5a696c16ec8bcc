use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FilterConfig {
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub max_ambiguous_fraction: Option<f64>,
    /// Drop records containing non-IUPAC characters instead of failing.
    #[serde(default = "default_true")]
    pub drop_invalid: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_length: None,
            max_length: None,
            max_ambiguous_fraction: None,
            drop_invalid: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ClusterConfig {
    Mmseqs(MmseqsConfig),
    Precomputed { tsv: PathBuf },
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::Mmseqs(MmseqsConfig::default())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MmseqsConfig {
    #[serde(default = "default_mmseqs_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_min_seq_id")]
    pub min_seq_id: f64,
    #[serde(default = "default_coverage")]
    pub coverage: f64,
    #[serde(default)]
    pub cov_mode: u8,
    #[serde(default)]
    pub cluster_mode: u8,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for MmseqsConfig {
    fn default() -> Self {
        Self {
            binary: default_mmseqs_binary(),
            min_seq_id: default_min_seq_id(),
            coverage: default_coverage(),
            cov_mode: 0,
            cluster_mode: 0,
            threads: None,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.8,
            val: 0.1,
            test: 0.1,
        }
    }
}

impl SplitRatios {
    pub fn new(train: f64, val: f64, test: f64) -> Self {
        Self { train, val, test }
    }

    pub fn total(&self) -> f64 {
        self.train + self.val + self.test
    }

    pub fn is_valid(&self) -> bool {
        let parts = [self.train, self.val, self.test];
        parts.iter().all(|r| r.is_finite() && *r >= 0.0) && self.total() > 0.0
    }

    /// Ratios rescaled to sum to one.
    pub fn normalized(&self) -> Self {
        let total = self.total();
        if total <= 0.0 {
            return *self;
        }
        Self {
            train: self.train / total,
            val: self.val / total,
            test: self.test / total,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SplitConfig {
    #[serde(default)]
    pub ratios: SplitRatios,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_line_width")]
    pub line_width: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            ratios: SplitRatios::default(),
            seed: default_seed(),
            line_width: default_line_width(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExportConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Apply a random circular rotation to each plasmid before writing.
    #[serde(default)]
    pub roll: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            roll: false,
            seed: default_seed(),
        }
    }
}

pub(crate) fn default_true() -> bool {
    true
}

fn default_mmseqs_binary() -> PathBuf {
    PathBuf::from("mmseqs")
}

fn default_min_seq_id() -> f64 {
    0.9
}

fn default_coverage() -> f64 {
    0.8
}

fn default_seed() -> u64 {
    42
}

fn default_line_width() -> usize {
    80
}
