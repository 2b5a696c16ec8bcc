mod factory;
pub mod fasta;
#[cfg(feature = "hub")]
mod huggingface;
mod remote;

use serde::{Deserialize, Serialize};

pub use factory::{describe_source, fetch_records};
pub use fasta::{parse_fasta, read_fasta, write_fasta};
#[cfg(feature = "hub")]
pub use huggingface::{fetch_huggingface_records, read_downloaded_files};
pub use remote::fetch_cached;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetSplit {
    Train,
    Val,
    Test,
}

impl DatasetSplit {
    pub const ALL: [DatasetSplit; 3] = [DatasetSplit::Train, DatasetSplit::Val, DatasetSplit::Test];

    pub fn name(self) -> &'static str {
        match self {
            DatasetSplit::Train => "train",
            DatasetSplit::Val => "val",
            DatasetSplit::Test => "test",
        }
    }

    pub fn index(self) -> usize {
        match self {
            DatasetSplit::Train => 0,
            DatasetSplit::Val => 1,
            DatasetSplit::Test => 2,
        }
    }
}

impl std::fmt::Display for DatasetSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
