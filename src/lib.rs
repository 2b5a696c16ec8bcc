pub mod cluster;
pub mod config;
pub mod dataset;
pub mod export;
pub mod filter;
pub mod job;
pub mod pipeline;
pub mod sequence;
pub mod split;
pub mod tokenizer;

pub use cluster::{
    ClusterAssignments, Clusterer, MmseqsClusterer, PrecomputedClusters, build_clusterer,
    parse_cluster_tsv, read_cluster_tsv, write_cluster_tsv,
};
pub use config::{
    ClusterConfig, DatasetConfig, DatasetSourceConfig, ExportConfig, FilterConfig,
    HuggingFaceDatasetConfig, HuggingFaceRecordFormat, JobConfig, MmseqsConfig, PipelineConfig,
    SplitConfig, SplitRatios, load_pipeline_config,
};
pub use dataset::{DatasetSplit, fetch_records, read_fasta, write_fasta};
pub use export::{TokenShard, export_token_shards};
pub use filter::{FilterReport, filter_records};
pub use job::{SbatchSubmitter, Submitter, render_batch_script, write_batch_script};
pub use pipeline::{Pipeline, RunManifest, Stage, WorkPaths};
pub use sequence::PlasmidRecord;
pub use split::{Partition, SplitManifest, partition};
pub use tokenizer::{NucleotideTokenizer, Tokenizer, random_roll};
