use std::cell::Cell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::Result;
use plasmid_lm::dataset::DatasetSplit;
use plasmid_lm::{
    ClusterAssignments, ClusterConfig, Clusterer, DatasetSourceConfig, Pipeline, PipelineConfig,
    RunManifest, Stage, read_cluster_tsv, read_fasta,
};
use tempfile::{TempDir, tempdir};

const PLASMIDS: &str = "\
>a1 pUC19 variant
ACGTACGTACGTAAAA
>a2
ACGTACGTACGTAAAA
>b1
GGGGCCCCGGGGCCCC
>c1
TTTTAAAATTTTAAAA
>d1
ACGTNNACGTACGTAC
>e1
CCCCAAAACCCCAAAA
>e2
CCCCAAAACCCCAAAA
>f1
GATTACAGATTACAGA
>g1
CATCATCATCATCATC
>short
ACG
>bad
ACGTXACGTACGTACG
";

/// Groups records with identical sequences and counts how often it runs.
struct ExactMatchClusterer {
    calls: Rc<Cell<usize>>,
}

impl Clusterer for ExactMatchClusterer {
    fn cluster(&self, fasta: &Path, _work_dir: &Path) -> Result<ClusterAssignments> {
        self.calls.set(self.calls.get() + 1);
        let records = read_fasta(fasta)?;
        let mut assignments = ClusterAssignments::new();
        for record in &records {
            let representative = records
                .iter()
                .find(|other| other.sequence == record.sequence)
                .map(|other| other.id.clone())
                .unwrap_or_else(|| record.id.clone());
            assignments.assign(representative, record.id.clone())?;
        }
        Ok(assignments)
    }

    fn name(&self) -> &'static str {
        "exact"
    }
}

fn setup() -> (TempDir, PipelineConfig) {
    let dir = tempdir().expect("tempdir");
    let fasta = dir.path().join("plasmids.fasta");
    fs::write(&fasta, PLASMIDS).expect("write fasta");

    let mut config = PipelineConfig::from_toml_str(
        r#"
[dataset.source]
type = "local"
path = "placeholder.fasta"

[filter]
min_length = 10
max_length = 100

[cluster]
method = "precomputed"
tsv = "unused.tsv"

[split]
seed = 7
line_width = 60
"#,
    )
    .expect("config");
    config.work_dir = dir.path().join("work");
    config.dataset.source = DatasetSourceConfig::Local { path: fasta };
    (dir, config)
}

fn pipeline<'a>(config: &'a PipelineConfig, calls: &Rc<Cell<usize>>) -> Pipeline<'a> {
    Pipeline::new(config).with_clusterer(Box::new(ExactMatchClusterer {
        calls: Rc::clone(calls),
    }))
}

fn cached_flags(manifest: &RunManifest) -> Vec<(Stage, bool)> {
    manifest
        .stages
        .iter()
        .map(|outcome| (outcome.stage, outcome.cached))
        .collect()
}

#[test]
fn full_run_writes_every_stage_output() {
    let (_dir, config) = setup();
    let calls = Rc::new(Cell::new(0));
    let pipeline = pipeline(&config, &calls);
    let manifest = pipeline.run(Stage::Export).expect("run");
    let paths = pipeline.paths();

    assert_eq!(read_fasta(paths.raw_fasta()).expect("raw").len(), 11);

    let report = manifest.filter.as_ref().expect("filter report");
    assert_eq!(report.input, 11);
    assert_eq!(report.kept, 9);
    assert_eq!(report.too_short, 1);
    assert_eq!(report.invalid, 1);

    assert_eq!(calls.get(), 1);
    assert_eq!(manifest.clusters, Some(7));
    let assignments = read_cluster_tsv(paths.assignments()).expect("assignments");
    assert_eq!(assignments.cluster_of("a2"), Some("a1"));
    assert_eq!(assignments.cluster_of("e2"), Some("e1"));

    let split = manifest.split.as_ref().expect("split manifest");
    assert_eq!(split.total_records, 9);
    assert_eq!(split.total_clusters, 7);
    let mut owner = std::collections::HashMap::new();
    for split in DatasetSplit::ALL {
        let path = paths.split_dir().join(format!("{}.fasta", split.name()));
        for record in read_fasta(&path).expect("split fasta") {
            owner.insert(record.id, split);
        }
    }
    assert_eq!(owner.len(), 9);
    assert_eq!(owner["a1"], owner["a2"]);
    assert_eq!(owner["e1"], owner["e2"]);

    // Export is disabled by default.
    assert!(manifest.tokens.is_empty());
    assert!(!paths.token_dir().exists());

    let json = fs::read_to_string(paths.run_manifest()).expect("run manifest");
    let reloaded: RunManifest = serde_json::from_str(&json).expect("parse run manifest");
    assert_eq!(cached_flags(&reloaded), cached_flags(&manifest));
    assert_eq!(reloaded.clusters, manifest.clusters);
    assert_eq!(reloaded.config.work_dir, config.work_dir);
}

#[test]
fn second_run_reuses_cached_stages() {
    let (_dir, config) = setup();
    let calls = Rc::new(Cell::new(0));

    let first = pipeline(&config, &calls).run(Stage::Split).expect("first run");
    assert_eq!(
        cached_flags(&first),
        [
            (Stage::Fetch, false),
            (Stage::Filter, false),
            (Stage::Cluster, false),
            (Stage::Split, false),
        ]
    );

    let second = pipeline(&config, &calls).run(Stage::Split).expect("second run");
    assert_eq!(
        cached_flags(&second),
        [
            (Stage::Fetch, true),
            (Stage::Filter, true),
            (Stage::Cluster, true),
            (Stage::Split, false),
        ]
    );
    assert_eq!(calls.get(), 1);
    assert_eq!(second.filter, first.filter);
    assert_eq!(second.split, first.split);
}

#[test]
fn changed_filter_invalidates_downstream_caches() {
    let (_dir, mut config) = setup();
    let calls = Rc::new(Cell::new(0));
    pipeline(&config, &calls).run(Stage::Cluster).expect("first run");

    config.filter.max_ambiguous_fraction = Some(0.05);
    let manifest = pipeline(&config, &calls).run(Stage::Cluster).expect("second run");
    assert_eq!(
        cached_flags(&manifest),
        [
            (Stage::Fetch, true),
            (Stage::Filter, false),
            (Stage::Cluster, false),
        ]
    );
    assert_eq!(calls.get(), 2);
    let report = manifest.filter.expect("filter report");
    assert_eq!(report.too_ambiguous, 1);
    assert_eq!(report.kept, 8);
}

#[test]
fn changed_cluster_config_only_reruns_clustering() {
    let (_dir, mut config) = setup();
    let calls = Rc::new(Cell::new(0));
    pipeline(&config, &calls).run(Stage::Cluster).expect("first run");

    config.cluster = ClusterConfig::Precomputed {
        tsv: "other.tsv".into(),
    };
    let manifest = pipeline(&config, &calls).run(Stage::Cluster).expect("second run");
    assert_eq!(
        cached_flags(&manifest),
        [
            (Stage::Fetch, true),
            (Stage::Filter, true),
            (Stage::Cluster, false),
        ]
    );
    assert_eq!(calls.get(), 2);
}

#[test]
fn force_reruns_cached_stages() {
    let (_dir, config) = setup();
    let calls = Rc::new(Cell::new(0));
    pipeline(&config, &calls).run(Stage::Cluster).expect("first run");

    let manifest = pipeline(&config, &calls)
        .force(true)
        .run(Stage::Cluster)
        .expect("forced run");
    assert!(manifest.stages.iter().all(|outcome| !outcome.cached));
    assert_eq!(calls.get(), 2);
}

#[test]
fn partial_run_stops_at_requested_stage() {
    let (_dir, config) = setup();
    let calls = Rc::new(Cell::new(0));
    let pipeline = pipeline(&config, &calls);
    let manifest = pipeline.run(Stage::Filter).expect("run");

    assert_eq!(manifest.stages.len(), 2);
    assert!(manifest.split.is_none());
    assert_eq!(calls.get(), 0);
    assert!(pipeline.paths().filtered_fasta().is_file());
    assert!(!pipeline.paths().split_dir().exists());
}

#[test]
fn export_writes_one_byte_per_token() {
    let (_dir, mut config) = setup();
    config.export.enabled = true;
    config.export.roll = true;
    let calls = Rc::new(Cell::new(0));
    let pipeline = pipeline(&config, &calls);
    let manifest = pipeline.run(Stage::Export).expect("run");

    assert_eq!(manifest.tokens.len(), 3);
    let split_dir = pipeline.paths().split_dir();
    for shard in &manifest.tokens {
        let records =
            read_fasta(split_dir.join(format!("{}.fasta", shard.split.name()))).expect("split");
        let expected: usize = records.iter().map(|record| record.len() + 1).sum();
        let bytes = fs::read(&shard.path).expect("token shard");

        assert_eq!(shard.records, records.len());
        assert_eq!(shard.tokens, expected);
        assert_eq!(bytes.len(), expected);
        assert!(bytes.iter().all(|&id| id < 6));
        assert_eq!(bytes.iter().filter(|&&id| id == 4).count(), records.len());
    }
}

#[test]
fn edited_local_source_invalidates_fetch() {
    let (_dir, config) = setup();
    let calls = Rc::new(Cell::new(0));
    let first = pipeline(&config, &calls).run(Stage::Filter).expect("first run");
    assert_eq!(first.stages[0].records, 11);

    let DatasetSourceConfig::Local { path } = &config.dataset.source else {
        panic!("expected a local source");
    };
    fs::write(path, format!("{PLASMIDS}>h1\nAAAACCCCGGGGTTTT\n")).expect("grow source");

    let second = pipeline(&config, &calls).run(Stage::Filter).expect("second run");
    assert_eq!(
        cached_flags(&second),
        [(Stage::Fetch, false), (Stage::Filter, false)]
    );
    assert_eq!(second.stages[0].records, 12);
    assert_eq!(second.filter.expect("filter report").kept, 10);
}

#[test]
fn run_manifest_records_the_work_dir_it_ran_in() {
    let (dir, mut config) = setup();
    config.work_dir = dir.path().join("elsewhere");
    let calls = Rc::new(Cell::new(0));
    let pipeline = pipeline(&config, &calls);
    let manifest = pipeline.run(Stage::Fetch).expect("run");

    assert_eq!(pipeline.paths().root, config.work_dir);
    assert!(pipeline.paths().run_manifest().is_file());
    assert_eq!(manifest.config.work_dir, pipeline.paths().root);
}
