use std::fs;

use plasmid_lm::{
    ClusterConfig, Clusterer, MmseqsConfig, PlasmidRecord, PrecomputedClusters, build_clusterer,
    write_fasta,
};
use tempfile::tempdir;

fn records() -> Vec<PlasmidRecord> {
    vec![
        PlasmidRecord::new("pA", "ACGTACGTACGT"),
        PlasmidRecord::new("pB", "ACGTACGTACGA"),
        PlasmidRecord::new("pC", "GGGGCCCCAAAA"),
    ]
}

#[test]
fn precomputed_clusters_read_existing_table() {
    let dir = tempdir().expect("tempdir");
    let tsv = dir.path().join("clusters.tsv");
    fs::write(&tsv, "pA\tpA\npA\tpB\npC\tpC\n").expect("write tsv");

    let clusterer = build_clusterer(&ClusterConfig::Precomputed { tsv: tsv.clone() });
    assert_eq!(clusterer.name(), "precomputed");
    let assignments = clusterer
        .cluster(&dir.path().join("ignored.fasta"), dir.path())
        .expect("cluster");
    assert_eq!(assignments.num_clusters(), 2);
    assert_eq!(assignments.cluster_of("pB"), Some("pA"));

    let missing = PrecomputedClusters::new(dir.path().join("missing.tsv"));
    assert!(missing.cluster(&tsv, dir.path()).is_err());
}

#[test]
fn conflicting_table_rows_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let tsv = dir.path().join("clusters.tsv");
    fs::write(&tsv, "pA\tpA\npA\tpB\npC\tpB\n").expect("write tsv");
    let err = PrecomputedClusters::new(&tsv)
        .cluster(&tsv, dir.path())
        .unwrap_err();
    assert!(format!("{err:#}").contains("pB"));
}

#[test]
fn covering_adds_singletons_for_unclustered_records() {
    let dir = tempdir().expect("tempdir");
    let tsv = dir.path().join("clusters.tsv");
    fs::write(&tsv, "pA\tpA\npA\tpB\nzz\tzz\n").expect("write tsv");

    let assignments = PrecomputedClusters::new(&tsv)
        .cluster(&tsv, dir.path())
        .expect("cluster")
        .covering(&records());
    assert_eq!(assignments.len(), 3);
    assert_eq!(assignments.cluster_of("pC"), Some("pC"));
    assert_eq!(assignments.cluster_of("zz"), None);
    assert_eq!(assignments.num_clusters(), 2);
}

#[cfg(unix)]
mod mmseqs {
    use super::*;
    use std::io::{self, Write};
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use plasmid_lm::MmseqsClusterer;

    /// Stand-in for `mmseqs easy-cluster` that puts every sequence into the
    /// first record's cluster and records its arguments.
    const FAKE_MMSEQS: &str = r#"#!/bin/sh
set -e
fasta="$2"
prefix="$3"
echo "$@" > "$(dirname "$prefix")/args.txt"
ids=$(grep '^>' "$fasta" | sed 's/^>//; s/[[:space:]].*//')
first=$(echo "$ids" | head -n 1)
for id in $ids; do
    printf '%s\t%s\n' "$first" "$id"
done > "${prefix}_cluster.tsv"
"#;

    fn install(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).expect("write fake binary");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        path
    }

    #[test]
    fn runs_easy_cluster_and_reads_its_table() {
        let dir = tempdir().expect("tempdir");
        let fasta = dir.path().join("filtered.fasta");
        write_fasta(&fasta, &records(), 80).expect("write fasta");
        let work = dir.path().join("clusters");

        let config = MmseqsConfig {
            binary: install(dir.path(), "mmseqs", FAKE_MMSEQS),
            min_seq_id: 0.95,
            coverage: 0.5,
            threads: Some(2),
            ..MmseqsConfig::default()
        };
        let clusterer = MmseqsClusterer::new(config);
        let assignments = clusterer.cluster(&fasta, &work).expect("cluster");

        assert_eq!(assignments.len(), 3);
        assert_eq!(assignments.num_clusters(), 1);
        assert_eq!(assignments.cluster_of("pC"), Some("pA"));
        assert!(MmseqsClusterer::cluster_tsv(&work).is_file());

        let args = fs::read_to_string(work.join("args.txt")).expect("args");
        let args: Vec<&str> = args.split_whitespace().collect();
        assert_eq!(args[0], "easy-cluster");
        assert!(args.windows(2).any(|pair| pair == ["--min-seq-id", "0.95"]));
        assert!(args.windows(2).any(|pair| pair == ["-c", "0.5"]));
        assert!(args.windows(2).any(|pair| pair == ["--threads", "2"]));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn successful_run_logs_stderr_warnings() {
        let dir = tempdir().expect("tempdir");
        let fasta = dir.path().join("filtered.fasta");
        write_fasta(&fasta, &records(), 80).expect("write fasta");
        let work = dir.path().join("clusters");

        let body = format!(
            "{FAKE_MMSEQS}echo 'Warning: 1 sequence contains invalid residues' >&2\n"
        );
        let clusterer = MmseqsClusterer::new(MmseqsConfig {
            binary: install(dir.path(), "mmseqs", &body),
            ..MmseqsConfig::default()
        });

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let assignments = tracing::subscriber::with_default(subscriber, || {
            clusterer.cluster(&fasta, &work)
        })
        .expect("cluster");
        assert_eq!(assignments.len(), 3);

        let output = String::from_utf8(logs.0.lock().expect("log buffer").clone()).expect("utf8");
        let warning = output
            .lines()
            .find(|line| line.contains("invalid residues"))
            .expect("stderr line logged");
        assert!(warning.contains("WARN"), "{warning}");
    }

    #[test]
    fn failing_binary_reports_stderr() {
        let dir = tempdir().expect("tempdir");
        let fasta = dir.path().join("filtered.fasta");
        write_fasta(&fasta, &records(), 80).expect("write fasta");

        let config = MmseqsConfig {
            binary: install(
                dir.path(),
                "mmseqs",
                "#!/bin/sh\necho 'Input database is empty' >&2\nexit 3\n",
            ),
            ..MmseqsConfig::default()
        };
        let err = MmseqsClusterer::new(config)
            .cluster(&fasta, &dir.path().join("clusters"))
            .unwrap_err();
        assert!(format!("{err:#}").contains("Input database is empty"));
    }
}
