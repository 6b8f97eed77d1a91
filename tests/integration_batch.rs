/*!
 * Integration tests for batch orchestration over local MRF fixtures
 *
 * These tests exercise the full job path — filter loading, output
 * directory creation, source streaming with and without gzip, identity
 * hashing, and the per-job log trail — against temporary directories,
 * with no network access.
 */

use mrf::prelude::*;
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Flattener that parses the streamed payload, stamps identities onto a
/// per-NPI record, and writes one marker file into its output directory.
struct RecordingFlattener;

impl Flattener for RecordingFlattener {
    fn flatten(
        &self,
        mut stream: StreamHandle,
        source: &SourceLocation,
        npi_filter: &FilterSet,
        _code_filter: Option<&FilterSet>,
        out_dir: &Path,
    ) -> mrf::Result<()> {
        let mut payload = String::new();
        stream.read_to_string(&mut payload)?;
        let document: Value = serde_json::from_str(&payload)?;

        let file_id = filename_identity(&source.to_string())?;
        let mut lines = Vec::new();
        for entry in document["in_network"].as_array().into_iter().flatten() {
            let npi = entry["npi"].as_u64().unwrap_or(0);
            if !npi_filter.contains_npi(npi) {
                continue;
            }
            let mut record = Map::new();
            record.insert("npi".to_string(), Value::from(npi));
            record.insert("billing_code".to_string(), entry["billing_code"].clone());
            record.insert("file_id".to_string(), Value::from(file_id));
            let id = append_identity(&mut record, "rate_hash")?;
            lines.push(format!("{},{}", npi, id));
        }

        fs::write(out_dir.join("rows.txt"), lines.join("\n"))?;
        Ok(())
    }
}

fn write_source(dir: &Path) -> PathBuf {
    let path = dir.join("rates.json");
    let payload = serde_json::json!({
        "reporting_entity_name": "Example Health",
        "in_network": [
            {"npi": 1111111110u64, "billing_code": "99213"},
            {"npi": 2222222220u64, "billing_code": "99214"},
            {"npi": 3333333330u64, "billing_code": "70450"},
        ]
    });
    fs::write(&path, serde_json::to_vec(&payload).unwrap()).unwrap();
    path
}

fn write_filter(dir: &Path, name: &str, npis: &[u64]) -> PathBuf {
    let path = dir.join(format!("{}.csv", name));
    let mut file = File::create(&path).unwrap();
    writeln!(file, "npi").unwrap();
    for npi in npis {
        writeln!(file, "{}", npi).unwrap();
    }
    path
}

fn orchestrator(dir: &Path) -> JobOrchestrator {
    let orchestrator = JobOrchestrator::new()
        .with_concurrency(3)
        .with_logs_dir(dir.join("logs"));
    #[cfg(feature = "progress")]
    let orchestrator = orchestrator.with_progress_bar(false);
    orchestrator
}

#[test]
fn test_failing_job_is_isolated_from_siblings() {
    let dir = TempDir::new().unwrap();
    let source_path = write_source(dir.path());
    let source = SourceLocation::Local(source_path);

    let mut jobs = Vec::new();
    for name in ["one", "two", "three", "four", "five"] {
        let filter_file = if name == "three" {
            // engineered failure: this filter file does not exist
            dir.path().join("missing_three.csv")
        } else {
            write_filter(dir.path(), name, &[1111111110, 2222222220])
        };
        jobs.push(Job::new(
            filter_file,
            source.clone(),
            dir.path().join("out").join(name),
        ));
    }

    let result = orchestrator(dir.path()).run(&jobs, None, &RecordingFlattener);

    assert_eq!(result.total, 5);
    assert_eq!(result.succeeded, 4);
    assert_eq!(result.failed, 1);

    // survivors each produced their own artifact
    for name in ["one", "two", "four", "five"] {
        let rows = fs::read_to_string(dir.path().join("out").join(name).join("rows.txt")).unwrap();
        assert_eq!(rows.lines().count(), 2, "job {} should match two NPIs", name);
        let log =
            fs::read_to_string(dir.path().join("logs").join(format!("{}.log", name))).unwrap();
        assert!(log.contains("job completed: success"));
    }

    // the failed job left a log trail and no artifact
    let failed_log =
        fs::read_to_string(dir.path().join("logs").join("missing_three.log")).unwrap();
    assert!(failed_log.contains("job failed"));
    assert!(!dir.path().join("out").join("three").join("rows.txt").exists());
}

#[test]
fn test_rerunning_a_batch_yields_identical_identities() {
    let dir = TempDir::new().unwrap();
    let source = SourceLocation::Local(write_source(dir.path()));

    let jobs = vec![
        Job::new(
            write_filter(dir.path(), "alpha", &[1111111110, 3333333330]),
            source.clone(),
            dir.path().join("out").join("alpha"),
        ),
        Job::new(
            write_filter(dir.path(), "beta", &[2222222220]),
            source.clone(),
            dir.path().join("out").join("beta"),
        ),
    ];

    let runner = orchestrator(dir.path());
    let first = runner.run(&jobs, None, &RecordingFlattener);
    assert!(first.all_succeeded());
    let alpha_first =
        fs::read_to_string(dir.path().join("out").join("alpha").join("rows.txt")).unwrap();
    let beta_first =
        fs::read_to_string(dir.path().join("out").join("beta").join("rows.txt")).unwrap();

    let second = runner.run(&jobs, None, &RecordingFlattener);
    assert!(second.all_succeeded());
    let alpha_second =
        fs::read_to_string(dir.path().join("out").join("alpha").join("rows.txt")).unwrap();
    let beta_second =
        fs::read_to_string(dir.path().join("out").join("beta").join("rows.txt")).unwrap();

    assert_eq!(alpha_first, alpha_second);
    assert_eq!(beta_first, beta_second);
    assert!(!alpha_first.is_empty());
}

#[test]
fn test_gzip_and_plain_sources_stream_the_same_bytes() {
    let dir = TempDir::new().unwrap();
    let plain_path = write_source(dir.path());
    let plain_bytes = fs::read(&plain_path).unwrap();

    let gz_path = dir.path().join("rates.json.gz");
    let gz_file = File::create(&gz_path).unwrap();
    let mut encoder = flate2::write::GzEncoder::new(gz_file, flate2::Compression::default());
    encoder.write_all(&plain_bytes).unwrap();
    encoder.finish().unwrap();

    let opener = SourceStream::new();

    let mut plain_out = Vec::new();
    opener
        .open(&SourceLocation::Local(plain_path))
        .unwrap()
        .read_to_end(&mut plain_out)
        .unwrap();

    let mut gz_out = Vec::new();
    opener
        .open(&SourceLocation::Local(gz_path))
        .unwrap()
        .read_to_end(&mut gz_out)
        .unwrap();

    assert_eq!(plain_out, gz_out);
    assert_eq!(plain_out, plain_bytes);
}

#[test]
fn test_compressed_source_feeds_the_flattener_decompressed() {
    let dir = TempDir::new().unwrap();
    let plain_bytes = fs::read(write_source(dir.path())).unwrap();

    let gz_path = dir.path().join("compressed_rates.json.gz");
    let gz_file = File::create(&gz_path).unwrap();
    let mut encoder = flate2::write::GzEncoder::new(gz_file, flate2::Compression::default());
    encoder.write_all(&plain_bytes).unwrap();
    encoder.finish().unwrap();

    let job = Job::new(
        write_filter(dir.path(), "gamma", &[1111111110]),
        SourceLocation::Local(gz_path),
        dir.path().join("out").join("gamma"),
    );

    let result = orchestrator(dir.path()).run(&[job], None, &RecordingFlattener);
    assert!(result.all_succeeded());

    let rows = fs::read_to_string(dir.path().join("out").join("gamma").join("rows.txt")).unwrap();
    assert_eq!(rows.lines().count(), 1);
}

#[test]
fn test_bad_suffix_source_fails_the_job_not_the_batch() {
    let dir = TempDir::new().unwrap();
    let bad_source = dir.path().join("rates.csv");
    fs::write(&bad_source, b"not json").unwrap();

    let jobs = vec![
        Job::new(
            write_filter(dir.path(), "good", &[1111111110]),
            SourceLocation::Local(write_source(dir.path())),
            dir.path().join("out").join("good"),
        ),
        Job::new(
            write_filter(dir.path(), "bad", &[1111111110]),
            SourceLocation::Local(bad_source),
            dir.path().join("out").join("bad"),
        ),
    ];

    let result = orchestrator(dir.path()).run(&jobs, None, &RecordingFlattener);
    assert_eq!(result.total, 2);
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 1);

    let log = fs::read_to_string(dir.path().join("logs").join("bad.log")).unwrap();
    assert!(log.contains("unsupported source suffix"));
}

#[test]
fn test_single_worker_batch_completes_every_job() {
    let dir = TempDir::new().unwrap();
    let source = SourceLocation::Local(write_source(dir.path()));

    let jobs: Vec<Job> = ["s1", "s2", "s3"]
        .iter()
        .map(|name| {
            Job::new(
                write_filter(dir.path(), name, &[2222222220]),
                source.clone(),
                dir.path().join("out").join(name),
            )
        })
        .collect();

    let runner = orchestrator(dir.path()).with_concurrency(1);
    assert_eq!(runner.concurrency(), 1);

    let result = runner.run(&jobs, None, &RecordingFlattener);
    assert_eq!(result, BatchResult { total: 3, succeeded: 3, failed: 0 });
}

#[test]
fn test_code_filter_reaches_the_flattener() {
    struct CodeCheckingFlattener;

    impl Flattener for CodeCheckingFlattener {
        fn flatten(
            &self,
            _stream: StreamHandle,
            _source: &SourceLocation,
            _npi_filter: &FilterSet,
            code_filter: Option<&FilterSet>,
            out_dir: &Path,
        ) -> mrf::Result<()> {
            let codes = code_filter.expect("code filter should be passed through");
            assert!(codes.contains_code("G0008"));
            fs::write(out_dir.join("checked"), b"ok")?;
            Ok(())
        }
    }

    let dir = TempDir::new().unwrap();
    let code_path = dir.path().join("codes.csv");
    fs::write(&code_path, "code\nG0008\n").unwrap();
    let code_filter = FilterSet::from_csv(&code_path).unwrap();

    let job = Job::new(
        write_filter(dir.path(), "delta", &[1111111110]),
        SourceLocation::Local(write_source(dir.path())),
        dir.path().join("out").join("delta"),
    );

    let result = orchestrator(dir.path()).run(&[job], Some(&code_filter), &CodeCheckingFlattener);
    assert!(result.all_succeeded());
    assert!(dir.path().join("out").join("delta").join("checked").exists());
}
