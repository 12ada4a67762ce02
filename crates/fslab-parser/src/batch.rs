//! Experiment-level driver: discovers run directories, parses every trial in
//! parallel and writes the per-run `properties` files.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::config::ParserConfig;
use crate::error::ParseError;
use crate::outcome::ErrorKind;
use crate::pipeline::{Pipeline, TrialArtifacts, TrialRecord};

#[derive(Debug)]
pub struct TrialResult {
    pub run_dir: PathBuf,
    pub result: std::result::Result<TrialRecord, ParseError>,
}

pub fn discover_runs(root: &Path, config: &ParserConfig) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(anyhow!("experiment directory not found: {}", root.display()));
    }
    let driver_log = config.artifacts.driver_log.as_str();
    let mut runs = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        if entry.file_type().is_file() && entry.file_name() == driver_log {
            if let Some(parent) = entry.path().parent() {
                runs.push(parent.to_path_buf());
            }
        }
    }
    runs.sort();
    runs.dedup();
    Ok(runs)
}

pub fn parse_trial(
    run_dir: &Path,
    pipeline: &Pipeline,
    config: &ParserConfig,
) -> std::result::Result<TrialRecord, ParseError> {
    let artifacts = TrialArtifacts::load(run_dir, &config.artifacts)?;
    pipeline.run(&artifacts)
}

/// Processes all `runs` on a worker pool. Results keep the input order; a
/// fatal trial is logged and returned as its own `Err` without affecting
/// the others.
pub fn parse_batch(runs: &[PathBuf], config: &ParserConfig) -> Result<Vec<TrialResult>> {
    let pipeline = Pipeline::from_config(config);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs)
        .thread_name(|i| format!("fslab-worker-{}", i))
        .build()
        .context("building worker pool")?;

    info!(trials = runs.len(), workers = pool.current_num_threads(), "parsing trials");
    let results = pool.install(|| {
        runs.par_iter()
            .map(|run_dir| {
                let result = parse_trial(run_dir, &pipeline, config);
                if let Err(e) = &result {
                    error!(run_dir = %run_dir.display(), error = %e, "trial aborted");
                }
                TrialResult {
                    run_dir: run_dir.clone(),
                    result,
                }
            })
            .collect::<Vec<_>>()
    });
    Ok(results)
}

/// Merges the run's static properties with `record` and writes the
/// properties file. Record attributes win on key clashes.
pub fn write_properties(
    run_dir: &Path,
    record: &TrialRecord,
    config: &ParserConfig,
) -> std::result::Result<PathBuf, ParseError> {
    let static_path = run_dir.join(&config.static_properties_file);
    let mut merged = match fs::read_to_string(&static_path) {
        Ok(data) => match serde_json::from_str::<Value>(&data)
            .map_err(|e| ParseError::write(&static_path, e))?
        {
            Value::Object(map) => map,
            _ => return Err(ParseError::write(&static_path, "static properties must be a JSON object")),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
        Err(e) => return Err(ParseError::write(&static_path, e)),
    };

    if let Value::Object(attributes) = record.attributes().to_json() {
        merged.extend(attributes);
    }

    let out = run_dir.join(&config.properties_file);
    atomic_write_json_pretty(&out, &Value::Object(merged)).map_err(|e| ParseError::write(&out, e))?;
    Ok(out)
}

/// Writes the properties file of every parsed trial. A run whose file cannot
/// be written is logged and reported; the others are still written.
pub fn write_batch_properties(results: &[TrialResult], config: &ParserConfig) -> (usize, Vec<TrialFailure>) {
    let mut written = 0usize;
    let mut failures = Vec::new();
    for trial in results {
        let Ok(record) = &trial.result else {
            continue;
        };
        match write_properties(&trial.run_dir, record, config) {
            Ok(_) => written += 1,
            Err(e) => {
                error!(run_dir = %trial.run_dir.display(), error = %e, "properties not written");
                failures.push(TrialFailure::new(&trial.run_dir, &e));
            }
        }
    }
    (written, failures)
}

fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

fn atomic_write_json_pretty(path: &Path, value: &Value) -> std::io::Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    atomic_write_bytes(path, &bytes)
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialFailure {
    pub run_dir: String,
    pub kind: &'static str,
    pub message: String,
}

impl TrialFailure {
    fn new(run_dir: &Path, error: &ParseError) -> Self {
        Self {
            run_dir: run_dir.display().to_string(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub trials: usize,
    pub parsed: usize,
    pub failed: usize,
    pub coverage: usize,
    pub written: usize,
    pub write_failed: usize,
    pub errors: BTreeMap<&'static str, usize>,
    pub failures: Vec<TrialFailure>,
}

impl BatchSummary {
    pub fn from_results(results: &[TrialResult]) -> Self {
        let mut summary = BatchSummary {
            trials: results.len(),
            ..BatchSummary::default()
        };
        for kind in ErrorKind::ALL {
            summary.errors.insert(kind.as_str(), 0);
        }
        for trial in results {
            match &trial.result {
                Ok(record) => {
                    summary.parsed += 1;
                    if record.coverage() {
                        summary.coverage += 1;
                    }
                    *summary.errors.entry(record.error_kind().as_str()).or_insert(0) += 1;
                }
                Err(e) => {
                    summary.failed += 1;
                    summary.failures.push(TrialFailure::new(&trial.run_dir, e));
                }
            }
        }
        summary
    }

    pub fn add_writes(&mut self, written: usize, failures: Vec<TrialFailure>) {
        self.written += written;
        self.write_failed += failures.len();
        self.failures.extend(failures);
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.write_failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::attr;

    fn temp_root(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "fslab_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&root).expect("temp dir");
        root
    }

    #[test]
    fn write_properties_merges_static_properties() {
        let root = temp_root("props");
        fs::write(
            root.join("static-properties"),
            r#"{"algorithm": "bfws", "domain": "blocks", "coverage": "stale"}"#,
        )
        .expect("static");
        fs::write(root.join("driver.log"), "node: n1\nrun-planner exit code: 3\n").expect("driver");

        let config = ParserConfig::default();
        let record = parse_trial(&root, &Pipeline::default(), &config).expect("parse");
        let out = write_properties(&root, &record, &config).expect("write");

        let written: Value = serde_json::from_str(&fs::read_to_string(out).expect("read")).expect("json");
        assert_eq!(written["algorithm"], "bfws");
        assert_eq!(written["domain"], "blocks");
        assert_eq!(written[attr::COVERAGE], 0);
        assert_eq!(written[attr::ERROR], "unsolvable-or-error");
        assert_eq!(written[attr::PLANNER_EXIT_CODE], 3);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn write_properties_rejects_non_object_static_properties() {
        let root = temp_root("props_bad");
        fs::write(root.join("static-properties"), "[1, 2]").expect("static");
        fs::write(root.join("driver.log"), "node: n1\n").expect("driver");
        let config = ParserConfig::default();
        let record = parse_trial(&root, &Pipeline::default(), &config).expect("parse");
        let err = write_properties(&root, &record, &config).expect_err("must fail");
        assert!(
            matches!(&err, ParseError::WriteProperties { path, .. } if path.ends_with("static-properties")),
            "unexpected error: {:?}",
            err
        );
        assert_eq!(err.kind(), "write");
        assert!(err.to_string().contains("JSON object"), "unexpected error: {}", err);
        assert!(!root.join("properties").exists());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn summary_counts_kinds_and_failures() {
        let pipeline = Pipeline::default();
        let ok = pipeline
            .run(&TrialArtifacts {
                driver_log: Some("node: a\n".to_string()),
                report: Some(r#"{"solved": 1, "valid": true}"#.to_string()),
                ..TrialArtifacts::default()
            })
            .expect("parse");
        let results = vec![
            TrialResult {
                run_dir: PathBuf::from("runs/00001"),
                result: Ok(ok),
            },
            TrialResult {
                run_dir: PathBuf::from("runs/00002"),
                result: Err(ParseError::MissingMandatory {
                    rule: "node",
                    artifact: "driver_log",
                }),
            },
        ];
        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.trials, 2);
        assert_eq!(summary.parsed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.coverage, 1);
        assert_eq!(summary.errors["all-good"], 1);
        assert_eq!(summary.errors["out-of-memory"], 0);
        assert_eq!(summary.failures[0].kind, "artifact");
        assert_eq!(summary.failures[0].run_dir, "runs/00002");
        assert!(!summary.is_clean());
    }

    #[test]
    fn write_failures_are_counted_separately() {
        let mut summary = BatchSummary::default();
        assert!(summary.is_clean());
        let err = ParseError::write("runs/00003/properties", "permission denied");
        summary.add_writes(2, vec![TrialFailure::new(Path::new("runs/00003"), &err)]);
        assert_eq!(summary.written, 2);
        assert_eq!(summary.write_failed, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.failures[0].kind, "write");
        assert!(!summary.is_clean());
    }
}
