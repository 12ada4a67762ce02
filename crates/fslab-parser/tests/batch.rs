use chrono::Utc;
use fslab_parser::{
    attr, discover_runs, parse_batch, write_batch_properties, write_properties, BatchSummary, ErrorKind,
    ParserConfig,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

fn temp_experiment(tag: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!(
        "fslab_it_{}_{}_{}",
        tag,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));
    fs::create_dir_all(&root).expect("experiment dir");
    root
}

fn write_run(root: &Path, id: &str, driver: &str, solver: Option<&str>, report: Option<&str>) -> PathBuf {
    let dir = root.join("runs-00001-00100").join(id);
    fs::create_dir_all(&dir).expect("run dir");
    fs::write(dir.join("driver.log"), driver).expect("driver.log");
    if let Some(solver) = solver {
        fs::write(dir.join("run.log"), solver).expect("run.log");
    }
    if let Some(report) = report {
        fs::write(dir.join("results.json"), report).expect("results.json");
    }
    dir
}

const SOLVER_LOG: &str = "\
[INFO][  0.0100] Starting
Reachability analysis: 0.10s, 1000kB
Preprocessing frontend: 0.50s, 20000kB
SDD compiled: size=10, theory vars=1, theory constraints=1
Node generation rate after 1K generations (nodes/sec.): 1000.0. Memory consumption: 30000kB.
SDD compiled: size=20, theory vars=2, theory constraints=0
Node generation rate after 2K generations (nodes/sec.): 1500.0. Memory consumption: 31000kB.
[INFO][  2.5000] Search finished
";

#[test]
fn batch_classifies_every_trial_and_isolates_fatal_ones() {
    let root = temp_experiment("batch");
    let solved = write_run(
        &root,
        "00001",
        "node: n1\nrun-planner exit code: 0\n",
        Some(SOLVER_LOG),
        Some(
            r#"{"solved": 1, "valid": true, "out_of_memory": false, "memory": 32000,
                "search_time": 0, "time_backend": 1.5, "plan_length": 1,
                "expanded": 5, "generated": 9, "evaluated": 7,
                "plan": ["(stack a b)"], "gen_per_second": 1800.0}"#,
        ),
    );
    let oom = write_run(
        &root,
        "00002",
        "node: n2\nrun-planner exit code: 0\n",
        Some(SOLVER_LOG),
        Some(r#"{"out_of_memory": true}"#),
    );
    let crashed = write_run(&root, "00003", "node: n3\nrun-planner exit code: 1\n", None, None);
    let truncated = write_run(&root, "00004", "", None, None);

    let config = ParserConfig {
        jobs: 2,
        ..ParserConfig::default()
    };
    let runs = discover_runs(&root, &config).expect("discover");
    assert_eq!(runs, vec![solved.clone(), oom.clone(), crashed.clone(), truncated.clone()]);

    let results = parse_batch(&runs, &config).expect("batch");
    assert_eq!(results.len(), 4);

    let solved_record = results[0].result.as_ref().expect("solved trial parses");
    let attrs = solved_record.attributes();
    assert_eq!(solved_record.error_kind(), ErrorKind::AllGood);
    assert_eq!(attrs.get_i64(attr::COVERAGE), Some(1));
    assert_eq!(attrs.get_f64(attr::SEARCH_TIME), Some(0.01));
    assert_eq!(attrs.get_f64(attr::TOTAL_TIME), Some(2.0));
    assert_eq!(attrs.get_f64(attr::NODE_GENERATION_RATE), Some(1800.0));
    assert_eq!(attrs.get_i64(attr::MEMORY), Some(32000));
    assert_eq!(attrs.get_i64(attr::SDD_SIZES), Some(30));
    assert_eq!(attrs.get_i64(attr::LAST_RECORDED_GENERATIONS), Some(2000));
    assert_eq!(attrs.get_f64(attr::LAST_RECORDED_TIME), Some(2.5));
    assert_eq!(attrs.get_str(attr::PLAN), Some("(stack a b)"));

    let oom_record = results[1].result.as_ref().expect("oom trial parses");
    assert_eq!(oom_record.error_kind(), ErrorKind::OutOfMemory);
    assert_eq!(oom_record.attributes().get_f64(attr::NODE_GENERATION_RATE), Some(1500.0));
    for key in attr::SOLVED_ONLY {
        assert!(!oom_record.attributes().contains(key), "{} leaked into oom record", key);
    }

    let crashed_record = results[2].result.as_ref().expect("crashed trial parses");
    assert_eq!(crashed_record.error_kind(), ErrorKind::UnsolvableOrError);

    assert!(results[3].result.is_err(), "empty driver log must be fatal");

    let summary = BatchSummary::from_results(&results);
    assert_eq!(summary.parsed, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.coverage, 1);
    assert_eq!(summary.errors["out-of-memory"], 1);
    assert_eq!(summary.failures[0].run_dir, truncated.display().to_string());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn properties_file_is_written_next_to_artifacts() {
    let root = temp_experiment("write");
    let run = write_run(
        &root,
        "00001",
        "node: n1\n",
        None,
        Some(r#"{"solved": 0, "valid": true, "out_of_memory": false, "search_time": 4.0}"#),
    );
    fs::write(run.join("static-properties"), r#"{"id": ["bfws", "blocks", "p01.pddl"]}"#)
        .expect("static properties");

    let config = ParserConfig::default();
    let runs = discover_runs(&root, &config).expect("discover");
    let results = parse_batch(&runs, &config).expect("batch");
    let record = results[0].result.as_ref().expect("parses");
    let path = write_properties(&run, record, &config).expect("write");
    assert_eq!(path, run.join("properties"));

    let written: Value = serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
    assert_eq!(written["id"][0], "bfws");
    assert_eq!(written["unsolvable"], true);
    assert_eq!(written["coverage"], 0);
    assert_eq!(written["search_time"], 4.0);
    assert!(written.get("plan").is_none());

    let leftovers: Vec<_> = fs::read_dir(&run)
        .expect("list run dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
        .collect();
    assert!(leftovers.is_empty(), "temporary files left behind");

    let _ = fs::remove_dir_all(root);
}

#[test]
fn unwritable_properties_do_not_stop_the_batch() {
    let root = temp_experiment("write_isolation");
    let report = r#"{"solved": 0, "valid": true, "out_of_memory": false}"#;
    let broken = write_run(&root, "00001", "node: n1\n", None, Some(report));
    let healthy = write_run(&root, "00002", "node: n2\n", None, Some(report));
    fs::write(broken.join("static-properties"), "[1]").expect("static properties");

    let config = ParserConfig::default();
    let runs = discover_runs(&root, &config).expect("discover");
    let results = parse_batch(&runs, &config).expect("batch");
    let (written, failures) = write_batch_properties(&results, &config);

    assert_eq!(written, 1);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, "write");
    assert_eq!(failures[0].run_dir, broken.display().to_string());
    assert!(!broken.join("properties").exists());
    assert!(healthy.join("properties").exists(), "later run must still be written");

    let mut summary = BatchSummary::from_results(&results);
    assert!(summary.is_clean());
    summary.add_writes(written, failures);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.write_failed, 1);
    assert!(!summary.is_clean());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn discover_rejects_missing_directory() {
    let missing = std::env::temp_dir().join("fslab_it_does_not_exist_7f3a");
    assert!(discover_runs(&missing, &ParserConfig::default()).is_err());
}
