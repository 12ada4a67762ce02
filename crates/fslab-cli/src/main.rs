use anyhow::Result;
use clap::{Parser, Subcommand};
use fslab_parser::{
    discover_runs, parse_batch, parse_trial, rules, write_batch_properties, BatchSummary,
    ParserConfig, Pipeline, TrialRecord,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fslab", version = "0.3.0", about = "FS planner experiment parser")]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every run of an experiment and write its properties file
    Parse {
        experiment: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        jobs: Option<usize>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },
    /// Classify a single run directory and print its attributes
    Classify {
        run_dir: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Print the extraction rule table
    Rules {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(CommandOutput { payload, success }) => {
            if let Some(payload) = payload {
                emit_json(&payload);
            }
            if !success {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

struct CommandOutput {
    payload: Option<Value>,
    success: bool,
}

impl CommandOutput {
    fn done() -> Self {
        Self {
            payload: None,
            success: true,
        }
    }
}

fn load_config(path: Option<&Path>, jobs: Option<usize>) -> Result<ParserConfig> {
    let mut config = ParserConfig::load(path)?;
    if let Some(jobs) = jobs {
        config.jobs = jobs;
    }
    Ok(config)
}

fn run_command(command: Commands) -> Result<CommandOutput> {
    match command {
        Commands::Parse {
            experiment,
            config,
            jobs,
            dry_run,
            json,
        } => {
            let config = load_config(config.as_deref(), jobs)?;
            let runs = discover_runs(&experiment, &config)?;
            if runs.is_empty() {
                warn!(experiment = %experiment.display(), "no run directories found");
            }
            let results = parse_batch(&runs, &config)?;

            let mut summary = BatchSummary::from_results(&results);
            if !dry_run {
                let (written, failures) = write_batch_properties(&results, &config);
                summary.add_writes(written, failures);
            }
            info!(
                parsed = summary.parsed,
                failed = summary.failed,
                written = summary.written,
                write_failed = summary.write_failed,
                "experiment parsed"
            );
            let success = summary.is_clean();

            if json {
                return Ok(CommandOutput {
                    payload: Some(json!({
                        "ok": success,
                        "command": "parse",
                        "experiment": experiment.display().to_string(),
                        "dry_run": dry_run,
                        "summary": summary_to_json(&summary),
                    })),
                    success,
                });
            }
            print_summary(&summary);
            for failure in &summary.failures {
                eprintln!("failed ({}): {}: {}", failure.kind, failure.run_dir, failure.message);
            }
            Ok(CommandOutput {
                payload: None,
                success,
            })
        }
        Commands::Classify {
            run_dir,
            config,
            json,
        } => {
            let config = load_config(config.as_deref(), None)?;
            let pipeline = Pipeline::from_config(&config);
            let record = parse_trial(&run_dir, &pipeline, &config)?;
            if json {
                return Ok(CommandOutput {
                    payload: Some(json!({
                        "ok": true,
                        "command": "classify",
                        "run_dir": run_dir.display().to_string(),
                        "record": record_to_json(&record),
                    })),
                    success: true,
                });
            }
            for (key, value) in record.attributes().iter() {
                println!("{}: {}", key, serde_json::to_string(value)?);
            }
            Ok(CommandOutput::done())
        }
        Commands::Rules { json } => {
            if json {
                let table: Vec<Value> = rules()
                    .iter()
                    .map(|r| {
                        json!({
                            "rule": r.name(),
                            "artifact": r.spec.artifact,
                            "attributes": r.attributes().collect::<Vec<_>>(),
                            "aggregation": r.spec.aggregation,
                            "mandatory": r.spec.mandatory,
                            "pattern": r.spec.pattern,
                        })
                    })
                    .collect();
                let stages: Vec<Value> = Pipeline::default()
                    .stages()
                    .iter()
                    .map(|s| json!({ "artifact": s.artifact(), "writes": s.writes() }))
                    .collect();
                return Ok(CommandOutput {
                    payload: Some(json!({
                        "ok": true,
                        "command": "rules",
                        "rules": table,
                        "stages": stages,
                    })),
                    success: true,
                });
            }
            for r in rules() {
                println!(
                    "{:<22} {:<11} {:<5} {:<9} {}",
                    r.name(),
                    r.spec.artifact.as_str(),
                    format!("{:?}", r.spec.aggregation).to_lowercase(),
                    if r.spec.mandatory { "mandatory" } else { "optional" },
                    r.attributes().collect::<Vec<_>>().join(",")
                );
            }
            Ok(CommandOutput::done())
        }
    }
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Parse { json, .. }
        | Commands::Classify { json, .. }
        | Commands::Rules { json } => *json,
    }
}

fn record_to_json(record: &TrialRecord) -> Value {
    json!({
        "error": record.error_kind().as_str(),
        "coverage": record.coverage(),
        "node": record.node(),
        "attributes": record.attributes().to_json(),
    })
}

fn summary_to_json(summary: &BatchSummary) -> Value {
    serde_json::to_value(summary).unwrap_or_else(|_| json!({}))
}

fn print_summary(summary: &BatchSummary) {
    println!("trials: {}", summary.trials);
    println!("parsed: {}", summary.parsed);
    println!("failed: {}", summary.failed);
    println!("coverage: {}", summary.coverage);
    println!("properties_written: {}", summary.written);
    println!("write_failed: {}", summary.write_failed);
    for (kind, count) in &summary.errors {
        println!("error.{}: {}", kind, count);
    }
}
