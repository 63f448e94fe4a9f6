use anyhow::{Context, Result};
use clap::Parser;
use race_core::{ConnectionDescriptor, HarnessError, Scheme};
use race_runner::{
    load_config, render_summary, render_trial_line, write_report, Harness, Report, RunConfig,
    TrialRecord,
};
use race_store::{MemoryMode, MemoryStore, MongoFactory};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: race [OPTIONS] <connection-string>";

#[derive(Parser)]
#[command(
    name = "race",
    version,
    about = "Races two concurrent upserts against one document and reports lost updates"
)]
struct Cli {
    /// mongodb://, mongodb+srv:// or memory://[atomic|lossy]
    connection: Option<String>,
    #[arg(long)]
    trials: Option<usize>,
    /// Per-operation timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    database: Option<String>,
    #[arg(long)]
    collection: Option<String>,
    /// race_config_v1 JSON file; flags take precedence over its values.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    json: bool,
    #[arg(long)]
    quiet: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };
    let Some(connection) = cli.connection.clone() else {
        eprintln!("\u{274c} {}", USAGE);
        std::process::exit(1);
    };
    init_tracing();

    let json_mode = cli.json;
    match run_command(cli, &connection) {
        Ok(Some(payload)) => emit_json(&payload),
        Ok(None) => {}
        Err(err) => {
            let (code, exit) = classify_error(&err);
            if json_mode {
                emit_json(&json_error(code, format!("{:#}", err), json!({})));
            } else {
                eprintln!("\u{274c} {:#}", err);
            }
            std::process::exit(exit);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RACE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_command(cli: Cli, connection: &str) -> Result<Option<Value>> {
    let descriptor = ConnectionDescriptor::parse(connection)?;
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RunConfig::default(),
    };
    apply_flags(&mut config, &cli);
    tracing::debug!(?config, backend = %descriptor, "resolved run configuration");
    let harness = Harness::new(config)?;

    if !cli.json {
        println!("\u{1f9ea} Race Condition Test");
        println!("Testing with: {}", descriptor);
    }
    let stream = !cli.json && !cli.quiet;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let report = runtime.block_on(execute(&harness, &descriptor, stream))?;

    if let Some(out) = &cli.out {
        write_report(out, &report)
            .with_context(|| format!("failed to write report {}", out.display()))?;
    }
    if cli.json {
        return Ok(Some(json!({
            "ok": true,
            "command": "run",
            "report": report.to_json(),
            "report_path": cli.out.as_ref().map(|p| p.display().to_string()),
        })));
    }
    println!();
    for line in render_summary(&report) {
        println!("{}", line);
    }
    if let Some(out) = &cli.out {
        println!("report: {}", out.display());
    }
    Ok(None)
}

fn apply_flags(config: &mut RunConfig, cli: &Cli) {
    if let Some(trials) = cli.trials {
        config.trials = trials;
    }
    if let Some(ms) = cli.timeout_ms {
        config.op_timeout = Duration::from_millis(ms);
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if let Some(db) = &cli.database {
        config.database = db.clone();
    }
    if let Some(coll) = &cli.collection {
        config.collection = coll.clone();
    }
}

async fn execute(
    harness: &Harness,
    descriptor: &ConnectionDescriptor,
    stream: bool,
) -> Result<Report, HarnessError> {
    let backend = descriptor.redacted();
    let config = harness.config();
    let print = |trial: &TrialRecord| {
        if stream {
            println!("{}", render_trial_line(trial, &config.fields));
        }
    };
    match descriptor.scheme() {
        Scheme::Memory => {
            let mode = MemoryMode::from_host(descriptor.host()).ok_or_else(|| {
                HarnessError::InvalidDescriptor(format!(
                    "unknown memory mode: {}",
                    descriptor.host()
                ))
            })?;
            let store = MemoryStore::new(mode);
            harness.run_with(&store, &backend, print).await
        }
        Scheme::Mongodb | Scheme::MongodbSrv => {
            let factory = MongoFactory::new(descriptor.clone())
                .database(&config.database)
                .collection(&config.collection);
            harness.run_with(&factory, &backend, print).await
        }
    }
}

fn classify_error(err: &anyhow::Error) -> (&'static str, i32) {
    match err.downcast_ref::<HarnessError>() {
        Some(HarnessError::Connection { .. }) => ("connection_failed", 2),
        Some(HarnessError::InvalidDescriptor(_)) => ("invalid_descriptor", 1),
        Some(HarnessError::InvalidConfig(_)) => ("invalid_config", 1),
        None => ("command_failed", 1),
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
