use clap::Parser;
use fabsim_rs::{run, SimConfig};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "ai-factory-sim",
    about = "Run an AI-factory fabric simulation from a JSON config"
)]
struct Args {
    /// Path to the JSON configuration file
    config: PathBuf,

    /// Also write the metrics JSON to this file
    #[arg(long)]
    metrics_json: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let raw = match fs::read_to_string(&args.config) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("failed to read {}: {err}", args.config.display());
            return ExitCode::FAILURE;
        }
    };
    let config: SimConfig = match serde_json::from_str(&raw) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to parse {}: {err}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    let default_level = if config.run.file_debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let metrics = match run(&config) {
        Ok(metrics) => metrics,
        Err(err) => {
            eprintln!("simulation failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    let json = serde_json::to_string_pretty(&metrics).expect("serialize metrics");
    println!("{json}");
    if let Some(path) = args.metrics_json {
        if let Err(err) = fs::write(&path, &json) {
            eprintln!("failed to write {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
        eprintln!("wrote metrics to {}", path.display());
    }
    ExitCode::SUCCESS
}
