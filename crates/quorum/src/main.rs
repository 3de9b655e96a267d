use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quorum::CycleInput;
use quorum_models::{Decision, QuorumConfig};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quorum", about = "Consensus and signal-reconciliation engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide one cycle from pre-collected signals (CycleInput JSON)
    Reconcile {
        /// Path to configuration file
        #[arg(short, long, default_value = "config/quorum.toml")]
        config: String,

        /// Read CycleInput JSON from a file instead of stdin
        #[arg(short, long)]
        input: Option<String>,

        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Run the configured agents for a symbol and decide
    Run {
        /// Symbol to analyze
        #[arg(short, long)]
        symbol: String,

        /// Path to configuration file
        #[arg(short, long, default_value = "config/quorum.toml")]
        config: String,

        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },
}

fn load_config(path: &str) -> Result<QuorumConfig> {
    if !Path::new(path).exists() {
        warn!(path, "Config file not found; using defaults");
        return Ok(QuorumConfig::default());
    }
    let config_str =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config: {path}"))?;
    toml::from_str(&config_str).with_context(|| format!("Failed to parse config: {path}"))
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read input: {path}"))
        }
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn print_decision(decision: &Decision, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(decision)?
    } else {
        serde_json::to_string(decision)?
    };
    println!("{output}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Respects RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Reconcile {
            config,
            input,
            pretty,
        } => {
            let config = load_config(&config)?;
            let raw = read_input(input.as_deref())?;
            let input: CycleInput =
                serde_json::from_str(&raw).context("Failed to parse CycleInput JSON")?;
            let decision =
                quorum::reconcile_cycle_input(input, &config).context("Reconciliation failed")?;
            print_decision(&decision, pretty)
        }
        Command::Run {
            symbol,
            config,
            pretty,
        } => {
            let config = load_config(&config)?;
            let orchestrator =
                quorum::build_orchestrator(&config).context("Failed to build orchestrator")?;
            let decision = orchestrator
                .evaluate(&symbol)
                .await
                .with_context(|| format!("Cycle failed for {symbol}"))?;
            print_decision(&decision, pretty)
        }
    }
}
