//! `ai-gateway` daemon.
//!
//! Loads the TOML configuration, installs logging and the Prometheus exporter,
//! builds the gateway and keeps its endpoint set in step with the config file
//! until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "ai-gateway", version, about = "AI gateway resilience and dispatch core")]
struct Cli {
    /// Path to the TOML configuration file (defaults are used when omitted)
    #[arg(short, long, env = "AI_GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match ai_gateway::lifecycle::run(cli.config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ai-gateway: {e}");
            ExitCode::FAILURE
        }
    }
}
