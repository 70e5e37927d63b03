//! ClawMedic Daemon - diagnoses OpenClaw installations and serves fix scripts

use anyhow::Result;
use clap::{Parser, Subcommand};
use clawmedicd::{commands, config::Config, init_logging, server};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "clawmedicd")]
#[command(about = "ClawMedic - OpenClaw installation doctor", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: /etc/clawmedic/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API (default)
    Serve,

    /// Diagnose a payload file offline and print the fix script
    Diagnose {
        /// Diagnostic payload JSON produced by the collection script
        file: PathBuf,

        /// Print the full analysis result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the known issue catalog
    Catalog,

    /// Show detection and fix counters from the ledger
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            info!("ClawMedic v{} starting", env!("CARGO_PKG_VERSION"));
            server::run(config).await
        }
        Commands::Diagnose { file, json } => commands::diagnose(config, &file, json).await,
        Commands::Catalog => commands::catalog(),
        Commands::Stats => commands::stats(&config),
    }
}
