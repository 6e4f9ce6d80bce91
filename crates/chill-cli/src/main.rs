//! Chill CLI - Headless player simulator and stream probe
//!
//! Features:
//! - Failure scenarios replayed against the real playback session
//! - Manifest probing (source kind, quality levels)
//! - Effective configuration dump
//! - Keyboard shortcut reference

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

use commands::Scenario;

/// Chill CLI - Playback session toolkit
#[derive(Parser)]
#[command(name = "chill-cli")]
#[command(version)]
#[command(about = "Simulate playback sessions and probe HLS streams", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Player configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a playback scenario on the simulated host
    Simulate {
        /// Scenario to run
        #[arg(value_enum, default_value = "happy")]
        scenario: Scenario,

        /// Source URL handed to the session
        #[arg(short, long, default_value = "https://cdn.example.com/phim/tap-01/index.m3u8")]
        url: String,

        /// Virtual seconds to run
        #[arg(short, long, default_value = "45")]
        seconds: u64,
    },

    /// Fetch a manifest and list its quality levels
    Probe {
        /// URL or path to manifest
        manifest: String,
    },

    /// Print the effective player configuration
    Config,

    /// List keyboard shortcuts
    Keys,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    chill_core::init();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate { scenario, url, seconds } => {
            let report = commands::simulate(scenario, &url, seconds, config);
            commands::print_report(&report, &cli.format);
        }
        Commands::Probe { manifest } => {
            commands::probe(&manifest, &cli.format).await?;
        }
        Commands::Config => {
            println!("{}", config.to_json());
        }
        Commands::Keys => {
            commands::keys(&cli.format);
        }
    }

    Ok(())
}
