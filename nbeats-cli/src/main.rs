//! nbeats-ensemble: inspect and post-process NBEATS ensemble sweeps on M4.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// NBEATS ensemble sweeps for the M4 benchmark
#[derive(Parser, Debug)]
#[command(name = "nbeats-ensemble", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds `.nbeats/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print the hyperparameter grid of the configured frequency
    Grid {
        /// Override the configured frequency (Yearly, Quarterly, Monthly)
        #[arg(short, long)]
        frequency: Option<String>,
        /// Width of the table rules
        #[arg(long, default_value = "80")]
        width: usize,
    },
    /// Load the configured data and report loader sizes for every data shape
    Loaders {
        /// Override the configured frequency (Yearly, Quarterly, Monthly)
        #[arg(short, long)]
        frequency: Option<String>,
    },
    /// Median-aggregate member forecast CSVs into one ensemble forecast
    Aggregate {
        /// Member forecast files (`unique_id,model,0,1,...`)
        #[arg(required = true)]
        frames: Vec<PathBuf>,
        /// Where to write the ensemble forecast
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "nbeats", "nbeats")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "nbeats-ensemble.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await
}
