//! openlake CLI: materialize assets and inspect the lake.

mod commands;

use clap::Parser;
use openlake_core::Tier;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// openlake: single-file Parquet lake for public datasets
#[derive(Parser, Debug)]
#[command(name = "openlake", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
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
    /// Materialize assets
    Materialize {
        /// Run a named job
        #[arg(short, long, conflicts_with_all = ["select", "group"])]
        job: Option<String>,

        /// Asset names to materialize (repeatable)
        #[arg(short, long)]
        select: Vec<String>,

        /// Materialize every asset of a group
        #[arg(short, long, conflicts_with = "select")]
        group: Option<String>,

        /// Include everything the selection depends on
        #[arg(long)]
        with_upstream: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List registered assets in execution order
    Assets,
    /// List jobs
    Jobs,
    /// Print the first rows of a stored asset
    Read {
        /// Asset name
        asset: String,

        /// Storage tier: raw or clean
        #[arg(short, long, default_value = "clean")]
        tier: Tier,

        /// Number of rows to print
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
    /// Print the file path of every asset
    Paths,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate evidence sources from dbt models
    Evidence,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default openlake.toml in the workspace
    Init,
    /// Show the current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Resolve workspace
    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let config = openlake_core::load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    config.validate()?;

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = config.paths.resolve(&workspace).log_dir;
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "openlake.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    tracing::debug!(workspace = %workspace.display(), "Configuration loaded");

    commands::handle_command(cli.command, &workspace, &config).await
}
