use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use quarry_lib::consts::STATE_DIR_ENV;

mod cmd;
mod output;

/// quarry - build-script orchestration engine
#[derive(Parser)]
#[command(name = "quarry")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// State directory for fingerprints and unit working directories
  /// (default: $QUARRY_STATE_DIR, else ./.quarry)
  #[arg(long, global = true)]
  state_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile and run every unit helper in a manifest
  Run {
    /// Path to the JSON unit manifest
    manifest: PathBuf,

    /// Maximum number of units executing concurrently
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Wall-clock budget per helper execution, in seconds
    #[arg(long)]
    timeout: Option<u64>,
  },

  /// Evaluate every unit's change-detection gate without executing
  Status {
    /// Path to the JSON unit manifest
    manifest: PathBuf,
  },

  /// Delete all persisted fingerprints and unit working directories
  Clean,
}

fn resolve_state_dir(flag: Option<PathBuf>) -> PathBuf {
  flag
    .or_else(|| std::env::var_os(STATE_DIR_ENV).map(PathBuf::from))
    .unwrap_or_else(|| PathBuf::from(".quarry"))
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quarry=debug,quarry_lib=debug"))
  } else {
    EnvFilter::from_default_env()
  };
  tracing_subscriber::fmt().with_env_filter(filter).without_time().init();

  let state_dir = resolve_state_dir(cli.state_dir);

  match cli.command {
    Commands::Run {
      manifest,
      jobs,
      timeout,
    } => cmd::cmd_run(&manifest, &state_dir, jobs, timeout).await,
    Commands::Status { manifest } => cmd::cmd_status(&manifest, &state_dir),
    Commands::Clean => cmd::cmd_clean(&state_dir),
  }
}
