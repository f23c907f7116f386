use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

/// stacklua - declarative deployment stacks, defined in Lua
#[derive(Parser)]
#[command(name = "stack")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Evaluate a config, synthesize the template and record a snapshot
  Synth {
    /// Path to the configuration file
    #[arg(default_value = "stack.lua")]
    config: PathBuf,

    /// Path to the secret store (default: secrets.yaml beside the config)
    #[arg(short, long)]
    secrets: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
  },

  /// Show what would change compared to the last recorded synth
  Plan {
    /// Path to the configuration file
    #[arg(default_value = "stack.lua")]
    config: PathBuf,

    /// Path to the secret store (default: secrets.yaml beside the config)
    #[arg(short, long)]
    secrets: Option<PathBuf>,

    /// Print the diff as JSON
    #[arg(long)]
    json: bool,
  },

  /// Compare two recorded snapshots (default: previous against current)
  Diff {
    /// First snapshot id
    snapshot_a: Option<String>,

    /// Second snapshot id
    snapshot_b: Option<String>,

    /// Path to the configuration file (locates the state directory)
    #[arg(short, long, default_value = "stack.lua")]
    config: PathBuf,

    /// Print the diff as JSON
    #[arg(long)]
    json: bool,
  },

  /// Summarize the units a config defines
  Info {
    /// Path to the configuration file
    #[arg(default_value = "stack.lua")]
    config: PathBuf,

    /// Path to the secret store (default: secrets.yaml beside the config)
    #[arg(short, long)]
    secrets: Option<PathBuf>,

    /// Print the manifest as JSON
    #[arg(long)]
    json: bool,
  },

  /// Scaffold a new stack project
  Init {
    /// Target directory
    #[arg(default_value = ".")]
    dir: PathBuf,
  },
}

fn main() {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
  } else {
    EnvFilter::from_default_env()
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Synth {
      config,
      secrets,
      json,
    } => cmd::cmd_synth(&config, secrets, json),
    Commands::Plan {
      config,
      secrets,
      json,
    } => cmd::cmd_plan(&config, secrets, json),
    Commands::Diff {
      snapshot_a,
      snapshot_b,
      config,
      json,
    } => cmd::cmd_diff(&config, snapshot_a, snapshot_b, json),
    Commands::Info {
      config,
      secrets,
      json,
    } => cmd::cmd_info(&config, secrets, json),
    Commands::Init { dir } => cmd::cmd_init(&dir),
  };

  if let Err(e) = result {
    output::print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
}
