mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use output::OutputFormat;

/// playbuild - compile playground programs and sync them to clients
#[derive(Parser)]
#[command(name = "playbuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Library sources directory (overrides PLAYBUILD_ROOT)
  #[arg(long, global = true)]
  root: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Serve one interactive session over stdin/stdout (JSON lines)
  Session {
    /// Mount a local package tree instead of fetching imports
    #[arg(long)]
    local: Option<PathBuf>,

    /// Package mirror base URL (overrides PLAYBUILD_MIRROR)
    #[arg(long)]
    mirror: Option<String>,

    /// How long to wait for the client's first message (e.g. "5s")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
  },

  /// Precompile library packages and upload them to storage
  Publish {
    /// Packages to publish (default: every package under the root)
    packages: Vec<String>,

    /// Write artifacts into this directory
    #[arg(long, conflicts_with = "bucket_url", required_unless_present = "bucket_url")]
    out: Option<PathBuf>,

    /// Upload artifacts to this bucket base URL
    #[arg(long)]
    bucket_url: Option<String>,

    /// Where to write the lookup table
    #[arg(long, default_value = "table.json")]
    table: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Build packages from the root and print their hashes
  Build {
    /// Packages to build
    #[arg(required = true)]
    packages: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Show the resolved configuration
  Info,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let mut config = playbuild_lib::config::Config::from_env()?;
  if let Some(root) = cli.root {
    config.root = root;
  }

  match cli.command {
    Commands::Session { local, mirror, timeout } => {
      if local.is_some() {
        config.local_path = local;
      }
      if mirror.is_some() {
        config.mirror = mirror;
      }
      if let Some(timeout) = timeout {
        config.instruction_timeout = timeout;
      }
      cmd::cmd_session(&config)
    }
    Commands::Publish {
      packages,
      out,
      bucket_url,
      table,
      output,
    } => {
      let target = match (out, bucket_url) {
        (Some(dir), _) => cmd::PublishTarget::Dir(dir),
        (None, Some(url)) => cmd::PublishTarget::Bucket(url),
        (None, None) => anyhow::bail!("either --out or --bucket-url is required"),
      };
      cmd::cmd_publish(&config, &packages, target, &table, output)
    }
    Commands::Build { packages, output } => cmd::cmd_build(&config, &packages, cli.verbose, output),
    Commands::Info => {
      cmd::cmd_info(&config);
      Ok(())
    }
  }
}
