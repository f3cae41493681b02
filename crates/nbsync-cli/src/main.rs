//! nbsync command-line tools.
//!
//! Usage:
//!   # Apply a recording of inbound messages and print the reconciled model
//!   nbsync replay --ops session.jsonl
//!
//!   # Show the effective client configuration
//!   nbsync config --config ~/.config/nbsync/client.ron
//!
//! Logs go to stderr; set `RUST_LOG=nbsync_reconcile=debug` to see no-op and
//! skipped operations.

mod replay;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nbsync_client::ClientConfig;
use nbsync_client::constants::CONFIG_PATH_ENV;
use tracing_subscriber::{EnvFilter, fmt};

use crate::replay::{Replay, parse_messages};

#[derive(Parser, Debug)]
#[command(name = "nbsync")]
#[command(about = "Notebook sync layer tools")]
struct Args {
    /// Client config file (RON). Falls back to $NBSYNC_CONFIG, then defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay recorded inbound messages against an in-memory store
    Replay {
        /// JSON array or JSON-lines file of inbound messages
        #[arg(long)]
        ops: PathBuf,

        /// Print compact JSON instead of pretty
        #[arg(long)]
        compact: bool,
    },
    /// Print the effective client configuration as RON
    Config,
}

fn load_config(flag: Option<&Path>) -> Result<ClientConfig> {
    let path = flag
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
    match path {
        Some(path) => ClientConfig::load(&path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(ClientConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Replay { ops, compact } => {
            let text = std::fs::read_to_string(&ops)
                .with_context(|| format!("reading {}", ops.display()))?;
            let messages = parse_messages(&text)?;
            tracing::info!("replaying {} message(s) from {}", messages.len(), ops.display());

            let replay = Replay::run(config, messages).await?;
            let out = replay.to_json()?;
            let rendered = if compact {
                serde_json::to_string(&out)?
            } else {
                serde_json::to_string_pretty(&out)?
            };
            println!("{rendered}");
        }
        Command::Config => {
            println!("{}", config.to_ron()?);
        }
    }
    Ok(())
}
