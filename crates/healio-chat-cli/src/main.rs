//! Command-line front end for the Healio chat companion.

mod chat;
mod output;
mod replay;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "healio-chat", version, about = "Stream replies from the Healio chat companion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Feed a captured SSE response body through the reader.
    Replay {
        /// File holding the raw response body.
        file: PathBuf,
        /// Bytes per simulated network read.
        #[arg(long, default_value_t = 64)]
        chunk_size: usize,
        /// Print every cumulative snapshot instead of only the new text.
        #[arg(long)]
        snapshots: bool,
    },
    /// Chat interactively; each stdin line is one turn.
    Chat {
        /// Fail a turn when no reply data arrives for this many seconds.
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
}

/// Loads `.env` from the crate directory and then the working directory.
fn load_env() {
    let _ = dotenvy::from_path(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".env"));
    dotenvy::dotenv().ok();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    healio_chat::observability::init_observability();

    let cli = Cli::parse();
    match cli.command {
        Command::Replay {
            file,
            chunk_size,
            snapshots,
        } => replay::run(&file, chunk_size, snapshots).await,
        Command::Chat { timeout_secs } => chat::run(timeout_secs).await,
    }
}
