//! # ttt-sim
//!
//! Drives tictactoe-sync sessions over the in-memory backend.
//!
//! ## Commands
//!
//! - `simulate`: play a scripted match between two in-process sessions
//! - `race`: two guests claim the same seat from one read
//!
//! ## Example
//!
//! ```bash
//! # Host wins along the top row
//! ttt-sim simulate --moves 0,3,1,4,2
//!
//! # Same match, broadcasts lost, third write fails once
//! ttt-sim simulate --moves 0,3,1,4,2 --drop-broadcasts --fail-write 3
//!
//! # Guest forfeits after two moves on a 5x5 board
//! ttt-sim simulate --size 5 --moves 0,6,12 --leave-after 2
//!
//! # Join race
//! ttt-sim race
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tictactoe_sync_types::BoardSize;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{race, simulate};

/// Drives tictactoe-sync sessions over the in-memory backend.
#[derive(Parser, Debug)]
#[command(name = "ttt-sim")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Client configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a scripted match between host and guest
    Simulate {
        /// Board side length (3 or 5)
        #[arg(long, default_value_t = 3)]
        size: u8,

        /// Cells to play, in order; the player holding the turn plays each
        #[arg(long, value_delimiter = ',', default_value = "0,3,1,4,2")]
        moves: Vec<usize>,

        /// Accept broadcasts but never deliver them
        #[arg(long)]
        drop_broadcasts: bool,

        /// Disable the broadcast path entirely
        #[arg(long, conflicts_with = "drop_broadcasts")]
        no_broadcast: bool,

        /// Fail the durable write of the Nth scripted move (1-based)
        #[arg(long)]
        fail_write: Option<usize>,

        /// Waiting player leaves after N scripted moves
        #[arg(long)]
        leave_after: Option<usize>,
    },

    /// Two guests race for the same seat
    Race {
        /// Board side length (3 or 5)
        #[arg(long, default_value_t = 3)]
        size: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate {
            size,
            moves,
            drop_broadcasts,
            no_broadcast,
            fail_write,
            leave_after,
        } => {
            let config = if no_broadcast {
                config.without_broadcast()
            } else {
                config
            };
            let options = simulate::Options {
                size: board_size(size)?,
                moves,
                drop_broadcasts,
                fail_write,
                leave_after,
            };
            simulate::run(config, options).await?;
        }
        Commands::Race { size } => {
            race::run(config, board_size(size)?).await?;
        }
    }

    Ok(())
}

fn board_size(side: u8) -> Result<BoardSize> {
    BoardSize::new(side).with_context(|| format!("Unsupported board size {}", side))
}
