use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "deckhand",
    about = "Chat-ops control deck for Docker containers",
    version
)]
pub struct Cli {
    /// Path to the Deckfile (defaults to the user config directory)
    #[arg(short, long, env = "DECKHAND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the watch service: status sweeps, surface refreshes,
    /// scheduled tasks
    Watch,

    /// One-shot fleet overview (forces a fresh sweep)
    Status,

    /// Validate the Deckfile and exit
    Validate,

    /// Write an example Deckfile
    Init {
        /// Overwrite an existing Deckfile
        #[arg(long)]
        force: bool,
    },
}
