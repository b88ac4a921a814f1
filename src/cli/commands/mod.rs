//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod analyze;
mod config_cmd;
mod gallery;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "inspo")]
#[command(about = "Streaming AI visual analysis of images")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config file)
    #[arg(long, global = true, env = "INSPO_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one image: URL, local path, file:// URL or data URI
    Analyze {
        /// Image source
        source: String,
        /// Page the image was found on, stored with the gallery entry
        #[arg(long)]
        page_url: Option<String>,
        /// Don't save the result to the gallery
        #[arg(long)]
        no_save: bool,
        /// Print the final status as JSON instead of a progress bar
        #[arg(long)]
        json: bool,
    },

    /// Show the most recent analysis status, if still recoverable
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List saved analyses, newest first
    Gallery {
        /// Maximum entries to show
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration (keys redacted)
    Config,
}

/// Parse arguments, load settings and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load().await;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = Some(dir.to_string_lossy().into_owned());
    }

    match cli.command {
        Commands::Analyze {
            source,
            page_url,
            no_save,
            json,
        } => analyze::cmd_analyze(&settings, &source, page_url, !no_save, json).await,
        Commands::Status { json } => status::cmd_status(&settings, json).await,
        Commands::Gallery { limit, json } => gallery::cmd_gallery(&settings, limit, json).await,
        Commands::Config => config_cmd::cmd_config(&settings),
    }
}
