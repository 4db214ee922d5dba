//! Dreamcloud CLI — render pipeline driver for timelines saved as JSON.
//!
//! Usage:
//!   dreamcloud check                 Check the render engine and directories
//!   dreamcloud validate <PATH>       Generate + validate project XML for a timeline
//!   dreamcloud render <PATH>         Export a timeline to video
//!   dreamcloud preview <PATH>        Fast preview render, optionally a time range
//!   dreamcloud sweep                 Remove orphaned render workspaces

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "dreamcloud",
    about = "Timeline rendering for the Dreamcloud studio",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the render engine and configured directories
    Check,

    /// Generate project XML for a timeline and validate it
    Validate {
        /// Path to the timeline JSON file
        path: PathBuf,

        /// Use the preview profile instead of the export profile
        #[arg(long)]
        preview: bool,

        /// Write the generated XML here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export a timeline to video
    Render {
        /// Path to the timeline JSON file
        path: PathBuf,

        /// Render preset name
        #[arg(long, default_value = "export-h264")]
        preset: String,

        /// Output file name hint (typically the project id)
        #[arg(long)]
        stem: Option<String>,

        /// Keep the generated XML and work directory after the render
        #[arg(long)]
        keep_artifacts: bool,
    },

    /// Fast preview render, optionally restricted to a time range
    Preview {
        /// Path to the timeline JSON file
        path: PathBuf,

        /// Range start in seconds
        #[arg(long)]
        start: Option<f64>,

        /// Range end in seconds
        #[arg(long)]
        end: Option<f64>,
    },

    /// Remove orphaned render workspaces left behind by crashes
    Sweep {
        /// Remove workspaces older than this many seconds
        #[arg(long)]
        max_age_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    dreamcloud_common::logging::init_logging(&dreamcloud_common::config::LoggingConfig {
        level: log_level.to_string(),
        json: false,
        file: None,
    });

    match cli.command {
        Commands::Check => commands::check::run().await,
        Commands::Validate {
            path,
            preview,
            output,
        } => commands::validate::run(path, preview, output),
        Commands::Render {
            path,
            preset,
            stem,
            keep_artifacts,
        } => commands::render::run(path, preset, stem, keep_artifacts).await,
        Commands::Preview { path, start, end } => commands::preview::run(path, start, end).await,
        Commands::Sweep { max_age_secs } => commands::sweep::run(max_age_secs),
    }
}
