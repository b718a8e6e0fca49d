//! Topograph CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use topograph_core::{FilterMode, LayoutKind};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "topograph")]
#[command(about = "Keeps a laid-out topology view in sync with replaced graph snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Working root holding topograph.toml and the position cache
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

/// Overlay inputs applied before the first snapshot.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct OverlayArgs {
    /// Node type to hide (repeatable)
    #[arg(long = "hide-node-type")]
    pub hidden_node_types: Vec<String>,

    /// Edge type to hide (repeatable)
    #[arg(long = "hide-edge-type")]
    pub hidden_edge_types: Vec<String>,

    /// How hidden types are shown: ghost or exclude
    #[arg(long, default_value = "ghost")]
    pub filter_mode: FilterMode,

    /// Search text to highlight
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed snapshot files through the view in order and report each step
    Replay {
        /// Snapshot JSON files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print one JSON object per step
        #[arg(long)]
        json: bool,

        /// Run a layout after the last snapshot
        #[arg(long)]
        layout: Option<LayoutKind>,

        #[command(flatten)]
        overlay: OverlayArgs,
    },
    /// Follow a snapshot file and resync on every rewrite
    Watch {
        /// Snapshot JSON file
        file: PathBuf,

        #[command(flatten)]
        overlay: OverlayArgs,
    },
    /// Clear the position cache
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "topograph={0},topograph_core={0},topograph_watcher={0}",
            log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!("Topograph v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Working root: {}", cli.root.display());

    match cli.command {
        Commands::Replay { files, json, layout, overlay } => commands::replay(cli.root, files, json, layout, overlay),
        Commands::Watch { file, overlay } => commands::watch(cli.root, file, overlay).await,
        Commands::Clear => commands::clear(cli.root),
        Commands::Version => {
            println!("Topograph v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
